use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub annotation: AnnotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to; also the fallback host for image addresses.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facemark")
        .join("facemark.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory uploaded files are written under (`{static_root}/images/...`).
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,

    /// Public URL prefix the static root is served at.
    #[serde(default = "default_static_url")]
    pub static_url: String,
}

fn default_static_root() -> PathBuf {
    PathBuf::from("static")
}

fn default_static_url() -> String {
    "static".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_root: default_static_root(),
            static_url: default_static_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api-us.faceplusplus.com/facepp/v3/detect".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Radius in pixels of the mark drawn at each landmark.
    #[serde(default = "default_mark_radius")]
    pub mark_radius: i32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_mark_radius() -> i32 {
    3
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            mark_radius: default_mark_radius(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            detection: DetectionConfig::default(),
            annotation: AnnotationConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("FACEMARK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config::default();
            config.save_to(&config_path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Overlay values from the process environment. `lookup` is injected so
    /// tests don't have to mutate the real environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("API_URL") {
            self.detection.api_url = url;
        }
        if let Some(key) = lookup("API_PUBLIC_KEY") {
            self.detection.api_key = key;
        }
        if let Some(secret) = lookup("API_SECRET") {
            self.detection.api_secret = secret;
        }
        if let Some(root) = lookup("STATIC_ROOT") {
            self.storage.static_root = PathBuf::from(root);
        }
        if let Some(url) = lookup("STATIC_URL") {
            self.storage.static_url = url;
        }
        if let Some(path) = lookup("DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("FACEMARK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FACEMARK_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid FACEMARK_PORT"),
            }
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facemark")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [detection]
            api_key = "key"
            api_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.detection.api_key, "key");
        assert_eq!(config.detection.timeout_secs, 30);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.static_url, "static");
        assert_eq!(config.annotation.mark_radius, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_PUBLIC_KEY", "public"),
            ("STATIC_ROOT", "/srv/static"),
            ("FACEMARK_PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.detection.api_key, "public");
        assert_eq!(config.storage.static_root, PathBuf::from("/srv/static"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| (key == "FACEMARK_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.annotation.mark_radius = 5;
        config.save_to(&path).unwrap();

        let loaded: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.annotation.mark_radius, 5);
    }
}
