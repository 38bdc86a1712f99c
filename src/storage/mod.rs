//! Uploaded image files under the static root.

pub mod naming;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::Result;

pub use naming::{build_address, filename_from_address, generate_filename};

/// Owns the bytes of stored images on disk.
#[derive(Debug, Clone)]
pub struct ImageStore {
    images_dir: PathBuf,
    static_url: String,
}

impl ImageStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            images_dir: config.static_root.join("images"),
            static_url: config.static_url.clone(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn static_url(&self) -> &str {
        &self.static_url
    }

    /// Where a file with the given generated name lives on disk.
    pub fn image_path(&self, filename: &str) -> PathBuf {
        self.images_dir.join(filename)
    }

    /// Public address for a stored file as seen by a client at `host:port`.
    pub fn address(&self, host: &str, port: u16, filename: &str) -> String {
        build_address(host, port, &self.static_url, filename)
    }

    /// Map a stored address back to its file under the static root.
    pub fn resolve_address(&self, address: &str) -> Option<PathBuf> {
        filename_from_address(address).map(|name| self.image_path(name))
    }

    /// Write `bytes` to `path`, creating the parent directory and replacing
    /// any existing file.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        tracing::debug!(path = ?path, bytes = bytes.len(), "Stored image file");
        Ok(())
    }

    /// Delete `path`. Returns `false` if there was nothing to delete.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = ?path, "Removed image file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = ?path, "Image file already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}
