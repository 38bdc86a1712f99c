use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use facemark::config::Config;
use facemark::db::Database;
use facemark::detection::FaceApiClient;
use facemark::logging;
use facemark::server;
use facemark::service::ImageService;
use facemark::storage::ImageStore;

fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facemark {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config_path
}

fn print_help() {
    println!(
        r#"facemark - HTTP server that stores uploaded images, detects faces in
them through a remote API and paints the detected landmarks on request

USAGE:
    facemark [OPTIONS]

Runs in the foreground until interrupted (Ctrl-C), listening on the
[server] host and port from the config file.

ROUTES:
    GET    /image                       List stored images
    POST   /image                       Upload an image (multipart: file, title)
    GET    /image/{{id}}?color=NAME       Image with landmarks painted, as JPEG
    PUT    /image/{{id}}                  Replace an image and its faces
    DELETE /image/{{id}}                  Delete an image and its faces
    GET    /{{static_url}}/images/{{name}}  Stored image file

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEMARK_CONFIG     Path to config file (overrides default location)
    FACEMARK_LOG        Log filter (trace, debug, info, warn, error)
    FACEMARK_HOST       Listen address
    FACEMARK_PORT       Listen port
    API_URL             Face detection endpoint
    API_PUBLIC_KEY      Face detection API key
    API_SECRET          Face detection API secret
    STATIC_ROOT         Directory uploaded images are stored under
    STATIC_URL          URL prefix the static directory is served at
    DB_PATH             SQLite database file

Config file location: $XDG_CONFIG_HOME/facemark/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = parse_args();

    match logging::init(Some(Config::config_dir().join("logs"))) {
        Ok(target) => tracing::debug!(?target, "Logging ready"),
        Err(e) => eprintln!("Warning: logging disabled: {:#}", e),
    }

    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    if config.detection.api_key.is_empty() || config.detection.api_secret.is_empty() {
        tracing::warn!("Face detection credentials are not configured");
    }

    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    db.initialize().context("Failed to initialize database schema")?;

    let store = ImageStore::new(&config.storage);
    std::fs::create_dir_all(store.images_dir())
        .with_context(|| format!("Failed to create {}", store.images_dir().display()))?;

    // The blocking HTTP client must not be built on an async worker.
    let detection = config.detection.clone();
    let detector = tokio::task::spawn_blocking(move || FaceApiClient::new(&detection))
        .await
        .context("Face detection client setup panicked")?
        .context("Failed to build face detection client")?;
    let detector = Arc::new(detector);
    let service = ImageService::new(db, store, detector, config.annotation.clone());

    server::serve(&config.server, Arc::new(service)).await
}
