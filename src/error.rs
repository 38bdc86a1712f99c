use thiserror::Error;

/// Errors surfaced by the image lifecycle and annotation workflows.
#[derive(Debug, Error)]
pub enum Error {
    #[error("image {0} not found")]
    NotFound(i64),

    /// The face detection API answered with a non-success status.
    #[error("face detection failed with status {status}: {payload}")]
    Detection {
        status: u16,
        payload: serde_json::Value,
    },

    #[error("face detection request failed: {0}")]
    DetectionTransport(String),

    #[error("failed to decode or encode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("filename has no extension: {0:?}")]
    InvalidFilename(String),

    #[error("unknown color: {0:?}")]
    InvalidColor(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("failed to fetch image from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
