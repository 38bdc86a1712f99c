//! Face detection through an external HTTP API.

pub mod client;
#[cfg(test)]
pub(crate) mod stub;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::FaceApiClient;

/// A face as reported by the detection API.
///
/// Geometry is kept as the API returned it so it can be stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(default)]
    pub landmark: Option<serde_json::Value>,
    #[serde(rename = "face_rectangle", default)]
    pub rectangle: Option<serde_json::Value>,
}

/// Something that can find faces in encoded image bytes.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in the given image. Makes a single attempt.
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>>;

    /// Name used in log events.
    fn provider_name(&self) -> &'static str;
}
