use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use super::{DetectedFace, FaceDetector};
use crate::config::DetectionConfig;
use crate::error::{Error, Result};

/// Client for a Face++-style detect endpoint.
///
/// Each call posts the image as `multipart/form-data` together with the API
/// credentials and asks for landmarks.
///
/// The blocking client runs its own runtime thread, so build it outside of
/// async code (or inside `spawn_blocking`).
pub struct FaceApiClient {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

impl FaceApiClient {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::DetectionTransport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn form(&self, image: &[u8]) -> Form {
        Form::new()
            .text("api_key", self.api_key.clone())
            .text("api_secret", self.api_secret.clone())
            .part("image_file", Part::bytes(image.to_vec()).file_name("image"))
            .text("return_landmark", "1")
    }
}

impl FaceDetector for FaceApiClient {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>> {
        tracing::debug!(url = %self.api_url, bytes = image.len(), "Sending face detection request");

        let response = self
            .client
            .post(&self.api_url)
            .multipart(self.form(image))
            .send()
            .map_err(|e| Error::DetectionTransport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::DetectionTransport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Face detection API rejected the request");
            return Err(Error::Detection {
                status: status.as_u16(),
                payload: error_payload(text),
            });
        }

        let faces = parse_faces(&text)?;
        tracing::debug!(faces = faces.len(), "Face detection finished");
        Ok(faces)
    }

    fn provider_name(&self) -> &'static str {
        "face-api"
    }
}

fn parse_faces(text: &str) -> Result<Vec<DetectedFace>> {
    let parsed: DetectResponse = serde_json::from_str(text)
        .map_err(|e| Error::DetectionTransport(format!("unexpected response body: {}", e)))?;
    Ok(parsed.faces)
}

/// Upstream error bodies are passed through; non-JSON text is wrapped as a string.
fn error_payload(text: String) -> serde_json::Value {
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
}
