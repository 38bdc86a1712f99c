//! Canned detector for tests.

use serde_json::json;
use std::sync::{Arc, Mutex};

use super::{DetectedFace, FaceDetector};
use crate::error::{Error, Result};

enum Answer {
    Faces(Vec<DetectedFace>),
    Status(u16),
}

/// Returns a fixed answer and counts calls.
pub(crate) struct StubDetector {
    answer: Mutex<Answer>,
    calls: Mutex<usize>,
}

impl StubDetector {
    pub(crate) fn returning(faces: Vec<DetectedFace>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Answer::Faces(faces)),
            calls: Mutex::new(0),
        })
    }

    pub(crate) fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Answer::Status(status)),
            calls: Mutex::new(0),
        })
    }

    pub(crate) fn set_faces(&self, faces: Vec<DetectedFace>) {
        *self.answer.lock().unwrap() = Answer::Faces(faces);
    }

    pub(crate) fn set_failing(&self, status: u16) {
        *self.answer.lock().unwrap() = Answer::Status(status);
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl FaceDetector for StubDetector {
    fn detect(&self, _image: &[u8]) -> Result<Vec<DetectedFace>> {
        *self.calls.lock().unwrap() += 1;
        match &*self.answer.lock().unwrap() {
            Answer::Faces(faces) => Ok(faces.clone()),
            Answer::Status(status) => Err(Error::Detection {
                status: *status,
                payload: json!({"error_message": "BAD_ARGUMENTS"}),
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

/// A face with the given landmark map and a fixed rectangle.
pub(crate) fn face(landmark: serde_json::Value) -> DetectedFace {
    DetectedFace {
        landmark: Some(landmark),
        rectangle: Some(json!({"top": 5, "left": 5, "width": 20, "height": 20})),
    }
}
