//! Face detection and content moderation collaborator
//!
//! The executor hands the service an encoded image (JPEG or PNG) and gets
//! back bounding boxes as fractions of the image size, or moderation
//! labels at or above a confidence threshold.

use crate::error::ImageHandlerError;
use async_trait::async_trait;
use thiserror::Error;

/// Face position as fractions of the image dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// The whole image
    pub const FULL: BoundingBox = BoundingBox {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationLabel {
    pub name: String,
    pub confidence: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("No vision service is configured")]
    NotConfigured,

    #[error("{message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
}

impl From<VisionError> for ImageHandlerError {
    fn from(err: VisionError) -> Self {
        match &err {
            VisionError::NotConfigured => {
                ImageHandlerError::collaborator(500, "Vision::NotConfigured", err.to_string())
            }
            VisionError::Service { status, code, .. } => {
                ImageHandlerError::collaborator(*status, code.clone(), err.to_string())
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<BoundingBox>, VisionError>;

    async fn detect_moderation_labels(
        &self,
        image: &[u8],
        min_confidence: f64,
    ) -> Result<Vec<ModerationLabel>, VisionError>;
}

/// Used when no detection backend is wired in; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVision;

#[async_trait]
impl VisionService for DisabledVision {
    async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<BoundingBox>, VisionError> {
        Err(VisionError::NotConfigured)
    }

    async fn detect_moderation_labels(
        &self,
        _image: &[u8],
        _min_confidence: f64,
    ) -> Result<Vec<ModerationLabel>, VisionError> {
        Err(VisionError::NotConfigured)
    }
}

/// Fixed answers, for tests and offline runs
#[derive(Debug, Clone, Default)]
pub struct StaticVision {
    pub faces: Vec<BoundingBox>,
    pub labels: Vec<ModerationLabel>,
}

impl StaticVision {
    pub fn with_faces(faces: Vec<BoundingBox>) -> Self {
        Self {
            faces,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(labels: &[(&str, f64)]) -> Self {
        Self {
            faces: Vec::new(),
            labels: labels
                .iter()
                .map(|(name, confidence)| ModerationLabel {
                    name: name.to_string(),
                    confidence: *confidence,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl VisionService for StaticVision {
    async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<BoundingBox>, VisionError> {
        Ok(self.faces.clone())
    }

    async fn detect_moderation_labels(
        &self,
        _image: &[u8],
        min_confidence: f64,
    ) -> Result<Vec<ModerationLabel>, VisionError> {
        Ok(self
            .labels
            .iter()
            .filter(|l| l.confidence >= min_confidence)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_vision_filters_by_confidence() {
        let vision = StaticVision::with_labels(&[("Violence", 90.0), ("Drugs", 60.0)]);
        let labels = vision.detect_moderation_labels(b"img", 75.0).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Violence");
    }

    #[tokio::test]
    async fn test_disabled_vision_maps_to_collaborator_failure() {
        let err: ImageHandlerError = DisabledVision.detect_faces(b"img").await.unwrap_err().into();
        assert_eq!(err.to_http_status(), 500);
        assert_eq!(err.code(), "Vision::NotConfigured");
    }

    #[tokio::test]
    async fn test_service_status_is_preserved() {
        let mut mock = MockVisionService::new();
        mock.expect_detect_faces().returning(|_| {
            Err(VisionError::Service {
                status: 429,
                code: "ThrottlingException".into(),
                message: "slow down".into(),
            })
        });
        let err: ImageHandlerError = mock.detect_faces(b"img").await.unwrap_err().into();
        assert_eq!(err.to_http_status(), 429);
        assert_eq!(err.code(), "ThrottlingException");
    }
}
