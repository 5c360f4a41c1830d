//! Request dialect classification
//!
//! Precedence, first match wins:
//! 1. Opaque: the path is base64 shaped and decodes to a valid record
//! 2. Custom: a rewrite rule is configured and the path looks like an image
//! 3. Legacy: the path looks like an image
//!
//! The legacy prefix markers (`fit-in`, `filters:`, `unsafe`) are all
//! optional, so the shape check only looks at the end of the path: either a
//! supported image extension or no dotted suffix at all.
//!
//! A configured rewrite rule does not claim every path: custom requests
//! must pass the same shape check as legacy ones. Paths that fail it stay
//! unclassified, which is what lets `key.jpg!style` reach the action
//! pipeline while a rewrite rule is active.

use super::decode;
use crate::error::ImageHandlerError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static OPAQUE_SHAPE: OnceLock<Regex> = OnceLock::new();
static IMAGE_EXTENSION: OnceLock<Regex> = OnceLock::new();
static DOTTED_SUFFIX: OnceLock<Regex> = OnceLock::new();

fn opaque_shape() -> &'static Regex {
    OPAQUE_SHAPE.get_or_init(|| {
        Regex::new(r"^/?([0-9a-zA-Z+/]{4})*(([0-9a-zA-Z+/]{2}==)|([0-9a-zA-Z+/]{3}=))?$")
            .expect("Invalid opaque regex - this is a compile-time bug")
    })
}

fn image_extension() -> &'static Regex {
    IMAGE_EXTENSION.get_or_init(|| {
        Regex::new(r"(?i)(\.jpg|\.jpeg|.\.png|\.webp|\.tiff|\.tif|\.svg|\.gif|\.avif)$")
            .expect("Invalid extension regex - this is a compile-time bug")
    })
}

fn dotted_suffix() -> &'static Regex {
    DOTTED_SUFFIX.get_or_init(|| {
        Regex::new(r"\.[^./\\]+$").expect("Invalid suffix regex - this is a compile-time bug")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Base64 JSON record
    Opaque,
    /// Thumbor-style path grammar
    Legacy,
    /// Legacy grammar after an operator-configured rewrite
    Custom,
}

impl RequestType {
    /// Legacy and custom requests share the path grammar
    pub fn uses_path_grammar(&self) -> bool {
        matches!(self, RequestType::Legacy | RequestType::Custom)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Opaque => "Default",
            RequestType::Legacy => "Thumbor",
            RequestType::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Whether a path looks like a request for an image file
pub fn looks_like_image(path: &str) -> bool {
    image_extension().is_match(path) || !dotted_suffix().is_match(path)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestClassifier {
    rewrite_configured: bool,
}

impl RequestClassifier {
    pub fn new(rewrite_configured: bool) -> Self {
        Self { rewrite_configured }
    }

    pub fn classify(&self, path: &str) -> Result<RequestType, ImageHandlerError> {
        if opaque_shape().is_match(path) && decode::decode(path).is_ok() {
            return Ok(RequestType::Opaque);
        }
        if looks_like_image(path) {
            if self.rewrite_configured {
                return Ok(RequestType::Custom);
            }
            return Ok(RequestType::Legacy);
        }
        tracing::debug!(path = %path, "No request dialect matched");
        Err(ImageHandlerError::classification(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::decode::{encode, OpaqueRequest};
    use rstest::rstest;

    fn opaque_path() -> String {
        let request = OpaqueRequest {
            key: "test.jpg".into(),
            ..Default::default()
        };
        format!("/{}", encode(&request).unwrap())
    }

    #[test]
    fn test_opaque_wins() {
        let path = opaque_path();
        assert_eq!(RequestClassifier::new(false).classify(&path).unwrap(), RequestType::Opaque);
        assert_eq!(RequestClassifier::new(true).classify(&path).unwrap(), RequestType::Opaque);
    }

    #[rstest]
    #[case("/fit-in/200x300/filters:grayscale()/test-image-001.jpg")]
    #[case("/test.PNG")]
    #[case("/unsafe/photos/image")]
    #[case("/filters:format(webp)/a/b.avif")]
    fn test_legacy_paths(#[case] path: &str) {
        assert_eq!(RequestClassifier::new(false).classify(path).unwrap(), RequestType::Legacy);
        assert_eq!(RequestClassifier::new(true).classify(path).unwrap(), RequestType::Custom);
    }

    #[test]
    fn test_base64_shaped_but_not_json_falls_through() {
        // "abcd" is valid base64 but not a record, and has no dotted suffix
        assert_eq!(RequestClassifier::new(false).classify("/abcd").unwrap(), RequestType::Legacy);
    }

    #[rstest]
    #[case("/image.pdf")]
    #[case("/archive/file.tar.gz")]
    fn test_unsupported_extension_fails(#[case] path: &str) {
        let err = RequestClassifier::new(false).classify(path).unwrap_err();
        assert_eq!(err.code(), "RequestTypeError");
        assert_eq!(err.to_http_status(), 400);
    }

    #[test]
    fn test_rewrite_rule_does_not_claim_every_path() {
        let classifier = RequestClassifier::new(true);
        assert!(classifier.classify("/notes.txt").is_err());
        assert!(classifier.classify("/cat.jpg!thumb").is_err());
        assert_eq!(classifier.classify("/a!b.png").unwrap(), RequestType::Custom);
    }
}
