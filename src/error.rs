//! Request-level error kinds
//!
//! Every failure a single image request can hit is one variant of
//! [`ImageHandlerError`]. Each variant carries a stable machine code (the
//! `code` field of the JSON error body), a human readable message and an
//! HTTP status via [`ImageHandlerError::to_http_status`].

use std::fmt;

/// Errors raised while classifying, resolving or executing an image request
#[derive(Debug, Clone, PartialEq)]
pub enum ImageHandlerError {
    // === Request shape ===
    /// No request dialect matched the path
    ClassificationFailure { path: String },
    /// Opaque payload could not be decoded, or there was no path at all
    DecodeFailure { code: &'static str, message: String },
    /// The rewrite dialect (or another configured feature) is missing settings
    ConfigurationError { code: &'static str, message: String },

    // === Edit validation ===
    /// An edit or action parameter is malformed or out of range
    InvalidEdit { code: String, message: String },
    /// Action or processor name is not registered
    UnknownAction { name: String },
    /// Style name was looked up but holds no action string
    StyleNotFound { name: String },
    /// Style name contains characters outside the allowed set
    InvalidStyleName { name: String },

    // === Source access ===
    /// No source buckets are configured
    NoSourceBuckets,
    /// The requested bucket is not on the allow-list
    SourceNotAllowed { bucket: String },
    /// A caller-supplied signature is required but absent
    MissingSignature,
    /// The caller-supplied signature does not match the path
    SignatureMismatch,

    // === Collaborators ===
    /// Face index beyond the detected faces
    FaceIndexOutOfRange { index: usize, detected: usize },
    /// Storage, detection or moderation failure, with the collaborator's status
    CollaboratorFailure {
        status: u16,
        code: String,
        message: String,
    },
    /// The image engine rejected an operation or could not encode
    Engine { code: String, message: String },

    // === Output ===
    /// Encoded body exceeds the configured ceiling
    OutputTooLarge { size: usize, limit: usize },
}

impl fmt::Display for ImageHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageHandlerError::ClassificationFailure { .. } => write!(
                f,
                "The type of request you are making could not be processed. Please ensure that \
                 your original image is of a supported file type (jpg/jpeg, png, tiff/tif, webp, \
                 svg, gif, avif) and that your image request is provided in the correct syntax."
            ),
            ImageHandlerError::DecodeFailure { message, .. }
            | ImageHandlerError::ConfigurationError { message, .. }
            | ImageHandlerError::InvalidEdit { message, .. }
            | ImageHandlerError::CollaboratorFailure { message, .. }
            | ImageHandlerError::Engine { message, .. } => write!(f, "{}", message),
            ImageHandlerError::UnknownAction { name } => {
                write!(f, "Unknown action: \"{}\"", name)
            }
            ImageHandlerError::StyleNotFound { name } => {
                write!(f, "Style not found: \"{}\"", name)
            }
            ImageHandlerError::InvalidStyleName { name } => {
                write!(f, "Invalid style name: \"{}\"", name)
            }
            ImageHandlerError::SourceNotAllowed { bucket } => write!(
                f,
                "The bucket you specified ({}) could not be accessed. Please check that the \
                 bucket is listed in the source buckets.",
                bucket
            ),
            ImageHandlerError::NoSourceBuckets => write!(
                f,
                "The source buckets could not be read. Please check that at least one source \
                 bucket is configured."
            ),
            ImageHandlerError::MissingSignature => {
                write!(f, "Query-string requires the signature parameter.")
            }
            ImageHandlerError::SignatureMismatch => write!(f, "Signature does not match."),
            ImageHandlerError::FaceIndexOutOfRange { index, detected } => write!(
                f,
                "You have provided a FaceIndex value ({}) that exceeds the {} detected faces. \
                 Please specify a value that is in-range.",
                index, detected
            ),
            ImageHandlerError::OutputTooLarge { size, limit } => write!(
                f,
                "The converted image is too large to return ({} bytes encoded, limit {}).",
                size, limit
            ),
        }
    }
}

impl std::error::Error for ImageHandlerError {}

impl ImageHandlerError {
    /// Stable machine-readable code for the error body
    pub fn code(&self) -> &str {
        match self {
            ImageHandlerError::ClassificationFailure { .. } => "RequestTypeError",
            ImageHandlerError::DecodeFailure { code, .. }
            | ImageHandlerError::ConfigurationError { code, .. } => *code,
            ImageHandlerError::InvalidEdit { code, .. }
            | ImageHandlerError::CollaboratorFailure { code, .. }
            | ImageHandlerError::Engine { code, .. } => code.as_str(),
            ImageHandlerError::UnknownAction { .. } => "UnknownAction",
            ImageHandlerError::StyleNotFound { .. } => "StyleNotFound",
            ImageHandlerError::InvalidStyleName { .. } => "InvalidStyleName",
            ImageHandlerError::SourceNotAllowed { .. } => "ImageBucket::CannotAccessBucket",
            ImageHandlerError::NoSourceBuckets => "GetAllowedSourceBuckets::NoSourceBuckets",
            ImageHandlerError::MissingSignature => "AuthorizationQueryParametersError",
            ImageHandlerError::SignatureMismatch => "SignatureDoesNotMatch",
            ImageHandlerError::FaceIndexOutOfRange { .. } => "SmartCrop::FaceIndexOutOfRange",
            ImageHandlerError::OutputTooLarge { .. } => "TooLargeImageException",
        }
    }

    /// Maps error kinds to HTTP status codes
    ///
    /// Status mapping:
    /// - request shape, edit validation, styles, missing signature → 400
    /// - source not allowed, signature mismatch → 403
    /// - collaborator failures → the collaborator's own status
    /// - output too large → 413
    /// - configuration and engine failures → 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            ImageHandlerError::ClassificationFailure { .. }
            | ImageHandlerError::DecodeFailure { .. }
            | ImageHandlerError::InvalidEdit { .. }
            | ImageHandlerError::UnknownAction { .. }
            | ImageHandlerError::StyleNotFound { .. }
            | ImageHandlerError::InvalidStyleName { .. }
            | ImageHandlerError::NoSourceBuckets
            | ImageHandlerError::MissingSignature
            | ImageHandlerError::FaceIndexOutOfRange { .. } => 400,

            ImageHandlerError::SourceNotAllowed { .. } | ImageHandlerError::SignatureMismatch => {
                403
            }

            ImageHandlerError::CollaboratorFailure { status, .. } => *status,

            ImageHandlerError::OutputTooLarge { .. } => 413,

            ImageHandlerError::ConfigurationError { .. } | ImageHandlerError::Engine { .. } => 500,
        }
    }

    /// Helper constructors for common error patterns
    pub fn classification(path: impl Into<String>) -> Self {
        ImageHandlerError::ClassificationFailure { path: path.into() }
    }

    pub fn cannot_decode() -> Self {
        ImageHandlerError::DecodeFailure {
            code: "DecodeRequest::CannotDecodeRequest",
            message: "The image request you provided could not be decoded. Please check that \
                      your request is base64 encoded properly."
                .to_string(),
        }
    }

    pub fn cannot_read_path() -> Self {
        ImageHandlerError::DecodeFailure {
            code: "DecodeRequest::CannotReadPath",
            message: "The URL path you provided could not be read. Please ensure that it is \
                      properly formed."
                .to_string(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        ImageHandlerError::ConfigurationError {
            code,
            message: message.into(),
        }
    }

    /// Generic invalid-argument error used by the action pipeline
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::invalid_edit("InvalidArgument", message)
    }

    pub fn invalid_edit(code: impl Into<String>, message: impl Into<String>) -> Self {
        ImageHandlerError::InvalidEdit {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown_param(key: &str) -> Self {
        Self::invalid_argument(format!("Unknown param: \"{}\"", key))
    }

    pub fn collaborator(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ImageHandlerError::CollaboratorFailure {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn engine(code: impl Into<String>, message: impl Into<String>) -> Self {
        ImageHandlerError::Engine {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True for the "invalid argument" family (bad edit parameters)
    pub fn is_invalid_edit(&self) -> bool {
        matches!(self, ImageHandlerError::InvalidEdit { .. })
    }
}
