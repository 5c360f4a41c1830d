//! Opaque dialect: base64-encoded JSON request records
//!
//! The decoder tolerates a leading slash, either base64 alphabet and missing
//! padding. The record is parsed from UTF-8 so keys and edit values may
//! carry characters outside basic Latin.

use crate::error::ImageHandlerError;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The structured record carried by an opaque request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpaqueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edits: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// WebP encoder effort
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<f64>,
}

/// Decode an opaque request path
pub fn decode(path: &str) -> Result<OpaqueRequest, ImageHandlerError> {
    if path.is_empty() {
        return Err(ImageHandlerError::cannot_read_path());
    }
    let encoded = path.strip_prefix('/').unwrap_or(path);
    let normalized: String = encoded
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let raw = LENIENT
        .decode(normalized.as_bytes())
        .map_err(|_| ImageHandlerError::cannot_decode())?;
    serde_json::from_slice(&raw).map_err(|e| {
        tracing::debug!(error = %e, "Opaque request is not a valid record");
        ImageHandlerError::cannot_decode()
    })
}

/// Encode a record into the path form accepted by [`decode`]
pub fn encode(request: &OpaqueRequest) -> Result<String, ImageHandlerError> {
    let json = serde_json::to_vec(request).map_err(|_| ImageHandlerError::cannot_decode())?;
    Ok(STANDARD.encode(json))
}
