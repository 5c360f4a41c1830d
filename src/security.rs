//! Request signature verification
//!
//! When enabled, every request must carry a `signature` query parameter:
//!
//! ```text
//! signature = hex(HMAC-SHA256(secret, path))
//! ```
//!
//! The path is the one received from the caller, before CDN normalisation.

use crate::error::ImageHandlerError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter that carries the signature
pub const SIGNATURE_PARAM: &str = "signature";

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex signature for `path`
    pub fn sign(&self, path: &str) -> Result<String, ImageHandlerError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| {
            ImageHandlerError::configuration("SignatureValidationFailure", e.to_string())
        })?;
        mac.update(path.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, path: &str, signature: Option<&str>) -> Result<(), ImageHandlerError> {
        let signature = signature.ok_or(ImageHandlerError::MissingSignature)?;
        let expected = self.sign(path)?;
        if constant_time_compare(signature, &expected) {
            Ok(())
        } else {
            tracing::warn!(path = %path, "Request signature does not match");
            Err(ImageHandlerError::SignatureMismatch)
        }
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
