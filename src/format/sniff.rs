//! Content-type inference from magic bytes
//!
//! Objects stored with a generic content type (`binary/octet-stream`,
//! `application/octet-stream`) have their real type inferred here.

/// Generic content types that trigger sniffing
pub const GENERIC_CONTENT_TYPES: [&str; 2] = ["binary/octet-stream", "application/octet-stream"];

/// Infer a content type from the first bytes of an image
///
/// Returns `"image"` when the signature is not recognised. SVG has no
/// binary signature and is never inferred.
pub fn infer_image_type(data: &[u8]) -> &'static str {
    if data.len() >= 4 {
        match &data[0..4] {
            [0x89, 0x50, 0x4E, 0x47] => return "image/png",
            [0x52, 0x49, 0x46, 0x46] => return "image/webp",
            [0x49, 0x49, 0x2A, 0x00] | [0x4D, 0x4D, 0x00, 0x2A] => return "image/tiff",
            [0x47, 0x49, 0x46, 0x38] => return "image/gif",
            _ => {}
        }
    }
    if data.len() >= 2 && data[0..2] == [0xFF, 0xD8] {
        return "image/jpeg";
    }
    if data.len() >= 12 && &data[4..12] == b"ftypavif" {
        return "image/avif";
    }
    "image"
}

/// Resolve the content type reported by storage
pub fn resolve_content_type(reported: Option<&str>, data: &[u8]) -> String {
    match reported {
        Some(ct) if GENERIC_CONTENT_TYPES.contains(&ct) => infer_image_type(data).to_string(),
        Some(ct) => ct.to_string(),
        None => "image".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x89, 0x50, 0x4E, 0x47, 0x0D], "image/png")]
    #[case(b"RIFF\0\0\0\0WEBP", "image/webp")]
    #[case(&[0x49, 0x49, 0x2A, 0x00], "image/tiff")]
    #[case(&[0x4D, 0x4D, 0x00, 0x2A], "image/tiff")]
    #[case(b"GIF89a", "image/gif")]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg")]
    #[case(b"\0\0\0\x1cftypavif", "image/avif")]
    #[case(b"<svg xmlns", "image")]
    #[case(&[], "image")]
    fn test_infer_image_type(#[case] data: &[u8], #[case] expected: &str) {
        assert_eq!(infer_image_type(data), expected);
    }

    #[test]
    fn test_resolve_content_type() {
        let png = [0x89, 0x50, 0x4E, 0x47];
        assert_eq!(
            resolve_content_type(Some("binary/octet-stream"), &png),
            "image/png"
        );
        assert_eq!(
            resolve_content_type(Some("image/jpeg"), &png),
            "image/jpeg"
        );
        assert_eq!(resolve_content_type(None, &png), "image");
    }
}
