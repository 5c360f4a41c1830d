//! Accept header negotiation
//!
//! Parses `Accept` values with q-values so that `image/webp;q=0` is treated
//! as an explicit refusal rather than a preference.

use super::ImageFormat;

/// Parsed Accept header preference
#[derive(Debug, Clone)]
struct FormatPreference {
    format: ImageFormat,
    quality: f32,
}

/// Whether the caller's Accept header admits `format`
pub fn accepts(accept_header: Option<&str>, format: ImageFormat) -> bool {
    let accept = match accept_header {
        Some(h) => h,
        None => return false,
    };

    parse_accept_header(accept)
        .iter()
        .any(|p| p.format == format && p.quality > 0.0)
}

/// Parse Accept header into format preferences, in header order
fn parse_accept_header(accept: &str) -> Vec<FormatPreference> {
    let mut preferences = Vec::new();

    for part in accept.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (media_type, quality) = if let Some((mt, params)) = part.split_once(';') {
            (mt.trim(), parse_quality(params))
        } else {
            (part, 1.0)
        };

        if let Some(format) = parse_image_media_type(media_type) {
            preferences.push(FormatPreference { format, quality });
        }
    }

    preferences
}

/// Parse quality value from parameters (e.g., "q=0.8")
fn parse_quality(params: &str) -> f32 {
    for param in params.split(';') {
        let param = param.trim();
        if let Some(q) = param.strip_prefix("q=") {
            if let Ok(quality) = q.parse::<f32>() {
                return quality.clamp(0.0, 1.0);
            }
        }
    }
    1.0
}

/// Only explicit image subtypes count; wildcards never select a format
fn parse_image_media_type(media_type: &str) -> Option<ImageFormat> {
    let subtype = media_type.trim().to_lowercase();
    let subtype = subtype.strip_prefix("image/")?;
    match subtype {
        "webp" => Some(ImageFormat::Webp),
        "avif" => Some(ImageFormat::Avif),
        "png" => Some(ImageFormat::Png),
        "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
        "gif" => Some(ImageFormat::Gif),
        "tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_webp() {
        assert!(accepts(
            Some("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
            ImageFormat::Webp
        ));
    }

    #[test]
    fn test_wildcard_does_not_select() {
        assert!(!accepts(Some("image/*,*/*"), ImageFormat::Webp));
    }

    #[test]
    fn test_zero_quality_is_refusal() {
        assert!(!accepts(Some("image/webp;q=0,image/png"), ImageFormat::Webp));
        assert!(accepts(Some("image/webp;q=0.5"), ImageFormat::Webp));
    }

    #[test]
    fn test_low_quality_still_admits() {
        assert!(accepts(Some("image/png;q=0.9, image/webp;q=0.1"), ImageFormat::Webp));
    }

    #[test]
    fn test_missing_header() {
        assert!(!accepts(None, ImageFormat::Webp));
    }
}
