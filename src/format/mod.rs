//! Image formats, content negotiation and output-format resolution
//!
//! # Modules
//!
//! - `negotiate`: Accept header parsing with q-values
//! - `resolve`: final output format and quality-key reconciliation
//! - `sniff`: content-type inference from magic bytes

pub mod negotiate;
pub mod resolve;
pub mod sniff;

pub use negotiate::accepts;
pub use resolve::{reconcile_quality, FormatContext, OutputFormatResolver, ResolvedOutput};
pub use sniff::infer_image_type;

use std::fmt;
use std::str::FromStr;

/// Content type of SVG sources
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
/// Content type of GIF sources
pub const GIF_CONTENT_TYPE: &str = "image/gif";

/// Formats the request grammar and the engine understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Heif,
    Heic,
    Raw,
    Gif,
    Avif,
}

/// Formats that may carry a per-format quality sub-key in an edit set
pub const QUALITY_FORMATS: [ImageFormat; 7] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Webp,
    ImageFormat::Tiff,
    ImageFormat::Heif,
    ImageFormat::Gif,
    ImageFormat::Avif,
];

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Heif => "heif",
            ImageFormat::Heic => "heic",
            ImageFormat::Raw => "raw",
            ImageFormat::Gif => "gif",
            ImageFormat::Avif => "avif",
        }
    }

    /// Content-Type header value for this format
    pub fn content_type(&self) -> String {
        format!("image/{}", self.as_str())
    }

    /// Whether a quality sub-key for this format is reconciled on output
    pub fn is_quality_format(&self) -> bool {
        QUALITY_FORMATS.contains(self)
    }

    /// Parse the subtype of an `image/<subtype>` content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let subtype = content_type
            .split(';')
            .next()?
            .trim()
            .strip_prefix("image/")?;
        subtype.parse().ok()
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            "heif" => Ok(ImageFormat::Heif),
            "heic" => Ok(ImageFormat::Heic),
            "raw" => Ok(ImageFormat::Raw),
            "gif" => Ok(ImageFormat::Gif),
            "avif" => Ok(ImageFormat::Avif),
            _ => Err(format!("Unknown image format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("JPEG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("tif".parse::<ImageFormat>().unwrap(), ImageFormat::Tiff);
        assert!("bmp".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_content_type_round_trip() {
        assert_eq!(ImageFormat::Webp.content_type(), "image/webp");
        assert_eq!(
            ImageFormat::from_content_type("image/png"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_content_type(SVG_CONTENT_TYPE), None);
        assert_eq!(ImageFormat::from_content_type("text/plain"), None);
    }

    #[test]
    fn test_quality_formats() {
        assert!(ImageFormat::Jpeg.is_quality_format());
        assert!(ImageFormat::Avif.is_quality_format());
        assert!(!ImageFormat::Heic.is_quality_format());
        assert!(!ImageFormat::Raw.is_quality_format());
    }
}
