//! The action catalogue
//!
//! Each action parses its comma-split token into a typed options struct.
//! `validate` runs the same parse and discards the result, so validation
//! and processing can never disagree.

pub mod adjust;
pub mod blur;
pub mod crop;
pub mod format;
pub mod quality;
pub mod resize;
pub mod rotate;
pub mod rounded_corners;
pub mod sharpen;
pub mod toggle;
pub mod watermark;

use super::Action;
use crate::edits::parse_int_prefix;
use crate::error::ImageHandlerError;
use std::sync::Arc;

/// Every built-in action, in registration order
pub fn catalogue() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(resize::ResizeAction),
        Arc::new(quality::QualityAction),
        Arc::new(adjust::BrightAction),
        Arc::new(format::FormatAction),
        Arc::new(blur::BlurAction),
        Arc::new(rotate::RotateAction),
        Arc::new(adjust::ContrastAction),
        Arc::new(sharpen::SharpenAction),
        Arc::new(toggle::InterlaceAction),
        Arc::new(toggle::AutoOrientAction),
        Arc::new(toggle::GreyAction),
        Arc::new(crop::CropAction),
        Arc::new(crop::IndexCropAction),
        Arc::new(rounded_corners::RoundedCornersAction),
        Arc::new(watermark::WatermarkAction),
    ]
}

/// `key_value` parameters after the action name, empty tokens skipped
pub(crate) fn key_values<'a>(params: &'a [&'a str]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    params
        .iter()
        .copied()
        .skip(1)
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('_').unwrap_or((p, "")))
}

/// Integer parameter within `min..=max`
pub(crate) fn int_in_range(value: &str, min: i64, max: i64) -> Option<i64> {
    parse_int_prefix(value).filter(|v| (min..=max).contains(v))
}

/// `0` or `1`
pub(crate) fn switch(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Single positional value, as in `rotate,90`
pub(crate) fn single_value<'a>(params: &[&'a str], usage: &str) -> Result<&'a str, ImageHandlerError> {
    match params {
        [_, value] => Ok(value),
        _ => Err(ImageHandlerError::invalid_argument(usage)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_values_split_on_first_underscore() {
        let params = ["watermark", "text_SGk_", "", "t_50"];
        let pairs: Vec<_> = key_values(&params).collect();
        assert_eq!(pairs, vec![("text", "SGk_"), ("t", "50")]);
    }

    #[test]
    fn test_int_in_range() {
        assert_eq!(int_in_range("50", 0, 50), Some(50));
        assert_eq!(int_in_range("51", 0, 50), None);
        assert_eq!(int_in_range("x", 0, 50), None);
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let mut names: Vec<_> = catalogue().iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 15);
    }
}
