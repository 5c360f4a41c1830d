//! `overlayWith`: place a second stored image on top of the current one
//!
//! The overlay is scaled with fit `inside` to `wRatio`/`hRatio` percent of
//! the base image, faded by `alpha` percent, and placed at `left`/`top`.
//! Positions are pixels or `Np` percentages; negative values count from
//! the far edge and account for the overlay size.

use crate::edits::{parse_int_prefix, FitMode, OverlayEdit};
use crate::engine::{EngineImage, ImageEngine, Layer, LayerInput, LoadOptions, ResizeOptions};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use crate::store::ObjectStore;
use bytes::Bytes;
use regex::Regex;
use std::sync::OnceLock;

static ZERO_TO_HUNDRED: OnceLock<Regex> = OnceLock::new();

fn zero_to_hundred_regex() -> &'static Regex {
    ZERO_TO_HUNDRED.get_or_init(|| {
        Regex::new(r"^(100|[1-9]?\d)$")
            .expect("Invalid percentage regex - this is a compile-time bug")
    })
}

/// Integer 0..=100 written without leading zeros
pub fn zero_to_hundred(value: Option<&str>) -> Option<u32> {
    let value = value?;
    if !zero_to_hundred_regex().is_match(value) {
        return None;
    }
    value.parse().ok()
}

/// Resolve one placement value against the base and overlay size along
/// the same axis; `None` when the value is not a number
pub fn overlay_offset(value: &str, image_size: u32, overlay_size: u32) -> Option<i64> {
    let image_size = image_size as f64;
    let overlay_size = overlay_size as f64;

    if let Some(percent) = value.strip_suffix('p') {
        let percent = parse_int_prefix(percent)? as f64;
        let offset = if percent < 0.0 {
            image_size + (image_size * percent) / 100.0 - overlay_size
        } else {
            (image_size * percent) / 100.0
        };
        return Some(offset.floor() as i64);
    }

    let pixels = parse_int_prefix(value)?;
    if pixels < 0 {
        return Some((image_size + pixels as f64 - overlay_size) as i64);
    }
    Some(pixels)
}

pub(super) async fn apply_overlay(
    image: &mut dyn EngineImage,
    edit: &OverlayEdit,
    engine: &dyn ImageEngine,
    store: &dyn ObjectStore,
) -> Result<(), ImageHandlerError> {
    let base = image.metadata();
    let object = store.get_object(&edit.bucket, &edit.key).await?;
    let mut overlay = engine.load(&object.body, LoadOptions::default())?;

    let width = zero_to_hundred(edit.w_ratio.as_deref()).map(|r| base.width * r / 100);
    let height = zero_to_hundred(edit.h_ratio.as_deref()).map(|r| base.height * r / 100);
    overlay.resize(&ResizeOptions::new(width, height, FitMode::Inside))?;

    let alpha = zero_to_hundred(edit.alpha.as_deref()).unwrap_or(0);
    overlay.set_opacity(1.0 - alpha as f32 / 100.0);

    let overlay_meta = overlay.metadata();
    let left = edit
        .options
        .left
        .as_deref()
        .and_then(|v| overlay_offset(v, base.width, overlay_meta.width));
    let top = edit
        .options
        .top
        .as_deref()
        .and_then(|v| overlay_offset(v, base.height, overlay_meta.height));

    tracing::debug!(
        bucket = %edit.bucket,
        key = %edit.key,
        left = ?left,
        top = ?top,
        "Compositing overlay"
    );

    let encoded = overlay.encode_as(ImageFormat::Png)?;
    let mut layer = Layer::new(LayerInput::Encoded(Bytes::from(encoded.data)));
    layer.left = left;
    layer.top = top;
    image.composite(&[layer])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", Some(0))]
    #[case("50", Some(50))]
    #[case("100", Some(100))]
    #[case("101", None)]
    #[case("05", None)]
    #[case("-1", None)]
    #[case("abc", None)]
    fn test_zero_to_hundred(#[case] value: &str, #[case] expected: Option<u32>) {
        assert_eq!(zero_to_hundred(Some(value)), expected);
    }

    #[rstest]
    #[case("50p", 200, 20, Some(100))]
    #[case("-10p", 200, 20, Some(160))]
    #[case("10", 200, 20, Some(10))]
    #[case("-10", 200, 20, Some(170))]
    #[case("33p", 100, 0, Some(33))]
    #[case("abc", 200, 20, None)]
    #[case("xp", 200, 20, None)]
    fn test_overlay_offset(
        #[case] value: &str,
        #[case] image_size: u32,
        #[case] overlay_size: u32,
        #[case] expected: Option<i64>,
    ) {
        assert_eq!(overlay_offset(value, image_size, overlay_size), expected);
    }

    #[tokio::test]
    async fn test_apply_overlay_places_scaled_image() {
        use crate::edits::OverlayPlacement;
        use crate::engine::{RasterEngine, RasterImage};
        use crate::store::MemoryObjectStore;

        let red = RasterImage::from_rgba(image::RgbaImage::from_pixel(
            50,
            50,
            image::Rgba([255, 0, 0, 255]),
        ))
        .encode_as(ImageFormat::Png)
        .unwrap();
        let store = MemoryObjectStore::new();
        store.put("assets", "logo.png", Bytes::from(red.data), Some("image/png"));

        let mut base: Box<dyn EngineImage> = Box::new(RasterImage::from_rgba(
            image::RgbaImage::from_pixel(100, 100, image::Rgba([0, 0, 0, 255])),
        ));
        let edit = OverlayEdit {
            bucket: "assets".into(),
            key: "logo.png".into(),
            w_ratio: Some("20".into()),
            options: OverlayPlacement {
                left: Some("10".into()),
                top: Some("-10".into()),
            },
            ..Default::default()
        };
        apply_overlay(base.as_mut(), &edit, &RasterEngine::new(), &store)
            .await
            .unwrap();

        let encoded = base.encode_as(ImageFormat::Png).unwrap();
        let pixels = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        // 20x20 overlay at (10, 100 - 10 - 20)
        assert_eq!(pixels.get_pixel(15, 75)[0], 255);
        assert_eq!(pixels.get_pixel(5, 75)[0], 0);
        assert_eq!(pixels.get_pixel(15, 65)[0], 0);
    }

    #[tokio::test]
    async fn test_missing_overlay_object_fails() {
        use crate::engine::{RasterEngine, RasterImage};
        use crate::store::MemoryObjectStore;

        let mut base: Box<dyn EngineImage> =
            Box::new(RasterImage::from_rgba(image::RgbaImage::new(10, 10)));
        let edit = OverlayEdit {
            bucket: "assets".into(),
            key: "missing.png".into(),
            ..Default::default()
        };
        let err = apply_overlay(base.as_mut(), &edit, &RasterEngine::new(), &MemoryObjectStore::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_http_status(), 404);
    }
}
