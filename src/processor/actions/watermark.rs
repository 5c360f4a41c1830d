//! Text and image watermarks
//!
//! `text_` and `image_` carry base64 payloads (URL-safe or standard
//! alphabet, padding optional). An image watermark names an object in the
//! context's buffer store; a text watermark is rendered by the engine with
//! the configured font.
//!
//! # Placement
//!
//! The mark is composited with the requested gravity, or tiled across the
//! whole image with `fill_1`. With `auto_1` (the default) a mark larger than
//! the base image is shrunk first.

use super::{int_in_range, key_values, switch};
use crate::edits::color::parse_hex;
use crate::edits::{FitMode, Rgba};
use crate::engine::{EngineImage, Gravity, Layer, LayerInput, LoadOptions, ResizeOptions, TextOptions};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;

const DEFAULT_FONT_SIZE: u32 = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkOpts {
    pub text: String,
    /// Object key of the watermark image
    pub image: String,
    /// Opacity percentage
    pub t: u32,
    pub g: Gravity,
    pub fill: bool,
    pub rotate: u32,
    pub size: u32,
    pub color: Rgba,
    pub auto: bool,
}

impl Default for WatermarkOpts {
    fn default() -> Self {
        Self {
            text: String::new(),
            image: String::new(),
            t: 100,
            g: Gravity::SouthEast,
            fill: false,
            rotate: 0,
            size: DEFAULT_FONT_SIZE,
            color: Rgba::black(),
            auto: true,
        }
    }
}

fn decode_payload(key: &str, value: &str) -> Result<String, ImageHandlerError> {
    let normalized: String = value
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .ok_or_else(|| {
            ImageHandlerError::invalid_argument(format!(
                "Watermark param '{}' must be base64 encoded UTF-8",
                key
            ))
        })
}

fn watermark_gravity(value: &str) -> Option<Gravity> {
    match value {
        "north" | "west" | "east" | "south" | "center" | "centre" | "southeast" | "southwest"
        | "northwest" | "northeast" | "se" | "sw" | "nw" | "ne" => value.parse().ok(),
        _ => None,
    }
}

fn switch_param(key: &str, value: &str) -> Result<bool, ImageHandlerError> {
    switch(value).ok_or_else(|| {
        ImageHandlerError::invalid_argument(format!("Watermark param '{}' must be 0 or 1", key))
    })
}

pub struct WatermarkAction;

impl WatermarkAction {
    pub fn parse(params: &[&str]) -> Result<WatermarkOpts, ImageHandlerError> {
        let mut opts = WatermarkOpts::default();
        for (key, value) in key_values(params) {
            match key {
                "text" if !value.is_empty() => opts.text = decode_payload(key, value)?,
                "image" if !value.is_empty() => opts.image = decode_payload(key, value)?,
                "text" | "image" => {}
                "t" => {
                    opts.t = int_in_range(value, 0, 100).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "Watermark param 't' must be between 0 and 100",
                        )
                    })? as u32
                }
                "g" => {
                    opts.g = watermark_gravity(value).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "Watermark param 'g' must be in 'north', 'west', 'east', 'south', 'center', 'centre', 'southeast', 'southwest', 'northwest', 'northeast'",
                        )
                    })?
                }
                "size" => {
                    opts.size = int_in_range(value, 1, 999).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "Watermark param 'size' must be between 0 and 1000",
                        )
                    })? as u32
                }
                "fill" => opts.fill = switch_param(key, value)?,
                "auto" => opts.auto = switch_param(key, value)?,
                "rotate" => {
                    let rotate = int_in_range(value, 0, 360).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "Watermark param 'rotate' must be between 0 and 360",
                        )
                    })? as u32;
                    opts.rotate = rotate % 360;
                }
                "color" => {
                    opts.color = parse_hex(&format!("#{}", value)).map_err(|_| {
                        ImageHandlerError::invalid_argument(format!(
                            "Watermark param 'color' is not a hex color: \"{}\"",
                            value
                        ))
                    })?
                }
                _ => return Err(ImageHandlerError::unknown_param(key)),
            }
        }

        match (opts.text.is_empty(), opts.image.is_empty()) {
            (true, true) => Err(ImageHandlerError::invalid_argument(
                "Watermark param 'text' and 'image' should not be empty at the same time",
            )),
            (false, false) => Err(ImageHandlerError::invalid_argument(
                "Does not support text and image watermark at the same time in this version",
            )),
            _ => Ok(opts),
        }
    }

    async fn text_mark(
        ctx: &ImageContext,
        opts: &WatermarkOpts,
    ) -> Result<Box<dyn EngineImage>, ImageHandlerError> {
        let mut color = opts.color;
        color.alpha = opts.t as f64 / 100.0;
        let mut mark = ctx.engine.render_text(&TextOptions {
            text: opts.text.clone(),
            font_size: opts.size as f32,
            color,
        })?;
        if opts.rotate > 0 {
            mark.rotate(opts.rotate as f64, Rgba::transparent());
        }
        if opts.auto {
            shrink_to_base(ctx, mark.as_mut(), 10, FitMode::Inside)?;
        }
        Ok(mark)
    }

    async fn image_mark(
        ctx: &ImageContext,
        opts: &WatermarkOpts,
    ) -> Result<Box<dyn EngineImage>, ImageHandlerError> {
        let buffers = ctx.buffers.clone();
        let data = buffers.get(&opts.image).await?;
        let mut mark = ctx.engine.load(&data, LoadOptions::default())?;
        if opts.t < 100 {
            mark.set_opacity(opts.t as f32 / 100.0);
        }
        if opts.rotate > 0 {
            mark.rotate(opts.rotate as f64, Rgba::transparent());
        }
        if opts.auto {
            shrink_to_base(ctx, mark.as_mut(), 1, FitMode::Fill)?;
        }
        Ok(mark)
    }
}

/// Shrink `mark` along each side that exceeds the base image, leaving `margin`
fn shrink_to_base(
    ctx: &ImageContext,
    mark: &mut dyn EngineImage,
    margin: u32,
    fit: FitMode,
) -> Result<(), ImageHandlerError> {
    let base = ctx.image.metadata();
    let current = mark.metadata();
    let limit = |side: u32| side.saturating_sub(margin).max(1);

    let width = (current.width > base.width).then(|| limit(base.width));
    let height = (current.height > base.height).then(|| limit(base.height));
    if width.is_none() && height.is_none() {
        return Ok(());
    }

    let options = ResizeOptions::new(
        Some(width.unwrap_or(current.width)),
        Some(height.unwrap_or(current.height)),
        fit,
    );
    mark.resize(&options)?;
    Ok(())
}

#[async_trait]
impl Action for WatermarkAction {
    fn name(&self) -> &'static str {
        "watermark"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let mark = if opts.text.is_empty() {
            Self::image_mark(ctx, &opts).await?
        } else {
            Self::text_mark(ctx, &opts).await?
        };

        let encoded = mark.encode_as(ImageFormat::Png)?;
        tracing::debug!(
            width = encoded.width,
            height = encoded.height,
            gravity = %opts.g,
            tile = opts.fill,
            "Compositing watermark"
        );
        let layer = Layer::new(LayerInput::Encoded(Bytes::from(encoded.data)))
            .with_gravity(opts.g)
            .tiled(opts.fill);
        ctx.image.composite(&[layer])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::{context, context_with_store, pixel, size};
    use crate::store::MemoryObjectStore;
    use base64::engine::general_purpose::STANDARD;
    use rstest::rstest;
    use std::sync::Arc;

    fn red_png(width: u32, height: u32) -> Bytes {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_process_future_can_move_across_threads() {
        let mut ctx = context(10, 10);
        let token = format!("image_{}", URL_SAFE_NO_PAD.encode("logo.png"));
        let params = ["watermark", token.as_str()];
        let future = WatermarkAction.process(&mut ctx, &params);
        assert_send(&future);
    }

    #[test]
    fn test_defaults_with_text() {
        let text = URL_SAFE_NO_PAD.encode("hello");
        let token = format!("text_{}", text);
        let opts = WatermarkAction::parse(&["watermark", &token]).unwrap();
        assert_eq!(opts.text, "hello");
        assert_eq!(opts.t, 100);
        assert_eq!(opts.g, Gravity::SouthEast);
        assert_eq!(opts.size, 40);
        assert!(opts.auto);
        assert!(!opts.fill);
    }

    #[test]
    fn test_standard_alphabet_with_padding_is_accepted() {
        let image = STANDARD.encode("marks/logo.png");
        let token = format!("image_{}", image);
        let opts = WatermarkAction::parse(&["watermark", &token, "rotate_360", "g_nw"]).unwrap();
        assert_eq!(opts.image, "marks/logo.png");
        assert_eq!(opts.rotate, 0);
        assert_eq!(opts.g, Gravity::NorthWest);
    }

    #[test]
    fn test_text_and_image_are_exclusive() {
        let text = format!("text_{}", URL_SAFE_NO_PAD.encode("a"));
        let image = format!("image_{}", URL_SAFE_NO_PAD.encode("b"));
        let err = WatermarkAction::parse(&["watermark", &text, &image]).unwrap_err();
        assert!(err.to_string().contains("at the same time"));

        let err = WatermarkAction::parse(&["watermark", "t_50"]).unwrap_err();
        assert!(err.to_string().contains("should not be empty"));
    }

    #[rstest]
    #[case("t_101")]
    #[case("size_0")]
    #[case("size_1000")]
    #[case("fill_2")]
    #[case("auto_yes")]
    #[case("rotate_361")]
    #[case("g_middle")]
    #[case("color_xyz")]
    #[case("voffset_10")]
    fn test_rejects_bad_params(#[case] token: &str) {
        let text = format!("text_{}", URL_SAFE_NO_PAD.encode("a"));
        let err = WatermarkAction.validate(&["watermark", &text, token]).unwrap_err();
        assert!(err.is_invalid_edit());
    }

    #[tokio::test]
    async fn test_image_watermark_in_corner() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("images", "logo.png", red_png(10, 10), Some("image/png"));
        let mut ctx = context_with_store(40, 40, store);

        let token = format!("image_{}", URL_SAFE_NO_PAD.encode("logo.png"));
        WatermarkAction
            .process(&mut ctx, &["watermark", &token])
            .await
            .unwrap();

        assert_eq!(size(&ctx), (40, 40));
        assert_eq!(pixel(&ctx, 35, 35), [255, 0, 0, 255]);
        assert_eq!(pixel(&ctx, 5, 5), [100, 100, 100, 255]);
    }

    #[tokio::test]
    async fn test_oversized_image_watermark_is_shrunk() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("images", "big.png", red_png(80, 80), Some("image/png"));
        let mut ctx = context_with_store(40, 40, store);

        let token = format!("image_{}", URL_SAFE_NO_PAD.encode("big.png"));
        WatermarkAction
            .process(&mut ctx, &["watermark", &token, "g_center"])
            .await
            .unwrap();
        assert_eq!(size(&ctx), (40, 40));
        assert_eq!(pixel(&ctx, 20, 20), [255, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_missing_watermark_object() {
        let mut ctx = context(40, 40);
        let token = format!("image_{}", URL_SAFE_NO_PAD.encode("nope.png"));
        let err = WatermarkAction
            .process(&mut ctx, &["watermark", &token])
            .await
            .unwrap_err();
        assert_eq!(err.to_http_status(), 404);
    }

    #[tokio::test]
    async fn test_text_watermark_without_font() {
        let mut ctx = context(40, 40);
        let token = format!("text_{}", URL_SAFE_NO_PAD.encode("hello"));
        let err = WatermarkAction
            .process(&mut ctx, &["watermark", &token])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Watermark::FontUnavailable");
    }
}
