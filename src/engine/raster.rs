//! `image`-crate backend
//!
//! Decodes to RGBA8, resizes with `fast_image_resize` (Lanczos3), reads the
//! EXIF orientation with `kamadak-exif`, and encodes JPEG, PNG, WebP, GIF
//! and TIFF. Animated GIFs keep their frame count in the metadata but only
//! the first frame is processed.

use super::composite::{
    blend_layer, ellipse_mask, gravity_position, rounded_rect_mask, tiled_positions, Placement,
};
use super::pixels;
use super::text::TextRenderer;
use super::{
    EncodedImage, EngineError, EngineImage, ImageEngine, ImageMetadata, Layer, LayerInput,
    LoadOptions, OutputSettings, Region, ResizeOptions, TextOptions,
};
use crate::edits::{ConvolveEdit, FitMode, Rgba as Color};
use crate::format::ImageFormat;
use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::io::Reader as ImageReader;
use image::{ImageEncoder as _, Rgba, RgbaImage};
use std::io::Cursor;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

/// Quality used when the request does not set one
pub const DEFAULT_QUALITY: u8 = 80;

/// Engine over the `image` crate; cheap to clone and share
#[derive(Debug, Clone, Default)]
pub struct RasterEngine {
    text: Option<Arc<TextRenderer>>,
}

impl RasterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(renderer: TextRenderer) -> Self {
        Self {
            text: Some(Arc::new(renderer)),
        }
    }

    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Ok(Self::with_font(TextRenderer::from_file(path)?))
    }

    pub fn has_font(&self) -> bool {
        self.text.is_some()
    }
}

impl ImageEngine for RasterEngine {
    fn load(&self, data: &[u8], options: LoadOptions) -> Result<Box<dyn EngineImage>, EngineError> {
        let mut image = RasterImage::decode(data)?;
        if options.auto_orient {
            image.auto_orient();
        }
        Ok(Box::new(image))
    }

    fn render_text(&self, options: &TextOptions) -> Result<Box<dyn EngineImage>, EngineError> {
        let renderer = self.text.as_ref().ok_or(EngineError::FontUnavailable)?;
        let pixels = renderer.render(&options.text, options.font_size, options.color)?;
        let mut image = RasterImage::from_rgba(pixels);
        image.output.format = Some(ImageFormat::Png);
        Ok(Box::new(image))
    }
}

/// Decoded image state for one request
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: RgbaImage,
    source_format: Option<ImageFormat>,
    orientation: Option<u32>,
    pages: u32,
    output: OutputSettings,
}

impl RasterImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image,
            source_format: None,
            orientation: None,
            pages: 1,
            output: OutputSettings::default(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, EngineError> {
        let (image, source_format) = decode_rgba(data)?;
        let pages = if source_format == Some(ImageFormat::Gif) {
            count_gif_frames(data)
        } else {
            1
        };
        let orientation = read_orientation(data);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            format = ?source_format,
            pages = pages,
            "Decoded source image"
        );

        Ok(Self {
            image,
            source_format,
            orientation,
            pages,
            output: OutputSettings::default(),
        })
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }
}

impl EngineImage for RasterImage {
    fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.image.width(),
            height: self.image.height(),
            format: self.source_format,
            orientation: self.orientation,
            pages: self.pages,
        }
    }

    fn resize(&mut self, options: &ResizeOptions) -> Result<(), EngineError> {
        let (src_w, src_h) = self.image.dimensions();
        let Some(plan) = plan_resize(src_w, src_h, options) else {
            return Ok(());
        };

        let mut resized = if (plan.width, plan.height) == (src_w, src_h) {
            self.image.clone()
        } else {
            resize_rgba(&self.image, plan.width, plan.height)?
        };

        match plan.canvas {
            Some(Canvas::Crop { width, height }) => {
                let left = (plan.width - width) / 2;
                let top = (plan.height - height) / 2;
                resized = image::imageops::crop_imm(&resized, left, top, width, height).to_image();
            }
            Some(Canvas::Pad { width, height }) => {
                let bg = options.background;
                let mut canvas =
                    RgbaImage::from_pixel(width, height, Rgba([bg.r, bg.g, bg.b, bg.alpha_u8()]));
                let left = ((width - plan.width) / 2) as i64;
                let top = ((height - plan.height) / 2) as i64;
                image::imageops::overlay(&mut canvas, &resized, left, top);
                resized = canvas;
            }
            None => {}
        }

        self.image = resized;
        Ok(())
    }

    fn auto_orient(&mut self) {
        if let Some(orientation) = self.orientation.take() {
            self.image = pixels::apply_orientation(&self.image, orientation);
        }
    }

    fn rotate(&mut self, degrees: f64, background: Color) {
        self.image = pixels::rotate(&self.image, degrees, background);
    }

    fn flip(&mut self) {
        image::imageops::flip_vertical_in_place(&mut self.image);
    }

    fn flop(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.image);
    }

    fn blur(&mut self, sigma: Option<f64>) {
        self.image = pixels::blur(&self.image, sigma);
    }

    fn sharpen(&mut self, sigma: f64, flat: f64, jagged: f64) {
        self.image = pixels::sharpen(&self.image, sigma, flat, jagged);
    }

    fn median(&mut self, size: u32) {
        self.image = pixels::median(&self.image, size);
    }

    fn convolve(&mut self, kernel: &ConvolveEdit) -> Result<(), EngineError> {
        if kernel.width == 0 || kernel.height == 0 || kernel.kernel.len() != kernel.width * kernel.height {
            return Err(EngineError::InvalidOperation(format!(
                "Kernel of {} values does not fill {}x{}",
                kernel.kernel.len(),
                kernel.width,
                kernel.height
            )));
        }
        self.image = pixels::convolve(&self.image, kernel);
        Ok(())
    }

    fn flatten(&mut self, background: Color) {
        pixels::flatten(&mut self.image, background);
    }

    fn gamma(&mut self, gamma: f64) {
        pixels::gamma(&mut self.image, gamma);
    }

    fn negate(&mut self) {
        pixels::negate(&mut self.image);
    }

    fn normalize(&mut self) {
        pixels::normalize(&mut self.image);
    }

    fn threshold(&mut self, level: u8) {
        pixels::threshold(&mut self.image, level);
    }

    fn tint(&mut self, r: f64, g: f64, b: f64) {
        pixels::tint(&mut self.image, r, g, b);
    }

    fn grayscale(&mut self) {
        pixels::grayscale(&mut self.image);
    }

    fn linear(&mut self, a: f64, b: f64) {
        pixels::linear(&mut self.image, a, b);
    }

    fn set_opacity(&mut self, opacity: f32) {
        pixels::set_opacity(&mut self.image, opacity);
    }

    fn extract(&mut self, region: Region) -> Result<(), EngineError> {
        let (w, h) = self.image.dimensions();
        let fits = region.width > 0
            && region.height > 0
            && region.left as u64 + region.width as u64 <= w as u64
            && region.top as u64 + region.height as u64 <= h as u64;
        if !fits {
            return Err(EngineError::OutOfBounds {
                left: region.left as i64,
                top: region.top as i64,
                width: region.width as i64,
                height: region.height as i64,
                image_width: w,
                image_height: h,
            });
        }
        self.image = image::imageops::crop_imm(
            &self.image,
            region.left,
            region.top,
            region.width,
            region.height,
        )
        .to_image();
        Ok(())
    }

    fn composite(&mut self, layers: &[Layer]) -> Result<(), EngineError> {
        let (base_w, base_h) = self.image.dimensions();

        for layer in layers {
            let overlay = match &layer.input {
                LayerInput::Encoded(bytes) => decode_rgba(bytes)?.0,
                LayerInput::Ellipse { cx, cy, rx, ry } => {
                    ellipse_mask(base_w, base_h, *cx, *cy, *rx, *ry)
                }
                LayerInput::RoundedRect { radius } => rounded_rect_mask(base_w, base_h, *radius),
            };
            let (layer_w, layer_h) = overlay.dimensions();

            let positions = if layer.tile {
                tiled_positions(base_w, base_h, layer_w, layer_h)
            } else {
                let at = match (layer.left, layer.top) {
                    (Some(left), Some(top)) => Placement::new(left, top),
                    _ => gravity_position(layer.gravity, base_w, base_h, layer_w, layer_h),
                };
                vec![at]
            };

            for at in positions {
                blend_layer(&mut self.image, &overlay, at, layer.blend, layer.opacity);
            }
        }
        Ok(())
    }

    fn trim(&mut self) {
        if let Some((left, top, width, height)) = pixels::trim_bounds(&self.image) {
            self.image = image::imageops::crop_imm(&self.image, left, top, width, height).to_image();
        }
    }

    fn output(&self) -> &OutputSettings {
        &self.output
    }

    fn output_mut(&mut self) -> &mut OutputSettings {
        &mut self.output
    }

    fn encode(&self) -> Result<EncodedImage, EngineError> {
        let format = self
            .output
            .format
            .or(self.source_format)
            .ok_or_else(|| EngineError::UnsupportedFormat("unknown".to_string()))?;
        self.encode_with(format, &self.output)
    }

    fn encode_as(&self, format: ImageFormat) -> Result<EncodedImage, EngineError> {
        self.encode_with(format, &OutputSettings::default())
    }
}

impl RasterImage {
    fn encode_with(
        &self,
        format: ImageFormat,
        settings: &OutputSettings,
    ) -> Result<EncodedImage, EngineError> {
        let data = encode_rgba(&self.image, format, settings)?;
        Ok(EncodedImage {
            data,
            format,
            width: self.image.width(),
            height: self.image.height(),
        })
    }
}

/// Result of fitting a source into a resize box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    /// Size the pixels are scaled to
    pub width: u32,
    pub height: u32,
    /// Post-scale crop or padding to the exact box
    pub canvas: Option<Canvas>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canvas {
    Crop { width: u32, height: u32 },
    Pad { width: u32, height: u32 },
}

/// Work out the scaled size for `options`; `None` leaves the image alone
pub fn plan_resize(src_w: u32, src_h: u32, options: &ResizeOptions) -> Option<ResizePlan> {
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let (sw, sh) = (src_w as f64, src_h as f64);
    let dim = |v: f64| (v.round() as u32).max(1);

    let mut plan = match (options.width, options.height) {
        (None, None) => return None,
        (Some(w), None) => ResizePlan {
            width: w.max(1),
            height: dim(sh * w as f64 / sw),
            canvas: None,
        },
        (None, Some(h)) => ResizePlan {
            width: dim(sw * h as f64 / sh),
            height: h.max(1),
            canvas: None,
        },
        (Some(w), Some(h)) => {
            let (w, h) = (w.max(1), h.max(1));
            let sx = w as f64 / sw;
            let sy = h as f64 / sh;
            match options.fit {
                FitMode::Fill => ResizePlan {
                    width: w,
                    height: h,
                    canvas: None,
                },
                FitMode::Inside | FitMode::Contain => {
                    let s = sx.min(sy);
                    ResizePlan {
                        width: dim(sw * s),
                        height: dim(sh * s),
                        canvas: (options.fit == FitMode::Contain).then_some(Canvas::Pad {
                            width: w,
                            height: h,
                        }),
                    }
                }
                FitMode::Outside | FitMode::Cover => {
                    let s = sx.max(sy);
                    ResizePlan {
                        width: dim(sw * s),
                        height: dim(sh * s),
                        canvas: (options.fit == FitMode::Cover).then_some(Canvas::Crop {
                            width: w,
                            height: h,
                        }),
                    }
                }
            }
        }
    };

    if options.without_enlargement && (plan.width > src_w || plan.height > src_h) {
        if options.fit != FitMode::Fill || options.width.is_none() || options.height.is_none() {
            return None;
        }
        plan.width = plan.width.min(src_w);
        plan.height = plan.height.min(src_h);
    }

    // Crop boxes never exceed the scaled image, pads never shrink it
    plan.canvas = match plan.canvas {
        Some(Canvas::Crop { width, height }) => Some(Canvas::Crop {
            width: width.min(plan.width),
            height: height.min(plan.height),
        }),
        Some(Canvas::Pad { width, height }) => Some(Canvas::Pad {
            width: width.max(plan.width),
            height: height.max(plan.height),
        }),
        None => None,
    };

    Some(plan)
}

fn map_format(format: image::ImageFormat) -> Option<ImageFormat> {
    match format {
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        image::ImageFormat::Gif => Some(ImageFormat::Gif),
        image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
        image::ImageFormat::Avif => Some(ImageFormat::Avif),
        _ => None,
    }
}

/// Decode any supported format to RGBA8
fn decode_rgba(data: &[u8]) -> Result<(RgbaImage, Option<ImageFormat>), EngineError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| EngineError::Decode(e.to_string()))?;
    let format = reader.format().and_then(map_format);
    let image = reader
        .decode()
        .map_err(|e| EngineError::Decode(e.to_string()))?;
    Ok((image.to_rgba8(), format))
}

fn count_gif_frames(data: &[u8]) -> u32 {
    use image::AnimationDecoder;

    match image::codecs::gif::GifDecoder::new(Cursor::new(data)) {
        Ok(decoder) => decoder.into_frames().take_while(Result::is_ok).count().max(1) as u32,
        Err(_) => 1,
    }
}

/// EXIF orientation tag, when present and valid
fn read_orientation(data: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).filter(|o| (1..=8).contains(o))
}

/// Resize using fast-image-resize with Lanczos3 filter
fn resize_rgba(image: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage, EngineError> {
    let invalid = |msg: &str| EngineError::InvalidOperation(msg.to_string());

    let src_width = NonZeroU32::new(image.width()).ok_or_else(|| invalid("Source width is 0"))?;
    let src_height = NonZeroU32::new(image.height()).ok_or_else(|| invalid("Source height is 0"))?;
    let dst_width = NonZeroU32::new(target_w).ok_or_else(|| invalid("Target width is 0"))?;
    let dst_height = NonZeroU32::new(target_h).ok_or_else(|| invalid("Target height is 0"))?;

    let src_image = Image::from_vec_u8(src_width, src_height, image.as_raw().clone(), PixelType::U8x4)
        .map_err(|e| EngineError::InvalidOperation(format!("Failed to create source image: {:?}", e)))?;
    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);

    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| EngineError::InvalidOperation(format!("Resize operation failed: {:?}", e)))?;

    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| invalid("Failed to create output image buffer"))
}

fn encode_error(format: ImageFormat, err: impl ToString) -> EngineError {
    EngineError::Encode {
        format: format.as_str().to_string(),
        message: err.to_string(),
    }
}

fn encode_rgba(
    image: &RgbaImage,
    format: ImageFormat,
    settings: &OutputSettings,
) -> Result<Vec<u8>, EngineError> {
    let (width, height) = image.dimensions();
    let mut output = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let quality = settings.quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100);
            let rgb = rgba_to_rgb(image.as_raw());
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality)
                .write_image(&rgb, width, height, image::ColorType::Rgb8)
                .map_err(|e| encode_error(format, e))?;
        }
        ImageFormat::Png => {
            image::codecs::png::PngEncoder::new(&mut output)
                .write_image(image.as_raw(), width, height, image::ColorType::Rgba8)
                .map_err(|e| encode_error(format, e))?;
        }
        ImageFormat::Webp => return encode_webp(image, settings),
        ImageFormat::Gif => {
            let mut encoder = image::codecs::gif::GifEncoder::new(&mut output);
            encoder
                .encode(image.as_raw(), width, height, image::ColorType::Rgba8)
                .map_err(|e| encode_error(format, e))?;
        }
        ImageFormat::Tiff => {
            image::codecs::tiff::TiffEncoder::new(&mut output)
                .write_image(image.as_raw(), width, height, image::ColorType::Rgba8)
                .map_err(|e| encode_error(format, e))?;
        }
        ImageFormat::Heif | ImageFormat::Heic | ImageFormat::Raw | ImageFormat::Avif => {
            return Err(EngineError::UnsupportedFormat(format.as_str().to_string()));
        }
    }

    Ok(output.into_inner())
}

/// Lossy WebP through libwebp; lossless through the `image` crate
fn encode_webp(image: &RgbaImage, settings: &OutputSettings) -> Result<Vec<u8>, EngineError> {
    let (width, height) = image.dimensions();

    if settings.lossless {
        let mut output = Cursor::new(Vec::new());
        image::codecs::webp::WebPEncoder::new_lossless(&mut output)
            .write_image(image.as_raw(), width, height, image::ColorType::Rgba8)
            .map_err(|e| encode_error(ImageFormat::Webp, e))?;
        return Ok(output.into_inner());
    }

    let encoder = webp::Encoder::from_rgba(image.as_raw(), width, height);
    let quality = settings.quality.unwrap_or(DEFAULT_QUALITY).min(100) as f32;

    match settings.effort {
        Some(effort) => {
            let mut config = webp::WebPConfig::new()
                .map_err(|_| encode_error(ImageFormat::Webp, "Invalid encoder configuration"))?;
            config.quality = quality;
            config.method = effort.min(6) as i32;
            encoder
                .encode_advanced(&config)
                .map(|memory| memory.to_vec())
                .map_err(|e| encode_error(ImageFormat::Webp, format!("{:?}", e)))
        }
        None => Ok(encoder.encode(quality).to_vec()),
    }
}

/// Convert RGBA to RGB (drop alpha channel)
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Blend, Gravity};
    use bytes::Bytes;

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn load(data: &[u8]) -> Box<dyn EngineImage> {
        RasterEngine::new().load(data, LoadOptions::default()).unwrap()
    }

    #[test]
    fn test_decode_reports_metadata() {
        let image = load(&png(8, 4, [255, 0, 0, 255]));
        let meta = image.metadata();
        assert_eq!((meta.width, meta.height), (8, 4));
        assert_eq!(meta.format, Some(ImageFormat::Png));
        assert_eq!(meta.pages, 1);
        assert_eq!(meta.orientation, None);
    }

    #[test]
    fn test_decode_invalid_data() {
        let err = RasterEngine::new()
            .load(b"not an image", LoadOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn test_plan_inside_keeps_aspect() {
        let options = ResizeOptions::new(Some(100), Some(100), FitMode::Inside);
        let plan = plan_resize(200, 100, &options).unwrap();
        assert_eq!((plan.width, plan.height), (100, 50));
        assert_eq!(plan.canvas, None);
    }

    #[test]
    fn test_plan_cover_crops_to_box() {
        let options = ResizeOptions::new(Some(100), Some(100), FitMode::Cover);
        let plan = plan_resize(200, 100, &options).unwrap();
        assert_eq!((plan.width, plan.height), (200, 100));
        assert_eq!(
            plan.canvas,
            Some(Canvas::Crop {
                width: 100,
                height: 100
            })
        );
    }

    #[test]
    fn test_plan_single_dimension_and_enlargement() {
        let options = ResizeOptions::new(None, Some(50), FitMode::Cover);
        let plan = plan_resize(200, 100, &options).unwrap();
        assert_eq!((plan.width, plan.height), (100, 50));

        let mut options = ResizeOptions::new(Some(400), None, FitMode::Inside);
        options.without_enlargement = true;
        assert_eq!(plan_resize(200, 100, &options), None);
        assert_eq!(plan_resize(200, 100, &ResizeOptions::new(None, None, FitMode::Inside)), None);
    }

    #[test]
    fn test_resize_contain_pads() {
        let mut image = load(&png(20, 10, [255, 0, 0, 255]));
        let mut options = ResizeOptions::new(Some(10), Some(10), FitMode::Contain);
        options.background = Color::rgb(0, 0, 255);
        image.resize(&options).unwrap();
        assert_eq!((image.metadata().width, image.metadata().height), (10, 10));

        let encoded = image.encode_as(ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_extract_out_of_bounds() {
        let mut image = load(&png(10, 10, [0, 0, 0, 255]));
        let err = image
            .extract(Region {
                left: 5,
                top: 5,
                width: 10,
                height: 2,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { .. }));

        image
            .extract(Region {
                left: 2,
                top: 3,
                width: 4,
                height: 5,
            })
            .unwrap();
        assert_eq!((image.metadata().width, image.metadata().height), (4, 5));
    }

    #[test]
    fn test_encode_formats() {
        let mut image = load(&png(4, 4, [0, 255, 0, 255]));
        let jpeg = image.encode_as(ImageFormat::Jpeg).unwrap();
        assert_eq!(&jpeg.data[0..2], &[0xFF, 0xD8]);

        let webp = image.encode_as(ImageFormat::Webp).unwrap();
        assert_eq!(&webp.data[0..4], b"RIFF");

        let gif = image.encode_as(ImageFormat::Gif).unwrap();
        assert_eq!(&gif.data[0..3], b"GIF");

        let tiff = image.encode_as(ImageFormat::Tiff).unwrap();
        assert!(tiff.data.starts_with(&[0x49, 0x49]) || tiff.data.starts_with(&[0x4D, 0x4D]));

        image.output_mut().format = Some(ImageFormat::Heif);
        assert!(matches!(image.encode(), Err(EngineError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_encode_keeps_source_format_by_default() {
        let image = load(&png(4, 4, [0, 255, 0, 255]));
        let encoded = image.encode().unwrap();
        assert_eq!(encoded.format, ImageFormat::Png);
        assert_eq!(&encoded.data[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_composite_encoded_layer_at_gravity() {
        let mut image = load(&png(10, 10, [0, 0, 0, 255]));
        let layer = Layer::new(LayerInput::Encoded(Bytes::from(png(2, 2, [255, 255, 255, 255]))))
            .with_gravity(Gravity::SouthEast);
        image.composite(&[layer]).unwrap();

        let encoded = image.encode_as(ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(9, 9), Rgba([255, 255, 255, 255]));
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_ellipse_dest_in_then_trim() {
        let mut image = load(&png(20, 10, [9, 9, 9, 255]));
        let mask = Layer::new(LayerInput::Ellipse {
            cx: 10.0,
            cy: 5.0,
            rx: 5.0,
            ry: 5.0,
        })
        .with_blend(Blend::DestIn);
        image.composite(&[mask]).unwrap();
        image.trim();
        let meta = image.metadata();
        assert!(meta.width <= 10 && meta.height <= 10);
    }

    #[test]
    fn test_render_text_without_font() {
        let err = RasterEngine::new()
            .render_text(&TextOptions {
                text: "hello".into(),
                font_size: 12.0,
                color: Color::white(),
            })
            .err()
            .unwrap();
        assert_eq!(err, EngineError::FontUnavailable);
    }

    #[test]
    fn test_rgba_to_rgb() {
        assert_eq!(rgba_to_rgb(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![1, 2, 3, 5, 6, 7]);
    }
}
