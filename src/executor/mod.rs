//! Dispatch-by-key edit pipeline
//!
//! Each [`Edit`] variant maps to one engine call, except four composites
//! that need collaborators or multi-step work:
//!
//! - `overlayWith` ([`overlay`]): fetch, scale and place a second image
//! - `smartCrop` ([`smart_crop`]): crop around a detected face
//! - `roundCrop` ([`round_crop`]): elliptical mask, then trim
//! - `contentModeration` ([`moderation`]): blur when flagged labels are found
//!
//! # Ordering
//!
//! Edits run in stages; within a stage they keep edit-set order:
//!
//! 1. orientation: `rotate`, `flip`, `flop`
//! 2. geometry: `crop`, `resize`
//! 3. `smartCrop`, `roundCrop`
//! 4. pixel filters and `contentModeration`
//! 5. `overlayWith`
//!
//! Format keys are read once at the end to configure the encoder.
//! A missing `resize` is treated as `{fit: inside}` with no dimensions.

pub mod moderation;
pub mod overlay;
pub mod round_crop;
pub mod smart_crop;

use crate::edits::{CropEdit, Edit, EditKey, EditSet, FitMode, ResizeEdit, Rgba};
use crate::engine::{EngineImage, ImageEngine, LoadOptions, Region, ResizeOptions};
use crate::error::ImageHandlerError;
use crate::format::{ImageFormat, GIF_CONTENT_TYPE};
use crate::request::ImageRequest;
use crate::store::ObjectStore;
use crate::vision::VisionService;
use bytes::Bytes;
use std::sync::Arc;

/// Base64 length ceiling of a response body
pub const DEFAULT_PAYLOAD_LIMIT: usize = 6 * 1024 * 1024;

/// Edits that are skipped for animated images
const ANIMATION_UNSAFE: [EditKey; 4] = [
    EditKey::Rotate,
    EditKey::SmartCrop,
    EditKey::RoundCrop,
    EditKey::ContentModeration,
];

fn stage(key: EditKey) -> u8 {
    match key {
        EditKey::Rotate | EditKey::Flip | EditKey::Flop => 0,
        EditKey::Crop | EditKey::Resize => 1,
        EditKey::SmartCrop | EditKey::RoundCrop => 2,
        EditKey::Sharpen
        | EditKey::Median
        | EditKey::Blur
        | EditKey::Flatten
        | EditKey::Gamma
        | EditKey::Negate
        | EditKey::Normalize
        | EditKey::Convolve
        | EditKey::Threshold
        | EditKey::Tint
        | EditKey::Grayscale
        | EditKey::ContentModeration => 3,
        EditKey::OverlayWith => 4,
        EditKey::ToFormat | EditKey::FormatOptions(_) | EditKey::Animated => 5,
    }
}

/// Edits in execution order; the sort is stable so each stage keeps the
/// edit-set order
pub fn execution_order(edits: &EditSet) -> Vec<&Edit> {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by_key(|edit| stage(edit.key()));
    ordered
}

/// Applies an [`ImageRequest`]'s edits through the image engine
pub struct EditExecutor {
    engine: Arc<dyn ImageEngine>,
    objects: Arc<dyn ObjectStore>,
    vision: Arc<dyn VisionService>,
    payload_limit: usize,
}

impl EditExecutor {
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        objects: Arc<dyn ObjectStore>,
        vision: Arc<dyn VisionService>,
    ) -> Self {
        Self {
            engine,
            objects,
            vision,
            payload_limit: DEFAULT_PAYLOAD_LIMIT,
        }
    }

    pub fn with_payload_limit(mut self, limit: usize) -> Self {
        self.payload_limit = limit;
        self
    }

    pub fn engine(&self) -> &Arc<dyn ImageEngine> {
        &self.engine
    }

    /// Produce the response body for `request`
    ///
    /// With no edits and no output format the original bytes come back
    /// untouched. The base64 length of the body must fit the payload limit.
    pub async fn process(&self, request: &ImageRequest) -> Result<Bytes, ImageHandlerError> {
        let edits = &request.edits;

        let body = if !edits.is_empty() {
            let load = LoadOptions {
                auto_orient: !edits.orientation_disabled(),
            };
            let mut image = self.engine.load(&request.original_image, load)?;

            let mut animated = edits
                .animated()
                .unwrap_or(request.content_type == GIF_CONTENT_TYPE);
            if animated && image.metadata().pages <= 1 {
                animated = false;
            }

            self.apply_edits(image.as_mut(), edits, animated).await?;
            configure_output(image.as_mut(), request);
            Bytes::from(image.encode()?.data)
        } else if request.output_format.is_some() {
            let mut image = self.engine.load(&request.original_image, LoadOptions::default())?;
            configure_output(image.as_mut(), request);
            Bytes::from(image.encode()?.data)
        } else {
            request.original_image.clone()
        };

        ensure_within_limit(&body, self.payload_limit)?;

        tracing::info!(
            bucket = %request.bucket,
            key = %request.key,
            edits = edits.len(),
            size = body.len(),
            "Processed image"
        );
        Ok(body)
    }

    /// Apply every edit in stage order
    pub async fn apply_edits(
        &self,
        image: &mut dyn EngineImage,
        edits: &EditSet,
        animated: bool,
    ) -> Result<(), ImageHandlerError> {
        let mut edits = edits.clone();
        normalize_resize(&mut edits, image)?;

        for edit in execution_order(&edits) {
            if animated && ANIMATION_UNSAFE.contains(&edit.key()) {
                tracing::debug!(edit = %edit.key(), "Skipping edit for animated image");
                continue;
            }
            self.apply(image, edit).await?;
        }
        Ok(())
    }

    async fn apply(&self, image: &mut dyn EngineImage, edit: &Edit) -> Result<(), ImageHandlerError> {
        match edit {
            Edit::Resize(resize) => image.resize(&resize_options(resize))?,
            Edit::Crop(crop) => apply_crop(image, crop)?,
            Edit::Rotate(Some(degrees)) => image.rotate(*degrees, Rgba::black()),
            Edit::Rotate(None) => {}
            Edit::Flip(true) => image.flip(),
            Edit::Flop(true) => image.flop(),
            Edit::Sharpen(sharpen) => image.sharpen(
                sharpen.sigma.unwrap_or(1.0),
                sharpen.flat.unwrap_or(1.0),
                sharpen.jagged.unwrap_or(2.0),
            ),
            Edit::Median(size) => image.median(*size),
            Edit::Blur(sigma) => image.blur(*sigma),
            Edit::Flatten(background) => image.flatten(*background),
            Edit::Gamma(gamma) => image.gamma(*gamma),
            Edit::Negate(true) => image.negate(),
            Edit::Normalize(true) => image.normalize(),
            Edit::Convolve(kernel) => image.convolve(kernel)?,
            Edit::Threshold(level) => image.threshold(*level),
            Edit::Tint(tint) => image.tint(tint.r, tint.g, tint.b),
            Edit::Grayscale(true) => image.grayscale(),
            Edit::OverlayWith(edit) => {
                overlay::apply_overlay(image, edit, self.engine.as_ref(), self.objects.as_ref())
                    .await?
            }
            Edit::SmartCrop(edit) => {
                smart_crop::apply_smart_crop(image, edit, self.vision.as_ref()).await?
            }
            Edit::RoundCrop(edit) => round_crop::apply_round_crop(image, edit)?,
            Edit::ContentModeration(edit) => {
                moderation::apply_moderation(image, edit, self.vision.as_ref()).await?
            }
            Edit::Flip(false)
            | Edit::Flop(false)
            | Edit::Negate(false)
            | Edit::Normalize(false)
            | Edit::Grayscale(false)
            | Edit::ToFormat(_)
            | Edit::FormatOptions(..)
            | Edit::Animated(_) => {}
        }
        Ok(())
    }
}

/// The base64 length of `body` must not exceed `limit`
pub fn ensure_within_limit(body: &[u8], limit: usize) -> Result<(), ImageHandlerError> {
    let encoded_len = body.len().div_ceil(3) * 4;
    if encoded_len > limit {
        return Err(ImageHandlerError::OutputTooLarge {
            size: encoded_len,
            limit,
        });
    }
    Ok(())
}

/// Round and validate resize dimensions, and resolve a `ratio` against the
/// explicit size or the current image size
pub fn normalize_resize(
    edits: &mut EditSet,
    image: &dyn EngineImage,
) -> Result<(), ImageHandlerError> {
    if edits.resize().is_none() {
        edits.insert(Edit::Resize(ResizeEdit {
            fit: Some(FitMode::Inside),
            ..Default::default()
        }));
        return Ok(());
    }

    let resize = edits.resize_mut();
    resize.width = resize.width.map(f64::round);
    resize.height = resize.height.map(f64::round);
    let invalid = |v: Option<f64>| v.is_some_and(|v| v.is_nan() || v <= 0.0);
    if invalid(resize.width) || invalid(resize.height) {
        return Err(ImageHandlerError::invalid_edit(
            "InvalidResizeException",
            "The image size is invalid.",
        ));
    }

    if let Some(ratio) = resize.ratio.take() {
        let (width, height) = match (resize.width, resize.height) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                let meta = image.metadata();
                (meta.width as f64, meta.height as f64)
            }
        };
        resize.width = Some((width * ratio).round());
        resize.height = Some((height * ratio).round());
        if resize.fit.is_none() {
            resize.fit = Some(FitMode::Inside);
        }
    }
    Ok(())
}

fn resize_options(resize: &ResizeEdit) -> ResizeOptions {
    let dim = |v: Option<f64>| v.filter(|v| *v >= 1.0).map(|v| v as u32);
    ResizeOptions {
        width: dim(resize.width),
        height: dim(resize.height),
        fit: resize.fit.unwrap_or(FitMode::Inside),
        background: resize.background.unwrap_or(Rgba::black()),
        without_enlargement: resize.without_enlargement.unwrap_or(false),
    }
}

fn apply_crop(image: &mut dyn EngineImage, crop: &CropEdit) -> Result<(), ImageHandlerError> {
    let out_of_bounds = || {
        ImageHandlerError::invalid_edit(
            "Crop::AreaOutOfBounds",
            "The cropping area you provided exceeds the boundaries of the original image. \
             Please try choosing a correct cropping value.",
        )
    };
    let region = to_region(crop.left, crop.top, crop.width, crop.height).ok_or_else(out_of_bounds)?;
    image.extract(region).map_err(|_| out_of_bounds())
}

/// Region from signed values; `None` for negative or non-positive sizes
pub(crate) fn to_region(left: i64, top: i64, width: i64, height: i64) -> Option<Region> {
    let convert = |v: i64| u32::try_from(v).ok();
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Region {
        left: convert(left)?,
        top: convert(top)?,
        width: convert(width)?,
        height: convert(height)?,
    })
}

/// Encoder settings from the resolved output format and the per-format
/// option keys
fn configure_output(image: &mut dyn EngineImage, request: &ImageRequest) {
    let edits = &request.edits;
    let format = request
        .output_format
        .or_else(|| edits.to_format())
        .or_else(|| {
            edits.iter().rev().find_map(|edit| match edit {
                Edit::FormatOptions(format, _) => Some(*format),
                _ => None,
            })
        });
    let target = format.or(image.metadata().format);

    let settings = image.output_mut();
    settings.format = format;
    if let Some(options) = target.and_then(|f| edits.format_options(f)) {
        settings.quality = options.quality.map(|q| q.round().clamp(1.0, 100.0) as u8);
        settings.progressive = options.progressive.unwrap_or(false);
        settings.lossless = options.lossless.unwrap_or(false);
        settings.effort = options.effort.map(|e| e.clamp(0.0, 6.0) as u8);
    }
    if target == Some(ImageFormat::Webp) && request.effort.is_some() {
        settings.effort = request.effort;
    }
}

/// Bytes the vision service accepts: JPEG for JPEG sources, PNG otherwise
pub(crate) fn vision_image(image: &dyn EngineImage) -> Result<Vec<u8>, ImageHandlerError> {
    let format = match image.metadata().format {
        Some(ImageFormat::Jpeg) => ImageFormat::Jpeg,
        _ => ImageFormat::Png,
    };
    Ok(image.encode_as(format)?.data)
}
