//! `smartCrop`: crop around a detected face

use super::{to_region, vision_image};
use crate::edits::SmartCropEdit;
use crate::engine::EngineImage;
use crate::error::ImageHandlerError;
use crate::vision::{BoundingBox, VisionService};

/// Pixel crop area; may still be invalid if padding pushed it outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropArea {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

/// Pick face `index`, clamp its fractions to [0, 1] and keep the box
/// inside the image. No detected faces selects the whole image.
pub fn select_face(faces: &[BoundingBox], index: usize) -> Result<BoundingBox, ImageHandlerError> {
    if faces.is_empty() {
        return Ok(BoundingBox::FULL);
    }
    let face = faces
        .get(index)
        .ok_or(ImageHandlerError::FaceIndexOutOfRange {
            index,
            detected: faces.len(),
        })?;

    let clamp = |v: f64| v.clamp(0.0, 1.0);
    let mut bounds = BoundingBox {
        left: clamp(face.left),
        top: clamp(face.top),
        width: clamp(face.width),
        height: clamp(face.height),
    };
    if bounds.left + bounds.width > 1.0 {
        bounds.width = 1.0 - bounds.left;
    }
    if bounds.top + bounds.height > 1.0 {
        bounds.height = 1.0 - bounds.top;
    }
    Ok(bounds)
}

/// Absolute crop area for a face box grown by `padding` pixels per side
pub fn crop_area(bounds: &BoundingBox, padding: f64, width: u32, height: u32) -> CropArea {
    let (w, h) = (width as f64, height as f64);

    let left = ((bounds.left * w - padding).floor() as i64).max(0);
    let top = ((bounds.top * h - padding).floor() as i64).max(0);
    let extract_width = (bounds.width * w + padding * 2.0).floor() as i64;
    let extract_height = (bounds.height * h + padding * 2.0).floor() as i64;

    CropArea {
        left,
        top,
        width: extract_width.min(width as i64 - left),
        height: extract_height.min(height as i64 - top),
    }
}

pub(super) async fn apply_smart_crop(
    image: &mut dyn EngineImage,
    edit: &SmartCropEdit,
    vision: &dyn VisionService,
) -> Result<(), ImageHandlerError> {
    let index = edit.face_index.unwrap_or(0);
    let padding = edit.padding.unwrap_or(0.0);

    let bytes = vision_image(image)?;
    let faces = vision.detect_faces(&bytes).await?;
    let bounds = select_face(&faces, index)?;

    let meta = image.metadata();
    let area = crop_area(&bounds, padding, meta.width, meta.height);
    tracing::debug!(faces = faces.len(), index = index, area = ?area, "Smart crop");

    let padding_error = || {
        ImageHandlerError::invalid_edit(
            "SmartCrop::PaddingOutOfBounds",
            "The padding value you provided exceeds the boundaries of the original image. \
             Please try choosing a smaller value or applying padding via Sharp for greater \
             specificity.",
        )
    };
    let region = to_region(area.left, area.top, area.width, area.height).ok_or_else(padding_error)?;
    image.extract(region).map_err(|_| padding_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RasterImage;
    use crate::vision::StaticVision;

    fn face(left: f64, top: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn test_no_faces_selects_whole_image() {
        assert_eq!(select_face(&[], 3).unwrap(), BoundingBox::FULL);
    }

    #[test]
    fn test_face_index_out_of_range() {
        let err = select_face(&[face(0.1, 0.1, 0.2, 0.2)], 1).unwrap_err();
        assert_eq!(err.code(), "SmartCrop::FaceIndexOutOfRange");
        assert_eq!(err.to_http_status(), 400);
    }

    #[test]
    fn test_bounds_are_clamped() {
        let bounds = select_face(&[face(-0.2, 0.5, 1.4, 0.8)], 0).unwrap();
        assert_eq!(bounds.left, 0.0);
        assert_eq!(bounds.width, 1.0);
        assert!((bounds.height - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_crop_area_with_padding() {
        let area = crop_area(&face(0.25, 0.25, 0.5, 0.5), 10.0, 200, 100);
        assert_eq!(
            area,
            CropArea {
                left: 40,
                top: 15,
                width: 120,
                height: 70
            }
        );

        let clamped = crop_area(&face(0.0, 0.0, 1.0, 1.0), 10.0, 200, 100);
        assert_eq!((clamped.left, clamped.top), (0, 0));
        assert_eq!((clamped.width, clamped.height), (200, 100));
    }

    #[tokio::test]
    async fn test_apply_smart_crop_extracts_face() {
        let mut image: Box<dyn EngineImage> = Box::new(RasterImage::from_rgba(
            image::RgbaImage::from_pixel(100, 100, image::Rgba([0, 0, 0, 255])),
        ));
        let vision = StaticVision::with_faces(vec![face(0.5, 0.5, 0.25, 0.25)]);
        apply_smart_crop(image.as_mut(), &SmartCropEdit::default(), &vision)
            .await
            .unwrap();
        let meta = image.metadata();
        assert_eq!((meta.width, meta.height), (25, 25));
    }

    #[tokio::test]
    async fn test_padding_past_the_face_is_rejected() {
        let mut image: Box<dyn EngineImage> = Box::new(RasterImage::from_rgba(
            image::RgbaImage::new(10, 10),
        ));
        let vision = StaticVision::with_faces(vec![face(0.1, 0.1, 0.2, 0.2)]);
        let edit = SmartCropEdit {
            face_index: Some(0),
            padding: Some(-20.0),
        };
        let err = apply_smart_crop(image.as_mut(), &edit, &vision)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SmartCrop::PaddingOutOfBounds");
    }
}
