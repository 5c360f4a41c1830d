//! `contentModeration`: blur the image when unsafe content is detected

use super::vision_image;
use crate::edits::ModerationEdit;
use crate::engine::EngineImage;
use crate::error::ImageHandlerError;
use crate::vision::{ModerationLabel, VisionService};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 75.0;
pub const DEFAULT_MODERATION_BLUR: f64 = 50.0;

/// Blur sigma to apply for the detected labels, if any.
///
/// With an allow-list only listed label names trigger; without one any
/// detected label does. Sigmas outside [0.3, 1000] disable the blur.
pub fn moderation_blur(edit: &ModerationEdit, labels: &[ModerationLabel]) -> Option<f64> {
    let blur = edit.blur.map(f64::ceil).unwrap_or(DEFAULT_MODERATION_BLUR);
    if !(0.3..=1000.0).contains(&blur) {
        return None;
    }

    let triggered = match &edit.moderation_labels {
        Some(allowed) => labels.iter().any(|l| allowed.contains(&l.name)),
        None => !labels.is_empty(),
    };
    triggered.then_some(blur)
}

pub(super) async fn apply_moderation(
    image: &mut dyn EngineImage,
    edit: &ModerationEdit,
    vision: &dyn VisionService,
) -> Result<(), ImageHandlerError> {
    let min_confidence = edit.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    let bytes = vision_image(image)?;
    let labels = vision
        .detect_moderation_labels(&bytes, min_confidence)
        .await?;

    if let Some(sigma) = moderation_blur(edit, &labels) {
        tracing::info!(
            labels = labels.len(),
            sigma = sigma,
            "Blurring image flagged by moderation"
        );
        image.blur(Some(sigma));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RasterImage;
    use crate::vision::{MockVisionService, StaticVision};

    fn label(name: &str) -> ModerationLabel {
        ModerationLabel {
            name: name.to_string(),
            confidence: 90.0,
        }
    }

    #[test]
    fn test_any_label_triggers_without_allow_list() {
        let edit = ModerationEdit::default();
        assert_eq!(moderation_blur(&edit, &[label("Smoking")]), Some(50.0));
        assert_eq!(moderation_blur(&edit, &[]), None);
    }

    #[test]
    fn test_allow_list_filters_labels() {
        let edit = ModerationEdit {
            moderation_labels: Some(vec!["Violence".to_string()]),
            ..Default::default()
        };
        assert_eq!(moderation_blur(&edit, &[label("Smoking")]), None);
        assert_eq!(moderation_blur(&edit, &[label("Violence")]), Some(50.0));
    }

    #[test]
    fn test_blur_is_rounded_up_and_bounded() {
        let mut edit = ModerationEdit {
            blur: Some(4.2),
            ..Default::default()
        };
        assert_eq!(moderation_blur(&edit, &[label("Smoking")]), Some(5.0));
        edit.blur = Some(1500.0);
        assert_eq!(moderation_blur(&edit, &[label("Smoking")]), None);
        edit.blur = Some(0.0);
        assert_eq!(moderation_blur(&edit, &[label("Smoking")]), None);
    }

    #[tokio::test]
    async fn test_min_confidence_defaults_to_75() {
        let mut vision = MockVisionService::new();
        vision
            .expect_detect_moderation_labels()
            .withf(|_, min_confidence| *min_confidence == 75.0)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let mut image: Box<dyn EngineImage> =
            Box::new(RasterImage::from_rgba(image::RgbaImage::new(8, 8)));
        apply_moderation(image.as_mut(), &ModerationEdit::default(), &vision)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flagged_image_is_blurred() {
        let mut source = image::RgbaImage::from_pixel(16, 16, image::Rgba([0, 0, 0, 255]));
        source.put_pixel(8, 8, image::Rgba([255, 255, 255, 255]));
        let mut image: Box<dyn EngineImage> = Box::new(RasterImage::from_rgba(source));

        let vision = StaticVision::with_labels(&[("Violence", 99.0)]);
        let edit = ModerationEdit {
            blur: Some(2.0),
            ..Default::default()
        };
        apply_moderation(image.as_mut(), &edit, &vision).await.unwrap();

        let encoded = image.encode_as(crate::format::ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert!(decoded.get_pixel(8, 8)[0] < 255);
        assert!(decoded.get_pixel(7, 8)[0] > 0);
    }
}
