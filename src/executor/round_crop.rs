//! `roundCrop`: mask the image with an ellipse and trim the transparent rest

use crate::edits::RoundCropEdit;
use crate::engine::{Blend, EngineImage, Layer, LayerInput};
use crate::error::ImageHandlerError;

/// Ellipse geometry in pixels: centre, then radii
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Missing or non-positive values fall back to a centred circle with the
/// largest radius that fits
pub fn ellipse_for(edit: &RoundCropEdit, width: u32, height: u32) -> Ellipse {
    let (w, h) = (width as f64, height as f64);
    let radius = w.min(h) / 2.0;
    Ellipse {
        cx: positive(edit.left).unwrap_or(w / 2.0),
        cy: positive(edit.top).unwrap_or(h / 2.0),
        rx: positive(edit.rx).unwrap_or(radius),
        ry: positive(edit.ry).unwrap_or(radius),
    }
}

pub(super) fn apply_round_crop(
    image: &mut dyn EngineImage,
    edit: &RoundCropEdit,
) -> Result<(), ImageHandlerError> {
    let meta = image.metadata();
    let Ellipse { cx, cy, rx, ry } = ellipse_for(edit, meta.width, meta.height);

    let mask = Layer::new(LayerInput::Ellipse { cx, cy, rx, ry }).with_blend(Blend::DestIn);
    image.composite(&[mask])?;
    image.trim();
    Ok(())
}
