//! Text rendering for watermarks
//!
//! Glyphs are laid out on a single line with kerning and drawn with
//! coverage-based anti-aliasing onto a transparent canvas.

use super::composite::blend_pixels;
use super::EngineError;
use crate::edits::Rgba as Color;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Padding added around measured text, in pixels
const TEXT_PADDING: u32 = 2;

/// A loaded TrueType/OpenType font
pub struct TextRenderer {
    font: FontVec,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer").finish_non_exhaustive()
    }
}

impl TextRenderer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, EngineError> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| EngineError::InvalidOperation(format!("Invalid font data: {}", e)))?;
        Ok(Self { font })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            EngineError::InvalidOperation(format!("Failed to read font {}: {}", path.display(), e))
        })?;
        Self::from_bytes(data)
    }

    /// Width and height of `text` at `font_size`, padding included
    pub fn measure(&self, text: &str, font_size: f32) -> (u32, u32) {
        let scaled = self.font.as_scaled(PxScale::from(font_size));

        let mut width = 0.0f32;
        let mut prev = None;
        for c in text.chars() {
            let glyph_id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                width += scaled.kern(prev, glyph_id);
            }
            width += scaled.h_advance(glyph_id);
            prev = Some(glyph_id);
        }

        (
            width.ceil() as u32 + TEXT_PADDING,
            scaled.height().ceil() as u32 + TEXT_PADDING,
        )
    }

    pub fn render(&self, text: &str, font_size: f32, color: Color) -> Result<RgbaImage, EngineError> {
        if text.is_empty() {
            return Err(EngineError::InvalidOperation(
                "Cannot render empty text".to_string(),
            ));
        }
        if font_size.is_nan() || font_size <= 0.0 {
            return Err(EngineError::InvalidOperation(format!(
                "Invalid font size: {}",
                font_size
            )));
        }

        let scale = PxScale::from(font_size);
        let scaled = self.font.as_scaled(scale);
        let (width, height) = self.measure(text, font_size);
        let (canvas_w, canvas_h) = (width.max(1), height.max(1));
        let mut image = RgbaImage::new(canvas_w, canvas_h);

        let alpha = color.alpha_u8() as f32;
        let baseline = scaled.ascent();
        let mut cursor_x = 0.0f32;
        let mut prev = None;

        for c in text.chars() {
            let glyph_id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                cursor_x += scaled.kern(prev, glyph_id);
            }

            let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|px, py, coverage| {
                    let x = px as i32 + bounds.min.x as i32;
                    let y = py as i32 + bounds.min.y as i32;
                    if x < 0 || y < 0 || x >= canvas_w as i32 || y >= canvas_h as i32 {
                        return;
                    }
                    let pixel = Rgba([color.r, color.g, color.b, (coverage * alpha) as u8]);
                    let existing = *image.get_pixel(x as u32, y as u32);
                    image.put_pixel(x as u32, y as u32, blend_pixels(existing, pixel, 1.0));
                });
            }

            cursor_x += scaled.h_advance(glyph_id);
            prev = Some(glyph_id);
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_FONTS: [&str; 2] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
    ];

    fn system_font() -> Option<TextRenderer> {
        SYSTEM_FONTS
            .iter()
            .find_map(|path| TextRenderer::from_file(path).ok())
    }

    #[test]
    fn test_invalid_font_data_is_rejected() {
        assert!(TextRenderer::from_bytes(b"not a font".to_vec()).is_err());
        assert!(TextRenderer::from_file("/nonexistent/font.ttf").is_err());
    }

    #[test]
    fn test_render_with_system_font() {
        // Hosts without DejaVu installed have nothing to render with
        let Some(renderer) = system_font() else {
            return;
        };
        let image = renderer.render("Hi", 24.0, Color::white()).unwrap();
        assert!(image.width() > TEXT_PADDING && image.height() > TEXT_PADDING);
        assert!(image.pixels().any(|p| p[3] > 0));

        let (small_w, _) = renderer.measure("Hi", 12.0);
        let (large_w, _) = renderer.measure("Hi", 48.0);
        assert!(large_w > small_w);
        assert!(renderer.render("", 24.0, Color::white()).is_err());
    }
}
