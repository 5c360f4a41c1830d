//! Layer placement and blending
//!
//! Layers are placed either at absolute coordinates or on a nine-grid
//! anchor, optionally tiled, and clipped to the base image. Coordinates may
//! be negative when a layer is larger than the base.

use super::{Blend, Gravity};
use image::{Rgba, RgbaImage};

/// Top-left corner of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
}

impl Placement {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Anchor a `layer_w` x `layer_h` layer on a `base_w` x `base_h` image
pub fn gravity_position(
    gravity: Gravity,
    base_w: u32,
    base_h: u32,
    layer_w: u32,
    layer_h: u32,
) -> Placement {
    let (bw, bh) = (base_w as i64, base_h as i64);
    let (lw, lh) = (layer_w as i64, layer_h as i64);
    let center_x = (bw - lw) / 2;
    let center_y = (bh - lh) / 2;

    match gravity {
        Gravity::NorthWest => Placement::new(0, 0),
        Gravity::North => Placement::new(center_x, 0),
        Gravity::NorthEast => Placement::new(bw - lw, 0),
        Gravity::West => Placement::new(0, center_y),
        Gravity::Center => Placement::new(center_x, center_y),
        Gravity::East => Placement::new(bw - lw, center_y),
        Gravity::SouthWest => Placement::new(0, bh - lh),
        Gravity::South => Placement::new(center_x, bh - lh),
        Gravity::SouthEast => Placement::new(bw - lw, bh - lh),
    }
}

/// Grid of placements covering the base image, starting at the origin
pub fn tiled_positions(base_w: u32, base_h: u32, layer_w: u32, layer_h: u32) -> Vec<Placement> {
    let mut positions = Vec::new();
    if layer_w == 0 || layer_h == 0 {
        return positions;
    }

    let mut y = 0i64;
    while y < base_h as i64 {
        let mut x = 0i64;
        while x < base_w as i64 {
            positions.push(Placement::new(x, y));
            x += layer_w as i64;
        }
        y += layer_h as i64;
    }
    positions
}

/// Draw `layer` onto `target` at `at` with the given blend mode
pub fn blend_layer(target: &mut RgbaImage, layer: &RgbaImage, at: Placement, blend: Blend, opacity: f32) {
    match blend {
        Blend::Over => blend_over(target, layer, at, opacity),
        Blend::DestIn => blend_dest_in(target, layer, at, opacity),
    }
}

fn blend_over(target: &mut RgbaImage, layer: &RgbaImage, at: Placement, opacity: f32) {
    let x_start = at.x.max(0);
    let y_start = at.y.max(0);
    let x_end = (at.x + layer.width() as i64).min(target.width() as i64);
    let y_end = (at.y + layer.height() as i64).min(target.height() as i64);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let lx = (tx - at.x) as u32;
            let ly = (ty - at.y) as u32;

            let fg = *layer.get_pixel(lx, ly);
            let bg = *target.get_pixel(tx as u32, ty as u32);
            target.put_pixel(tx as u32, ty as u32, blend_pixels(bg, fg, opacity));
        }
    }
}

/// Base alpha multiplied by layer alpha; pixels the layer does not cover
/// become transparent
fn blend_dest_in(target: &mut RgbaImage, layer: &RgbaImage, at: Placement, opacity: f32) {
    let (lw, lh) = (layer.width() as i64, layer.height() as i64);
    let opacity = opacity.clamp(0.0, 1.0);

    for (tx, ty, pixel) in target.enumerate_pixels_mut() {
        let lx = tx as i64 - at.x;
        let ly = ty as i64 - at.y;
        let mask = if lx >= 0 && ly >= 0 && lx < lw && ly < lh {
            layer.get_pixel(lx as u32, ly as u32)[3] as f32 / 255.0 * opacity
        } else {
            0.0
        };
        pixel[3] = (pixel[3] as f32 * mask).round() as u8;
    }
}

/// Porter-Duff over with an extra opacity multiplier on the foreground
pub fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

/// Opaque white ellipse on a transparent `width` x `height` canvas
pub fn ellipse_mask(width: u32, height: u32, cx: f64, cy: f64, rx: f64, ry: f64) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if rx <= 0.0 || ry <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let dx = (x as f64 + 0.5 - cx) / rx;
        let dy = (y as f64 + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Opaque white rectangle with corners rounded by `radius`
pub fn rounded_rect_mask(width: u32, height: u32, radius: u32) -> RgbaImage {
    let r = radius.min(width / 2).min(height / 2) as f64;
    let (w, h) = (width as f64, height as f64);

    RgbaImage::from_fn(width, height, |x, y| {
        let px = x as f64 + 0.5;
        let py = y as f64 + 0.5;
        // Nearest corner circle center, if the pixel is in a corner square
        let cx = if px < r {
            Some(r)
        } else if px > w - r {
            Some(w - r)
        } else {
            None
        };
        let cy = if py < r {
            Some(r)
        } else if py > h - r {
            Some(h - r)
        } else {
            None
        };

        let inside = match (cx, cy) {
            (Some(cx), Some(cy)) => (px - cx).powi(2) + (py - cy).powi(2) <= r * r,
            _ => true,
        };
        if inside {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}
