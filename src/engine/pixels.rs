//! Pixel filters for the raster backend
//!
//! All functions work on RGBA8 buffers. Color filters leave alpha alone
//! unless stated otherwise.

use crate::edits::{ConvolveEdit, Rgba as Color};
use image::{imageops, Rgba, RgbaImage};

/// Rec. 601 luma of a pixel
fn luma(p: &Rgba<u8>) -> f64 {
    0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn map_rgb(image: &mut RgbaImage, f: impl Fn(u8) -> u8) {
    for pixel in image.pixels_mut() {
        pixel[0] = f(pixel[0]);
        pixel[1] = f(pixel[1]);
        pixel[2] = f(pixel[2]);
    }
}

pub fn linear(image: &mut RgbaImage, a: f64, b: f64) {
    map_rgb(image, |v| clamp_u8(v as f64 * a + b));
}

pub fn negate(image: &mut RgbaImage) {
    map_rgb(image, |v| 255 - v);
}

pub fn gamma(image: &mut RgbaImage, gamma: f64) {
    if gamma <= 0.0 {
        return;
    }
    let exponent = 1.0 / gamma;
    let table: Vec<u8> = (0..=255u16)
        .map(|v| clamp_u8(255.0 * (v as f64 / 255.0).powf(exponent)))
        .collect();
    map_rgb(image, |v| table[v as usize]);
}

pub fn grayscale(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let l = clamp_u8(luma(pixel));
        pixel[0] = l;
        pixel[1] = l;
        pixel[2] = l;
    }
}

/// Pixels at or above `level` become white, the rest black
pub fn threshold(image: &mut RgbaImage, level: u8) {
    for pixel in image.pixels_mut() {
        let v = if luma(pixel) >= level as f64 { 255 } else { 0 };
        pixel[0] = v;
        pixel[1] = v;
        pixel[2] = v;
    }
}

/// Stretch luminance to the full range
pub fn normalize(image: &mut RgbaImage) {
    let (min, max) = image
        .pixels()
        .map(luma)
        .fold((f64::MAX, f64::MIN), |(lo, hi), l| (lo.min(l), hi.max(l)));
    if max <= min {
        return;
    }
    let scale = 255.0 / (max - min);
    map_rgb(image, |v| clamp_u8((v as f64 - min) * scale));
}

/// Keep each pixel's luminance while taking the hue of the tint color
pub fn tint(image: &mut RgbaImage, r: f64, g: f64, b: f64) {
    let tint_luma = 0.299 * r + 0.587 * g + 0.114 * b;
    let scale = |c: f64| if tint_luma > 0.0 { c / tint_luma } else { 0.0 };
    let (sr, sg, sb) = (scale(r), scale(g), scale(b));
    for pixel in image.pixels_mut() {
        let l = luma(pixel);
        pixel[0] = clamp_u8(l * sr);
        pixel[1] = clamp_u8(l * sg);
        pixel[2] = clamp_u8(l * sb);
    }
}

/// Composite onto a solid background and drop transparency
pub fn flatten(image: &mut RgbaImage, background: Color) {
    let (br, bg, bb) = (background.r as f64, background.g as f64, background.b as f64);
    for pixel in image.pixels_mut() {
        let a = pixel[3] as f64 / 255.0;
        pixel[0] = clamp_u8(pixel[0] as f64 * a + br * (1.0 - a));
        pixel[1] = clamp_u8(pixel[1] as f64 * a + bg * (1.0 - a));
        pixel[2] = clamp_u8(pixel[2] as f64 * a + bb * (1.0 - a));
        pixel[3] = 255;
    }
}

/// Multiply alpha by `opacity`
pub fn set_opacity(image: &mut RgbaImage, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    for pixel in image.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
}

/// Gaussian blur; `None` is a 3x3 box blur
pub fn blur(image: &RgbaImage, sigma: Option<f64>) -> RgbaImage {
    match sigma {
        Some(sigma) if sigma > 0.0 => imageops::blur(image, sigma as f32),
        _ => imageops::filter3x3(image, &[1.0 / 9.0; 9]),
    }
}

/// Unsharp mask; `flat` and `jagged` are the gains below and above a fixed
/// edge threshold
pub fn sharpen(image: &RgbaImage, sigma: f64, flat: f64, jagged: f64) -> RgbaImage {
    const EDGE_THRESHOLD: f64 = 8.0;
    let blurred = imageops::blur(image, sigma.max(0.01) as f32);
    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let soft = blurred.get_pixel(x, y);
        for c in 0..3 {
            let detail = pixel[c] as f64 - soft[c] as f64;
            let gain = if detail.abs() > EDGE_THRESHOLD { jagged } else { flat };
            pixel[c] = clamp_u8(pixel[c] as f64 + detail * gain);
        }
    }
    out
}

/// Median over a `size` x `size` window, clamped at the edges
pub fn median(image: &RgbaImage, size: u32) -> RgbaImage {
    let radius = (size.max(1) / 2) as i64;
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = (image.width() as i64, image.height() as i64);
    let mut window: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];

    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        for channel in window.iter_mut() {
            channel.clear();
        }
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let sx = (x as i64 + dx).clamp(0, w - 1) as u32;
                let sy = (y as i64 + dy).clamp(0, h - 1) as u32;
                let p = image.get_pixel(sx, sy);
                for c in 0..3 {
                    window[c].push(p[c]);
                }
            }
        }
        let mut out = *image.get_pixel(x, y);
        for c in 0..3 {
            window[c].sort_unstable();
            out[c] = window[c][window[c].len() / 2];
        }
        out
    })
}

/// Arbitrary kernel convolution; scale defaults to the kernel sum (or 1)
pub fn convolve(image: &RgbaImage, kernel: &ConvolveEdit) -> RgbaImage {
    let sum: f64 = kernel.kernel.iter().sum();
    let scale = kernel
        .scale
        .unwrap_or(if sum == 0.0 { 1.0 } else { sum });
    let scale = if scale == 0.0 { 1.0 } else { scale };
    let offset = kernel.offset.unwrap_or(0.0);

    let (kw, kh) = (kernel.width as i64, kernel.height as i64);
    let (w, h) = (image.width() as i64, image.height() as i64);

    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let mut acc = [0.0f64; 3];
        for ky in 0..kh {
            for kx in 0..kw {
                let weight = kernel.kernel[(ky * kw + kx) as usize];
                let sx = (x as i64 + kx - kw / 2).clamp(0, w - 1) as u32;
                let sy = (y as i64 + ky - kh / 2).clamp(0, h - 1) as u32;
                let p = image.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += p[c] as f64 * weight;
                }
            }
        }
        let alpha = image.get_pixel(x, y)[3];
        Rgba([
            clamp_u8(acc[0] / scale + offset),
            clamp_u8(acc[1] / scale + offset),
            clamp_u8(acc[2] / scale + offset),
            alpha,
        ])
    })
}

/// Normalized 1-D Gaussian weights of length `2 * radius + 1`
pub fn gaussian_kernel(radius: u32, sigma: f64) -> Vec<f64> {
    let sigma = if sigma > 0.0 { sigma } else { 1.0 };
    let r = radius as i64;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Clockwise rotation; quarter turns are exact, other angles are sampled
/// bilinearly onto an expanded canvas filled with `background`
pub fn rotate(image: &RgbaImage, degrees: f64, background: Color) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return image.clone();
    }
    if normalized == 90.0 {
        return imageops::rotate90(image);
    }
    if normalized == 180.0 {
        return imageops::rotate180(image);
    }
    if normalized == 270.0 {
        return imageops::rotate270(image);
    }

    let fill = Rgba([background.r, background.g, background.b, background.alpha_u8()]);
    let radians = (normalized as f32).to_radians();
    let cos = radians.cos();
    let sin = radians.sin();

    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    let cx = src_w / 2.0;
    let cy = src_h / 2.0;

    let dst_w = (src_w * cos.abs() + src_h * sin.abs()).ceil().max(1.0) as u32;
    let dst_h = (src_w * sin.abs() + src_h * cos.abs()).ceil().max(1.0) as u32;
    let dst_cx = dst_w as f32 / 2.0;
    let dst_cy = dst_h as f32 / 2.0;

    RgbaImage::from_fn(dst_w, dst_h, |dx, dy| {
        // Inverse rotation back into source space
        let rx = dx as f32 + 0.5 - dst_cx;
        let ry = dy as f32 + 0.5 - dst_cy;
        let sx = rx * cos + ry * sin + cx - 0.5;
        let sy = -rx * sin + ry * cos + cy - 0.5;

        if sx < 0.0 || sy < 0.0 || sx > src_w - 1.0 || sy > src_h - 1.0 {
            return fill;
        }

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(image.width() - 1);
        let y1 = (y0 + 1).min(image.height() - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let p00 = image.get_pixel(x0, y0);
        let p10 = image.get_pixel(x1, y0);
        let p01 = image.get_pixel(x0, y1);
        let p11 = image.get_pixel(x1, y1);

        let interpolate = |c: usize| -> u8 {
            let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
                + p10[c] as f32 * fx * (1.0 - fy)
                + p01[c] as f32 * (1.0 - fx) * fy
                + p11[c] as f32 * fx * fy;
            v.round().clamp(0.0, 255.0) as u8
        };

        Rgba([interpolate(0), interpolate(1), interpolate(2), interpolate(3)])
    })
}

/// Undo an EXIF orientation (1..=8)
pub fn apply_orientation(image: &RgbaImage, orientation: u32) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(image),
        3 => imageops::rotate180(image),
        4 => imageops::flip_vertical(image),
        5 => imageops::flip_horizontal(&imageops::rotate90(image)),
        6 => imageops::rotate90(image),
        7 => imageops::flip_horizontal(&imageops::rotate270(image)),
        8 => imageops::rotate270(image),
        _ => image.clone(),
    }
}

/// Bounding box of pixels that differ from the top-left pixel
pub fn trim_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let reference = *image.get_pixel_checked(0, 0)?;
    let differs = |p: &Rgba<u8>| {
        if p[3] == 0 && reference[3] == 0 {
            return false;
        }
        p.0 != reference.0
    };

    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    for (x, y, p) in image.enumerate_pixels() {
        if differs(p) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if min_x == u32::MAX {
        return None;
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}
