//! `crop` with nine-grid gravity and `indexcrop` strip selection

use super::key_values;
use crate::edits::parse_int_prefix;
use crate::engine::{Gravity, Region};
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropOpts {
    /// 0 means "to the edge"
    pub w: u32,
    pub h: u32,
    pub x: u32,
    pub y: u32,
    pub g: Gravity,
}

impl Default for CropOpts {
    fn default() -> Self {
        Self {
            w: 0,
            h: 0,
            x: 0,
            y: 0,
            g: Gravity::NorthWest,
        }
    }
}

fn crop_gravity(value: &str) -> Option<Gravity> {
    match value {
        "nw" | "north" | "ne" | "west" | "center" | "east" | "sw" | "south" | "se" => value.parse().ok(),
        _ => None,
    }
}

/// Absolute crop rectangle for an image of `width` x `height`
pub fn crop_region(opts: &CropOpts, width: u32, height: u32) -> Result<Region, ImageHandlerError> {
    let third_w = (width as f64 / 3.0).round() as u32;
    let third_h = (height as f64 / 3.0).round() as u32;

    let mut x = opts.x;
    let mut y = opts.y;
    match opts.g {
        Gravity::West | Gravity::Center | Gravity::East => y = y.saturating_add(third_h),
        Gravity::SouthWest | Gravity::South | Gravity::SouthEast => {
            y = y.saturating_add(third_h * 2)
        }
        _ => {}
    }
    match opts.g {
        Gravity::North | Gravity::Center | Gravity::South => x = x.saturating_add(third_w),
        Gravity::NorthEast | Gravity::East | Gravity::SouthEast => {
            x = x.saturating_add(third_w * 2)
        }
        _ => {}
    }

    if x >= width {
        return Err(ImageHandlerError::invalid_argument(format!(
            "Incorrect crop param, 'x' value must be less than the image width({})",
            width
        )));
    }
    if y >= height {
        return Err(ImageHandlerError::invalid_argument(format!(
            "Incorrect crop param, 'y' value must be less than the image height({})",
            height
        )));
    }

    let w = if opts.w == 0 { width - x } else { opts.w.min(width - x) };
    let h = if opts.h == 0 { height - y } else { opts.h.min(height - y) };

    Ok(Region {
        left: x,
        top: y,
        width: w,
        height: h,
    })
}

pub struct CropAction;

impl CropAction {
    pub fn parse(params: &[&str]) -> Result<CropOpts, ImageHandlerError> {
        if params.len() < 2 {
            return Err(ImageHandlerError::invalid_argument(
                "Crop param error, e.g: crop,x_100,y_50",
            ));
        }
        let mut opts = CropOpts::default();
        for (key, value) in key_values(params) {
            let number = parse_int_prefix(value);
            match key {
                "w" | "h" => {
                    let v = number
                        .filter(|v| *v > 0)
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            ImageHandlerError::invalid_argument(format!(
                                "Crop param '{}' must be greater than 0",
                                key
                            ))
                        })?;
                    if key == "w" {
                        opts.w = v;
                    } else {
                        opts.h = v;
                    }
                }
                "x" | "y" => {
                    let v = number
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            ImageHandlerError::invalid_argument(format!(
                                "Crop param '{}' must be greater than or equal to 0",
                                key
                            ))
                        })?;
                    if key == "x" {
                        opts.x = v;
                    } else {
                        opts.y = v;
                    }
                }
                "g" => {
                    opts.g = crop_gravity(value).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "Crop param 'g' must be 'nw, north, ne, west, center, east, sw, south, se'",
                        )
                    })?
                }
                _ => return Err(ImageHandlerError::unknown_param(key)),
            }
        }
        Ok(opts)
    }
}

#[async_trait]
impl Action for CropAction {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let meta = ctx.image.metadata();
        let region = crop_region(&opts, meta.width, meta.height)?;
        ctx.image.extract(region)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCropOpts {
    /// Strip width when cutting vertically
    pub x: u32,
    /// Strip height when cutting horizontally
    pub y: u32,
    pub i: i64,
}

/// Strip `i` of the image, or `None` when the index is out of range
pub fn index_region(opts: &IndexCropOpts, width: u32, height: u32) -> Option<Region> {
    let index = u32::try_from(opts.i).ok()?;
    if opts.x > 0 {
        if opts.x > width || index >= width / opts.x {
            return None;
        }
        return Some(Region {
            left: index * opts.x,
            top: 0,
            width: opts.x,
            height,
        });
    }
    if opts.y > 0 {
        if opts.y > height || index >= height / opts.y {
            return None;
        }
        return Some(Region {
            left: 0,
            top: index * opts.y,
            width,
            height: opts.y,
        });
    }
    None
}

pub struct IndexCropAction;

impl IndexCropAction {
    pub fn parse(params: &[&str]) -> Result<IndexCropOpts, ImageHandlerError> {
        if params.len() < 3 {
            return Err(ImageHandlerError::invalid_argument(
                "IndexCrop param error, e.g: indexcrop,x_100,i_0",
            ));
        }
        let mut opts = IndexCropOpts::default();
        for (key, value) in key_values(params) {
            if !matches!(key, "x" | "y" | "i") {
                return Err(ImageHandlerError::unknown_param(key));
            }
            let number = parse_int_prefix(value).ok_or_else(|| {
                ImageHandlerError::invalid_argument(format!("Param error: {} must be a number", key))
            })?;
            match key {
                "x" | "y" => {
                    let v = u32::try_from(number).map_err(|_| {
                        ImageHandlerError::invalid_argument(format!(
                            "Param error: {} value must be greater than 0",
                            key
                        ))
                    })?;
                    if key == "x" {
                        opts.x = v;
                    } else {
                        opts.y = v;
                    }
                }
                "i" => opts.i = number,
                _ => return Err(ImageHandlerError::unknown_param(key)),
            }
        }
        if opts.x > 0 && opts.y > 0 {
            return Err(ImageHandlerError::invalid_argument(
                "Param error: Cannot enter x and y at the same time",
            ));
        }
        Ok(opts)
    }
}

#[async_trait]
impl Action for IndexCropAction {
    fn name(&self) -> &'static str {
        "indexcrop"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let meta = ctx.image.metadata();
        match index_region(&opts, meta.width, meta.height) {
            Some(region) => ctx.image.extract(region)?,
            None => tracing::debug!(index = opts.i, "Index crop out of range, image unchanged"),
        }
        Ok(())
    }
}
