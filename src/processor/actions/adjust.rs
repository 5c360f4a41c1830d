//! Linear brightness and contrast

use super::{int_in_range, single_value};
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

fn level(params: &[&str], usage: &str, range_message: &str) -> Result<i64, ImageHandlerError> {
    let value = single_value(params, usage)?;
    int_in_range(value, -100, 100).ok_or_else(|| ImageHandlerError::invalid_argument(range_message))
}

pub struct BrightAction;

impl BrightAction {
    pub fn parse(params: &[&str]) -> Result<i64, ImageHandlerError> {
        level(
            params,
            "Bright param error, e.g: bright,50",
            "Bright must be between -100 and 100",
        )
    }
}

#[async_trait]
impl Action for BrightAction {
    fn name(&self) -> &'static str {
        "bright"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let bright = Self::parse(params)?;
        ctx.image.linear(1.0, bright as f64);
        Ok(())
    }
}

pub struct ContrastAction;

impl ContrastAction {
    pub fn parse(params: &[&str]) -> Result<i64, ImageHandlerError> {
        level(
            params,
            "Contrast param error, e.g: contrast,-50",
            "Contrast must be between -100 and 100",
        )
    }

    /// Multiplier for a contrast level
    pub fn slope(contrast: i64) -> f64 {
        let c = contrast as f64;
        if contrast > 0 {
            (2.0 * c + 100.0) / 200.0 + 0.5
        } else {
            (c + 100.0) / 200.0 + 0.5
        }
    }
}

#[async_trait]
impl Action for ContrastAction {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let contrast = Self::parse(params)?;
        ctx.image.linear(Self::slope(contrast), 0.0);
        Ok(())
    }
}
