use super::{int_in_range, key_values, switch};
use crate::edits::color::parse_hex;
use crate::edits::{parse_int_prefix, FitMode, Rgba};
use crate::engine::ResizeOptions;
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;
use std::str::FromStr;

/// `m_` values of the resize action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    #[default]
    Lfit,
    Mfit,
    Fill,
    Pad,
    Fixed,
}

impl ResizeMode {
    pub fn fit(&self) -> FitMode {
        match self {
            ResizeMode::Lfit => FitMode::Inside,
            ResizeMode::Mfit => FitMode::Outside,
            ResizeMode::Fill => FitMode::Cover,
            ResizeMode::Pad => FitMode::Contain,
            ResizeMode::Fixed => FitMode::Fill,
        }
    }
}

impl FromStr for ResizeMode {
    type Err = ImageHandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lfit" => Ok(ResizeMode::Lfit),
            "mfit" => Ok(ResizeMode::Mfit),
            "fill" => Ok(ResizeMode::Fill),
            "pad" => Ok(ResizeMode::Pad),
            "fixed" => Ok(ResizeMode::Fixed),
            _ => Err(ImageHandlerError::invalid_argument(format!("Unknown m: \"{}\"", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeOpts {
    pub mode: ResizeMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Never enlarge
    pub limit: bool,
    pub color: Rgba,
    /// Percentage scale, used when neither width nor height is given
    pub percent: Option<u32>,
}

impl Default for ResizeOpts {
    fn default() -> Self {
        Self {
            mode: ResizeMode::Lfit,
            width: None,
            height: None,
            limit: true,
            color: Rgba::white(),
            percent: None,
        }
    }
}

fn dimension(key: &str, value: &str) -> Result<u32, ImageHandlerError> {
    parse_int_prefix(value)
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| ImageHandlerError::invalid_argument(format!("Unknown {}: \"{}\"", key, value)))
}

pub struct ResizeAction;

impl ResizeAction {
    pub fn parse(params: &[&str]) -> Result<ResizeOpts, ImageHandlerError> {
        let mut opts = ResizeOpts::default();
        for (key, value) in key_values(params) {
            match key {
                "w" => opts.width = Some(dimension(key, value)?),
                "h" => opts.height = Some(dimension(key, value)?),
                "m" => opts.mode = value.parse()?,
                "limit" => {
                    opts.limit = switch(value).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(format!("Unknown limit: \"{}\"", value))
                    })?
                }
                "color" => {
                    opts.color = parse_hex(&format!("#{}", value)).map_err(|_| {
                        ImageHandlerError::invalid_argument(format!("Unknown color: \"{}\"", value))
                    })?
                }
                "p" => {
                    let p = int_in_range(value, 1, 1000).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(format!("Unknown p: \"{}\"", value))
                    })?;
                    opts.percent = Some(p as u32);
                }
                _ => return Err(ImageHandlerError::unknown_param(key)),
            }
        }
        Ok(opts)
    }
}

#[async_trait]
impl Action for ResizeAction {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let mut resize = ResizeOptions::new(opts.width, opts.height, opts.mode.fit());
        resize.background = opts.color;
        resize.without_enlargement = opts.limit;

        if let (Some(percent), None, None) = (opts.percent, opts.width, opts.height) {
            let meta = ctx.image.metadata();
            let scale = |v: u32| ((v as f64 * percent as f64 * 0.01).round() as u32).max(1);
            resize.width = Some(scale(meta.width));
            resize.height = Some(scale(meta.height));
            resize.without_enlargement = false;
        }

        ctx.image.resize(&resize)?;
        Ok(())
    }
}
