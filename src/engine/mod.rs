//! Image engine collaborator
//!
//! The executor and the action pipeline never touch pixels. They drive an
//! [`EngineImage`] handle produced by an [`ImageEngine`]: read metadata,
//! apply one operation at a time, and finally encode.
//!
//! # Modules
//!
//! - `raster`: the `image`-crate backend ([`RasterEngine`])
//! - `composite`: layer placement and Porter-Duff blending
//! - `pixels`: per-pixel filters, convolution and rotation
//! - `text`: glyph rendering for text watermarks

pub mod composite;
pub mod pixels;
pub mod raster;
pub mod text;

pub use raster::{RasterEngine, RasterImage};

use crate::edits::{ConvolveEdit, FitMode, Rgba};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by an engine backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Output format {0} is not supported")]
    UnsupportedFormat(String),

    #[error("Failed to encode {format}: {message}")]
    Encode { format: String, message: String },

    #[error(
        "Region {width}x{height} at ({left}, {top}) is outside the {image_width}x{image_height} image"
    )]
    OutOfBounds {
        left: i64,
        top: i64,
        width: i64,
        height: i64,
        image_width: u32,
        image_height: u32,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No font is configured for text rendering")]
    FontUnavailable,
}

impl From<EngineError> for ImageHandlerError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Decode(_) => ImageHandlerError::engine("ImageEngine::CannotDecode", err.to_string()),
            EngineError::UnsupportedFormat(_) => ImageHandlerError::engine(
                "UnsupportedOutputImageFormat",
                format!("Format to {}", err),
            ),
            EngineError::Encode { .. } => {
                ImageHandlerError::engine("ImageEngine::CannotEncode", err.to_string())
            }
            EngineError::OutOfBounds { .. } => {
                ImageHandlerError::invalid_edit("ImageEngine::AreaOutOfBounds", err.to_string())
            }
            EngineError::InvalidOperation(_) => {
                ImageHandlerError::invalid_edit("ImageEngine::InvalidOperation", err.to_string())
            }
            EngineError::FontUnavailable => {
                ImageHandlerError::configuration("Watermark::FontUnavailable", err.to_string())
            }
        }
    }
}

/// Snapshot of the current image state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Format the source was decoded from
    pub format: Option<ImageFormat>,
    /// EXIF orientation (1..=8) still pending, if any
    pub orientation: Option<u32>,
    /// Frame count; 1 for still images
    pub pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Apply the EXIF orientation to the pixels on load
    pub auto_orient: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { auto_orient: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    /// Padding color for `contain`
    pub background: Rgba,
    pub without_enlargement: bool,
}

impl ResizeOptions {
    pub fn new(width: Option<u32>, height: Option<u32>, fit: FitMode) -> Self {
        Self {
            width,
            height,
            fit,
            background: Rgba::black(),
            without_enlargement: false,
        }
    }
}

/// Pixel rectangle inside the current image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Nine-grid anchor for layers and gravity crops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    #[default]
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl FromStr for Gravity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nw" | "northwest" => Ok(Gravity::NorthWest),
            "north" => Ok(Gravity::North),
            "ne" | "northeast" => Ok(Gravity::NorthEast),
            "west" => Ok(Gravity::West),
            "center" | "centre" => Ok(Gravity::Center),
            "east" => Ok(Gravity::East),
            "sw" | "southwest" => Ok(Gravity::SouthWest),
            "south" => Ok(Gravity::South),
            "se" | "southeast" => Ok(Gravity::SouthEast),
            _ => Err(format!("Unknown gravity: {}", s)),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gravity::NorthWest => "nw",
            Gravity::North => "north",
            Gravity::NorthEast => "ne",
            Gravity::West => "west",
            Gravity::Center => "center",
            Gravity::East => "east",
            Gravity::SouthWest => "sw",
            Gravity::South => "south",
            Gravity::SouthEast => "se",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blend {
    /// Porter-Duff over
    #[default]
    Over,
    /// Keep the base only where the layer is opaque
    DestIn,
}

/// Pixel source of a layer
#[derive(Debug, Clone, PartialEq)]
pub enum LayerInput {
    /// Encoded image bytes in any decodable format
    Encoded(Bytes),
    /// Opaque ellipse on a transparent canvas the size of the base image
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    /// Opaque rounded rectangle the size of the base image
    RoundedRect { radius: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub input: LayerInput,
    /// Absolute placement; falls back to `gravity` when either is missing
    pub left: Option<i64>,
    pub top: Option<i64>,
    pub gravity: Gravity,
    /// Repeat the layer across the whole base image
    pub tile: bool,
    pub blend: Blend,
    /// Multiplier on the layer alpha, 0.0..=1.0
    pub opacity: f32,
}

impl Layer {
    pub fn new(input: LayerInput) -> Self {
        Self {
            input,
            left: None,
            top: None,
            gravity: Gravity::Center,
            tile: false,
            blend: Blend::Over,
            opacity: 1.0,
        }
    }

    pub fn at(mut self, left: i64, top: i64) -> Self {
        self.left = Some(left);
        self.top = Some(top);
        self
    }

    pub fn with_gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn tiled(mut self, tile: bool) -> Self {
        self.tile = tile;
        self
    }
}

/// Encoder settings; `format: None` keeps the source format
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputSettings {
    pub format: Option<ImageFormat>,
    pub quality: Option<u8>,
    pub effort: Option<u8>,
    pub progressive: bool,
    pub lossless: bool,
}

/// Options for [`ImageEngine::render_text`]
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub text: String,
    pub font_size: f32,
    pub color: Rgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Factory for image handles; shared across requests
pub trait ImageEngine: Send + Sync {
    fn load(&self, data: &[u8], options: LoadOptions) -> Result<Box<dyn EngineImage>, EngineError>;

    /// Render a line of text onto a transparent canvas
    fn render_text(&self, options: &TextOptions) -> Result<Box<dyn EngineImage>, EngineError>;
}

/// One decoded image, exclusively owned by a single request
pub trait EngineImage: Send + Sync {
    fn metadata(&self) -> ImageMetadata;

    fn resize(&mut self, options: &ResizeOptions) -> Result<(), EngineError>;
    /// Apply and clear the pending EXIF orientation
    fn auto_orient(&mut self);
    /// Clockwise rotation; uncovered corners are filled with `background`
    fn rotate(&mut self, degrees: f64, background: Rgba);
    /// Mirror top to bottom
    fn flip(&mut self);
    /// Mirror left to right
    fn flop(&mut self);
    /// `None` is a fast mild blur
    fn blur(&mut self, sigma: Option<f64>);
    fn sharpen(&mut self, sigma: f64, flat: f64, jagged: f64);
    fn median(&mut self, size: u32);
    fn convolve(&mut self, kernel: &ConvolveEdit) -> Result<(), EngineError>;
    fn flatten(&mut self, background: Rgba);
    fn gamma(&mut self, gamma: f64);
    fn negate(&mut self);
    fn normalize(&mut self);
    fn threshold(&mut self, level: u8);
    fn tint(&mut self, r: f64, g: f64, b: f64);
    fn grayscale(&mut self);
    /// `v * a + b` on every color channel
    fn linear(&mut self, a: f64, b: f64);
    /// Scale the alpha channel
    fn set_opacity(&mut self, opacity: f32);
    fn extract(&mut self, region: Region) -> Result<(), EngineError>;
    fn composite(&mut self, layers: &[Layer]) -> Result<(), EngineError>;
    /// Cut away borders matching the top-left pixel
    fn trim(&mut self);

    fn output(&self) -> &OutputSettings;
    fn output_mut(&mut self) -> &mut OutputSettings;

    /// Encode with the current output settings
    fn encode(&self) -> Result<EncodedImage, EngineError>;
    /// Encode as `format` with default options, leaving the settings alone
    fn encode_as(&self, format: ImageFormat) -> Result<EncodedImage, EngineError>;
}
