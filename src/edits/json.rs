//! Opaque-dialect edits: JSON object → [`EditSet`]
//!
//! Field names follow the opaque record (`resize`, `overlayWith`,
//! `jpeg: {quality}`...). Keys outside the closed edit set are logged and
//! skipped; a known key with a malformed value is an invalid edit.

use super::{
    ConvolveEdit, CropEdit, Edit, EditSet, FitMode, FormatOptions, ModerationEdit, OverlayEdit,
    OverlayPlacement, ResizeEdit, Rgba, RoundCropEdit, SharpenEdit, SmartCropEdit, TintEdit,
};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use serde_json::{Map, Value};

const PARSE_CODE: &str = "ImageEdits::CannotParseEdits";

/// Largest accepted median window side
pub const MAX_MEDIAN_SIZE: u32 = 99;

impl EditSet {
    /// Build an edit set from the `edits` object of an opaque request
    pub fn from_json(edits: &Map<String, Value>) -> Result<EditSet, ImageHandlerError> {
        let mut set = EditSet::new();
        for (key, value) in edits {
            match edit_from_json(key, value)? {
                Some(edit) => {
                    set.insert(edit);
                }
                None => {
                    tracing::warn!(edit = %key, "Ignoring unsupported edit");
                }
            }
        }
        Ok(set)
    }
}

/// `Ok(None)` means the key is not part of the edit set or is switched off
fn edit_from_json(key: &str, value: &Value) -> Result<Option<Edit>, ImageHandlerError> {
    let edit = match key {
        "resize" => Edit::Resize(resize(value)?),
        "crop" => Edit::Crop(CropEdit {
            left: integer(value, "left")?,
            top: integer(value, "top")?,
            width: integer(value, "width")?,
            height: integer(value, "height")?,
        }),
        "rotate" => match value {
            Value::Null => Edit::Rotate(None),
            other => Edit::Rotate(Some(number(other, key)?)),
        },
        "flip" => Edit::Flip(truthy(value)),
        "flop" => Edit::Flop(truthy(value)),
        "sharpen" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Bool(true) => Edit::Sharpen(SharpenEdit::default()),
            Value::Object(fields) => Edit::Sharpen(SharpenEdit {
                sigma: optional_number(fields.get("sigma"), "sigma")?,
                flat: optional_number(fields.get("m1").or(fields.get("flat")), "flat")?,
                jagged: optional_number(fields.get("m2").or(fields.get("jagged")), "jagged")?,
            }),
            other => Edit::Sharpen(SharpenEdit {
                sigma: Some(number(other, key)?),
                ..Default::default()
            }),
        },
        "median" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Bool(true) => Edit::Median(3),
            other => Edit::Median(median_size(number(other, key)?)?),
        },
        "blur" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Bool(true) => Edit::Blur(None),
            other => Edit::Blur(Some(number(other, key)?)),
        },
        "flatten" => {
            let background = match value {
                Value::Object(fields) => fields
                    .get("background")
                    .map(color)
                    .transpose()?
                    .unwrap_or_else(Rgba::black),
                Value::Bool(false) => return Ok(None),
                _ => Rgba::black(),
            };
            Edit::Flatten(background)
        }
        "gamma" => match value {
            Value::Bool(true) => Edit::Gamma(2.2),
            Value::Bool(false) => return Ok(None),
            other => Edit::Gamma(number(other, key)?),
        },
        "negate" => Edit::Negate(truthy(value)),
        "normalize" | "normalise" => Edit::Normalize(truthy(value)),
        "convolve" => Edit::Convolve(convolve(value)?),
        "threshold" => match value {
            Value::Bool(true) => Edit::Threshold(128),
            Value::Bool(false) => return Ok(None),
            other => Edit::Threshold(number(other, key)?.clamp(0.0, 255.0) as u8),
        },
        "tint" => Edit::Tint(tint(value)?),
        "grayscale" | "greyscale" => Edit::Grayscale(truthy(value)),
        "toFormat" => Edit::ToFormat(format_name(value)?),
        "overlayWith" => Edit::OverlayWith(overlay(value)?),
        "smartCrop" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Object(fields) => Edit::SmartCrop(SmartCropEdit {
                face_index: optional_number(fields.get("faceIndex"), "faceIndex")?
                    .map(|i| i.max(0.0) as usize),
                padding: optional_number(fields.get("padding"), "padding")?,
            }),
            _ => Edit::SmartCrop(SmartCropEdit::default()),
        },
        "roundCrop" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Object(fields) => Edit::RoundCrop(RoundCropEdit {
                top: optional_number(fields.get("top"), "top")?,
                left: optional_number(fields.get("left"), "left")?,
                rx: optional_number(fields.get("rx"), "rx")?,
                ry: optional_number(fields.get("ry"), "ry")?,
            }),
            _ => Edit::RoundCrop(RoundCropEdit::default()),
        },
        "contentModeration" => match value {
            Value::Bool(false) => return Ok(None),
            Value::Object(fields) => Edit::ContentModeration(ModerationEdit {
                min_confidence: optional_number(fields.get("minConfidence"), "minConfidence")?,
                blur: optional_number(fields.get("blur"), "blur")?,
                moderation_labels: match fields.get("moderationLabels") {
                    Some(Value::Array(labels)) => Some(
                        labels
                            .iter()
                            .filter_map(|l| l.as_str().map(str::to_string))
                            .collect(),
                    ),
                    _ => None,
                },
            }),
            _ => Edit::ContentModeration(ModerationEdit::default()),
        },
        "animated" => Edit::Animated(truthy(value)),
        other => match other.parse::<ImageFormat>() {
            Ok(format) if other == format.as_str() => {
                Edit::FormatOptions(format, format_options(value)?)
            }
            _ => return Ok(None),
        },
    };
    Ok(Some(edit))
}

fn resize(value: &Value) -> Result<ResizeEdit, ImageHandlerError> {
    let fields = object(value, "resize")?;
    Ok(ResizeEdit {
        width: optional_number(fields.get("width"), "width")?,
        height: optional_number(fields.get("height"), "height")?,
        fit: match fields.get("fit") {
            Some(Value::String(fit)) => Some(
                fit.parse::<FitMode>()
                    .map_err(|e| ImageHandlerError::invalid_edit(PARSE_CODE, e))?,
            ),
            _ => None,
        },
        background: fields.get("background").map(color).transpose()?,
        without_enlargement: fields.get("withoutEnlargement").map(truthy),
        ratio: optional_number(fields.get("ratio"), "ratio")?,
    })
}

/// Median window side; the window is sorted once per pixel
fn median_size(size: f64) -> Result<u32, ImageHandlerError> {
    if (1.0..=MAX_MEDIAN_SIZE as f64).contains(&size) {
        Ok(size as u32)
    } else {
        Err(ImageHandlerError::invalid_edit(
            PARSE_CODE,
            format!("Median size must be between 1 and {}", MAX_MEDIAN_SIZE),
        ))
    }
}

fn convolve(value: &Value) -> Result<ConvolveEdit, ImageHandlerError> {
    let fields = object(value, "convolve")?;
    let kernel = match fields.get("kernel") {
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| number(v, "kernel"))
            .collect::<Result<Vec<f64>, _>>()?,
        _ => return Err(malformed("convolve.kernel")),
    };
    let dimension = |name: &str| -> Result<usize, ImageHandlerError> {
        usize::try_from(integer(value, name)?)
            .ok()
            .filter(|side| *side > 0)
            .ok_or_else(|| malformed(&format!("convolve.{}", name)))
    };
    let (width, height) = (dimension("width")?, dimension("height")?);
    if width.checked_mul(height) != Some(kernel.len()) {
        return Err(ImageHandlerError::invalid_edit(
            PARSE_CODE,
            format!(
                "Convolution kernel has {} values but is {}x{}",
                kernel.len(),
                width,
                height
            ),
        ));
    }
    Ok(ConvolveEdit {
        width,
        height,
        kernel,
        scale: optional_number(fields.get("scale"), "scale")?,
        offset: optional_number(fields.get("offset"), "offset")?,
    })
}

fn tint(value: &Value) -> Result<TintEdit, ImageHandlerError> {
    match value {
        Value::String(_) => {
            let c = color(value)?;
            Ok(TintEdit {
                r: c.r as f64,
                g: c.g as f64,
                b: c.b as f64,
            })
        }
        _ => {
            let fields = object(value, "tint")?;
            Ok(TintEdit {
                r: optional_number(fields.get("r"), "r")?.unwrap_or(0.0),
                g: optional_number(fields.get("g"), "g")?.unwrap_or(0.0),
                b: optional_number(fields.get("b"), "b")?.unwrap_or(0.0),
            })
        }
    }
}

fn overlay(value: &Value) -> Result<OverlayEdit, ImageHandlerError> {
    let fields = object(value, "overlayWith")?;
    let options = match fields.get("options") {
        Some(Value::Object(options)) => OverlayPlacement {
            left: options.get("left").and_then(loose_string),
            top: options.get("top").and_then(loose_string),
        },
        _ => OverlayPlacement::default(),
    };
    Ok(OverlayEdit {
        bucket: fields
            .get("bucket")
            .and_then(loose_string)
            .ok_or_else(|| malformed("overlayWith.bucket"))?,
        key: fields
            .get("key")
            .and_then(loose_string)
            .ok_or_else(|| malformed("overlayWith.key"))?,
        alpha: fields.get("alpha").and_then(loose_string),
        w_ratio: fields.get("wRatio").and_then(loose_string),
        h_ratio: fields.get("hRatio").and_then(loose_string),
        options,
    })
}

fn format_options(value: &Value) -> Result<FormatOptions, ImageHandlerError> {
    match value {
        Value::Object(fields) => Ok(FormatOptions {
            quality: optional_number(fields.get("quality"), "quality")?,
            progressive: fields.get("progressive").map(truthy),
            effort: optional_number(fields.get("effort"), "effort")?,
            lossless: fields.get("lossless").map(truthy),
        }),
        _ => Ok(FormatOptions::default()),
    }
}

fn format_name(value: &Value) -> Result<ImageFormat, ImageHandlerError> {
    value
        .as_str()
        .ok_or_else(|| malformed("toFormat"))?
        .parse::<ImageFormat>()
        .map_err(|e| ImageHandlerError::invalid_edit(PARSE_CODE, e))
}

/// A color given as `{r, g, b, alpha}` or as a hex/named string
pub(crate) fn color(value: &Value) -> Result<Rgba, ImageHandlerError> {
    match value {
        Value::String(s) => s
            .parse::<Rgba>()
            .map_err(|e| ImageHandlerError::invalid_edit(PARSE_CODE, e)),
        Value::Object(fields) => {
            let channel = |name: &str| -> Result<u8, ImageHandlerError> {
                Ok(optional_number(fields.get(name), name)?
                    .unwrap_or(0.0)
                    .clamp(0.0, 255.0) as u8)
            };
            Ok(Rgba {
                r: channel("r")?,
                g: channel("g")?,
                b: channel("b")?,
                alpha: optional_number(fields.get("alpha"), "alpha")?
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0),
            })
        }
        _ => Err(malformed("color")),
    }
}

fn object<'a>(value: &'a Value, name: &str) -> Result<&'a Map<String, Value>, ImageHandlerError> {
    value.as_object().ok_or_else(|| malformed(name))
}

fn number(value: &Value, name: &str) -> Result<f64, ImageHandlerError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| malformed(name)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| malformed(name)),
        _ => Err(malformed(name)),
    }
}

fn optional_number(value: Option<&Value>, name: &str) -> Result<Option<f64>, ImageHandlerError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v, name).map(Some),
    }
}

fn integer(value: &Value, field: &str) -> Result<i64, ImageHandlerError> {
    let fields = object(value, field)?;
    match fields.get(field) {
        Some(v) => Ok(number(v, field)?.round() as i64),
        None => Err(malformed(field)),
    }
}

/// JavaScript-style truthiness for switch-like edits
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strings stay as written; numbers are rendered without a trailing `.0`
fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn malformed(field: &str) -> ImageHandlerError {
    ImageHandlerError::invalid_edit(PARSE_CODE, format!("The edit value for {} is malformed", field))
}
