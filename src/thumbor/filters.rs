//! Legacy filter semantics table
//!
//! Each `filters:name(args)` token maps to one [`FilterRule`]. A rule
//! reads the edits accumulated so far (stretch looks at the fit mode,
//! quality looks at `toFormat`) and returns a fragment that the mapper
//! merges in. Unknown filter names are ignored.

use crate::edits::{
    ConvolveEdit, Edit, EditSet, FitMode, FormatOptions, OverlayEdit, OverlayPlacement,
    ResizeEdit, Rgba, SharpenEdit, TintEdit,
};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use regex::Regex;
use std::sync::OnceLock;

/// One parsed `filters:name(args)` token
#[derive(Debug, Clone, Copy)]
pub struct FilterCall<'a> {
    pub name: &'a str,
    pub args: &'a str,
    /// Format named by the path's file extension, if it names one
    pub file_format: Option<ImageFormat>,
}

pub type FilterParser = fn(&FilterCall<'_>, &EditSet) -> Result<EditSet, ImageHandlerError>;

/// Static, read-only table entry
pub struct FilterRule {
    pub name: &'static str,
    pub parse: FilterParser,
}

/// Filters understood by the legacy grammar
pub static FILTER_RULES: &[FilterRule] = &[
    FilterRule { name: "autojpg", parse: autojpg },
    FilterRule { name: "background_color", parse: background_color },
    FilterRule { name: "blur", parse: blur },
    FilterRule { name: "convolution", parse: convolution },
    FilterRule { name: "equalize", parse: equalize },
    FilterRule { name: "fill", parse: fill },
    FilterRule { name: "format", parse: format },
    FilterRule { name: "grayscale", parse: grayscale },
    FilterRule { name: "no_upscale", parse: no_upscale },
    FilterRule { name: "proportion", parse: proportion },
    FilterRule { name: "quality", parse: quality },
    FilterRule { name: "rgb", parse: rgb },
    FilterRule { name: "rotate", parse: rotate },
    FilterRule { name: "sharpen", parse: sharpen },
    FilterRule { name: "stretch", parse: stretch },
    FilterRule { name: "strip_exif", parse: strip_metadata },
    FilterRule { name: "strip_icc", parse: strip_metadata },
    FilterRule { name: "upscale", parse: upscale },
    FilterRule { name: "watermark", parse: watermark },
];

pub fn find_rule(name: &str) -> Option<&'static FilterRule> {
    FILTER_RULES.iter().find(|rule| rule.name == name)
}

/// Formats the `format` filter accepts
const FORMAT_FILTER_VALUES: [ImageFormat; 7] = [
    ImageFormat::Heic,
    ImageFormat::Heif,
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Raw,
    ImageFormat::Tiff,
    ImageFormat::Webp,
];

/// Formats a `quality` filter may target
const QUALITY_FILTER_TARGETS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Webp,
    ImageFormat::Tiff,
    ImageFormat::Heif,
];

const FILTER_CODE: &str = "ThumborMapping::InvalidFilter";

static POSITION_PATTERN: OnceLock<Regex> = OnceLock::new();

/// `Np` overlay positions, N in -100..=100
fn position_pattern() -> &'static Regex {
    POSITION_PATTERN.get_or_init(|| {
        Regex::new(r"^(100|[1-9]?\d|-(100|[1-9]\d?))p$")
            .expect("Invalid position regex - this is a compile-time bug")
    })
}

fn single(edit: Edit) -> EditSet {
    EditSet::from_iter([edit])
}

fn resize_fragment(resize: ResizeEdit) -> EditSet {
    single(Edit::Resize(resize))
}

fn number(call: &FilterCall<'_>, value: &str) -> Result<f64, ImageHandlerError> {
    value.trim().parse::<f64>().map_err(|_| {
        ImageHandlerError::invalid_edit(
            FILTER_CODE,
            format!("Filter {} received a non-numeric value: \"{}\"", call.name, value),
        )
    })
}

fn color(call: &FilterCall<'_>) -> Result<Rgba, ImageHandlerError> {
    Rgba::from_legacy_arg(call.args.trim()).map_err(|e| {
        ImageHandlerError::invalid_edit(FILTER_CODE, format!("Filter {}: {}", call.name, e))
    })
}

fn autojpg(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::ToFormat(ImageFormat::Jpeg)))
}

fn background_color(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::Flatten(color(call)?)))
}

/// `blur(radius[,sigma])`: sigma when numeric, else radius / 2
fn blur(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let mut parts = call.args.split(',');
    let radius = parts.next().unwrap_or("");
    let sigma = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
    let amount = match sigma {
        Some(sigma) => sigma,
        None => number(call, radius)? / 2.0,
    };
    Ok(single(Edit::Blur(Some(amount))))
}

/// `convolution(k1;k2;...;kn,width,normalize)`
fn convolution(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let mut parts = call.args.split(',');
    let kernel = parts
        .next()
        .unwrap_or("")
        .split(';')
        .map(|v| number(call, v))
        .collect::<Result<Vec<f64>, _>>()?;
    let width = number(call, parts.next().unwrap_or(""))?;
    if width < 1.0 {
        return Err(ImageHandlerError::invalid_edit(
            FILTER_CODE,
            "Convolution matrix width must be at least 1",
        ));
    }
    let width = width as usize;
    let height = kernel.len().div_ceil(width);
    Ok(single(Edit::Convolve(ConvolveEdit {
        width,
        height,
        kernel,
        scale: None,
        offset: None,
    })))
}

fn equalize(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::Normalize(true)))
}

fn fill(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(resize_fragment(ResizeEdit {
        fit: Some(FitMode::Contain),
        background: Some(color(call)?),
        ..Default::default()
    }))
}

/// `format(name)`: `jpg` is `jpeg`; names outside the accepted set are a no-op
fn format(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let name: String = call
        .args
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let name = if name == "jpg" { "jpeg".to_string() } else { name };
    match name.parse::<ImageFormat>() {
        Ok(format) if FORMAT_FILTER_VALUES.contains(&format) => Ok(single(Edit::ToFormat(format))),
        _ => {
            tracing::debug!(format = %call.args, "Ignoring unsupported format filter");
            Ok(EditSet::new())
        }
    }
}

fn grayscale(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::Grayscale(true)))
}

fn no_upscale(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(resize_fragment(ResizeEdit {
        without_enlargement: Some(true),
        ..Default::default()
    }))
}

/// `proportion(ratio)`: scales an explicit size now, otherwise defers to
/// the executor through `resize.ratio`
fn proportion(call: &FilterCall<'_>, edits: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let ratio = number(call, call.args)?;
    let fragment = match edits.resize() {
        Some(ResizeEdit {
            width: Some(w),
            height: Some(h),
            ..
        }) if *w != 0.0 && *h != 0.0 => ResizeEdit {
            width: Some(w * ratio),
            height: Some(h * ratio),
            ..Default::default()
        },
        _ => ResizeEdit {
            ratio: Some(ratio),
            ..Default::default()
        },
    };
    Ok(resize_fragment(fragment))
}

/// `quality(n)`: targets the file-extension format when it supports a
/// quality, otherwise the format chosen by an earlier `format` filter
fn quality(call: &FilterCall<'_>, edits: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let supported = |f: Option<ImageFormat>| f.filter(|f| QUALITY_FILTER_TARGETS.contains(f));
    let target = supported(call.file_format).or_else(|| supported(edits.to_format()));
    match target {
        Some(format) => Ok(single(Edit::FormatOptions(
            format,
            FormatOptions::with_quality(number(call, call.args)?),
        ))),
        None => Ok(EditSet::new()),
    }
}

/// `rgb(r,g,b)`: percentages scaled onto 0..=255
fn rgb(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let values = call
        .args
        .split(',')
        .map(|p| number(call, p).map(|v| 255.0 * (v / 100.0)))
        .collect::<Result<Vec<f64>, _>>()?;
    if values.len() != 3 {
        return Err(ImageHandlerError::invalid_edit(
            FILTER_CODE,
            "rgb filter expects three percentages",
        ));
    }
    Ok(single(Edit::Tint(TintEdit {
        r: values[0],
        g: values[1],
        b: values[2],
    })))
}

fn rotate(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::Rotate(Some(number(call, call.args)?))))
}

/// `sharpen(amount,radius[,luminance_only])`: sigma = 1 + radius / 2
fn sharpen(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let radius = call.args.split(',').nth(1).unwrap_or("");
    Ok(single(Edit::Sharpen(SharpenEdit {
        sigma: Some(1.0 + number(call, radius)? / 2.0),
        ..Default::default()
    })))
}

/// Fill unless fit-in already asked for inside
fn stretch(_: &FilterCall<'_>, edits: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let fit = edits.resize().and_then(|r| r.fit);
    if fit == Some(FitMode::Inside) {
        return Ok(resize_fragment(ResizeEdit::default()));
    }
    Ok(resize_fragment(ResizeEdit {
        fit: Some(FitMode::Fill),
        ..Default::default()
    }))
}

fn strip_metadata(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(single(Edit::Rotate(None)))
}

fn upscale(_: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    Ok(resize_fragment(ResizeEdit {
        fit: Some(FitMode::Inside),
        ..Default::default()
    }))
}

/// `watermark(bucket,key,x,y,alpha[,wRatio,hRatio])`
///
/// Positions are kept as written when numeric or `Np`; anything else is
/// left out of the placement.
fn watermark(call: &FilterCall<'_>, _: &EditSet) -> Result<EditSet, ImageHandlerError> {
    let compact: String = call.args.chars().filter(|c| !c.is_whitespace()).collect();
    let parts: Vec<&str> = compact.split(',').collect();
    let part = |i: usize| parts.get(i).map(|s| s.to_string());

    let valid_position = |value: &Option<String>| {
        value
            .as_deref()
            .is_some_and(|v| position_pattern().is_match(v) || v.parse::<f64>().is_ok())
    };

    let (x, y) = (part(2), part(3));
    let options = OverlayPlacement {
        left: if valid_position(&x) { x } else { None },
        top: if valid_position(&y) { y } else { None },
    };

    Ok(single(Edit::OverlayWith(OverlayEdit {
        bucket: part(0).unwrap_or_default(),
        key: part(1).unwrap_or_default(),
        alpha: part(4),
        w_ratio: part(5),
        h_ratio: part(6),
        options,
    })))
}
