//! Legacy (Thumbor-style) URL grammar
//!
//! `/[fit-in/][<l>x<t>:<r>x<b>/][<w>x<h>/][filters:name(args)/...]<key>`
//!
//! [`map_path_to_edits`] computes crop, resize and fit-in fragments
//! independently, merges them in that order, then applies the filter
//! chain on top.
//!
//! # Filter order
//!
//! Filter tokens are sorted lexicographically before they are applied.
//! `format(...)` therefore always runs before `quality(...)`, so quality
//! can target the format the request asked for regardless of how the
//! caller ordered them. Do not remove the sort.

pub mod filters;
pub mod rewrite;

pub use filters::{find_rule, FilterCall, FilterRule, FILTER_RULES};
pub use rewrite::CustomPathRewriter;

use crate::edits::{CropEdit, Edit, EditSet, FitMode, ResizeEdit};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use regex::Regex;
use std::sync::OnceLock;

static CROP_PATTERN: OnceLock<Regex> = OnceLock::new();
static RESIZE_PATTERN: OnceLock<Regex> = OnceLock::new();
static FILTER_TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();
static FILTER_CALL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn crop_pattern() -> &'static Regex {
    CROP_PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,6})x(\d{1,6}):(\d{1,6})x(\d{1,6})")
            .expect("Invalid crop regex - this is a compile-time bug")
    })
}

fn resize_pattern() -> &'static Regex {
    RESIZE_PATTERN.get_or_init(|| {
        Regex::new(r"/((\d+)x(\d+))/").expect("Invalid resize regex - this is a compile-time bug")
    })
}

fn filter_token_pattern() -> &'static Regex {
    FILTER_TOKEN_PATTERN.get_or_init(|| {
        Regex::new(r"filters:[^)]+").expect("Invalid filter regex - this is a compile-time bug")
    })
}

fn filter_call_pattern() -> &'static Regex {
    FILTER_CALL_PATTERN.get_or_init(|| {
        Regex::new(r":(.+)\((.*)\)").expect("Invalid filter regex - this is a compile-time bug")
    })
}

/// Map a legacy path onto the canonical edit set
pub fn map_path_to_edits(path: &str) -> Result<EditSet, ImageHandlerError> {
    let file_format = file_format(path);

    let mut edits = map_crop(path).merge(map_resize(path)).merge(map_fit_in(path));

    for token in extract_filters(path) {
        edits = map_filter(&token, file_format, edits)?;
    }

    tracing::debug!(path = %path, edits = edits.len(), "Mapped legacy path");
    Ok(edits)
}

/// `<l>x<t>:<r>x<b>` → crop; absent or unparsable bounds emit nothing
pub fn map_crop(path: &str) -> EditSet {
    let Some(caps) = crop_pattern().captures(path) else {
        return EditSet::new();
    };
    let bound = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
    match (bound(1), bound(2), bound(3), bound(4)) {
        (Some(left), Some(top), Some(right), Some(bottom)) => {
            EditSet::from_iter([Edit::Crop(CropEdit {
                left,
                top,
                width: right - left,
                height: bottom - top,
            })])
        }
        _ => EditSet::new(),
    }
}

/// First `/<w>x<h>/` token only; a zero side becomes "derive from aspect
/// ratio" and forces fit inside
pub fn map_resize(path: &str) -> EditSet {
    let Some(caps) = resize_pattern().captures(path) else {
        return EditSet::new();
    };
    let side = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    let (Some(width), Some(height)) = (side(2), side(3)) else {
        return EditSet::new();
    };

    let dimension = |v: u64| if v == 0 { None } else { Some(v as f64) };
    let fit = if width == 0 || height == 0 {
        Some(FitMode::Inside)
    } else {
        None
    };
    EditSet::from_iter([Edit::Resize(ResizeEdit {
        width: dimension(width),
        height: dimension(height),
        fit,
        ..Default::default()
    })])
}

/// `fit-in` anywhere in the path forces fit inside
pub fn map_fit_in(path: &str) -> EditSet {
    if path.contains("fit-in") {
        EditSet::from_iter([Edit::Resize(ResizeEdit {
            fit: Some(FitMode::Inside),
            ..Default::default()
        })])
    } else {
        EditSet::new()
    }
}

/// Every `filters:name(args)` token, sorted
///
/// A token runs to the next `)` rather than the next `/`, so arguments
/// may contain object keys with slashes.
pub fn extract_filters(path: &str) -> Vec<String> {
    let mut tokens: Vec<String> = filter_token_pattern()
        .find_iter(path)
        .map(|m| format!("{})", m.as_str()))
        .collect();
    tokens.sort();
    tokens
}

/// Apply one filter token to the accumulated edits
pub fn map_filter(
    expression: &str,
    file_format: Option<ImageFormat>,
    edits: EditSet,
) -> Result<EditSet, ImageHandlerError> {
    let Some(caps) = filter_call_pattern().captures(expression) else {
        return Ok(edits);
    };
    let (name, args) = match (caps.get(1), caps.get(2)) {
        (Some(name), Some(args)) => (name.as_str(), args.as_str()),
        _ => return Ok(edits),
    };

    let Some(rule) = find_rule(name) else {
        tracing::debug!(filter = %name, "Ignoring unknown filter");
        return Ok(edits);
    };

    let call = FilterCall {
        name,
        args,
        file_format,
    };
    let fragment = (rule.parse)(&call, &edits)?;
    Ok(edits.merge(fragment))
}

/// Format named by the text after the path's last `.`
fn file_format(path: &str) -> Option<ImageFormat> {
    let (_, extension) = path.rsplit_once('.')?;
    extension.parse().ok()
}
