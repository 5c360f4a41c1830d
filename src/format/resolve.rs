//! Output format resolution
//!
//! Priority, first hit wins:
//! 1. `toFormat` in the edit set
//! 2. WebP when auto-WebP is enabled and the Accept header admits it
//! 3. `outputFormat` from the opaque record
//! 4. none: the source format passes through
//!
//! An SVG source with edits but no `toFormat` is rasterised to PNG.

use super::{accepts, ImageFormat, SVG_CONTENT_TYPE};
use crate::edits::{Edit, EditKey, EditSet};

/// Effort used when the opaque record carries one outside 0..=6
pub const DEFAULT_WEBP_EFFORT: u8 = 4;

/// Inputs to resolution beyond the edit set
#[derive(Debug, Clone, Default)]
pub struct FormatContext<'a> {
    /// Content type of the source object after sniffing
    pub source_content_type: &'a str,
    pub accept: Option<&'a str>,
    /// The request came in through the opaque dialect
    pub opaque: bool,
    /// `outputFormat` of the opaque record
    pub requested: Option<ImageFormat>,
    /// `effort` of the opaque record
    pub effort: Option<f64>,
}

/// Final format decision for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOutput {
    pub format: Option<ImageFormat>,
    /// `image/<format>` when a format was chosen
    pub content_type: Option<String>,
    /// WebP encoder effort, opaque requests only
    pub effort: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatResolver {
    auto_webp: bool,
}

impl OutputFormatResolver {
    pub fn new(auto_webp: bool) -> Self {
        Self { auto_webp }
    }

    pub fn resolve(&self, edits: &EditSet, ctx: &FormatContext<'_>) -> ResolvedOutput {
        let to_format = edits.to_format();
        let is_svg = ctx.source_content_type == SVG_CONTENT_TYPE;

        let mut format = None;
        if is_svg && !edits.is_empty() && to_format.is_none() {
            format = Some(ImageFormat::Png);
        }

        let mut effort = None;
        if !is_svg || to_format.is_some() || format.is_some() {
            let negotiated = if self.auto_webp && accepts(ctx.accept, ImageFormat::Webp) {
                Some(ImageFormat::Webp)
            } else if ctx.opaque {
                ctx.requested
            } else {
                None
            };

            if negotiated == Some(ImageFormat::Webp) && ctx.opaque {
                effort = ctx.effort.map(normalize_effort);
            }

            if let Some(explicit) = to_format {
                format = Some(explicit);
            } else if negotiated.is_some() {
                format = negotiated;
            }
        }

        tracing::debug!(
            format = ?format,
            source = %ctx.source_content_type,
            "Resolved output format"
        );

        ResolvedOutput {
            format,
            content_type: format.map(|f| f.content_type()),
            effort,
        }
    }
}

fn normalize_effort(effort: f64) -> u8 {
    let truncated = effort.trunc();
    if truncated.is_finite() && (0.0..=6.0).contains(&truncated) {
        truncated as u8
    } else {
        DEFAULT_WEBP_EFFORT
    }
}

/// Move a legacy-dialect quality sub-key onto the resolved output format
///
/// When several quality sub-keys are present, the one already named after
/// `output` is kept; otherwise the first one in edit order is moved. All
/// other quality sub-keys are dropped so exactly one remains.
pub fn reconcile_quality(edits: &mut EditSet, output: ImageFormat) {
    if !output.is_quality_format() {
        return;
    }
    let keys = edits.quality_keys();
    let Some(&first) = keys.first() else {
        return;
    };

    let chosen = if keys.contains(&output) { output } else { first };
    for key in keys.iter().filter(|k| **k != chosen) {
        edits.remove(EditKey::FormatOptions(*key));
    }

    if chosen != output {
        if let Some(Edit::FormatOptions(_, options)) = edits.remove(EditKey::FormatOptions(chosen)) {
            edits.insert(Edit::FormatOptions(output, options));
        }
    }
}
