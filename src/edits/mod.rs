//! Canonical edit model
//!
//! Every dialect resolves into an [`EditSet`]: an insertion-ordered
//! collection of [`Edit`] values with at most one value per [`EditKey`].
//! Replacing an edit keeps its position; removing it shifts later edits
//! forward.
//!
//! # Merge semantics
//!
//! [`EditSet::merge`] folds a later fragment into an earlier one. Scalar
//! edits are replaced, structured edits (resize, overlay, per-format
//! options, moderation) are merged field by field with the later value
//! winning, and list fields (moderation labels) are unioned.

pub mod color;
mod json;

pub use color::Rgba;

use crate::format::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// Resize behavior governing aspect-ratio handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitMode {
    /// Crop to cover both dimensions
    Cover,
    /// Letterbox inside both dimensions
    Contain,
    /// Stretch to exactly the requested dimensions
    Fill,
    /// Scale down to fit within both dimensions
    Inside,
    /// Scale so both dimensions are at least the requested ones
    Outside,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Cover => "cover",
            FitMode::Contain => "contain",
            FitMode::Fill => "fill",
            FitMode::Inside => "inside",
            FitMode::Outside => "outside",
        }
    }
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            "fill" => Ok(FitMode::Fill),
            "inside" => Ok(FitMode::Inside),
            "outside" => Ok(FitMode::Outside),
            _ => Err(format!("Unknown fit mode: {}", s)),
        }
    }
}

/// Resize parameters; `None` dimensions are derived from the aspect ratio
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResizeEdit {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fit: Option<FitMode>,
    pub background: Option<Rgba>,
    pub without_enlargement: Option<bool>,
    /// Scale factor applied to the explicit or current size before resizing
    pub ratio: Option<f64>,
}

impl ResizeEdit {
    fn merge(self, later: ResizeEdit) -> ResizeEdit {
        ResizeEdit {
            width: later.width.or(self.width),
            height: later.height.or(self.height),
            fit: later.fit.or(self.fit),
            background: later.background.or(self.background),
            without_enlargement: later.without_enlargement.or(self.without_enlargement),
            ratio: later.ratio.or(self.ratio),
        }
    }
}

/// Absolute crop region; may be out of bounds until validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropEdit {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharpenEdit {
    pub sigma: Option<f64>,
    pub flat: Option<f64>,
    pub jagged: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvolveEdit {
    pub width: usize,
    pub height: usize,
    pub kernel: Vec<f64>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TintEdit {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// Per-format encoder options (`jpeg: {quality: 80}`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatOptions {
    pub quality: Option<f64>,
    pub progressive: Option<bool>,
    pub effort: Option<f64>,
    pub lossless: Option<bool>,
}

impl FormatOptions {
    pub fn with_quality(quality: f64) -> Self {
        Self {
            quality: Some(quality),
            ..Default::default()
        }
    }

    fn merge(self, later: FormatOptions) -> FormatOptions {
        FormatOptions {
            quality: later.quality.or(self.quality),
            progressive: later.progressive.or(self.progressive),
            effort: later.effort.or(self.effort),
            lossless: later.lossless.or(self.lossless),
        }
    }
}

/// Overlay placement; values stay as written (`"50p"`, `"-10"`) until the
/// base and overlay dimensions are known
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPlacement {
    pub left: Option<String>,
    pub top: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayEdit {
    pub bucket: String,
    pub key: String,
    pub alpha: Option<String>,
    pub w_ratio: Option<String>,
    pub h_ratio: Option<String>,
    pub options: OverlayPlacement,
}

impl OverlayEdit {
    fn merge(self, later: OverlayEdit) -> OverlayEdit {
        OverlayEdit {
            bucket: later.bucket,
            key: later.key,
            alpha: later.alpha.or(self.alpha),
            w_ratio: later.w_ratio.or(self.w_ratio),
            h_ratio: later.h_ratio.or(self.h_ratio),
            options: OverlayPlacement {
                left: later.options.left.or(self.options.left),
                top: later.options.top.or(self.options.top),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmartCropEdit {
    pub face_index: Option<usize>,
    pub padding: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundCropEdit {
    pub top: Option<f64>,
    pub left: Option<f64>,
    pub rx: Option<f64>,
    pub ry: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationEdit {
    pub min_confidence: Option<f64>,
    pub blur: Option<f64>,
    pub moderation_labels: Option<Vec<String>>,
}

impl ModerationEdit {
    fn merge(self, later: ModerationEdit) -> ModerationEdit {
        let moderation_labels = match (self.moderation_labels, later.moderation_labels) {
            (Some(mut earlier), Some(more)) => {
                for label in more {
                    if !earlier.contains(&label) {
                        earlier.push(label);
                    }
                }
                Some(earlier)
            }
            (earlier, more) => more.or(earlier),
        };
        ModerationEdit {
            min_confidence: later.min_confidence.or(self.min_confidence),
            blur: later.blur.or(self.blur),
            moderation_labels,
        }
    }
}

/// Identity of an edit within an [`EditSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKey {
    Resize,
    Crop,
    Rotate,
    Flip,
    Flop,
    Sharpen,
    Median,
    Blur,
    Flatten,
    Gamma,
    Negate,
    Normalize,
    Convolve,
    Threshold,
    Tint,
    Grayscale,
    ToFormat,
    FormatOptions(ImageFormat),
    OverlayWith,
    SmartCrop,
    RoundCrop,
    ContentModeration,
    Animated,
}

impl EditKey {
    /// The field name used by the opaque dialect
    pub fn name(&self) -> &'static str {
        match self {
            EditKey::Resize => "resize",
            EditKey::Crop => "crop",
            EditKey::Rotate => "rotate",
            EditKey::Flip => "flip",
            EditKey::Flop => "flop",
            EditKey::Sharpen => "sharpen",
            EditKey::Median => "median",
            EditKey::Blur => "blur",
            EditKey::Flatten => "flatten",
            EditKey::Gamma => "gamma",
            EditKey::Negate => "negate",
            EditKey::Normalize => "normalize",
            EditKey::Convolve => "convolve",
            EditKey::Threshold => "threshold",
            EditKey::Tint => "tint",
            EditKey::Grayscale => "grayscale",
            EditKey::ToFormat => "toFormat",
            EditKey::FormatOptions(format) => format.as_str(),
            EditKey::OverlayWith => "overlayWith",
            EditKey::SmartCrop => "smartCrop",
            EditKey::RoundCrop => "roundCrop",
            EditKey::ContentModeration => "contentModeration",
            EditKey::Animated => "animated",
        }
    }
}

impl fmt::Display for EditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One canonical edit operation with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Resize(ResizeEdit),
    Crop(CropEdit),
    /// `None` disables orientation handling (the legacy strip filters)
    Rotate(Option<f64>),
    Flip(bool),
    Flop(bool),
    Sharpen(SharpenEdit),
    Median(u32),
    /// `None` is a mild fixed blur
    Blur(Option<f64>),
    Flatten(Rgba),
    Gamma(f64),
    Negate(bool),
    Normalize(bool),
    Convolve(ConvolveEdit),
    Threshold(u8),
    Tint(TintEdit),
    Grayscale(bool),
    ToFormat(ImageFormat),
    FormatOptions(ImageFormat, FormatOptions),
    OverlayWith(OverlayEdit),
    SmartCrop(SmartCropEdit),
    RoundCrop(RoundCropEdit),
    ContentModeration(ModerationEdit),
    Animated(bool),
}

impl Edit {
    pub fn key(&self) -> EditKey {
        match self {
            Edit::Resize(_) => EditKey::Resize,
            Edit::Crop(_) => EditKey::Crop,
            Edit::Rotate(_) => EditKey::Rotate,
            Edit::Flip(_) => EditKey::Flip,
            Edit::Flop(_) => EditKey::Flop,
            Edit::Sharpen(_) => EditKey::Sharpen,
            Edit::Median(_) => EditKey::Median,
            Edit::Blur(_) => EditKey::Blur,
            Edit::Flatten(_) => EditKey::Flatten,
            Edit::Gamma(_) => EditKey::Gamma,
            Edit::Negate(_) => EditKey::Negate,
            Edit::Normalize(_) => EditKey::Normalize,
            Edit::Convolve(_) => EditKey::Convolve,
            Edit::Threshold(_) => EditKey::Threshold,
            Edit::Tint(_) => EditKey::Tint,
            Edit::Grayscale(_) => EditKey::Grayscale,
            Edit::ToFormat(_) => EditKey::ToFormat,
            Edit::FormatOptions(format, _) => EditKey::FormatOptions(*format),
            Edit::OverlayWith(_) => EditKey::OverlayWith,
            Edit::SmartCrop(_) => EditKey::SmartCrop,
            Edit::RoundCrop(_) => EditKey::RoundCrop,
            Edit::ContentModeration(_) => EditKey::ContentModeration,
            Edit::Animated(_) => EditKey::Animated,
        }
    }

    /// Fold a later edit with the same key into this one
    fn merge(self, later: Edit) -> Edit {
        match (self, later) {
            (Edit::Resize(a), Edit::Resize(b)) => Edit::Resize(a.merge(b)),
            (Edit::OverlayWith(a), Edit::OverlayWith(b)) => Edit::OverlayWith(a.merge(b)),
            (Edit::FormatOptions(fa, a), Edit::FormatOptions(fb, b)) if fa == fb => {
                Edit::FormatOptions(fa, a.merge(b))
            }
            (Edit::ContentModeration(a), Edit::ContentModeration(b)) => {
                Edit::ContentModeration(a.merge(b))
            }
            (_, later) => later,
        }
    }
}

/// Ordered edit collection with one value per key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = EditKey> + '_ {
        self.edits.iter().map(Edit::key)
    }

    pub fn contains(&self, key: EditKey) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: EditKey) -> Option<&Edit> {
        self.position(key).map(|i| &self.edits[i])
    }

    pub fn get_mut(&mut self, key: EditKey) -> Option<&mut Edit> {
        match self.position(key) {
            Some(i) => Some(&mut self.edits[i]),
            None => None,
        }
    }

    /// Insert or replace; a replaced edit keeps its original position
    pub fn insert(&mut self, edit: Edit) -> Option<Edit> {
        match self.position(edit.key()) {
            Some(i) => Some(std::mem::replace(&mut self.edits[i], edit)),
            None => {
                self.edits.push(edit);
                None
            }
        }
    }

    pub fn remove(&mut self, key: EditKey) -> Option<Edit> {
        self.position(key).map(|i| self.edits.remove(i))
    }

    /// Fold a later fragment into this set
    pub fn merge(mut self, later: EditSet) -> EditSet {
        for edit in later.edits {
            match self.position(edit.key()) {
                Some(i) => {
                    let earlier = std::mem::replace(&mut self.edits[i], Edit::Animated(false));
                    self.edits[i] = earlier.merge(edit);
                }
                None => self.edits.push(edit),
            }
        }
        self
    }

    pub fn resize(&self) -> Option<&ResizeEdit> {
        match self.get(EditKey::Resize) {
            Some(Edit::Resize(resize)) => Some(resize),
            _ => None,
        }
    }

    /// Resize edit, inserted empty if absent
    pub fn resize_mut(&mut self) -> &mut ResizeEdit {
        let index = match self.position(EditKey::Resize) {
            Some(i) => i,
            None => {
                self.edits.push(Edit::Resize(ResizeEdit::default()));
                self.edits.len() - 1
            }
        };
        match &mut self.edits[index] {
            Edit::Resize(resize) => resize,
            _ => unreachable!("position() matched a non-resize edit for EditKey::Resize"),
        }
    }

    pub fn to_format(&self) -> Option<ImageFormat> {
        match self.get(EditKey::ToFormat) {
            Some(Edit::ToFormat(format)) => Some(*format),
            _ => None,
        }
    }

    pub fn animated(&self) -> Option<bool> {
        match self.get(EditKey::Animated) {
            Some(Edit::Animated(animated)) => Some(*animated),
            _ => None,
        }
    }

    /// `rotate: null`: keep the pixels as stored, ignoring orientation metadata
    pub fn orientation_disabled(&self) -> bool {
        matches!(self.get(EditKey::Rotate), Some(Edit::Rotate(None)))
    }

    /// Per-format option keys that carry a reconcilable quality, in order
    pub fn quality_keys(&self) -> Vec<ImageFormat> {
        self.edits
            .iter()
            .filter_map(|edit| match edit {
                Edit::FormatOptions(format, _) if format.is_quality_format() => Some(*format),
                _ => None,
            })
            .collect()
    }

    pub fn format_options(&self, format: ImageFormat) -> Option<&FormatOptions> {
        match self.get(EditKey::FormatOptions(format)) {
            Some(Edit::FormatOptions(_, options)) => Some(options),
            _ => None,
        }
    }

    fn position(&self, key: EditKey) -> Option<usize> {
        self.edits.iter().position(|edit| edit.key() == key)
    }
}

impl FromIterator<Edit> for EditSet {
    fn from_iter<I: IntoIterator<Item = Edit>>(iter: I) -> Self {
        let mut set = EditSet::new();
        for edit in iter {
            set.insert(edit);
        }
        set
    }
}

impl IntoIterator for EditSet {
    type Item = Edit;
    type IntoIter = std::vec::IntoIter<Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.into_iter()
    }
}

impl<'a> IntoIterator for &'a EditSet {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

/// Leading integer of a parameter, read the way URL parameters are read
/// elsewhere: optional sign, then digits up to the first non-digit
pub fn parse_int_prefix(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_prefix_stops_at_non_digit() {
        assert_eq!(parse_int_prefix("12abc"), Some(12));
        assert_eq!(parse_int_prefix("-7.5"), Some(-7));
        assert_eq!(parse_int_prefix(""), None);
        assert_eq!(parse_int_prefix("x1"), None);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut edits = EditSet::new();
        edits.insert(Edit::Grayscale(true));
        edits.insert(Edit::Rotate(Some(90.0)));
        edits.insert(Edit::Grayscale(false));

        let keys: Vec<EditKey> = edits.keys().collect();
        assert_eq!(keys, vec![EditKey::Grayscale, EditKey::Rotate]);
        assert_eq!(edits.get(EditKey::Grayscale), Some(&Edit::Grayscale(false)));
    }

    #[test]
    fn test_remove_shifts() {
        let mut edits: EditSet = vec![Edit::Flip(true), Edit::Flop(true), Edit::Negate(true)]
            .into_iter()
            .collect();
        edits.remove(EditKey::Flop);
        let keys: Vec<EditKey> = edits.keys().collect();
        assert_eq!(keys, vec![EditKey::Flip, EditKey::Negate]);
    }

    #[test]
    fn test_merge_resize_deep() {
        let earlier: EditSet = vec![Edit::Resize(ResizeEdit {
            width: Some(100.0),
            height: None,
            fit: Some(FitMode::Cover),
            ..Default::default()
        })]
        .into_iter()
        .collect();
        let later: EditSet = vec![Edit::Resize(ResizeEdit {
            fit: Some(FitMode::Inside),
            ..Default::default()
        })]
        .into_iter()
        .collect();

        let merged = earlier.merge(later);
        let resize = merged.resize().unwrap();
        assert_eq!(resize.width, Some(100.0));
        assert_eq!(resize.fit, Some(FitMode::Inside));
    }

    #[test]
    fn test_merge_moderation_unions_labels() {
        let a = ModerationEdit {
            moderation_labels: Some(vec!["Nudity".into(), "Violence".into()]),
            ..Default::default()
        };
        let b = ModerationEdit {
            moderation_labels: Some(vec!["Violence".into(), "Drugs".into()]),
            blur: Some(20.0),
            ..Default::default()
        };
        let merged = EditSet::from_iter([Edit::ContentModeration(a)])
            .merge(EditSet::from_iter([Edit::ContentModeration(b)]));
        match merged.get(EditKey::ContentModeration) {
            Some(Edit::ContentModeration(m)) => {
                assert_eq!(
                    m.moderation_labels.as_deref(),
                    Some(&["Nudity".to_string(), "Violence".into(), "Drugs".into()][..])
                );
                assert_eq!(m.blur, Some(20.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_scalar_replaces() {
        let merged = EditSet::from_iter([Edit::Rotate(Some(90.0))])
            .merge(EditSet::from_iter([Edit::Rotate(None)]));
        assert!(merged.orientation_disabled());
    }

    #[test]
    fn test_resize_mut_inserts_default() {
        let mut edits = EditSet::new();
        edits.resize_mut().fit = Some(FitMode::Inside);
        assert_eq!(edits.resize().unwrap().fit, Some(FitMode::Inside));
        assert_eq!(edits.len(), 1);
    }

    #[test]
    fn test_quality_keys_in_order() {
        let edits = EditSet::from_iter([
            Edit::FormatOptions(ImageFormat::Png, FormatOptions::with_quality(50.0)),
            Edit::Grayscale(true),
            Edit::FormatOptions(ImageFormat::Heic, FormatOptions::with_quality(10.0)),
            Edit::FormatOptions(ImageFormat::Jpeg, FormatOptions::with_quality(70.0)),
        ]);
        assert_eq!(
            edits.quality_keys(),
            vec![ImageFormat::Png, ImageFormat::Jpeg]
        );
    }

    #[test]
    fn test_fit_mode_parse() {
        assert_eq!("inside".parse::<FitMode>().unwrap(), FitMode::Inside);
        assert!("stretch".parse::<FitMode>().is_err());
    }
}
