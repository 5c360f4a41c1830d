//! Source bucket allow-list and legacy-path key extraction

use crate::error::ImageHandlerError;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

static CROP_SEGMENT: OnceLock<Regex> = OnceLock::new();
static RESIZE_SEGMENT: OnceLock<Regex> = OnceLock::new();
static WATERMARK_FILTER: OnceLock<Regex> = OnceLock::new();
static FILTER_RUN: OnceLock<Regex> = OnceLock::new();
static FIT_IN_SEGMENT: OnceLock<Regex> = OnceLock::new();

fn crop_segment() -> &'static Regex {
    CROP_SEGMENT.get_or_init(|| {
        Regex::new(r"/\d+x\d+:\d+x\d+/").expect("Invalid crop regex - this is a compile-time bug")
    })
}

fn resize_segment() -> &'static Regex {
    RESIZE_SEGMENT.get_or_init(|| {
        Regex::new(r"/\d+x\d+/").expect("Invalid resize regex - this is a compile-time bug")
    })
}

fn watermark_filter() -> &'static Regex {
    WATERMARK_FILTER.get_or_init(|| {
        Regex::new(r"filters:watermark\(.*\)")
            .expect("Invalid watermark regex - this is a compile-time bug")
    })
}

fn filter_run() -> &'static Regex {
    FILTER_RUN.get_or_init(|| {
        Regex::new(r"filters:[^/]+").expect("Invalid filter regex - this is a compile-time bug")
    })
}

fn fit_in_segment() -> &'static Regex {
    FIT_IN_SEGMENT.get_or_init(|| {
        Regex::new(r"/fit-in/").expect("Invalid fit-in regex - this is a compile-time bug")
    })
}

/// Buckets that requests may read from; the first one is the default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBuckets(Vec<String>);

impl SourceBuckets {
    pub fn new(buckets: Vec<String>) -> Self {
        Self(buckets.into_iter().filter(|b| !b.is_empty()).collect())
    }

    /// Parse the comma-separated form; whitespace anywhere is ignored
    pub fn parse(value: &str) -> Self {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        Self::new(compact.split(',').map(str::to_string).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, bucket: &str) -> bool {
        self.0.iter().any(|b| b == bucket)
    }

    pub fn default_bucket(&self) -> Result<&str, ImageHandlerError> {
        self.0
            .first()
            .map(String::as_str)
            .ok_or(ImageHandlerError::NoSourceBuckets)
    }

    /// Bucket named by an opaque record, which must be on the list
    pub fn resolve_opaque(&self, requested: Option<&str>) -> Result<String, ImageHandlerError> {
        let default = self.default_bucket()?;
        match requested {
            None => Ok(default.to_string()),
            Some(bucket) if self.contains(bucket) => Ok(bucket.to_string()),
            Some(bucket) => Err(ImageHandlerError::SourceNotAllowed {
                bucket: bucket.to_string(),
            }),
        }
    }

    /// Bucket for a path-grammar request: an allowed `s3:<bucket>` segment
    /// overrides the default
    pub fn resolve_path(&self, path: &str) -> Result<String, ImageHandlerError> {
        let default = self.default_bucket()?;
        let chosen = path
            .split('/')
            .filter_map(|segment| segment.strip_prefix("s3:"))
            .find(|bucket| self.contains(bucket));
        if let Some(bucket) = chosen {
            tracing::debug!(bucket = %bucket, "Bucket override from path");
            return Ok(bucket.to_string());
        }
        Ok(default.to_string())
    }
}

/// Remove every `/<segment>/` match, keeping the trailing slash so adjacent
/// segments are removed too
fn remove_segments(pattern: &Regex, path: String) -> String {
    let mut current = path;
    while let Cow::Owned(next) = pattern.replace_all(&current, "/") {
        current = next;
    }
    current
}

/// Object key of a path-grammar request (after any custom rewrite)
pub fn parse_legacy_key(path: &str, bucket: &str) -> String {
    let path = remove_segments(crop_segment(), path.to_string());
    let path = remove_segments(resize_segment(), path);
    let path = watermark_filter().replacen(&path, 1, "").into_owned();
    let path = filter_run().replace_all(&path, "").into_owned();
    let path = remove_segments(fit_in_segment(), path);
    let path = path.replacen(&format!("s3:{}/", bucket), "", 1);
    let key = path.trim_start_matches('/');

    match urlencoding::decode(key) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            tracing::warn!(key = %key, "Key is not valid percent-encoded UTF-8, using it as is");
            key.to_string()
        }
    }
}
