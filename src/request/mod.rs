//! Inbound request resolution
//!
//! Turns `{path, query, accept}` into an [`ImageRequest`]: the source
//! object, its bytes and metadata, the canonical edit set and the output
//! format.
//!
//! # Flow
//!
//! classify → bucket → key → edits → fetch original → response headers →
//! output format → quality reconciliation
//!
//! # Modules
//!
//! - `classify`: dialect detection
//! - `decode`: the opaque base64 record
//! - `source`: bucket allow-list and legacy key extraction
//! - `headers`: deny list for caller-supplied response headers

pub mod classify;
pub mod decode;
pub mod headers;
pub mod source;

pub use classify::{RequestClassifier, RequestType};
pub use decode::OpaqueRequest;
pub use source::{parse_legacy_key, SourceBuckets};

use crate::edits::EditSet;
use crate::error::ImageHandlerError;
use crate::format::sniff::resolve_content_type;
use crate::format::{reconcile_quality, FormatContext, ImageFormat, OutputFormatResolver};
use crate::store::{ObjectStore, StoredObject, DEFAULT_CACHE_CONTROL};
use crate::thumbor::{map_path_to_edits, CustomPathRewriter};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// The request as it reaches the core
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub accept: Option<String>,
}

impl InboundRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }
}

/// A fully resolved image request
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub request_type: RequestType,
    pub bucket: String,
    pub key: String,
    pub edits: EditSet,
    pub output_format: Option<ImageFormat>,
    /// WebP encoder effort from the opaque record
    pub effort: Option<u8>,
    /// Filtered caller-supplied response headers
    pub headers: Option<Vec<(String, String)>>,
    pub original_image: Bytes,
    pub content_type: String,
    pub cache_control: String,
    pub expires: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Builds [`ImageRequest`]s; shared by all requests
pub struct RequestResolver {
    classifier: RequestClassifier,
    rewriter: Option<CustomPathRewriter>,
    buckets: SourceBuckets,
    objects: Arc<dyn ObjectStore>,
    formats: OutputFormatResolver,
}

impl RequestResolver {
    pub fn new(buckets: SourceBuckets, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            classifier: RequestClassifier::new(false),
            rewriter: None,
            buckets,
            objects,
            formats: OutputFormatResolver::default(),
        }
    }

    /// Enable the custom dialect
    pub fn with_rewriter(mut self, rewriter: CustomPathRewriter) -> Self {
        self.classifier = RequestClassifier::new(true);
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_auto_webp(mut self, auto_webp: bool) -> Self {
        self.formats = OutputFormatResolver::new(auto_webp);
        self
    }

    pub fn buckets(&self) -> &SourceBuckets {
        &self.buckets
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    pub async fn setup(&self, inbound: &InboundRequest) -> Result<ImageRequest, ImageHandlerError> {
        let path = inbound.path.as_str();
        let request_type = self.classifier.classify(path)?;

        let opaque = match request_type {
            RequestType::Opaque => Some(decode::decode(path)?),
            _ => None,
        };

        let (bucket, key, mut edits) = match &opaque {
            Some(record) => {
                let bucket = self.buckets.resolve_opaque(record.bucket.as_deref())?;
                let edits = match &record.edits {
                    Some(edits) => EditSet::from_json(edits)?,
                    None => EditSet::new(),
                };
                (bucket, record.key.clone(), edits)
            }
            None => {
                let grammar_path = match request_type {
                    RequestType::Custom => self.rewrite(path)?,
                    _ => path.to_string(),
                };
                let bucket = self.buckets.resolve_path(path)?;
                let key = parse_legacy_key(&grammar_path, &bucket);
                (bucket, key, map_path_to_edits(&grammar_path)?)
            }
        };

        let original = self.fetch(&bucket, &key).await?;
        let content_type = resolve_content_type(original.metadata.content_type.as_deref(), &original.body);

        let requested = opaque
            .as_ref()
            .and_then(|r| r.output_format.as_deref())
            .and_then(|f| match f.parse::<ImageFormat>() {
                Ok(format) => Some(format),
                Err(_) => {
                    tracing::warn!(output_format = %f, "Ignoring unknown output format");
                    None
                }
            });
        let resolved = self.formats.resolve(
            &edits,
            &FormatContext {
                source_content_type: &content_type,
                accept: inbound.accept.as_deref(),
                opaque: opaque.is_some(),
                requested,
                effort: opaque.as_ref().and_then(|r| r.effort),
            },
        );

        if let Some(format) = resolved.format {
            if request_type.uses_path_grammar() {
                reconcile_quality(&mut edits, format);
            }
        }

        let headers = opaque
            .as_ref()
            .and_then(|r| r.headers.as_ref())
            .map(headers::filter_headers);

        tracing::info!(
            request_type = %request_type,
            bucket = %bucket,
            key = %key,
            edits = edits.len(),
            output_format = ?resolved.format,
            "Resolved image request"
        );

        Ok(ImageRequest {
            request_type,
            bucket,
            key,
            edits,
            output_format: resolved.format,
            effort: resolved.effort,
            headers,
            original_image: original.body,
            content_type: resolved.content_type.unwrap_or(content_type),
            cache_control: original
                .metadata
                .cache_control
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
            expires: original.metadata.expires,
            last_modified: original.metadata.last_modified,
        })
    }

    fn rewrite(&self, path: &str) -> Result<String, ImageHandlerError> {
        let rewriter = self.rewriter.as_ref().ok_or_else(|| {
            ImageHandlerError::configuration(
                "ThumborMapping::ParseCustomPath::RewriteMatchPatternUndefined",
                "The rewrite match pattern is not configured.",
            )
        })?;
        Ok(rewriter.rewrite(path).into_owned())
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, ImageHandlerError> {
        tracing::debug!(bucket = %bucket, key = %key, "Fetching original image");
        self.objects.get_object(bucket, key).await.map_err(|e| {
            if e.is_not_found() {
                ImageHandlerError::collaborator(
                    404,
                    "NoSuchKey",
                    format!(
                        "The image {} does not exist or the request may not be base64 encoded properly.",
                        key
                    ),
                )
            } else {
                tracing::error!(bucket = %bucket, key = %key, error = %e, "Failed to fetch original image");
                e.into()
            }
        })
    }
}
