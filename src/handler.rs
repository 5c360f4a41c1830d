//! End-to-end request handling
//!
//! [`ImageHandler::handle`] never fails: every error becomes a JSON error
//! response, or the configured fallback image.
//!
//! # Routing
//!
//! Requests with an `x-oss-process` query go through the action pipeline
//! against the default bucket. So do `key!style` paths, but only when no
//! request dialect claims the path: a legacy key may itself contain `!`.
//! Everything else goes through dialect classification and the
//! dispatch-by-key executor.

use crate::config::{Config, CorsConfig, FallbackConfig};
use crate::engine::{ImageEngine, LoadOptions};
use crate::error::ImageHandlerError;
use crate::executor::{ensure_within_limit, EditExecutor};
use crate::format::sniff::resolve_content_type;
use crate::processor::{parse_request, ActionRegistry, ImageContext, ProcessRequest, ProcessorMap, PROCESS_QUERY_PARAM};
use crate::request::{ImageRequest, InboundRequest, RequestClassifier, RequestResolver};
use crate::security::{SignatureVerifier, SIGNATURE_PARAM};
use crate::store::{BucketBuffer, ObjectStore, StyleStore, DEFAULT_CACHE_CONTROL};
use crate::vision::VisionService;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::Instrument;
use uuid::Uuid;

static CDN_SEGMENT: OnceLock<Regex> = OnceLock::new();

fn cdn_segment() -> &'static Regex {
    CDN_SEGMENT.get_or_init(|| {
        Regex::new(r"/cdn-cgi/image/fit=contain,width=\d+,height=\d+")
            .expect("Invalid CDN regex - this is a compile-time bug")
    })
}

/// Remove a CDN image-resizing segment from the path
pub fn normalize_cdn_path(path: &str) -> String {
    cdn_segment().replace(path, "").into_owned()
}

/// RFC 7231 HTTP date
pub fn http_date(value: &DateTime<Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HandlerResponse {
    /// First header with `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }
}

/// Collaborators the handler is wired with
#[derive(Clone)]
pub struct Collaborators {
    pub objects: Arc<dyn ObjectStore>,
    pub styles: Arc<dyn StyleStore>,
    pub vision: Arc<dyn VisionService>,
    pub engine: Arc<dyn ImageEngine>,
}

pub struct ImageHandler {
    resolver: RequestResolver,
    executor: EditExecutor,
    processors: ProcessorMap,
    objects: Arc<dyn ObjectStore>,
    engine: Arc<dyn ImageEngine>,
    signature: Option<SignatureVerifier>,
    cors: CorsConfig,
    fallback: FallbackConfig,
    payload_limit: usize,
}

impl ImageHandler {
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self, ImageHandlerError> {
        let mut resolver = RequestResolver::new(config.source_buckets(), collaborators.objects.clone())
            .with_auto_webp(config.output.auto_webp);
        let rewriter = config.rewriter().map_err(|e| {
            ImageHandlerError::configuration("ThumborMapping::ParseCustomPath::InvalidRewriteMatchPattern", e)
        })?;
        if let Some(rewriter) = rewriter {
            resolver = resolver.with_rewriter(rewriter);
        }

        let executor = EditExecutor::new(
            collaborators.engine.clone(),
            collaborators.objects.clone(),
            collaborators.vision.clone(),
        )
        .with_payload_limit(config.output.payload_limit);

        let registry = Arc::new(ActionRegistry::with_defaults());
        let processors = ProcessorMap::new(registry, collaborators.styles.clone());

        let signature = if config.signature.enabled {
            let secret = config.signature.secret.clone().unwrap_or_default();
            Some(SignatureVerifier::new(secret))
        } else {
            None
        };

        Ok(Self {
            resolver,
            executor,
            processors,
            objects: collaborators.objects,
            engine: collaborators.engine,
            signature,
            cors: config.cors.clone(),
            fallback: config.fallback.clone(),
            payload_limit: config.output.payload_limit,
        })
    }

    pub async fn handle(&self, inbound: InboundRequest) -> HandlerResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("image_request", request_id = %request_id, path = %inbound.path);

        async {
            match self.process(inbound).await {
                Ok(response) => {
                    tracing::info!(status = response.status, size = response.body.len(), "Request completed");
                    response
                }
                Err(err) => {
                    tracing::warn!(
                        status = err.to_http_status(),
                        code = %err.code(),
                        error = %err,
                        "Request failed"
                    );
                    self.error_response(&err).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, mut inbound: InboundRequest) -> Result<HandlerResponse, ImageHandlerError> {
        if let Some(verifier) = &self.signature {
            let signature = inbound.query.get(SIGNATURE_PARAM).map(String::as_str);
            verifier.verify(&inbound.path, signature)?;
        }
        inbound.path = normalize_cdn_path(&inbound.path);

        if is_action_request(&inbound, self.resolver.classifier()) {
            let request = parse_request(&inbound.path, &inbound.query)?;
            return self.process_actions(request).await;
        }

        let request = self.resolver.setup(&inbound).await?;
        let body = self.executor.process(&request).await?;
        Ok(self.success_response(&request, body))
    }

    async fn process_actions(&self, request: ProcessRequest) -> Result<HandlerResponse, ImageHandlerError> {
        let bucket = self.resolver.buckets().default_bucket()?.to_string();
        let key = urlencoding::decode(&request.uri)
            .map(|k| k.into_owned())
            .unwrap_or_else(|_| request.uri.clone());
        tracing::debug!(bucket = %bucket, key = %key, actions = ?request.actions, "Running action pipeline");

        let original = self.objects.get_object(&bucket, &key).await?;
        let source_type = resolve_content_type(original.metadata.content_type.as_deref(), &original.body);

        let (body, content_type) = if request.has_actions() {
            let image = self.engine.load(&original.body, LoadOptions { auto_orient: false })?;
            let buffers = Arc::new(BucketBuffer::new(self.objects.clone(), bucket.clone()));
            let mut ctx = ImageContext::new(image, self.engine.clone(), buffers);
            self.processors.run(&mut ctx, &request.actions).await?;
            let encoded = ctx.image.encode()?;
            (Bytes::from(encoded.data), encoded.format.content_type())
        } else {
            (original.body.clone(), source_type)
        };
        ensure_within_limit(&body, self.payload_limit)?;

        let mut response = HandlerResponse {
            status: 200,
            headers: self.cors_headers(),
            body,
        };
        response.set_header("Content-Type", content_type);
        response.set_header(
            "Cache-Control",
            original
                .metadata
                .cache_control
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
        );
        if let Some(last_modified) = &original.metadata.last_modified {
            response.set_header("Last-Modified", http_date(last_modified));
        }
        Ok(response)
    }

    fn success_response(&self, request: &ImageRequest, body: Bytes) -> HandlerResponse {
        let mut response = HandlerResponse {
            status: 200,
            headers: self.cors_headers(),
            body,
        };
        response.set_header("Content-Type", request.content_type.clone());
        if let Some(expires) = &request.expires {
            response.set_header("Expires", http_date(expires));
        }
        if let Some(last_modified) = &request.last_modified {
            response.set_header("Last-Modified", http_date(last_modified));
        }
        response.set_header("Cache-Control", request.cache_control.clone());

        for (name, value) in request.headers.iter().flatten() {
            response.set_header(name, value.clone());
        }
        response
    }

    async fn error_response(&self, err: &ImageHandlerError) -> HandlerResponse {
        let status = err.to_http_status();

        if let Some((bucket, key)) = self.fallback.target() {
            match self.objects.get_object(bucket, key).await {
                Ok(fallback) => {
                    let mut response = HandlerResponse {
                        status,
                        headers: self.cors_headers(),
                        body: Bytes::new(),
                    };
                    let content_type =
                        resolve_content_type(fallback.metadata.content_type.as_deref(), &fallback.body);
                    response.set_header("Content-Type", content_type);
                    if let Some(last_modified) = &fallback.metadata.last_modified {
                        response.set_header("Last-Modified", http_date(last_modified));
                    }
                    response.set_header("Cache-Control", DEFAULT_CACHE_CONTROL);
                    response.body = fallback.body;
                    return response;
                }
                Err(e) => {
                    tracing::error!(bucket = %bucket, key = %key, error = %e, "Failed to fetch the fallback image");
                }
            }
        }

        let body = serde_json::json!({
            "status": status,
            "code": err.code(),
            "message": err.to_string(),
        });
        let mut response = HandlerResponse {
            status,
            headers: self.cors_headers(),
            body: Bytes::from(body.to_string()),
        };
        response.set_header("Content-Type", "application/json");
        response
    }

    fn cors_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Access-Control-Allow-Methods".to_string(), "GET".to_string()),
            (
                "Access-Control-Allow-Headers".to_string(),
                "Content-Type, Authorization".to_string(),
            ),
            ("Access-Control-Allow-Credentials".to_string(), "true".to_string()),
        ];
        if self.cors.enabled {
            if let Some(origin) = &self.cors.origin {
                headers.push(("Access-Control-Allow-Origin".to_string(), origin.clone()));
            }
        }
        headers
    }
}

/// Whether the request addresses the action pipeline
///
/// A style suffix only counts when `classifier` rejects the path.
pub fn is_action_request(inbound: &InboundRequest, classifier: &RequestClassifier) -> bool {
    if inbound.query.contains_key(PROCESS_QUERY_PARAM) {
        return true;
    }
    inbound.path.contains('!') && classifier.classify(&inbound.path).is_err()
}
