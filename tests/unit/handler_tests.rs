// End-to-end handler tests against in-memory collaborators

use bytes::Bytes;
use kagami::config::Config;
use kagami::engine::RasterEngine;
use kagami::handler::{Collaborators, HandlerResponse, ImageHandler};
use kagami::request::decode::encode;
use kagami::request::{InboundRequest, OpaqueRequest};
use kagami::security::SignatureVerifier;
use kagami::store::{MemoryObjectStore, MemoryStyleStore};
use kagami::vision::{BoundingBox, DisabledVision, StaticVision, VisionService};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;

fn png(width: u32, height: u32) -> Bytes {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    Bytes::from(out.into_inner())
}

fn dimensions(body: &[u8]) -> (u32, u32) {
    let decoded = image::load_from_memory(body).unwrap();
    (decoded.width(), decoded.height())
}

fn objects() -> Arc<MemoryObjectStore> {
    let store = MemoryObjectStore::new();
    store.put("photos", "test.png", png(40, 30), Some("image/png"));
    store.put("photos", "fallback.png", png(2, 2), Some("image/png"));
    store.put("photos", "a!b.png", png(40, 30), Some("image/png"));
    Arc::new(store)
}

fn handler_with(yaml: &str, vision: Arc<dyn VisionService>) -> ImageHandler {
    let config = Config::from_yaml_with_env(yaml).unwrap();
    ImageHandler::new(
        &config,
        Collaborators {
            objects: objects(),
            styles: Arc::new(MemoryStyleStore::from_styles(&config.styles)),
            vision,
            engine: Arc::new(RasterEngine::new()),
        },
    )
    .unwrap()
}

fn handler(yaml: &str) -> ImageHandler {
    handler_with(yaml, Arc::new(DisabledVision))
}

fn error_body(response: &HandlerResponse) -> Value {
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    serde_json::from_slice(&response.body).unwrap()
}

const BASIC: &str = "source_buckets: [photos]\n";

#[tokio::test]
async fn test_legacy_resize() {
    let response = handler(BASIC)
        .handle(InboundRequest::new("/fit-in/20x20/test.png"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Type"), Some("image/png"));
    assert_eq!(response.header("Cache-Control"), Some("max-age=31536000,public"));
    assert_eq!(dimensions(&response.body), (20, 15));
}

#[tokio::test]
async fn test_opaque_request_with_headers() {
    let record = OpaqueRequest {
        bucket: Some("photos".into()),
        key: "test.png".into(),
        edits: json!({"resize": {"width": 10}}).as_object().cloned(),
        headers: json!({"X-Image-Tag": "thumb"}).as_object().cloned(),
        ..Default::default()
    };
    let path = format!("/{}", encode(&record).unwrap());

    let response = handler(BASIC).handle(InboundRequest::new(path)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header("X-Image-Tag"), Some("thumb"));
    assert_eq!(dimensions(&response.body).0, 10);
}

#[tokio::test]
async fn test_opaque_bucket_outside_allow_list() {
    let record = OpaqueRequest {
        bucket: Some("secret".into()),
        key: "test.png".into(),
        ..Default::default()
    };
    let path = format!("/{}", encode(&record).unwrap());

    let response = handler(BASIC).handle(InboundRequest::new(path)).await;

    assert_eq!(response.status, 403);
    assert_eq!(error_body(&response)["code"], "ImageBucket::CannotAccessBucket");
}

#[tokio::test]
async fn test_missing_object_is_json_error() {
    let response = handler(BASIC).handle(InboundRequest::new("/missing.png")).await;

    assert_eq!(response.status, 404);
    let body = error_body(&response);
    assert_eq!(body["status"], 404);
    assert_eq!(body["code"], "NoSuchKey");
}

#[tokio::test]
async fn test_fallback_image_replaces_error_body() {
    let yaml = "source_buckets: [photos]\nfallback:\n  enabled: true\n  bucket: photos\n  key: fallback.png\n";
    let response = handler(yaml).handle(InboundRequest::new("/missing.png")).await;

    assert_eq!(response.status, 404);
    assert_eq!(response.header("Content-Type"), Some("image/png"));
    assert_eq!(dimensions(&response.body), (2, 2));
}

#[tokio::test]
async fn test_unclassifiable_path() {
    let response = handler(BASIC).handle(InboundRequest::new("/notes.txt")).await;

    assert_eq!(response.status, 400);
    assert_eq!(error_body(&response)["code"], "RequestTypeError");
}

#[tokio::test]
async fn test_cors_headers() {
    let yaml = "source_buckets: [photos]\ncors:\n  enabled: true\n  origin: \"https://example.com\"\n";
    let response = handler(yaml).handle(InboundRequest::new("/test.png")).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("https://example.com")
    );
    assert_eq!(response.header("Access-Control-Allow-Methods"), Some("GET"));
}

#[tokio::test]
async fn test_signature_required() {
    let yaml = "source_buckets: [photos]\nsignature:\n  enabled: true\n  secret: s3cr3t\n";
    let handler = handler(yaml);

    let missing = handler.handle(InboundRequest::new("/test.png")).await;
    assert_eq!(missing.status, 400);

    let wrong = handler
        .handle(InboundRequest::new("/test.png").with_query("signature", "00ff"))
        .await;
    assert_eq!(wrong.status, 403);

    let signature = SignatureVerifier::new("s3cr3t").sign("/test.png").unwrap();
    let signed = handler
        .handle(InboundRequest::new("/test.png").with_query("signature", signature))
        .await;
    assert_eq!(signed.status, 200);
}

#[tokio::test]
async fn test_action_pipeline_from_query() {
    let response = handler(BASIC)
        .handle(InboundRequest::new("/test.png").with_query("x-oss-process", "image/resize,w_10"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Type"), Some("image/png"));
    assert_eq!(dimensions(&response.body).0, 10);
}

#[tokio::test]
async fn test_action_pipeline_from_style() {
    let yaml = "source_buckets: [photos]\nstyles:\n  small: \"image/resize,w_20\"\n";
    let handler = handler(yaml);

    let response = handler.handle(InboundRequest::new("/test.png!small")).await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body).0, 20);

    let response = handler.handle(InboundRequest::new("/test.png@!missing")).await;
    assert_eq!(response.status, 400);
    assert_eq!(error_body(&response)["code"], "StyleNotFound");
}

#[tokio::test]
async fn test_legacy_key_may_contain_bang() {
    let response = handler(BASIC)
        .handle(InboundRequest::new("/fit-in/20x20/a!b.png"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (20, 15));
}

#[tokio::test]
async fn test_invalid_action_is_rejected() {
    let response = handler(BASIC)
        .handle(InboundRequest::new("/test.png").with_query("x-oss-process", "image/blur,r_60"))
        .await;

    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_smart_crop_face_index_out_of_range() {
    let face = BoundingBox {
        left: 0.25,
        top: 0.25,
        width: 0.5,
        height: 0.5,
    };
    let handler = handler_with(BASIC, Arc::new(StaticVision::with_faces(vec![face])));
    let record = OpaqueRequest {
        bucket: Some("photos".into()),
        key: "test.png".into(),
        edits: json!({"smartCrop": {"faceIndex": 3}}).as_object().cloned(),
        ..Default::default()
    };
    let path = format!("/{}", encode(&record).unwrap());

    let response = handler.handle(InboundRequest::new(path)).await;

    assert_eq!(response.status, 400);
    assert_eq!(error_body(&response)["code"], "SmartCrop::FaceIndexOutOfRange");
}
