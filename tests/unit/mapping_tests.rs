// Request mapping tests: dialect classification, legacy grammar, rewrites
// and format reconciliation working together

use bytes::Bytes;
use kagami::edits::{Edit, EditKey, EditSet, FitMode};
use kagami::format::{reconcile_quality, ImageFormat};
use kagami::request::decode::{decode, encode};
use kagami::request::{InboundRequest, OpaqueRequest, RequestClassifier, RequestResolver, RequestType, SourceBuckets};
use kagami::store::MemoryObjectStore;
use kagami::thumbor::{map_path_to_edits, CustomPathRewriter};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_opaque_record_survives_encoding() {
    let record = OpaqueRequest {
        bucket: Some("photos".into()),
        key: "déjà vu/猫.jpg".into(),
        edits: json!({"resize": {"width": 100, "fit": "cover"}, "grayscale": true})
            .as_object()
            .cloned(),
        output_format: Some("webp".into()),
        effort: Some(6.0),
        ..Default::default()
    };
    let path = format!("/{}", encode(&record).unwrap());

    assert_eq!(RequestClassifier::new(false).classify(&path).unwrap(), RequestType::Opaque);
    assert_eq!(decode(&path).unwrap(), record);
}

#[test]
fn test_zero_width_derives_from_aspect_ratio() {
    let edits = map_path_to_edits("/0x300/cat.jpg").unwrap();
    let resize = edits.resize().unwrap();
    assert_eq!(resize.width, None);
    assert_eq!(resize.height, Some(300.0));
    assert_eq!(resize.fit, Some(FitMode::Inside));
}

#[rstest]
#[case("/filters:format(webp)/filters:quality(40)/cat.jpg")]
#[case("/filters:quality(40)/filters:format(webp)/cat.jpg")]
fn test_format_and_quality_in_either_order(#[case] path: &str) {
    let edits = map_path_to_edits(path).unwrap();
    assert_eq!(edits.to_format(), Some(ImageFormat::Webp));
    // The mapper files quality under the extension's format
    assert_eq!(
        edits.format_options(ImageFormat::Jpeg).and_then(|o| o.quality),
        Some(40.0)
    );
}

#[rstest]
#[case("/filters:format(webp)/filters:quality(40)/cat.jpg")]
#[case("/filters:quality(40)/filters:format(webp)/cat.jpg")]
#[tokio::test]
async fn test_request_setup_moves_quality_to_output_format(#[case] path: &str) {
    let store = MemoryObjectStore::new();
    store.put("photos", "cat.jpg", Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
    let resolver = RequestResolver::new(SourceBuckets::parse("photos"), Arc::new(store));

    let request = resolver.setup(&InboundRequest::new(path)).await.unwrap();

    assert_eq!(request.output_format, Some(ImageFormat::Webp));
    assert_eq!(request.edits.quality_keys(), vec![ImageFormat::Webp]);
    assert_eq!(
        request.edits.format_options(ImageFormat::Webp).and_then(|o| o.quality),
        Some(40.0)
    );
}

#[test]
fn test_watermark_placement_stays_symbolic() {
    let edits = map_path_to_edits("/filters:watermark(logos,mark.png,50p,30p,20)/cat.jpg").unwrap();
    match edits.get(EditKey::OverlayWith) {
        Some(Edit::OverlayWith(overlay)) => {
            assert_eq!((overlay.bucket.as_str(), overlay.key.as_str()), ("logos", "mark.png"));
            assert_eq!(overlay.options.left.as_deref(), Some("50p"));
            assert_eq!(overlay.options.top.as_deref(), Some("30p"));
            assert_eq!(overlay.alpha.as_deref(), Some("20"));
        }
        other => panic!("expected overlay, got {:?}", other),
    }
}

#[test]
fn test_crop_bounds_become_origin_and_size() {
    let edits = map_path_to_edits("/10x0:100x200/test.jpg").unwrap();
    match edits.get(EditKey::Crop) {
        Some(Edit::Crop(crop)) => {
            assert_eq!((crop.left, crop.top, crop.width, crop.height), (10, 0, 90, 200));
        }
        other => panic!("expected crop, got {:?}", other),
    }
}

#[test]
fn test_malformed_crop_is_absent() {
    let edits = map_path_to_edits("/10x0:100/test.jpg").unwrap();
    assert!(!edits.contains(EditKey::Crop));
}

#[test]
fn test_rewritten_path_maps_like_the_legacy_form() {
    let rewriter = CustomPathRewriter::from_config(Some("/(filters-)/gm"), Some("filters:")).unwrap();
    let rewritten = rewriter.rewrite("/filters-rotate(90)/filters-grayscale()/cat.jpg");

    let edits = map_path_to_edits(&rewritten).unwrap();
    let expected = map_path_to_edits("/filters:rotate(90)/filters:grayscale()/cat.jpg").unwrap();
    assert_eq!(edits, expected);
    assert!(edits.contains(EditKey::Grayscale));
}

#[test]
fn test_quality_moves_to_negotiated_format() {
    let mut edits = map_path_to_edits("/filters:quality(70)/cat.jpg").unwrap();
    assert_eq!(edits.quality_keys(), vec![ImageFormat::Jpeg]);

    reconcile_quality(&mut edits, ImageFormat::Webp);
    assert_eq!(edits.quality_keys(), vec![ImageFormat::Webp]);
    assert_eq!(
        edits.format_options(ImageFormat::Webp).and_then(|o| o.quality),
        Some(70.0)
    );
}

#[test]
fn test_json_edits_match_legacy_edits() {
    let from_json = EditSet::from_json(json!({"grayscale": true}).as_object().unwrap()).unwrap();
    let from_path = map_path_to_edits("/filters:grayscale()/cat.jpg").unwrap();
    assert_eq!(from_json, from_path);
}
