// Configuration loading tests through the public API

use kagami::config::{Config, LogFormat, StorageBackend};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml_with_env("source_buckets: photos, archive\n").unwrap();

    assert_eq!(config.source_buckets, vec!["photos", "archive"]);
    assert_eq!(config.storage.backend, StorageBackend::S3);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(!config.output.auto_webp);
    assert!(config.output.payload_limit > 0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_file_config_with_styles() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "source_buckets: [photos]\nstyles:\n  thumb: \"image/resize,w_100\"\nstorage:\n  backend: local\n  root: /srv"
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.styles.get("thumb").map(String::as_str), Some("image/resize,w_100"));
    assert_eq!(config.storage.backend, StorageBackend::Local);
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_layers_over_file() {
    let mut config = Config::from_yaml_with_env("source_buckets: [photos]\n").unwrap();
    let env: HashMap<&str, &str> = [
        ("SOURCE_BUCKETS", "a, b"),
        ("AUTO_WEBP", "Yes"),
        ("ENABLE_SIGNATURE", "No"),
        ("REWRITE_MATCH_PATTERN", "/(filters-)/gm"),
        ("REWRITE_SUBSTITUTION", "filters:"),
    ]
    .into_iter()
    .collect();

    config.apply_overrides_from(|name| env.get(name).map(|v| v.to_string()));

    assert_eq!(config.source_buckets, vec!["a", "b"]);
    assert!(config.output.auto_webp);
    assert!(!config.signature.enabled);
    assert!(config.rewriter().unwrap().is_some());
}

#[test]
fn test_validation_failures() {
    let no_buckets = Config::from_yaml_with_env("styles: {}\n").unwrap();
    assert!(no_buckets.validate().is_err());

    let unsigned = Config::from_yaml_with_env("source_buckets: [a]\nsignature:\n  enabled: true\n").unwrap();
    assert!(unsigned.validate().unwrap_err().contains("secret"));

    let bad_style = Config::from_yaml_with_env("source_buckets: [a]\nstyles:\n  \"a/b\": \"image/grey,1\"\n").unwrap();
    assert!(bad_style.validate().is_err());

    let bad_rewrite =
        Config::from_yaml_with_env("source_buckets: [a]\nrewrite:\n  match_pattern: \"/(x/\"\n  substitution: y\n")
            .unwrap();
    assert!(bad_rewrite.validate().is_err());
}
