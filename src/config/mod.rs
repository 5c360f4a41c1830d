// Configuration module
//
// YAML with `${VAR}` substitution, then the legacy environment variables of
// the image handler layered on top.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::executor::DEFAULT_PAYLOAD_LIMIT;
use crate::processor::is_valid_style_name;
use crate::request::SourceBuckets;
use crate::thumbor::CustomPathRewriter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Allowed source buckets; the first one is the default. Accepts a
    /// YAML list or a comma-separated string.
    #[serde(default, deserialize_with = "bucket_list")]
    pub source_buckets: Vec<String>,
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Style name → action string
    #[serde(default)]
    pub styles: HashMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
}

fn bucket_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Buckets {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Buckets::deserialize(deserializer)? {
        Buckets::List(list) => SourceBuckets::new(list).as_slice().to_vec(),
        Buckets::Csv(csv) => SourceBuckets::parse(&csv).as_slice().to_vec(),
    })
}

/// Custom dialect: regex (bare or `/pattern/flags`) and its substitution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution: Option<String>,
}

impl RewriteConfig {
    /// Both values present and non-empty
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.match_pattern) && set(&self.substitution)
    }
}

fn default_payload_limit() -> usize {
    DEFAULT_PAYLOAD_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Serve WebP when the Accept header allows it
    #[serde(default)]
    pub auto_webp: bool,
    /// Ceiling on the base64 length of a response body
    #[serde(default = "default_payload_limit")]
    pub payload_limit: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            auto_webp: false,
            payload_limit: default_payload_limit(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SignatureConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl std::fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("enabled", &self.enabled)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Object served in place of an error body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl FallbackConfig {
    /// Bucket and key when enabled and both are non-blank
    pub fn target(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        let bucket = self.bucket.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let key = self.key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((bucket, key))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the local backend; buckets are sub-directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom S3 endpoint (MinIO, LocalStack); enables path-style addressing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// TrueType/OpenType font for text watermarks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
}

fn yes(value: &str) -> bool {
    value == "Yes"
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });
        if let Some(var_name) = missing {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Layer the process environment on top of the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Layer `lookup` (an environment) on top of the file values
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(buckets) = lookup("SOURCE_BUCKETS") {
            self.source_buckets = SourceBuckets::parse(&buckets).as_slice().to_vec();
        }
        if let Some(pattern) = lookup("REWRITE_MATCH_PATTERN") {
            self.rewrite.match_pattern = Some(pattern);
        }
        if let Some(substitution) = lookup("REWRITE_SUBSTITUTION") {
            self.rewrite.substitution = Some(substitution);
        }
        if let Some(value) = lookup("AUTO_WEBP") {
            self.output.auto_webp = yes(&value);
        }
        if let Some(value) = lookup("ENABLE_SIGNATURE") {
            self.signature.enabled = yes(&value);
        }
        if let Some(secret) = lookup("SECRET_KEY") {
            self.signature.secret = Some(secret);
        }
        if let Some(value) = lookup("CORS_ENABLED") {
            self.cors.enabled = yes(&value);
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.cors.origin = Some(origin);
        }
        if let Some(value) = lookup("ENABLE_DEFAULT_FALLBACK_IMAGE") {
            self.fallback.enabled = yes(&value);
        }
        if let Some(bucket) = lookup("DEFAULT_FALLBACK_IMAGE_BUCKET") {
            self.fallback.bucket = Some(bucket);
        }
        if let Some(key) = lookup("DEFAULT_FALLBACK_IMAGE_KEY") {
            self.fallback.key = Some(key);
        }
    }

    pub fn source_buckets(&self) -> SourceBuckets {
        SourceBuckets::new(self.source_buckets.clone())
    }

    /// Compiled rewrite rule when the custom dialect is configured
    pub fn rewriter(&self) -> Result<Option<CustomPathRewriter>, String> {
        if !self.rewrite.is_configured() {
            return Ok(None);
        }
        CustomPathRewriter::from_config(
            self.rewrite.match_pattern.as_deref(),
            self.rewrite.substitution.as_deref(),
        )
        .map(Some)
        .map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_buckets.is_empty() {
            return Err("At least one source bucket must be configured".to_string());
        }

        self.rewriter()?;

        if self.output.payload_limit == 0 {
            return Err("output.payload_limit must be greater than 0".to_string());
        }

        if self.signature.enabled
            && self.signature.secret.as_deref().map_or(true, str::is_empty)
        {
            return Err("signature.secret is required when signatures are enabled".to_string());
        }

        if self.cors.enabled && self.cors.origin.is_none() {
            return Err("cors.origin is required when CORS is enabled".to_string());
        }

        if self.storage.backend == StorageBackend::Local && self.storage.root.is_none() {
            return Err("storage.root is required for the local backend".to_string());
        }

        for (name, action) in &self.styles {
            if !is_valid_style_name(name) {
                return Err(format!("Style name '{}' is not valid", name));
            }
            if action.trim().is_empty() {
                return Err(format!("Style '{}' has an empty action string", name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
source_buckets:
  - photos
  - archive
rewrite:
  match_pattern: "/(filters-)/gm"
  substitution: "filters:"
output:
  auto_webp: true
signature:
  enabled: true
  secret: "s3cr3t"
cors:
  enabled: true
  origin: "*"
fallback:
  enabled: true
  bucket: photos
  key: fallback.png
storage:
  backend: local
  root: /srv/images
styles:
  thumb: "image/resize,w_100/quality,q_80"
logging:
  level: debug
  format: compact
watermark:
  font_path: /usr/share/fonts/DejaVuSans.ttf
"#;

    #[test]
    fn test_config_can_be_loaded_from_file_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL_CONFIG.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.source_buckets, vec!["photos", "archive"]);
        assert!(config.rewrite.is_configured());
        assert!(config.output.auto_webp);
        assert_eq!(config.output.payload_limit, DEFAULT_PAYLOAD_LIMIT);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.fallback.target(), Some(("photos", "fallback.png")));
        assert_eq!(config.styles["thumb"], "image/resize,w_100/quality,q_80");
        assert!(config.validate().is_ok());
        assert!(config.rewriter().unwrap().is_some());
    }

    #[test]
    fn test_defaults_when_sections_are_omitted() {
        let config = Config::from_yaml_with_env("source_buckets: \"a, b ,c\"\n").unwrap();
        assert_eq!(config.source_buckets, vec!["a", "b", "c"]);
        assert!(!config.rewrite.is_configured());
        assert!(!config.signature.enabled);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.fallback.target().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("KAGAMI_TEST_SECRET", "from-env");
        let yaml = "source_buckets: [a]\nsignature:\n  enabled: true\n  secret: \"${KAGAMI_TEST_SECRET}\"\n";
        let config = Config::from_yaml_with_env(yaml).unwrap();
        assert_eq!(config.signature.secret.as_deref(), Some("from-env"));
        std::env::remove_var("KAGAMI_TEST_SECRET");

        let err = Config::from_yaml_with_env("source_buckets: \"${KAGAMI_TEST_UNSET_VAR}\"").unwrap_err();
        assert!(err.contains("KAGAMI_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_legacy_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("SOURCE_BUCKETS", "one, two"),
            ("AUTO_WEBP", "Yes"),
            ("ENABLE_SIGNATURE", "No"),
            ("CORS_ENABLED", "Yes"),
            ("CORS_ORIGIN", "https://example.com"),
            ("REWRITE_MATCH_PATTERN", "/(filters-)/gm"),
            ("REWRITE_SUBSTITUTION", "filters:"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.signature.enabled = true;
        config.apply_overrides_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.source_buckets, vec!["one", "two"]);
        assert!(config.output.auto_webp);
        assert!(!config.signature.enabled);
        assert_eq!(config.cors.origin.as_deref(), Some("https://example.com"));
        assert!(config.rewrite.is_configured());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::from_yaml_with_env("source_buckets: [a]").unwrap();

        config.signature.enabled = true;
        assert!(config.validate().unwrap_err().contains("signature.secret"));
        config.signature.enabled = false;

        config.storage.backend = StorageBackend::Local;
        assert!(config.validate().unwrap_err().contains("storage.root"));
        config.storage.backend = StorageBackend::S3;

        config.styles.insert("bad name!".into(), "image/resize,w_10".into());
        assert!(config.validate().unwrap_err().contains("bad name!"));
        config.styles.clear();

        config.rewrite.match_pattern = Some("/([/g".into());
        config.rewrite.substitution = Some("x".into());
        assert!(config.validate().is_err());

        assert!(Config::default().validate().unwrap_err().contains("source bucket"));
    }

    #[test]
    fn test_signature_secret_is_redacted() {
        let config = SignatureConfig {
            enabled: true,
            secret: Some("hunter2".into()),
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
