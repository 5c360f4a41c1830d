//! S3 object store

use super::{ObjectMetadata, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Client from the default credential chain, with optional region and
    /// endpoint overrides (path-style addressing when an endpoint is set)
    pub async fn from_env(region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(endpoint.is_some())
            .build();
        Self::new(S3Client::from_conf(config))
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        tracing::info!(bucket = %bucket, key = %key, "Getting object from S3");

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|r| r.status().as_u16());
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    return StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    };
                }
                StoreError::Backend {
                    status: status.unwrap_or(500),
                    code: service.code().unwrap_or("InternalError").to_string(),
                    message: service
                        .message()
                        .map(str::to_string)
                        .unwrap_or_else(|| service.to_string()),
                }
            })?;

        let metadata = ObjectMetadata {
            content_type: response.content_type().map(str::to_string),
            cache_control: response.cache_control().map(str::to_string),
            expires: response
                .expires_string()
                .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            last_modified: response.last_modified().and_then(to_chrono),
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend {
                status: 500,
                code: "InternalError".to_string(),
                message: format!("Failed to read S3 body: {e}"),
            })?
            .into_bytes();

        Ok(StoredObject { body, metadata })
    }
}
