//! Storage collaborators
//!
//! - [`ObjectStore`]: source and overlay objects addressed by bucket/key
//! - [`BufferStore`]: raw bytes by key, used by action-pipeline watermarks
//! - [`StyleStore`]: named action-string macros
//!
//! # Backends
//!
//! - `s3`: AWS S3 through `aws-sdk-s3`
//! - `local`: a directory per bucket under a root
//! - `memory`: in-process maps, used by tests and the CLI

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalStore;
pub use memory::{MemoryObjectStore, MemoryStyleStore};
pub use s3::S3Store;

use crate::error::ImageHandlerError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Cache-Control used when the object carries none
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=31536000,public";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object body plus the metadata the response needs
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: ObjectMetadata,
}

/// Errors from storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("The specified key does not exist: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Access denied to {bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },
}

impl StoreError {
    pub fn status(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::AccessDenied { .. } => 403,
            StoreError::Io(_) => 500,
            StoreError::Backend { status, .. } => *status,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            StoreError::NotFound { .. } => "NoSuchKey",
            StoreError::AccessDenied { .. } => "AccessDenied",
            StoreError::Io(_) => "InternalError",
            StoreError::Backend { code, .. } => code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<StoreError> for ImageHandlerError {
    fn from(err: StoreError) -> Self {
        ImageHandlerError::collaborator(err.status(), err.code(), err.to_string())
    }
}

/// Bucket/key object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;
}

/// Byte storage addressed by key alone
#[async_trait]
pub trait BufferStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;
}

/// Style records: `{ "style": "<action string>" }`
#[async_trait]
pub trait StyleStore: Send + Sync {
    async fn get_style(&self, name: &str) -> Result<Option<Map<String, Value>>, StoreError>;
}

/// [`BufferStore`] view of one bucket of an [`ObjectStore`]
pub struct BucketBuffer {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl BucketBuffer {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BufferStore for BucketBuffer {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let key = key.trim_start_matches('/');
        Ok(self.store.get_object(&self.bucket, key).await?.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: ImageHandlerError = StoreError::NotFound {
            bucket: "b".into(),
            key: "k".into(),
        }
        .into();
        assert_eq!(err.to_http_status(), 404);
        assert_eq!(err.code(), "NoSuchKey");

        let err: ImageHandlerError = StoreError::Io(std::io::Error::other("disk")).into();
        assert_eq!(err.to_http_status(), 500);
    }

    #[tokio::test]
    async fn test_bucket_buffer_reads_from_bucket() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("assets", "logo.png", Bytes::from_static(b"png"), None);
        let buffer = BucketBuffer::new(store.clone() as Arc<dyn ObjectStore>, "assets");
        assert_eq!(buffer.get("/logo.png").await.unwrap(), Bytes::from_static(b"png"));
        assert!(buffer.get("missing.png").await.unwrap_err().is_not_found());
    }
}
