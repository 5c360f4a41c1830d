//! Filesystem object store
//!
//! Buckets are sub-directories of a root directory and keys are relative
//! paths inside them. Keys that try to leave the bucket are refused.

use super::{ObjectMetadata, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || bucket.is_empty() {
            return Err(StoreError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

/// Content type from the file extension; storage without metadata behaves
/// like an object uploaded without a content type
fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "binary/octet-stream",
    };
    Some(content_type)
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let path = self.object_path(bucket, key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let last_modified = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        tracing::debug!(bucket = %bucket, key = %key, size = data.len(), "Read local object");

        Ok(StoredObject {
            body: Bytes::from(data),
            metadata: ObjectMetadata {
                content_type: content_type_for(&path).map(str::to_string),
                cache_control: None,
                expires: None,
                last_modified,
            },
        })
    }
}
