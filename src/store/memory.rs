//! In-memory stores

use super::{ObjectMetadata, ObjectStore, StoreError, StoredObject, StyleStore};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Object store backed by a map; used by tests and local runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: Option<&str>) {
        self.put_object(
            bucket,
            key,
            StoredObject {
                body,
                metadata: ObjectMetadata {
                    content_type: content_type.map(str::to_string),
                    ..Default::default()
                },
            },
        );
    }

    pub fn put_object(&self, bucket: &str, key: &str, object: StoredObject) {
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// Style records held in memory, seeded from configuration
#[derive(Debug, Default)]
pub struct MemoryStyleStore {
    styles: RwLock<HashMap<String, Map<String, Value>>>,
}

impl MemoryStyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `{ "style": action }` record per configured style
    pub fn from_styles(styles: &HashMap<String, String>) -> Self {
        let store = Self::new();
        for (name, action) in styles {
            store.insert(name, action);
        }
        store
    }

    pub fn insert(&self, name: &str, action: &str) {
        let mut record = Map::new();
        record.insert("style".to_string(), Value::String(action.to_string()));
        self.insert_record(name, record);
    }

    /// Store an arbitrary record, including malformed ones
    pub fn insert_record(&self, name: &str, record: Map<String, Value>) {
        self.styles.write().insert(name.to_string(), record);
    }
}

#[async_trait]
impl StyleStore for MemoryStyleStore {
    async fn get_style(&self, name: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self.styles.read().get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("b", "a.png", Bytes::from_static(b"data"), Some("image/png"));
        let object = store.get_object("b", "a.png").await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"data"));
        assert_eq!(object.metadata.content_type.as_deref(), Some("image/png"));
        assert!(store.get_object("other", "a.png").await.is_err());
    }

    #[tokio::test]
    async fn test_styles_from_config() {
        let mut styles = HashMap::new();
        styles.insert("thumb".to_string(), "image/resize,w_100".to_string());
        let store = MemoryStyleStore::from_styles(&styles);
        let record = store.get_style("thumb").await.unwrap().unwrap();
        assert_eq!(record.get("style").and_then(Value::as_str), Some("image/resize,w_100"));
        assert!(store.get_style("missing").await.unwrap().is_none());
    }
}
