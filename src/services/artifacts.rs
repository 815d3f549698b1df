use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// URL scheme prefix for session-local resources
pub const OBJECT_URL_PREFIX: &str = "blob:gif-dropzone/";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub mime_type: String,
}

/// Session-scoped registry mapping resource URLs to in-memory buffers.
/// Nothing is written to disk; entries live until revoked or the store is
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_object_url(&self, data: Bytes, mime_type: &str) -> String {
        let url = format!("{}{}", OBJECT_URL_PREFIX, Uuid::new_v4());
        self.objects.insert(
            url.clone(),
            StoredObject {
                data,
                mime_type: mime_type.to_string(),
            },
        );
        url
    }

    pub fn resolve(&self, url: &str) -> Option<StoredObject> {
        self.objects.get(url).map(|entry| entry.value().clone())
    }

    /// Releases the buffer behind `url`. Returns false if it was unknown.
    pub fn revoke(&self, url: &str) -> bool {
        self.objects.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
