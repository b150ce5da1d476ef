//! In-memory object store.
//!
//! Keeps objects in a concurrent hash map. Primarily used for tests and
//! development environments; contents vanish with the process.

use std::{future::Future, pin::Pin, sync::Arc};

use bytes::Bytes;

use crate::error::Error;

use super::ObjectStore;

/// Thread-safe in-memory object store.
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<papaya::HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(papaya::HashMap::new()),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.pin().is_empty()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, Error>> + Send>> {
        let self_clone = self.clone();
        let path = path.to_owned();
        Box::pin(async move {
            let guard = self_clone.objects.guard();
            self_clone.objects.insert(path.clone(), bytes, &guard);
            Ok(path)
        })
    }

    fn get(&self, path: &str) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>> {
        let self_clone = self.clone();
        let path = path.to_owned();
        Box::pin(async move {
            let guard = self_clone.objects.guard();
            self_clone
                .objects
                .get(&path, &guard)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("object {path}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn stores_and_returns_bytes_under_the_given_path() {
        let store = MemoryObjectStore::new();

        let reference = store
            .put("alice/1700000000000_syllabus.pdf", Bytes::from_static(b"pdf"))
            .await
            .unwrap();
        assert_eq!(reference, "alice/1700000000000_syllabus.pdf");

        let bytes = store.get(&reference).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"pdf"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryObjectStore::new();

        let result = store.get("nobody/0_missing.bin").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
