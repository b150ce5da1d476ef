//! Filesystem object store.
//!
//! Lays objects out under a root directory, one file per object, mirroring
//! the `{sender}/{timestamp}_{uuid}_{filename}` reference convention as a
//! directory per sender.

use std::{
    future::Future,
    path::{Component, Path, PathBuf},
    pin::Pin,
};

use bytes::Bytes;

use crate::error::Error;

use super::ObjectStore;

/// Object store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a reference to a path under the root. References carrying
    /// parent-directory or absolute components are rejected so a stored
    /// file name can never escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(path);

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::object_storage(format!("invalid object path: {path}")));
        }

        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, Error>> + Send>> {
        let resolved = self.resolve(path);
        let path = path.to_owned();
        Box::pin(async move {
            let target = resolved?;

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::object_storage(format!("create {parent:?}: {e}")))?;
            }

            tokio::fs::write(&target, &bytes)
                .await
                .map_err(|e| Error::object_storage(format!("write {target:?}: {e}")))?;

            Ok(path)
        })
    }

    fn get(&self, path: &str) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>> {
        let resolved = self.resolve(path);
        let path = path.to_owned();
        Box::pin(async move {
            let target = resolved?;

            match tokio::fs::read(&target).await {
                Ok(contents) => Ok(Bytes::from(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Error::not_found(format!("object {path}")))
                }
                Err(e) => Err(Error::object_storage(format!("read {target:?}: {e}"))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn writes_under_root_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let reference = store
            .put("bob/1700000000000_notes.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert!(dir.path().join("bob/1700000000000_notes.txt").is_file());
        assert_eq!(
            store.get(&reference).await.unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let result = store.get("bob/0_missing.txt").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn parent_directory_references_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let result = store
            .put("../escape.txt", Bytes::from_static(b"nope"))
            .await;
        assert!(matches!(result, Err(Error::ObjectStorage { .. })));

        let result = store.get("/etc/hostname").await;
        assert!(matches!(result, Err(Error::ObjectStorage { .. })));
    }
}
