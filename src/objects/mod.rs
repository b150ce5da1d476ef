//! Binary object storage for attachment payloads.
//!
//! This module provides the trait the messaging core writes attachment bytes
//! through, plus the bundled backends. The core never touches bytes outside
//! this boundary: it puts an object, records the returned reference in the
//! attachment ledger, and reads it back through the same reference.

use bytes::Bytes;
use std::{future::Future, pin::Pin};

use crate::error::Error;

pub mod fs;
pub mod memory;

/// Storage backend for attachment payloads.
///
/// Object references are the paths objects were put under. Paths follow the
/// `{sender}/{timestamp}_{uuid}_{filename}` convention, so they are unique
/// per upload and a backend never has to overwrite.
pub trait ObjectStore: Send + Sync + 'static {
    /// Stores `bytes` under `path` and returns the reference to record in
    /// the ledger.
    fn put(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, Error>> + Send>>;

    /// Retrieves the object previously stored under `path`.
    ///
    /// A reference that was never written resolves to [`Error::NotFound`];
    /// ledger rows are only written after a successful put, so hitting that
    /// case means the backend lost data.
    fn get(&self, path: &str) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>>;
}
