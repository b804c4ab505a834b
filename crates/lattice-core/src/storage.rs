//! Storage backend abstraction for registry state.
//!
//! The registry keeps all durable state (action records, version snapshots,
//! head pointers, idempotency markers, CDN artifacts) in an object store
//! behind this trait. The contract is deliberately small:
//!
//! - Conditional writes with preconditions (the only isolation primitive)
//! - Object metadata including a version token
//! - Prefix listing for history reads
//!
//! The version token is an opaque `String` so different backends can map it
//! to their own notion of generation (GCS generation, S3 `ETag`, a counter
//! for the in-memory backend). Nothing outside a backend interprets it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes (CAS operations).
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// Write succeeded, returns the new version token.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed, returns the current version token.
    PreconditionFailed {
        /// The version that caused the precondition to fail, when the
        /// object exists.
        current_version: Option<String>,
    },
}

impl WriteResult {
    /// Returns true when the write took effect.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Object version token for CAS operations.
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for registry state.
///
/// All backends (cloud object stores, the in-memory test backend) implement
/// this trait. Precondition failures are normal results, never errors.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes an object with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` when the precondition is
    /// not met; that is a normal result, not an error.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object. Succeeds even if the object doesn't exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// **Ordering**: results come back in arbitrary order. Callers needing
    /// deterministic order must sort (the version store sorts by path, which
    /// for ULID-named records is creation order).
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

/// In-memory storage backend for tests and local development.
///
/// Thread-safe via `RwLock`. Versions are numeric counters exposed as
/// strings to mimic object-store generation semantics.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let existing = objects.get(path);
        match (&precondition, existing) {
            (WritePrecondition::DoesNotExist, Some(current)) => {
                return Ok(WriteResult::PreconditionFailed {
                    current_version: Some(current.version.to_string()),
                });
            }
            (WritePrecondition::MatchesVersion(expected), Some(current)) => {
                if current.version.to_string() != *expected {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: Some(current.version.to_string()),
                    });
                }
            }
            (WritePrecondition::MatchesVersion(_), None) => {
                return Ok(WriteResult::PreconditionFailed {
                    current_version: None,
                });
            }
            _ => {}
        }

        let next_version = existing.map_or(1, |o| o.version + 1);
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                version: next_version,
                last_modified: Utc::now(),
            },
        );

        Ok(WriteResult::Success {
            version: next_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        objects.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, o)| ObjectMeta {
                path: path.clone(),
                size: o.data.len() as u64,
                version: o.version.to_string(),
                last_modified: Some(o.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|o| ObjectMeta {
            path: path.to_string(),
            size: o.data.len() as u64,
            version: o.version.to_string(),
            last_modified: Some(o.last_modified),
        }))
    }
}
