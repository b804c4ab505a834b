//! At-most-once execution keyed by a caller-supplied fingerprint.
//!
//! A durable marker in the shared store goes through `InProgress` →
//! `Completed`/`Failed`. The claim is a `DoesNotExist` CAS write: exactly
//! one caller wins and executes; everyone else polls the marker and
//! returns the cached serialized outcome. Errors are cached for the TTL
//! window too. Stale `InProgress` markers (a crashed winner) are taken
//! over after the TTL.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lattice_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use lattice_core::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Status of an idempotency marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum MarkerStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Marker {
    status: MarkerStatus,
    identifier_hash: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Marker {
    fn in_progress(identifier_hash: String) -> Self {
        Self {
            status: MarkerStatus::InProgress,
            identifier_hash,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            error: None,
        }
    }

    fn completed(mut self, result: serde_json::Value) -> Self {
        self.status = MarkerStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
        self.error = None;
        self
    }

    fn failed(mut self, error: String) -> Self {
        self.status = MarkerStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.result = None;
        self.error = Some(error);
        self
    }

    /// A marker is expired when its defining instant (start for
    /// `InProgress`, finish otherwise) is older than the TTL.
    fn is_expired(&self, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let reference = match self.status {
            MarkerStatus::InProgress => self.started_at,
            MarkerStatus::Completed | MarkerStatus::Failed => {
                self.finished_at.unwrap_or(self.started_at)
            }
        };
        reference + ttl < Utc::now()
    }
}

/// At-most-once execution wrapper over the shared store.
#[derive(Clone)]
pub struct IdempotencyRunner {
    storage: Arc<dyn StorageBackend>,
}

impl IdempotencyRunner {
    /// Creates a runner over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    fn hash_identifier(identifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn marker_path(identifier_hash: &str) -> String {
        let prefix = &identifier_hash[..2.min(identifier_hash.len())];
        format!("idempotency/{prefix}/{identifier_hash}.json")
    }

    /// Runs `executor` at most once per `identifier` within `ttl`.
    ///
    /// Duplicate callers (concurrent or within the TTL) observe the
    /// winner's cached outcome, success or failure alike.
    ///
    /// # Errors
    ///
    /// Returns the executor's error (possibly replayed from the cache) or
    /// a storage error from the marker protocol itself.
    pub async fn run<T, F, Fut>(&self, identifier: &str, ttl: Duration, executor: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let identifier_hash = Self::hash_identifier(identifier);
        let path = Self::marker_path(&identifier_hash);

        let mut executor = Some(executor);
        // One initial claim attempt plus bounded retries after takeovers
        // and finalization races.
        for _ in 0..3 {
            let marker = Marker::in_progress(identifier_hash.clone());
            let claim = self
                .storage
                .put(
                    &path,
                    marker_bytes(&marker)?,
                    WritePrecondition::DoesNotExist,
                )
                .await?;

            match claim {
                WriteResult::Success { version } => {
                    let Some(executor) = executor.take() else {
                        return Err(Error::Internal {
                            message: "idempotent executor consumed twice".into(),
                        });
                    };
                    return self.execute(&path, marker, &version, executor).await;
                }
                WriteResult::PreconditionFailed { .. } => {
                    match self.await_existing::<T>(&path, ttl).await? {
                        Awaited::Outcome(outcome) => {
                            metrics::counter!("lattice_idempotency_replays_total").increment(1);
                            return outcome;
                        }
                        Awaited::TakeOver { current_version } => {
                            let marker = Marker::in_progress(identifier_hash.clone());
                            let takeover = self
                                .storage
                                .put(
                                    &path,
                                    marker_bytes(&marker)?,
                                    WritePrecondition::MatchesVersion(current_version),
                                )
                                .await?;
                            if let WriteResult::Success { version } = takeover {
                                let Some(executor) = executor.take() else {
                                    return Err(Error::Internal {
                                        message: "idempotent executor consumed twice".into(),
                                    });
                                };
                                return self.execute(&path, marker, &version, executor).await;
                            }
                            // Lost the takeover race; loop and wait again.
                        }
                        Awaited::Vanished => {
                            // Marker expired and was deleted; claim again.
                        }
                    }
                }
            }
        }

        Err(Error::Internal {
            message: format!("idempotent execution for '{identifier}' did not settle"),
        })
    }

    async fn execute<T, F, Fut>(
        &self,
        path: &str,
        marker: Marker,
        claim_version: &str,
        executor: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match executor().await {
            Ok(value) => {
                let result = serde_json::to_value(&value)
                    .map_err(|e| Error::serialization(format!("failed to cache result: {e}")))?;
                let finalized = marker.completed(result);
                self.finalize(path, &finalized, claim_version).await;
                Ok(value)
            }
            Err(e) => {
                let finalized = marker.failed(e.to_string());
                self.finalize(path, &finalized, claim_version).await;
                Err(e)
            }
        }
    }

    /// Finalization is best effort: losing the marker CAS (a takeover
    /// happened meanwhile) must not fail the already-produced outcome.
    async fn finalize(&self, path: &str, marker: &Marker, claim_version: &str) {
        let Ok(data) = marker_bytes(marker) else {
            return;
        };
        match self
            .storage
            .put(
                path,
                data,
                WritePrecondition::MatchesVersion(claim_version.to_string()),
            )
            .await
        {
            Ok(WriteResult::Success { .. }) => {}
            Ok(WriteResult::PreconditionFailed { .. }) => {
                tracing::warn!(path, "idempotency marker was taken over during execution");
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to finalize idempotency marker");
            }
        }
    }

    async fn await_existing<T: DeserializeOwned>(
        &self,
        path: &str,
        ttl: Duration,
    ) -> Result<Awaited<T>> {
        // Bound the wait: a healthy winner finishes well within the TTL.
        let deadline = tokio::time::Instant::now() + ttl + Duration::from_secs(5);
        loop {
            let data = match self.storage.get(path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => return Ok(Awaited::Vanished),
                Err(e) => return Err(e),
            };
            let marker: Marker = serde_json::from_slice(&data)
                .map_err(|e| Error::serialization(format!("corrupt idempotency marker: {e}")))?;

            if marker.is_expired(ttl) {
                let meta = self.storage.head(path).await?;
                let Some(meta) = meta else {
                    return Ok(Awaited::Vanished);
                };
                return Ok(Awaited::TakeOver {
                    current_version: meta.version,
                });
            }

            match marker.status {
                MarkerStatus::Completed => {
                    let result = marker.result.unwrap_or(serde_json::Value::Null);
                    let value = serde_json::from_value(result).map_err(|e| {
                        Error::serialization(format!("corrupt cached result: {e}"))
                    })?;
                    return Ok(Awaited::Outcome(Ok(value)));
                }
                MarkerStatus::Failed => {
                    let message = marker
                        .error
                        .unwrap_or_else(|| "unknown cached failure".to_string());
                    return Ok(Awaited::Outcome(Err(Error::Internal { message })));
                }
                MarkerStatus::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::Internal {
                            message: "timed out waiting for idempotent execution".into(),
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

enum Awaited<T> {
    Outcome(Result<T>),
    TakeOver { current_version: String },
    Vanished,
}

fn marker_bytes(marker: &Marker) -> Result<Bytes> {
    serde_json::to_vec(marker)
        .map(Bytes::from)
        .map_err(|e| Error::serialization(format!("failed to encode idempotency marker: {e}")))
}
