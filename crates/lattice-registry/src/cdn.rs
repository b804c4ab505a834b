//! CDN artifact publication.
//!
//! Three named resources exist per target: `schema`, `metadata` and
//! `supergraph`. The CDN is eventually consistent and never a source of
//! truth; upload failures are logged and do not roll back the already
//! durable version. The next `sync` reconciles.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use lattice_core::id::TargetId;
use lattice_core::storage::{StorageBackend, WritePrecondition};
use lattice_core::Result;

use crate::model::Schema;

/// The named artifacts served per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdnResource {
    /// The SDL list (or single SDL object).
    Schema,
    /// Merged schema metadata.
    Metadata,
    /// The federation supergraph.
    Supergraph,
}

impl CdnResource {
    /// The stored object name for the resource.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Schema => "schema.json",
            Self::Metadata => "metadata.json",
            Self::Supergraph => "supergraph.graphql",
        }
    }
}

/// The write side of the content-delivery layer.
#[async_trait]
pub trait CdnStore: Send + Sync {
    /// Uploads one resource value for a target.
    async fn publish(&self, target_id: TargetId, resource: CdnResource, value: String)
        -> Result<()>;
}

/// CDN store backed by the shared object storage.
///
/// The edge service serves `registry/{target}/cdn/*` under the documented
/// read contract (`GET /schema|/supergraph|/metadata` with
/// `X-Hive-CDN-Key`).
#[derive(Clone)]
pub struct StorageCdnStore {
    storage: Arc<dyn StorageBackend>,
}

impl StorageCdnStore {
    /// Creates a CDN store over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// The storage path of a resource; shared with tests and the edge
    /// service configuration.
    #[must_use]
    pub fn resource_path(target_id: TargetId, resource: CdnResource) -> String {
        format!("registry/{target_id}/cdn/{}", resource.file_name())
    }
}

#[async_trait]
impl CdnStore for StorageCdnStore {
    async fn publish(
        &self,
        target_id: TargetId,
        resource: CdnResource,
        value: String,
    ) -> Result<()> {
        let path = Self::resource_path(target_id, resource);
        self.storage
            .put(&path, Bytes::from(value), WritePrecondition::None)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SchemaEntry<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    sdl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    date: chrono::DateTime<chrono::Utc>,
}

/// Uploads a version's artifacts to the CDN, best effort.
#[derive(Clone)]
pub struct CdnPublisher {
    store: Arc<dyn CdnStore>,
}

impl CdnPublisher {
    /// Creates a publisher over the given CDN store.
    #[must_use]
    pub fn new(store: Arc<dyn CdnStore>) -> Self {
        Self { store }
    }

    /// Publishes the schema list, metadata and optional supergraph.
    ///
    /// Failures are logged and counted, never propagated: the version is
    /// already durable and `sync` reconciles the CDN later.
    pub async fn publish_artifacts(
        &self,
        target_id: TargetId,
        schemas: &[Schema],
        supergraph: Option<&str>,
    ) {
        if let Some(value) = schema_payload(schemas) {
            self.upload(target_id, CdnResource::Schema, value).await;
        }
        if let Some(value) = metadata_payload(schemas) {
            self.upload(target_id, CdnResource::Metadata, value).await;
        }
        if let Some(supergraph) = supergraph {
            self.upload(target_id, CdnResource::Supergraph, supergraph.to_string())
                .await;
        }
    }

    async fn upload(&self, target_id: TargetId, resource: CdnResource, value: String) {
        match self.store.publish(target_id, resource, value).await {
            Ok(()) => {
                tracing::debug!(target = %target_id, resource = ?resource, "cdn resource published");
            }
            Err(e) => {
                metrics::counter!("lattice_cdn_publish_failures_total").increment(1);
                tracing::error!(
                    target = %target_id,
                    resource = ?resource,
                    error = %e,
                    "cdn publish failed; will be reconciled by sync"
                );
            }
        }
    }
}

fn schema_payload(schemas: &[Schema]) -> Option<String> {
    let live: Vec<&Schema> = schemas.iter().filter(|s| s.sdl().is_some()).collect();
    match live.as_slice() {
        [] => None,
        [only] if only.service_name().is_none() => {
            let entry = SchemaEntry {
                name: None,
                sdl: only.sdl().unwrap_or_default(),
                url: None,
                date: only.date(),
            };
            serde_json::to_string(&entry).ok()
        }
        many => {
            let entries: Vec<SchemaEntry<'_>> = many
                .iter()
                .map(|schema| SchemaEntry {
                    name: schema.service_name(),
                    sdl: schema.sdl().unwrap_or_default(),
                    url: schema.service_url(),
                    date: schema.date(),
                })
                .collect();
            serde_json::to_string(&entries).ok()
        }
    }
}

fn metadata_payload(schemas: &[Schema]) -> Option<String> {
    let mut values: Vec<Value> = Vec::new();
    for schema in schemas {
        let Some(metadata) = schema.metadata() else {
            continue;
        };
        match serde_json::from_str::<Value>(metadata) {
            Ok(value) => values.push(value),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparseable schema metadata");
            }
        }
    }

    match values.len() {
        0 => None,
        1 => serde_json::to_string(&values[0]).ok(),
        _ => serde_json::to_string(&values).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lattice_core::id::ActionId;
    use lattice_core::storage::MemoryBackend;

    fn single(sdl: &str) -> Schema {
        Schema::Single {
            action_id: ActionId::generate(),
            sdl: sdl.to_string(),
            metadata: Some(r#"{"owner":"platform"}"#.to_string()),
            date: Utc::now(),
        }
    }

    fn composite(name: &str, sdl: &str) -> Schema {
        Schema::AddedComposite {
            action_id: ActionId::generate(),
            service_name: name.to_string(),
            service_url: Some(format!("https://{name}.example/graphql")),
            sdl: sdl.to_string(),
            metadata: None,
            date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn single_schema_publishes_an_object() {
        let backend = Arc::new(MemoryBackend::new());
        let publisher = CdnPublisher::new(Arc::new(StorageCdnStore::new(backend.clone())));
        let target = TargetId::generate();

        publisher
            .publish_artifacts(target, &[single("type Query { ping: String }")], None)
            .await;

        let stored = backend
            .get(&StorageCdnStore::resource_path(target, CdnResource::Schema))
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&stored).unwrap();
        assert!(value.is_object());
        assert_eq!(value["sdl"], "type Query { ping: String }");
    }

    #[tokio::test]
    async fn composite_schemas_publish_an_array() {
        let backend = Arc::new(MemoryBackend::new());
        let publisher = CdnPublisher::new(Arc::new(StorageCdnStore::new(backend.clone())));
        let target = TargetId::generate();

        publisher
            .publish_artifacts(
                target,
                &[
                    composite("ping", "type Query { ping: String }"),
                    composite("pong", "type Query { pong: String }"),
                ],
                Some("supergraph sdl"),
            )
            .await;

        let stored = backend
            .get(&StorageCdnStore::resource_path(target, CdnResource::Schema))
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&stored).unwrap();
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 2);

        let supergraph = backend
            .get(&StorageCdnStore::resource_path(
                target,
                CdnResource::Supergraph,
            ))
            .await
            .unwrap();
        assert_eq!(supergraph, Bytes::from_static(b"supergraph sdl"));
    }

    #[tokio::test]
    async fn metadata_single_value_is_not_wrapped() {
        let backend = Arc::new(MemoryBackend::new());
        let publisher = CdnPublisher::new(Arc::new(StorageCdnStore::new(backend.clone())));
        let target = TargetId::generate();

        publisher
            .publish_artifacts(target, &[single("type Query { ping: String }")], None)
            .await;

        let stored = backend
            .get(&StorageCdnStore::resource_path(target, CdnResource::Metadata))
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(value["owner"], "platform");
    }

    #[tokio::test]
    async fn no_metadata_publishes_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let publisher = CdnPublisher::new(Arc::new(StorageCdnStore::new(backend.clone())));
        let target = TargetId::generate();

        publisher
            .publish_artifacts(target, &[composite("ping", "type Query { ping: String }")], None)
            .await;

        let missing = backend
            .get(&StorageCdnStore::resource_path(target, CdnResource::Metadata))
            .await;
        assert!(missing.is_err());
    }
}
