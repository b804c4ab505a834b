//! Append-only persistence of actions and versions.
//!
//! The storage-backed implementation keeps three kinds of objects per
//! target:
//!
//! - `registry/{target}/actions/{ulid}.json`: immutable action records
//! - `registry/{target}/versions/{ulid}.json`: immutable version records
//! - `registry/{target}/head.json`: the CAS pointer naming the latest and
//!   latest-composable versions
//!
//! Writes follow the snapshot-then-pointer protocol: action and version
//! records are invisible until the head pointer swings to them, so a lost
//! head CAS means nothing was committed. Per-target ordering is exactly
//! the order of successful head swings.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lattice_core::id::{ActionId, TargetId, VersionId};
use lattice_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use lattice_core::{Error, Result};

use crate::model::{Action, ActionKind, LiveEdge, ProjectKind, Schema, Version};

/// Input for a new action record.
#[derive(Debug, Clone)]
pub struct NewAction {
    /// Who published.
    pub author: String,
    /// Client-supplied revision tag.
    pub commit: String,
    /// What the action does.
    pub kind: ActionKind,
    /// Service name; required for composite projects.
    pub service_name: Option<String>,
    /// Service URL, for federation subgraphs.
    pub service_url: Option<String>,
    /// The published SDL; `None` exactly for deletes.
    pub sdl: Option<String>,
    /// Arbitrary JSON metadata string.
    pub metadata: Option<String>,
}

/// Input for [`VersionStore::create_version`].
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// The target being appended to.
    pub target_id: TargetId,
    /// The project kind, which decides how the live set is maintained.
    pub project_kind: ProjectKind,
    /// The triggering action.
    pub action: NewAction,
    /// Base schema in effect at write time.
    pub base_schema: Option<String>,
    /// Composition status of the resulting version.
    pub is_composable: bool,
}

/// Append-only store of a target's schema history.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Persists an action and its resulting version atomically.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionFailed` when a concurrent publish won
    /// the head pointer race; nothing became visible and the caller may
    /// retry.
    async fn create_version(&self, new: NewVersion) -> Result<Version>;

    /// Shorthand for recording a service deletion.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::create_version`].
    async fn delete_schema(
        &self,
        target_id: TargetId,
        project_kind: ProjectKind,
        service_name: &str,
        is_composable: bool,
        base_schema: Option<String>,
    ) -> Result<Version>;

    /// The newest version of the target, when one exists.
    async fn latest_version(&self, target_id: TargetId) -> Result<Option<Version>>;

    /// The newest composable version of the target, when one exists.
    async fn latest_composable_version(&self, target_id: TargetId) -> Result<Option<Version>>;

    /// The live schema set of a version.
    async fn schemas_of_version(
        &self,
        target_id: TargetId,
        version_id: VersionId,
    ) -> Result<Vec<Schema>>;

    /// The live schema set of the version preceding the given one.
    async fn schemas_of_previous_version(
        &self,
        target_id: TargetId,
        version_id: VersionId,
    ) -> Result<Vec<Schema>>;

    /// Newest-first page of the target's versions.
    async fn list_versions(
        &self,
        target_id: TargetId,
        limit: usize,
        after: Option<VersionId>,
    ) -> Result<Vec<Version>>;

    /// Flips a version's composability flag (legacy registry model only)
    /// and repairs the composable head pointer.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown version.
    async fn update_version_status(
        &self,
        target_id: TargetId,
        version_id: VersionId,
        composable: bool,
    ) -> Result<Version>;

    /// Renames a live service (legacy registry model only).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when the old name is not live or the
    /// new name collides with a live service.
    async fn update_service_name(
        &self,
        target_id: TargetId,
        old_name: &str,
        new_name: &str,
    ) -> Result<()>;
}

/// Per-target head pointer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Head {
    latest: Option<VersionId>,
    latest_composable: Option<VersionId>,
}

/// Storage-backed [`VersionStore`].
#[derive(Clone)]
pub struct ObjectVersionStore {
    storage: Arc<dyn StorageBackend>,
}

impl ObjectVersionStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    fn action_path(target_id: TargetId, action_id: ActionId) -> String {
        format!("registry/{target_id}/actions/{action_id}.json")
    }

    fn version_path(target_id: TargetId, version_id: VersionId) -> String {
        format!("registry/{target_id}/versions/{version_id}.json")
    }

    fn head_path(target_id: TargetId) -> String {
        format!("registry/{target_id}/head.json")
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let data = self.storage.get(path).await?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::serialization(format!("corrupt record at {path}: {e}")))
    }

    /// Reads the head pointer plus its CAS token; `None` when the target
    /// has no history yet.
    async fn read_head(&self, target_id: TargetId) -> Result<Option<(Head, String)>> {
        let path = Self::head_path(target_id);
        match self.storage.get(&path).await {
            Ok(data) => {
                let head: Head = serde_json::from_slice(&data)
                    .map_err(|e| Error::serialization(format!("corrupt head at {path}: {e}")))?;
                let meta = self.storage.head(&path).await?.ok_or_else(|| {
                    Error::storage(format!("head vanished during read: {path}"))
                })?;
                Ok(Some((head, meta.version)))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_snapshot<T: Serialize>(&self, path: &str, record: &T) -> Result<()> {
        let data = serde_json::to_vec(record)
            .map_err(|e| Error::serialization(format!("failed to encode {path}: {e}")))?;
        match self
            .storage
            .put(path, Bytes::from(data), WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { .. } => Ok(()),
            WriteResult::PreconditionFailed { .. } => Err(Error::Internal {
                message: format!("immutable record already exists: {path}"),
            }),
        }
    }

    async fn swing_head(
        &self,
        target_id: TargetId,
        head: &Head,
        token: Option<&str>,
    ) -> Result<()> {
        let path = Self::head_path(target_id);
        let data = serde_json::to_vec(head)
            .map_err(|e| Error::serialization(format!("failed to encode head: {e}")))?;
        let precondition = match token {
            Some(token) => WritePrecondition::MatchesVersion(token.to_string()),
            None => WritePrecondition::DoesNotExist,
        };
        match self.storage.put(&path, Bytes::from(data), precondition).await? {
            WriteResult::Success { .. } => Ok(()),
            WriteResult::PreconditionFailed { .. } => Err(Error::PreconditionFailed {
                message: format!("concurrent publish to target {target_id}"),
            }),
        }
    }

    async fn read_version(&self, target_id: TargetId, version_id: VersionId) -> Result<Version> {
        self.read_json(&Self::version_path(target_id, version_id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::resource_not_found("version", version_id)
                } else {
                    e
                }
            })
    }

    async fn read_action(&self, target_id: TargetId, action_id: ActionId) -> Result<Action> {
        self.read_json(&Self::action_path(target_id, action_id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::resource_not_found("action", action_id)
                } else {
                    e
                }
            })
    }

    fn next_live_edges(
        project_kind: ProjectKind,
        previous: &[LiveEdge],
        action: &Action,
    ) -> Vec<LiveEdge> {
        let new_edge = LiveEdge {
            action_id: action.id,
            service_name: action.service_name.clone(),
        };

        if !project_kind.is_composite() {
            return vec![new_edge];
        }

        let mut edges: Vec<LiveEdge> = previous
            .iter()
            .filter(|edge| edge.service_name != action.service_name)
            .cloned()
            .collect();
        if action.kind != ActionKind::Delete {
            edges.push(new_edge);
        }
        edges
    }
}

#[async_trait]
impl VersionStore for ObjectVersionStore {
    async fn create_version(&self, new: NewVersion) -> Result<Version> {
        let NewVersion {
            target_id,
            project_kind,
            action,
            base_schema,
            is_composable,
        } = new;

        let head_state = self.read_head(target_id).await?;
        let (head, head_token) = match head_state {
            Some((head, token)) => (head, Some(token)),
            None => (Head::default(), None),
        };

        let previous = match head.latest {
            Some(previous_id) => Some(self.read_version(target_id, previous_id).await?),
            None => None,
        };

        let action = Action {
            id: ActionId::generate(),
            author: action.author,
            created_at: Utc::now(),
            commit: action.commit,
            kind: action.kind,
            service_name: action.service_name,
            service_url: action.service_url,
            sdl: action.sdl,
            metadata: action.metadata,
        };

        let previous_edges = previous.as_ref().map_or(&[][..], |v| v.live_edges.as_slice());
        let version = Version {
            id: VersionId::generate(),
            target_id,
            created_at: action.created_at,
            is_composable,
            base_schema,
            action_id: action.id,
            previous_version_id: previous.as_ref().map(|v| v.id),
            live_edges: Self::next_live_edges(project_kind, previous_edges, &action),
        };

        self.write_snapshot(&Self::action_path(target_id, action.id), &action)
            .await?;
        self.write_snapshot(&Self::version_path(target_id, version.id), &version)
            .await?;

        let next_head = Head {
            latest: Some(version.id),
            latest_composable: if is_composable {
                Some(version.id)
            } else {
                head.latest_composable
            },
        };
        self.swing_head(target_id, &next_head, head_token.as_deref())
            .await?;

        tracing::info!(
            target = %target_id,
            version = %version.id,
            action = %action.id,
            kind = ?action.kind,
            service = ?action.service_name,
            composable = is_composable,
            live_services = version.live_edges.len(),
            "version created"
        );

        Ok(version)
    }

    async fn delete_schema(
        &self,
        target_id: TargetId,
        project_kind: ProjectKind,
        service_name: &str,
        is_composable: bool,
        base_schema: Option<String>,
    ) -> Result<Version> {
        self.create_version(NewVersion {
            target_id,
            project_kind,
            action: NewAction {
                author: "unknown".to_string(),
                commit: "unknown".to_string(),
                kind: ActionKind::Delete,
                service_name: Some(service_name.to_string()),
                service_url: None,
                sdl: None,
                metadata: None,
            },
            base_schema,
            is_composable,
        })
        .await
    }

    async fn latest_version(&self, target_id: TargetId) -> Result<Option<Version>> {
        match self.read_head(target_id).await? {
            Some((Head { latest: Some(id), .. }, _)) => {
                Ok(Some(self.read_version(target_id, id).await?))
            }
            _ => Ok(None),
        }
    }

    async fn latest_composable_version(&self, target_id: TargetId) -> Result<Option<Version>> {
        match self.read_head(target_id).await? {
            Some((
                Head {
                    latest_composable: Some(id),
                    ..
                },
                _,
            )) => Ok(Some(self.read_version(target_id, id).await?)),
            _ => Ok(None),
        }
    }

    async fn schemas_of_version(
        &self,
        target_id: TargetId,
        version_id: VersionId,
    ) -> Result<Vec<Schema>> {
        let version = self.read_version(target_id, version_id).await?;
        let mut schemas = Vec::with_capacity(version.live_edges.len());
        for edge in &version.live_edges {
            let action = self.read_action(target_id, edge.action_id).await?;
            schemas.push(Schema::from_action(&action));
        }
        Ok(schemas)
    }

    async fn schemas_of_previous_version(
        &self,
        target_id: TargetId,
        version_id: VersionId,
    ) -> Result<Vec<Schema>> {
        let version = self.read_version(target_id, version_id).await?;
        match version.previous_version_id {
            Some(previous_id) => self.schemas_of_version(target_id, previous_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn list_versions(
        &self,
        target_id: TargetId,
        limit: usize,
        after: Option<VersionId>,
    ) -> Result<Vec<Version>> {
        let prefix = format!("registry/{target_id}/versions/");
        let mut listed = self.storage.list(&prefix).await?;
        // ULID-named records: path order is creation order.
        listed.sort_by(|a, b| b.path.cmp(&a.path));

        let after_path = after.map(|id| Self::version_path(target_id, id));
        let mut versions = Vec::new();
        for meta in listed {
            if let Some(boundary) = &after_path {
                if meta.path >= *boundary {
                    continue;
                }
            }
            if versions.len() >= limit {
                break;
            }
            versions.push(self.read_json::<Version>(&meta.path).await?);
        }
        Ok(versions)
    }

    async fn update_version_status(
        &self,
        target_id: TargetId,
        version_id: VersionId,
        composable: bool,
    ) -> Result<Version> {
        let mut version = self.read_version(target_id, version_id).await?;
        if version.is_composable == composable {
            return Ok(version);
        }
        version.is_composable = composable;

        let path = Self::version_path(target_id, version_id);
        let data = serde_json::to_vec(&version)
            .map_err(|e| Error::serialization(format!("failed to encode version: {e}")))?;
        self.storage
            .put(&path, Bytes::from(data), WritePrecondition::None)
            .await?;

        let Some((mut head, token)) = self.read_head(target_id).await? else {
            return Ok(version);
        };

        if composable {
            if head.latest_composable.map_or(true, |current| current < version_id) {
                head.latest_composable = Some(version_id);
                self.swing_head(target_id, &head, Some(&token)).await?;
            }
        } else if head.latest_composable == Some(version_id) {
            // Walk back to the newest version that is still composable.
            let mut replacement = None;
            let mut cursor = version.previous_version_id;
            while let Some(id) = cursor {
                let candidate = self.read_version(target_id, id).await?;
                if candidate.is_composable {
                    replacement = Some(id);
                    break;
                }
                cursor = candidate.previous_version_id;
            }
            head.latest_composable = replacement;
            self.swing_head(target_id, &head, Some(&token)).await?;
        }

        Ok(version)
    }

    async fn update_service_name(
        &self,
        target_id: TargetId,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let Some(latest) = self.latest_version(target_id).await? else {
            return Err(Error::InvalidInput(format!(
                "target {target_id} has no versions"
            )));
        };

        if latest
            .live_edges
            .iter()
            .any(|edge| edge.service_name.as_deref() == Some(new_name))
        {
            return Err(Error::InvalidInput(format!(
                "service '{new_name}' already exists"
            )));
        }

        let edge = latest
            .live_edges
            .iter()
            .find(|edge| edge.service_name.as_deref() == Some(old_name))
            .ok_or_else(|| Error::InvalidInput(format!("service '{old_name}' not found")))?;

        let mut action = self.read_action(target_id, edge.action_id).await?;
        action.service_name = Some(new_name.to_string());
        let action_data = serde_json::to_vec(&action)
            .map_err(|e| Error::serialization(format!("failed to encode action: {e}")))?;
        self.storage
            .put(
                &Self::action_path(target_id, action.id),
                Bytes::from(action_data),
                WritePrecondition::None,
            )
            .await?;

        let mut updated = latest.clone();
        for edge in &mut updated.live_edges {
            if edge.service_name.as_deref() == Some(old_name) {
                edge.service_name = Some(new_name.to_string());
            }
        }
        let version_data = serde_json::to_vec(&updated)
            .map_err(|e| Error::serialization(format!("failed to encode version: {e}")))?;
        self.storage
            .put(
                &Self::version_path(target_id, updated.id),
                Bytes::from(version_data),
                WritePrecondition::None,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::storage::MemoryBackend;

    fn store() -> ObjectVersionStore {
        ObjectVersionStore::new(Arc::new(MemoryBackend::new()))
    }

    fn add_action(service: &str, sdl: &str) -> NewAction {
        NewAction {
            author: "dev".into(),
            commit: "c1".into(),
            kind: ActionKind::Add,
            service_name: Some(service.into()),
            service_url: Some(format!("https://{service}.example/graphql")),
            sdl: Some(sdl.into()),
            metadata: None,
        }
    }

    async fn publish(
        store: &ObjectVersionStore,
        target: TargetId,
        action: NewAction,
        composable: bool,
    ) -> Version {
        store
            .create_version(NewVersion {
                target_id: target,
                project_kind: ProjectKind::Federation,
                action,
                base_schema: None,
                is_composable: composable,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_target_has_no_versions() {
        let store = store();
        let target = TargetId::generate();
        assert!(store.latest_version(target).await.unwrap().is_none());
        assert!(store
            .latest_composable_version(target)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn first_publish_becomes_latest_and_composable() {
        let store = store();
        let target = TargetId::generate();
        let version = publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;

        let latest = store.latest_version(target).await.unwrap().unwrap();
        assert_eq!(latest.id, version.id);
        let composable = store.latest_composable_version(target).await.unwrap().unwrap();
        assert_eq!(composable.id, version.id);
        assert_eq!(latest.live_edges.len(), 1);
    }

    #[tokio::test]
    async fn modify_replaces_same_named_service() {
        let store = store();
        let target = TargetId::generate();
        publish(&store, target, add_action("reviews", "type Query { a: ID }"), true).await;

        let mut second = add_action("reviews", "type Query { b: ID }");
        second.kind = ActionKind::Modify;
        let version = publish(&store, target, second, true).await;

        assert_eq!(version.live_edges.len(), 1);
        let schemas = store.schemas_of_version(target, version.id).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].sdl(), Some("type Query { b: ID }"));
        assert_eq!(version.action_id, schemas[0].action_id());
    }

    #[tokio::test]
    async fn delete_removes_service_from_live_set() {
        let store = store();
        let target = TargetId::generate();
        publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;
        publish(&store, target, add_action("pong", "type Query { pong: String }"), true).await;

        let version = store
            .delete_schema(target, ProjectKind::Federation, "ping", true, None)
            .await
            .unwrap();

        assert_eq!(version.live_edges.len(), 1);
        let schemas = store.schemas_of_version(target, version.id).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].service_name(), Some("pong"));

        // The delete action itself is recorded but not live.
        let delete_action = store.read_action(target, version.action_id).await.unwrap();
        assert_eq!(delete_action.kind, ActionKind::Delete);
        assert_eq!(delete_action.author, "unknown");
        assert!(delete_action.sdl.is_none());
    }

    #[tokio::test]
    async fn non_composable_version_does_not_advance_composable_head() {
        let store = store();
        let target = TargetId::generate();
        let good = publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;
        let bad = publish(&store, target, add_action("pong", "type Query { pong: String }"), false).await;

        let latest = store.latest_version(target).await.unwrap().unwrap();
        assert_eq!(latest.id, bad.id);
        let composable = store.latest_composable_version(target).await.unwrap().unwrap();
        assert_eq!(composable.id, good.id);
    }

    #[tokio::test]
    async fn single_project_live_set_is_always_one() {
        let store = store();
        let target = TargetId::generate();
        for i in 0..3 {
            store
                .create_version(NewVersion {
                    target_id: target,
                    project_kind: ProjectKind::Single,
                    action: NewAction {
                        author: "dev".into(),
                        commit: format!("c{i}"),
                        kind: ActionKind::NotApplicable,
                        service_name: None,
                        service_url: None,
                        sdl: Some(format!("type Query {{ v{i}: ID }}")),
                        metadata: None,
                    },
                    base_schema: None,
                    is_composable: true,
                })
                .await
                .unwrap();
        }

        let latest = store.latest_version(target).await.unwrap().unwrap();
        assert_eq!(latest.live_edges.len(), 1);
    }

    #[tokio::test]
    async fn schemas_of_previous_version() {
        let store = store();
        let target = TargetId::generate();
        publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;
        let second = publish(&store, target, add_action("pong", "type Query { pong: String }"), true).await;

        let previous = store
            .schemas_of_previous_version(target, second.id)
            .await
            .unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].service_name(), Some("ping"));
    }

    #[tokio::test]
    async fn list_versions_pages_newest_first() {
        let store = store();
        let target = TargetId::generate();
        let mut ids = Vec::new();
        for i in 0..5 {
            let version = publish(
                &store,
                target,
                add_action(&format!("svc{i}"), "type Query { x: ID }"),
                true,
            )
            .await;
            ids.push(version.id);
        }

        let page = store.list_versions(target, 2, None).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[4]);
        assert_eq!(page[1].id, ids[3]);

        let next = store
            .list_versions(target, 10, Some(page[1].id))
            .await
            .unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0].id, ids[2]);
    }

    #[tokio::test]
    async fn update_version_status_flips_and_repairs_head() {
        let store = store();
        let target = TargetId::generate();
        let first = publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;
        let second = publish(&store, target, add_action("pong", "type Query { pong: String }"), true).await;

        // Flip the latest to non-composable: the composable head walks back.
        store
            .update_version_status(target, second.id, false)
            .await
            .unwrap();
        let composable = store.latest_composable_version(target).await.unwrap().unwrap();
        assert_eq!(composable.id, first.id);

        // Flip it back: the composable head advances again.
        store
            .update_version_status(target, second.id, true)
            .await
            .unwrap();
        let composable = store.latest_composable_version(target).await.unwrap().unwrap();
        assert_eq!(composable.id, second.id);
    }

    #[tokio::test]
    async fn update_service_name_rejects_collisions() {
        let store = store();
        let target = TargetId::generate();
        publish(&store, target, add_action("ping", "type Query { ping: String }"), true).await;
        publish(&store, target, add_action("pong", "type Query { pong: String }"), true).await;

        let err = store
            .update_service_name(target, "ping", "pong")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        store
            .update_service_name(target, "ping", "gateway")
            .await
            .unwrap();
        let latest = store.latest_version(target).await.unwrap().unwrap();
        let schemas = store.schemas_of_version(target, latest.id).await.unwrap();
        let names: Vec<_> = schemas.iter().filter_map(Schema::service_name).collect();
        assert!(names.contains(&"gateway"));
        assert!(!names.contains(&"ping"));
    }
}
