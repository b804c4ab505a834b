//! The schema lifecycle coordinator.
//!
//! Public entrypoint of the registry: authorizes the caller, loads state,
//! dispatches to the project-type model, materializes accepted versions in
//! the store, fans artifacts out to the CDN and wraps `publish` in the
//! idempotency barrier.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lattice_core::audit::{AuditAction, AuditEvent};
use lattice_core::id::{TargetId, VersionId};
use lattice_core::{Error, Result};
use lattice_schema::{
    Change, CustomOrchestrator, Orchestrator, SchemaError, SingleOrchestrator,
    StitchingOrchestrator,
};

use crate::cdn::CdnPublisher;
use crate::directory::RegistryDirectory;
use crate::idempotency::IdempotencyRunner;
use crate::model::{schema_inputs, Organization, Project, ProjectKind, Schema, Target, Version};
use crate::models::{
    CheckInput, CompositeModel, DeleteInput, DeleteOutcome, ModelContext, PublishInput,
    PublishOutcome, SingleModel,
};
use crate::store::{NewVersion, VersionStore};

/// TTL of the publish idempotency window.
const PUBLISH_IDEMPOTENCY_TTL: Duration = Duration::from_secs(60);

/// Scopes guarding registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryScope {
    /// Read schema history and run checks.
    RegistryRead,
    /// Publish and delete schemas.
    RegistryWrite,
}

impl RegistryScope {
    /// The scope literal used in tokens and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegistryRead => "target:registry:read",
            Self::RegistryWrite => "target:registry:write",
        }
    }
}

impl fmt::Display for RegistryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a registry operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Fingerprint of the presented token; safe for logs and audit.
    pub token_fingerprint: String,
    /// Scopes resolved from the token.
    pub scopes: HashSet<RegistryScope>,
    /// Request id propagated from the inbound request.
    pub request_id: String,
}

impl RequestContext {
    /// Creates a request context.
    #[must_use]
    pub fn new(
        token_fingerprint: impl Into<String>,
        scopes: HashSet<RegistryScope>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            token_fingerprint: token_fingerprint.into(),
            scopes,
            request_id: request_id.into(),
        }
    }

    fn authorize(&self, scope: RegistryScope, target_id: TargetId) -> Result<()> {
        if self.scopes.contains(&scope) {
            return Ok(());
        }

        if let Ok(event) = AuditEvent::builder()
            .action(AuditAction::AuthDeny)
            .actor(&self.token_fingerprint)
            .target(target_id.to_string())
            .decision_reason(format!("missing_scope:{scope}"))
            .try_build()
        {
            event.emit();
        }
        Err(Error::permission_denied(scope))
    }
}

/// Response to a publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaPublishPayload {
    /// The publish was recorded (or was a noop).
    Success {
        /// True for the target's first version.
        initial: bool,
        /// Composability of the recorded version.
        valid: bool,
        /// Classified changes against the previous version.
        changes: Vec<Change>,
    },
    /// The publish was rejected.
    Error {
        /// Why.
        errors: Vec<SchemaError>,
        /// Classified changes, for context.
        changes: Vec<Change>,
    },
    /// Composite projects require a service name.
    MissingServiceName {
        /// Fixed message.
        message: String,
    },
    /// Federation projects require a service URL.
    MissingServiceUrl {
        /// Fixed message.
        message: String,
    },
    /// GitHub-shaped success.
    GitHubSuccess {
        /// Check-run summary line.
        message: String,
    },
    /// GitHub-shaped failure.
    GitHubError {
        /// Check-run summary line.
        message: String,
    },
}

/// Response to a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaCheckPayload {
    /// The change is admissible.
    Success {
        /// Always true; kept for payload parity.
        valid: bool,
        /// True when the target has no live schemas.
        initial: bool,
        /// Classified changes.
        changes: Vec<Change>,
    },
    /// The change is not admissible.
    Error {
        /// Why.
        errors: Vec<SchemaError>,
        /// Classified changes.
        changes: Vec<Change>,
    },
    /// GitHub-shaped success.
    GitHubSuccess {
        /// Check-run summary line.
        message: String,
    },
    /// GitHub-shaped failure.
    GitHubError {
        /// Check-run summary line.
        message: String,
    },
}

/// The retired service, on a successful delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedSchema {
    /// Name of the deleted service.
    pub service_name: String,
}

/// Response to a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDeleteResult {
    /// The deleted service, on success.
    pub ok: Option<DeletedSchema>,
    /// The rejection reasons, on failure.
    pub errors: Option<Vec<SchemaError>>,
}

/// The orchestrator for every project kind.
pub struct OrchestratorSet {
    single: SingleOrchestrator,
    stitching: StitchingOrchestrator,
    federation: Arc<dyn Orchestrator>,
    custom: CustomOrchestrator,
}

impl OrchestratorSet {
    /// Creates a set with the given federation orchestrator.
    #[must_use]
    pub fn new(federation: Arc<dyn Orchestrator>) -> Self {
        Self {
            single: SingleOrchestrator,
            stitching: StitchingOrchestrator,
            federation,
            custom: CustomOrchestrator::new(),
        }
    }

    fn for_kind(&self, kind: ProjectKind) -> &dyn Orchestrator {
        match kind {
            ProjectKind::Single => &self.single,
            ProjectKind::Stitching => &self.stitching,
            ProjectKind::Federation => self.federation.as_ref(),
            ProjectKind::Custom => &self.custom,
        }
    }
}

struct LoadedState {
    project: Project,
    target: Target,
    #[allow(dead_code)]
    organization: Organization,
    latest: Option<Version>,
    schemas: Vec<Schema>,
}

/// The schema lifecycle coordinator.
pub struct SchemaLifecycleCoordinator {
    directory: Arc<dyn RegistryDirectory>,
    store: Arc<dyn VersionStore>,
    cdn: CdnPublisher,
    idempotency: IdempotencyRunner,
    orchestrators: OrchestratorSet,
}

impl SchemaLifecycleCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        directory: Arc<dyn RegistryDirectory>,
        store: Arc<dyn VersionStore>,
        cdn: CdnPublisher,
        idempotency: IdempotencyRunner,
        orchestrators: OrchestratorSet,
    ) -> Self {
        Self {
            directory,
            store,
            cdn,
            idempotency,
            orchestrators,
        }
    }

    async fn load_state(&self, target_id: TargetId) -> Result<LoadedState> {
        let target = self.directory.target(target_id).await?;
        let (project, organization, latest) = tokio::try_join!(
            self.directory.project(target.project_id),
            self.directory.organization(target.organization_id),
            self.store.latest_version(target_id),
        )?;
        let schemas = match &latest {
            Some(version) => self.store.schemas_of_version(target_id, version.id).await?,
            None => Vec::new(),
        };
        Ok(LoadedState {
            project,
            target,
            organization,
            latest,
            schemas,
        })
    }

    /// Publishes a schema revision.
    ///
    /// Wrapped in the idempotency barrier: concurrent or repeated calls
    /// with the same checksum observe one execution and one outcome.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization failures, storage failures and
    /// idempotency-protocol failures; all of these are safe to retry with
    /// the same checksum.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        input: PublishInput,
    ) -> Result<SchemaPublishPayload> {
        let checksum = input
            .checksum
            .clone()
            .unwrap_or_else(|| derive_checksum(&input));
        let identifier = format!("schema:publish:{checksum}");

        self.idempotency
            .run(&identifier, PUBLISH_IDEMPOTENCY_TTL, || {
                self.publish_inner(ctx, target_id, input)
            })
            .await
    }

    async fn publish_inner(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        input: PublishInput,
    ) -> Result<SchemaPublishPayload> {
        ctx.authorize(RegistryScope::RegistryWrite, target_id)?;
        let state = self.load_state(target_id).await?;
        let config = state.project.orchestrator_config();
        let model_ctx = ModelContext {
            orchestrator: self.orchestrators.for_kind(state.project.kind),
            config: &config,
            project: &state.project,
            target: &state.target,
        };

        let outcome = if state.project.kind.is_composite() {
            CompositeModel::publish(&model_ctx, &input, &state.schemas, state.latest.as_ref()).await
        } else {
            SingleModel::publish(&model_ctx, &input, &state.schemas, state.latest.as_ref()).await
        };

        match outcome {
            PublishOutcome::Neutral => {
                tracing::debug!(target = %target_id, request_id = %ctx.request_id, "publish is a noop");
                Ok(shape_publish_success(
                    input.github,
                    false,
                    true,
                    Vec::new(),
                ))
            }
            PublishOutcome::Publish(decision) => {
                let base_schema = if state.project.kind.supports_base_schema() {
                    state.target.base_schema.clone()
                } else {
                    None
                };
                let version = self
                    .store
                    .create_version(NewVersion {
                        target_id,
                        project_kind: state.project.kind,
                        action: decision.action,
                        base_schema,
                        is_composable: decision.version_composable,
                    })
                    .await?;

                if decision.version_composable {
                    self.publish_version_artifacts(
                        target_id,
                        version.id,
                        decision.supergraph.as_deref(),
                    )
                    .await;
                }

                metrics::counter!("lattice_publish_total").increment(1);
                self.audit(
                    ctx,
                    AuditAction::SchemaPublish,
                    target_id,
                    None,
                    if decision.version_composable {
                        "composable"
                    } else {
                        "forced_non_composable"
                    },
                );

                Ok(shape_publish_success(
                    input.github,
                    decision.is_initial,
                    decision.version_composable,
                    decision.validation.changes,
                ))
            }
            PublishOutcome::Reject { errors, changes } => {
                metrics::counter!("lattice_publish_rejected_total").increment(1);
                self.audit(
                    ctx,
                    AuditAction::SchemaPublishDeny,
                    target_id,
                    None,
                    "rejected",
                );
                if input.github {
                    Ok(SchemaPublishPayload::GitHubError {
                        message: join_errors(&errors),
                    })
                } else {
                    Ok(SchemaPublishPayload::Error { errors, changes })
                }
            }
            PublishOutcome::MissingServiceName => Ok(SchemaPublishPayload::MissingServiceName {
                message: "Missing service name".to_string(),
            }),
            PublishOutcome::MissingServiceUrl => Ok(SchemaPublishPayload::MissingServiceUrl {
                message: "Missing service url".to_string(),
            }),
        }
    }

    /// Dry-runs a schema change. Read-only: no writes, no CDN, no
    /// idempotency barrier.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization and load failures.
    pub async fn check(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        input: CheckInput,
    ) -> Result<SchemaCheckPayload> {
        ctx.authorize(RegistryScope::RegistryRead, target_id)?;
        let state = self.load_state(target_id).await?;
        let config = state.project.orchestrator_config();
        let model_ctx = ModelContext {
            orchestrator: self.orchestrators.for_kind(state.project.kind),
            config: &config,
            project: &state.project,
            target: &state.target,
        };

        let check = if state.project.kind.is_composite() {
            let Some(service_name) = input
                .service_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
            else {
                return Ok(SchemaCheckPayload::Error {
                    errors: vec![SchemaError::new("Missing service name")],
                    changes: Vec::new(),
                });
            };
            CompositeModel::check(
                &model_ctx,
                service_name,
                &input.sdl,
                None,
                false,
                &state.schemas,
            )
            .await
        } else {
            SingleModel::check(&model_ctx, &input.sdl, false, &state.schemas).await
        };

        let validation = check.validation;
        if validation.errors.is_empty() {
            if input.github {
                Ok(SchemaCheckPayload::GitHubSuccess {
                    message: format!("No breaking changes ({} changes)", validation.changes.len()),
                })
            } else {
                Ok(SchemaCheckPayload::Success {
                    valid: true,
                    initial: check.is_initial,
                    changes: validation.changes,
                })
            }
        } else if input.github {
            Ok(SchemaCheckPayload::GitHubError {
                message: join_errors(&validation.errors),
            })
        } else {
            Ok(SchemaCheckPayload::Error {
                errors: validation.errors,
                changes: validation.changes,
            })
        }
    }

    /// Retires a service from a composite target.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization, load and storage failures;
    /// domain rejections come back inside the result.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        input: DeleteInput,
    ) -> Result<SchemaDeleteResult> {
        ctx.authorize(RegistryScope::RegistryWrite, target_id)?;
        let state = self.load_state(target_id).await?;

        if !state.project.kind.is_composite() {
            let DeleteOutcome::Rejected { errors } = SingleModel::delete() else {
                unreachable!("single model never deletes");
            };
            return Ok(SchemaDeleteResult {
                ok: None,
                errors: Some(errors),
            });
        }

        let config = state.project.orchestrator_config();
        let model_ctx = ModelContext {
            orchestrator: self.orchestrators.for_kind(state.project.kind),
            config: &config,
            project: &state.project,
            target: &state.target,
        };

        match CompositeModel::delete(&model_ctx, &input, &state.schemas).await {
            DeleteOutcome::Rejected { errors } => {
                self.audit(
                    ctx,
                    AuditAction::SchemaDeleteDeny,
                    target_id,
                    Some(&input.service_name),
                    "rejected",
                );
                Ok(SchemaDeleteResult {
                    ok: None,
                    errors: Some(errors),
                })
            }
            DeleteOutcome::Deleted {
                service_name,
                version_composable,
                ..
            } => {
                let base_schema = if state.project.kind.supports_base_schema() {
                    state.target.base_schema.clone()
                } else {
                    None
                };
                let version = self
                    .store
                    .delete_schema(
                        target_id,
                        state.project.kind,
                        &service_name,
                        version_composable,
                        base_schema,
                    )
                    .await?;

                if version_composable {
                    let supergraph = self
                        .supergraph_for_version(&state.project, &config, target_id, version.id)
                        .await;
                    self.publish_version_artifacts(target_id, version.id, supergraph.as_deref())
                        .await;
                }

                self.audit(
                    ctx,
                    AuditAction::SchemaDelete,
                    target_id,
                    Some(&service_name),
                    "deleted",
                );
                Ok(SchemaDeleteResult {
                    ok: Some(DeletedSchema { service_name }),
                    errors: None,
                })
            }
        }
    }

    /// Re-mirrors the latest composable version to the CDN.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization and load failures.
    pub async fn sync(&self, ctx: &RequestContext, target_id: TargetId) -> Result<()> {
        ctx.authorize(RegistryScope::RegistryWrite, target_id)?;
        let target = self.directory.target(target_id).await?;
        let project = self.directory.project(target.project_id).await?;

        let Some(version) = self.store.latest_composable_version(target_id).await? else {
            tracing::debug!(target = %target_id, "nothing to sync: no composable version");
            return Ok(());
        };

        let config = project.orchestrator_config();
        let supergraph = self
            .supergraph_for_version(&project, &config, target_id, version.id)
            .await;
        self.publish_version_artifacts(target_id, version.id, supergraph.as_deref())
            .await;
        Ok(())
    }

    /// Flips a version's composability flag (legacy registry model only).
    ///
    /// When the flipped version is the current latest and becomes
    /// composable, the CDN is re-synced.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for modern-model projects, plus
    /// authorization/storage failures.
    pub async fn update_version_status(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        version_id: VersionId,
        composable: bool,
    ) -> Result<Version> {
        ctx.authorize(RegistryScope::RegistryWrite, target_id)?;
        let target = self.directory.target(target_id).await?;
        let project = self.directory.project(target.project_id).await?;
        if !project.is_using_legacy_registry_model {
            return Err(Error::InvalidInput(
                "updating version status is only available for projects using the legacy registry model"
                    .to_string(),
            ));
        }

        let version = self
            .store
            .update_version_status(target_id, version_id, composable)
            .await?;

        if composable {
            let latest = self.store.latest_version(target_id).await?;
            if latest.map(|v| v.id) == Some(version_id) {
                let config = project.orchestrator_config();
                let supergraph = self
                    .supergraph_for_version(&project, &config, target_id, version_id)
                    .await;
                self.publish_version_artifacts(target_id, version_id, supergraph.as_deref())
                    .await;
            }
        }
        Ok(version)
    }

    /// Renames a live service (legacy registry model only).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for modern-model projects, unknown
    /// services and name collisions.
    pub async fn update_service_name(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        ctx.authorize(RegistryScope::RegistryWrite, target_id)?;
        let target = self.directory.target(target_id).await?;
        let project = self.directory.project(target.project_id).await?;
        if !project.is_using_legacy_registry_model {
            return Err(Error::InvalidInput(
                "renaming services is only available for projects using the legacy registry model"
                    .to_string(),
            ));
        }
        if new_name.trim().is_empty() {
            return Err(Error::InvalidInput("service name must not be empty".into()));
        }

        self.store
            .update_service_name(target_id, old_name, new_name)
            .await
    }

    /// The latest version with its live schema set.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization and storage failures.
    pub async fn latest_version(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
    ) -> Result<Option<(Version, Vec<Schema>)>> {
        ctx.authorize(RegistryScope::RegistryRead, target_id)?;
        self.version_with_schemas(self.store.latest_version(target_id).await?, target_id)
            .await
    }

    /// The latest composable version with its live schema set.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization and storage failures.
    pub async fn latest_composable_version(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
    ) -> Result<Option<(Version, Vec<Schema>)>> {
        ctx.authorize(RegistryScope::RegistryRead, target_id)?;
        self.version_with_schemas(
            self.store.latest_composable_version(target_id).await?,
            target_id,
        )
        .await
    }

    /// Newest-first page of the target's versions.
    ///
    /// # Errors
    ///
    /// Returns an error for authorization and storage failures.
    pub async fn versions(
        &self,
        ctx: &RequestContext,
        target_id: TargetId,
        limit: usize,
        after: Option<VersionId>,
    ) -> Result<Vec<Version>> {
        ctx.authorize(RegistryScope::RegistryRead, target_id)?;
        self.store.list_versions(target_id, limit, after).await
    }

    async fn version_with_schemas(
        &self,
        version: Option<Version>,
        target_id: TargetId,
    ) -> Result<Option<(Version, Vec<Schema>)>> {
        match version {
            Some(version) => {
                let schemas = self.store.schemas_of_version(target_id, version.id).await?;
                Ok(Some((version, schemas)))
            }
            None => Ok(None),
        }
    }

    async fn supergraph_for_version(
        &self,
        project: &Project,
        config: &lattice_schema::OrchestratorConfig,
        target_id: TargetId,
        version_id: VersionId,
    ) -> Option<String> {
        if !project.kind.supports_supergraph() {
            return None;
        }
        let schemas = match self.store.schemas_of_version(target_id, version_id).await {
            Ok(schemas) => schemas,
            Err(e) => {
                tracing::warn!(target = %target_id, error = %e, "failed to load schemas for supergraph");
                return None;
            }
        };
        let inputs = schema_inputs(&schemas);
        match self
            .orchestrators
            .for_kind(project.kind)
            .supergraph(&inputs, config)
            .await
        {
            Ok(supergraph) => supergraph,
            Err(e) => {
                tracing::warn!(target = %target_id, error = %e, "supergraph generation failed during sync");
                None
            }
        }
    }

    /// Best-effort CDN fan-out for an already durable version.
    async fn publish_version_artifacts(
        &self,
        target_id: TargetId,
        version_id: VersionId,
        supergraph: Option<&str>,
    ) {
        match self.store.schemas_of_version(target_id, version_id).await {
            Ok(schemas) => {
                self.cdn
                    .publish_artifacts(target_id, &schemas, supergraph)
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    target = %target_id,
                    version = %version_id,
                    error = %e,
                    "failed to load schemas for cdn publish; sync will reconcile"
                );
            }
        }
    }

    fn audit(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        target_id: TargetId,
        service: Option<&str>,
        reason: &str,
    ) {
        let mut builder = AuditEvent::builder()
            .action(action)
            .actor(&ctx.token_fingerprint)
            .target(target_id.to_string())
            .decision_reason(reason);
        if let Some(service) = service {
            builder = builder.service(service);
        }
        if let Ok(event) = builder.try_build() {
            event.emit();
        }
    }
}

fn shape_publish_success(
    github: bool,
    initial: bool,
    valid: bool,
    changes: Vec<Change>,
) -> SchemaPublishPayload {
    if github {
        SchemaPublishPayload::GitHubSuccess {
            message: format!("Schema published ({} changes)", changes.len()),
        }
    } else {
        SchemaPublishPayload::Success {
            initial,
            valid,
            changes,
        }
    }
}

fn join_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Derives the idempotency checksum when the client did not supply one:
/// MD5 over the fields that define "the same publish".
fn derive_checksum(input: &PublishInput) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.sdl.as_bytes());
    hasher.update(input.service_name.as_deref().unwrap_or_default().as_bytes());
    hasher.update(input.service_url.as_deref().unwrap_or_default().as_bytes());
    hasher.update(input.metadata.as_deref().unwrap_or_default().as_bytes());
    hasher.update(input.commit.as_bytes());
    hex::encode(hasher.finalize())
}
