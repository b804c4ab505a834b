//! GraphQL object, union and input definitions for the registry endpoint.

use async_graphql::{Enum, InputObject, SimpleObject, Union, ID};
use chrono::{DateTime, Utc};

use lattice_registry::{
    CheckInput, DeleteInput, PublishInput, Schema, SchemaCheckPayload, SchemaDeleteResult,
    SchemaPublishPayload, Version,
};
use lattice_schema::{Change, Criticality, SchemaError};

/// Client impact classification of a change.
#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "SCREAMING_SNAKE_CASE")]
pub enum CriticalityLevel {
    /// Purely additive.
    Safe,
    /// Additive but able to change runtime behavior.
    Dangerous,
    /// Removes or narrows something clients may depend on.
    Breaking,
}

impl From<Criticality> for CriticalityLevel {
    fn from(criticality: Criticality) -> Self {
        match criticality {
            Criticality::Safe => Self::Safe,
            Criticality::Dangerous => Self::Dangerous,
            Criticality::Breaking => Self::Breaking,
        }
    }
}

/// One classified schema change.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaChange {
    /// Dotted path to the changed member.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Client impact.
    pub criticality: CriticalityLevel,
}

impl From<Change> for SchemaChange {
    fn from(change: Change) -> Self {
        Self {
            path: change.path,
            message: change.message,
            criticality: change.criticality.into(),
        }
    }
}

/// A validation error.
#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "SchemaError")]
pub struct SchemaErrorObject {
    /// The error message.
    pub message: String,
}

/// A page of changes.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaChangeConnection {
    /// Total number of changes.
    pub total: i32,
    /// The changes.
    pub nodes: Vec<SchemaChange>,
}

impl From<Vec<Change>> for SchemaChangeConnection {
    fn from(changes: Vec<Change>) -> Self {
        let nodes: Vec<SchemaChange> = changes.into_iter().map(Into::into).collect();
        Self {
            total: nodes.len() as i32,
            nodes,
        }
    }
}

/// A page of errors.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaErrorConnection {
    /// Total number of errors.
    pub total: i32,
    /// The errors.
    pub nodes: Vec<SchemaErrorObject>,
}

impl From<Vec<SchemaError>> for SchemaErrorConnection {
    fn from(errors: Vec<SchemaError>) -> Self {
        let nodes: Vec<SchemaErrorObject> = errors
            .into_iter()
            .map(|e| SchemaErrorObject { message: e.message })
            .collect();
        Self {
            total: nodes.len() as i32,
            nodes,
        }
    }
}

/// The one schema of a single/custom target.
#[derive(SimpleObject, Debug, Clone)]
pub struct SingleSchema {
    /// Producing action id.
    pub id: ID,
    /// The SDL.
    pub sdl: String,
    /// Publication date.
    pub date: DateTime<Utc>,
    /// Metadata JSON string.
    pub metadata: Option<String>,
}

/// A service member of a composite target.
#[derive(SimpleObject, Debug, Clone)]
pub struct CompositeSchema {
    /// Producing action id.
    pub id: ID,
    /// Service name.
    pub name: String,
    /// The SDL.
    pub sdl: String,
    /// Service URL.
    pub url: Option<String>,
    /// Publication date.
    pub date: DateTime<Utc>,
    /// Metadata JSON string.
    pub metadata: Option<String>,
}

/// A live member of a version.
#[derive(Union, Debug, Clone)]
pub enum RegistrySchema {
    /// Single-schema member.
    Single(SingleSchema),
    /// Composite member.
    Composite(CompositeSchema),
}

/// Projects a domain schema into the GraphQL union.
///
/// Live sets never contain deleted members, so deletes have no arm here.
#[must_use]
pub fn registry_schema(schema: &Schema) -> Option<RegistrySchema> {
    let sdl = schema.sdl()?.to_string();
    Some(match schema.service_name() {
        None => RegistrySchema::Single(SingleSchema {
            id: ID(schema.action_id().to_string()),
            sdl,
            date: schema.date(),
            metadata: schema.metadata().map(ToString::to_string),
        }),
        Some(name) => RegistrySchema::Composite(CompositeSchema {
            id: ID(schema.action_id().to_string()),
            name: name.to_string(),
            sdl,
            url: schema.service_url().map(ToString::to_string),
            date: schema.date(),
            metadata: schema.metadata().map(ToString::to_string),
        }),
    })
}

/// A page of live schemas.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaConnection {
    /// Total number of live schemas.
    pub total: i32,
    /// The schemas.
    pub nodes: Vec<RegistrySchema>,
}

impl From<&[Schema]> for SchemaConnection {
    fn from(schemas: &[Schema]) -> Self {
        let nodes: Vec<RegistrySchema> = schemas.iter().filter_map(registry_schema).collect();
        Self {
            total: nodes.len() as i32,
            nodes,
        }
    }
}

/// A recorded schema version.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaVersion {
    /// Version id.
    pub id: ID,
    /// When the version was recorded.
    pub date: DateTime<Utc>,
    /// Composability of the version.
    pub valid: bool,
    /// The triggering action id.
    pub action_id: ID,
    /// The live schema set.
    pub schemas: SchemaConnection,
}

/// Builds the version object from the domain records.
#[must_use]
pub fn schema_version(version: &Version, schemas: &[Schema]) -> SchemaVersion {
    SchemaVersion {
        id: ID(version.id.to_string()),
        date: version.created_at,
        valid: version.is_composable,
        action_id: ID(version.action_id.to_string()),
        schemas: SchemaConnection::from(schemas),
    }
}

/// A version list entry (no schema set loaded).
#[derive(SimpleObject, Debug, Clone)]
pub struct RegistryVersion {
    /// Version id.
    pub id: ID,
    /// When the version was recorded.
    pub date: DateTime<Utc>,
    /// Composability of the version.
    pub valid: bool,
}

/// A page of versions.
#[derive(SimpleObject, Debug, Clone)]
pub struct RegistryVersionConnection {
    /// Versions, newest first.
    pub nodes: Vec<RegistryVersion>,
}

// --- publish ---------------------------------------------------------------

/// Successful (or noop) publish.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaPublishSuccess {
    /// True for the target's first version.
    pub initial: bool,
    /// Composability of the recorded version.
    pub valid: bool,
    /// Classified changes.
    pub changes: SchemaChangeConnection,
}

/// Rejected publish.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaPublishError {
    /// Why.
    pub errors: SchemaErrorConnection,
    /// Classified changes, for context.
    pub changes: SchemaChangeConnection,
}

/// Composite projects require a service name.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaPublishMissingServiceError {
    /// Fixed message.
    pub message: String,
}

/// Federation projects require a service URL.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaPublishMissingUrlError {
    /// Fixed message.
    pub message: String,
}

/// GitHub-shaped publish success.
#[derive(SimpleObject, Debug, Clone)]
pub struct GitHubSchemaPublishSuccess {
    /// Check-run summary line.
    pub message: String,
}

/// GitHub-shaped publish failure.
#[derive(SimpleObject, Debug, Clone)]
pub struct GitHubSchemaPublishError {
    /// Check-run summary line.
    pub message: String,
}

/// Response to `schemaPublish`.
#[derive(Union, Debug, Clone)]
#[graphql(name = "SchemaPublishPayload")]
pub enum SchemaPublishPayloadGql {
    /// Recorded or noop.
    Success(SchemaPublishSuccess),
    /// Rejected.
    Error(SchemaPublishError),
    /// Missing service name.
    MissingService(SchemaPublishMissingServiceError),
    /// Missing service URL.
    MissingUrl(SchemaPublishMissingUrlError),
    /// GitHub-shaped success.
    GitHubSuccess(GitHubSchemaPublishSuccess),
    /// GitHub-shaped failure.
    GitHubError(GitHubSchemaPublishError),
}

impl From<SchemaPublishPayload> for SchemaPublishPayloadGql {
    fn from(payload: SchemaPublishPayload) -> Self {
        match payload {
            SchemaPublishPayload::Success {
                initial,
                valid,
                changes,
            } => Self::Success(SchemaPublishSuccess {
                initial,
                valid,
                changes: changes.into(),
            }),
            SchemaPublishPayload::Error { errors, changes } => Self::Error(SchemaPublishError {
                errors: errors.into(),
                changes: changes.into(),
            }),
            SchemaPublishPayload::MissingServiceName { message } => {
                Self::MissingService(SchemaPublishMissingServiceError { message })
            }
            SchemaPublishPayload::MissingServiceUrl { message } => {
                Self::MissingUrl(SchemaPublishMissingUrlError { message })
            }
            SchemaPublishPayload::GitHubSuccess { message } => {
                Self::GitHubSuccess(GitHubSchemaPublishSuccess { message })
            }
            SchemaPublishPayload::GitHubError { message } => {
                Self::GitHubError(GitHubSchemaPublishError { message })
            }
        }
    }
}

// --- check -----------------------------------------------------------------

/// Admissible check.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaCheckSuccess {
    /// Always true.
    pub valid: bool,
    /// True when the target has no live schemas.
    pub initial: bool,
    /// Classified changes.
    pub changes: SchemaChangeConnection,
}

/// Inadmissible check.
#[derive(SimpleObject, Debug, Clone)]
pub struct SchemaCheckError {
    /// Why.
    pub errors: SchemaErrorConnection,
    /// Classified changes.
    pub changes: SchemaChangeConnection,
}

/// GitHub-shaped check success.
#[derive(SimpleObject, Debug, Clone)]
pub struct GitHubSchemaCheckSuccess {
    /// Check-run summary line.
    pub message: String,
}

/// GitHub-shaped check failure.
#[derive(SimpleObject, Debug, Clone)]
pub struct GitHubSchemaCheckError {
    /// Check-run summary line.
    pub message: String,
}

/// Response to `schemaCheck`.
#[derive(Union, Debug, Clone)]
#[graphql(name = "SchemaCheckPayload")]
pub enum SchemaCheckPayloadGql {
    /// Admissible.
    Success(SchemaCheckSuccess),
    /// Inadmissible.
    Error(SchemaCheckError),
    /// GitHub-shaped success.
    GitHubSuccess(GitHubSchemaCheckSuccess),
    /// GitHub-shaped failure.
    GitHubError(GitHubSchemaCheckError),
}

impl From<SchemaCheckPayload> for SchemaCheckPayloadGql {
    fn from(payload: SchemaCheckPayload) -> Self {
        match payload {
            SchemaCheckPayload::Success {
                valid,
                initial,
                changes,
            } => Self::Success(SchemaCheckSuccess {
                valid,
                initial,
                changes: changes.into(),
            }),
            SchemaCheckPayload::Error { errors, changes } => Self::Error(SchemaCheckError {
                errors: errors.into(),
                changes: changes.into(),
            }),
            SchemaCheckPayload::GitHubSuccess { message } => {
                Self::GitHubSuccess(GitHubSchemaCheckSuccess { message })
            }
            SchemaCheckPayload::GitHubError { message } => {
                Self::GitHubError(GitHubSchemaCheckError { message })
            }
        }
    }
}

// --- delete ----------------------------------------------------------------

/// The retired service.
#[derive(SimpleObject, Debug, Clone)]
pub struct DeletedSchema {
    /// Name of the deleted service.
    pub name: String,
}

/// Response to `schemaDelete`.
#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "SchemaDeleteResult")]
pub struct SchemaDeleteResultGql {
    /// The deleted service, on success.
    pub ok: Option<DeletedSchema>,
    /// The rejection reasons, on failure.
    pub errors: Option<SchemaErrorConnection>,
}

impl From<SchemaDeleteResult> for SchemaDeleteResultGql {
    fn from(result: SchemaDeleteResult) -> Self {
        Self {
            ok: result.ok.map(|deleted| DeletedSchema {
                name: deleted.service_name,
            }),
            errors: result.errors.map(Into::into),
        }
    }
}

// --- inputs ----------------------------------------------------------------

/// Input to `schemaPublish`.
#[derive(InputObject, Debug, Clone)]
pub struct SchemaPublishInput {
    /// Service name (composite projects).
    pub service: Option<String>,
    /// Service URL (federation).
    pub url: Option<String>,
    /// The SDL to publish.
    pub sdl: String,
    /// Author attribution.
    pub author: String,
    /// Client-supplied revision tag.
    pub commit: String,
    /// Force past the breaking-change policy.
    pub force: Option<bool>,
    /// Accept breaking changes on the legacy registry model.
    pub experimental_accept_breaking_changes: Option<bool>,
    /// Arbitrary JSON metadata string.
    pub metadata: Option<String>,
    /// Shape the response for the GitHub integration.
    pub github: Option<bool>,
    /// Idempotency fingerprint.
    pub checksum: Option<String>,
}

impl From<SchemaPublishInput> for PublishInput {
    fn from(input: SchemaPublishInput) -> Self {
        Self {
            sdl: input.sdl,
            service_name: input.service,
            service_url: input.url,
            author: input.author,
            commit: input.commit,
            force: input.force.unwrap_or(false),
            experimental_accept_breaking_changes: input
                .experimental_accept_breaking_changes
                .unwrap_or(false),
            metadata: input.metadata,
            checksum: input.checksum,
            github: input.github.unwrap_or(false),
        }
    }
}

/// Input to `schemaCheck`.
#[derive(InputObject, Debug, Clone)]
pub struct SchemaCheckInput {
    /// Service name (composite projects).
    pub service: Option<String>,
    /// The SDL to dry-run.
    pub sdl: String,
    /// Shape the response for the GitHub integration.
    pub github: Option<bool>,
}

impl From<SchemaCheckInput> for CheckInput {
    fn from(input: SchemaCheckInput) -> Self {
        Self {
            sdl: input.sdl,
            service_name: input.service,
            github: input.github.unwrap_or(false),
        }
    }
}

/// Input to `schemaDelete`.
#[derive(InputObject, Debug, Clone)]
pub struct SchemaDeleteInput {
    /// The service to retire.
    pub service_name: String,
    /// Accept breaking changes and composition failures.
    pub force: Option<bool>,
}

impl From<SchemaDeleteInput> for DeleteInput {
    fn from(input: SchemaDeleteInput) -> Self {
        Self {
            service_name: input.service_name,
            force: input.force.unwrap_or(false),
        }
    }
}
