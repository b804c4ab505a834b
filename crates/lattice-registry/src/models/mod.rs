//! Project-type models: the decision logic of `check`, `publish` and
//! `delete`.
//!
//! Models are pure decision makers: they run validation, weigh the
//! registry-model policy (legacy vs modern) and produce a typed outcome.
//! They never touch the version store or the CDN; that is the
//! coordinator's job.

mod composite;
mod single;

pub use composite::CompositeModel;
pub use single::SingleModel;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use lattice_schema::{
    Change, Orchestrator, OrchestratorConfig, SchemaError, SchemaInput, ValidationResult,
};

use crate::model::{Project, Target};
use crate::store::NewAction;

/// Registry-level publish input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishInput {
    /// The SDL to publish.
    pub sdl: String,
    /// Service name; required for composite projects.
    pub service_name: Option<String>,
    /// Service URL; required for federation.
    pub service_url: Option<String>,
    /// Author attribution.
    pub author: String,
    /// Client-supplied revision tag.
    pub commit: String,
    /// Force the publish past the breaking-change policy (legacy) or the
    /// composability gate on delete.
    pub force: bool,
    /// Accept breaking changes on the legacy registry model.
    pub experimental_accept_breaking_changes: bool,
    /// Arbitrary JSON metadata string.
    pub metadata: Option<String>,
    /// Idempotency fingerprint; derived from the input when absent.
    pub checksum: Option<String>,
    /// Shape the response for the GitHub check-run integration.
    pub github: bool,
}

/// Registry-level check input.
#[derive(Debug, Clone)]
pub struct CheckInput {
    /// The SDL to dry-run.
    pub sdl: String,
    /// Service name; required for composite projects.
    pub service_name: Option<String>,
    /// Shape the response for the GitHub check-run integration.
    pub github: bool,
}

/// Registry-level delete input.
#[derive(Debug, Clone)]
pub struct DeleteInput {
    /// The service to retire.
    pub service_name: String,
    /// Accept breaking changes and composition failures.
    pub force: bool,
}

/// Everything a model needs to decide.
pub struct ModelContext<'a> {
    /// The project's orchestrator.
    pub orchestrator: &'a dyn Orchestrator,
    /// Per-project orchestrator settings.
    pub config: &'a OrchestratorConfig,
    /// The project.
    pub project: &'a Project,
    /// The target.
    pub target: &'a Target,
}

/// Result of a dry-run check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// The pipeline's verdict.
    pub validation: ValidationResult,
    /// True when the target had no live schemas.
    pub is_initial: bool,
}

/// The model's verdict on a publish.
#[derive(Debug)]
pub enum PublishOutcome {
    /// Record a new version.
    Publish(PublishDecision),
    /// Nothing changed; no version is written.
    Neutral,
    /// The publish is rejected.
    Reject {
        /// Validation errors.
        errors: Vec<SchemaError>,
        /// Classified changes, for the error payload.
        changes: Vec<Change>,
    },
    /// Composite projects require a service name.
    MissingServiceName,
    /// Federation projects require a service URL.
    MissingServiceUrl,
}

/// The data needed to materialize an accepted publish.
#[derive(Debug)]
pub struct PublishDecision {
    /// The pipeline's verdict (changes travel to the response).
    pub validation: ValidationResult,
    /// The action to record.
    pub action: NewAction,
    /// Composability flag of the resulting version.
    pub version_composable: bool,
    /// Supergraph artifact, fetched for composable federation versions.
    pub supergraph: Option<String>,
    /// True when this is the target's first version.
    pub is_initial: bool,
}

/// The model's verdict on a delete.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// Retire the service.
    Deleted {
        /// The pipeline's verdict on the shrunken set.
        validation: ValidationResult,
        /// The retired service.
        service_name: String,
        /// Composability flag of the resulting version.
        version_composable: bool,
    },
    /// The delete is rejected.
    Rejected {
        /// Why.
        errors: Vec<SchemaError>,
    },
}

/// The breaking-change acceptance policy shared by both models: the modern
/// registry model never rejects on breaking changes.
#[must_use]
pub(crate) fn accept_breaking_changes(input: &PublishInput, project: &Project) -> bool {
    input.experimental_accept_breaking_changes || !project.is_using_legacy_registry_model
}

/// Replaces the same-named service in the set, or appends.
#[must_use]
pub(crate) fn swap_services(current: &[SchemaInput], incoming: SchemaInput) -> Vec<SchemaInput> {
    let mut next: Vec<SchemaInput> = current
        .iter()
        .filter(|schema| schema.source != incoming.source)
        .cloned()
        .collect();
    next.push(incoming);
    next
}

/// Concatenated per-service MD5 over the name-sorted set. Equal strings
/// mean the sets are byte-identical service by service.
#[must_use]
pub(crate) fn service_set_checksum(schemas: &[SchemaInput]) -> String {
    let mut sorted: Vec<&SchemaInput> = schemas.iter().collect();
    sorted.sort_by(|a, b| a.source.cmp(&b.source));

    let mut checksum = String::new();
    for schema in sorted {
        let mut hasher = Md5::new();
        hasher.update(schema.source.as_bytes());
        hasher.update(schema.raw.as_bytes());
        if let Some(url) = &schema.url {
            hasher.update(url.as_bytes());
        }
        checksum.push_str(&hex::encode(hasher.finalize()));
    }
    checksum
}
