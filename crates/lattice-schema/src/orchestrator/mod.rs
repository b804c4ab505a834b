//! Composition orchestrators.
//!
//! Every project kind gets its schema set composed by an orchestrator behind
//! the same trait: `Single` and `Stitching` compose in-process, `Federation`
//! delegates to the out-of-process composition service over RPC, and
//! `Custom` calls a tenant-supplied HTTP hook. The registry picks the
//! orchestrator per project and passes per-project settings through
//! [`OrchestratorConfig`].

use async_graphql_parser::types::ServiceDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod custom;
mod federation;
mod single;
mod stitching;

pub use custom::CustomOrchestrator;
pub use federation::FederationOrchestrator;
pub use single::SingleOrchestrator;
pub use stitching::StitchingOrchestrator;

/// One schema entering composition: the raw SDL plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInput {
    /// The raw SDL text.
    pub raw: String,
    /// Where the SDL came from (service name, or the target for single).
    pub source: String,
    /// The service URL, for federation subgraphs.
    pub url: Option<String>,
}

impl SchemaInput {
    /// Creates a schema input without a service URL.
    #[must_use]
    pub fn new(raw: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            source: source.into(),
            url: None,
        }
    }

    /// Sets the service URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// The outcome of a successful `build`.
#[derive(Debug, Clone)]
pub struct ComposedSchema {
    /// The parsed composed document.
    pub document: ServiceDocument,
    /// The composed SDL text.
    pub raw: String,
    /// Provenance label of the composition.
    pub source: String,
}

/// A composition rule violation reported by an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionError {
    /// Human-readable message.
    pub message: String,
}

impl CompositionError {
    /// Creates a composition error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure to produce a composed schema.
///
/// Build errors never reach clients directly; the validation pipeline folds
/// them into a single synthetic comparison error.
#[derive(Debug, thiserror::Error)]
pub enum SchemaBuildError {
    /// The orchestrator requires exactly one schema.
    #[error("expected exactly one schema, got {0}")]
    InvalidSchemaCount(usize),

    /// An input or composed SDL did not parse.
    #[error("failed to parse schema '{source_name}': {message}")]
    Parse {
        /// Which schema failed to parse.
        source_name: String,
        /// Parser message.
        message: String,
    },

    /// The schema set does not compose.
    #[error("composition failed: {0}")]
    Composition(String),

    /// The composition service or hook could not be reached.
    #[error("composition request failed: {0}")]
    Transport(String),

    /// The composition service or hook returned an unusable response.
    #[error("invalid composition response: {0}")]
    InvalidResponse(String),

    /// A required endpoint is not configured on the project.
    #[error("project has no {0} configured")]
    MissingEndpoint(&'static str),
}

/// External composition settings forwarded to the composition service.
///
/// The secret is an opaque ciphertext: the registry stores and forwards it
/// verbatim, and the composition service uses it to sign the webhook call
/// to the tenant's own composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalComposition {
    /// Tenant composition endpoint.
    pub endpoint: String,
    /// Opaque encrypted signing secret.
    pub encrypted_secret: String,
}

/// Per-project settings threaded through every orchestrator call.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// External composition settings (federation only).
    pub external: Option<ExternalComposition>,
    /// Validation hook URL (custom only).
    pub validation_url: Option<String>,
    /// Build hook URL (custom only).
    pub build_url: Option<String>,
    /// Strip federation-injected machinery from the public build result.
    /// Set for federation projects on the modern registry model.
    pub strip_federation_machinery: bool,
}

/// A composition front-end for one project kind.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Checks the schema set against composition rules.
    ///
    /// # Errors
    ///
    /// Returns `SchemaBuildError` only for transport-level failures; rule
    /// violations come back as the `Ok` list.
    async fn validate(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<Vec<CompositionError>, SchemaBuildError>;

    /// Produces the composed schema for the set.
    ///
    /// # Errors
    ///
    /// Returns `SchemaBuildError` when the set does not compose or the
    /// composition backend fails.
    async fn build(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<ComposedSchema, SchemaBuildError>;

    /// Produces the supergraph SDL, for orchestrators that have one.
    ///
    /// # Errors
    ///
    /// Returns `SchemaBuildError` when the composition backend fails.
    async fn supergraph(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<Option<String>, SchemaBuildError>;
}
