//! # lattice-schema
//!
//! The GraphQL schema domain of the Lattice registry:
//!
//! - **SDL tooling**: parse, canonical print, deterministic MD5 hashing
//! - **Schema differ**: change classification (`Safe` / `Dangerous` / `Breaking`)
//! - **Orchestrators**: single, stitching, federation (RPC) and custom (HTTP hook)
//!   composition front-ends behind one trait
//! - **Validation pipeline**: composes orchestrator + differ into a
//!   [`validate::ValidationResult`] for a proposed schema set
//!
//! Everything here is independent of how the registry persists versions;
//! the registry crate maps its project model onto [`orchestrator::OrchestratorConfig`].

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod diff;
pub mod index;
pub mod orchestrator;
pub mod sdl;
pub mod validate;

pub use diff::{diff_schemas, Change, Criticality};
pub use index::SchemaIndex;
pub use orchestrator::{
    ComposedSchema, CompositionError, CustomOrchestrator, ExternalComposition,
    FederationOrchestrator, Orchestrator, OrchestratorConfig, SchemaBuildError, SchemaInput,
    SingleOrchestrator, StitchingOrchestrator,
};
pub use validate::{
    validate_schemas, SchemaComparison, SchemaError, ValidationRequest, ValidationResult,
};
