//! # lattice-registry
//!
//! The schema lifecycle engine of the Lattice registry. For every incoming
//! mutation against a target it decides admissibility under the project
//! kind and breaking-change policy, produces the resulting immutable
//! version, materializes it atomically in storage, and propagates
//! artifacts to the CDN under an idempotency guarantee.
//!
//! - [`model`]: projects, targets, actions, versions, the schema union
//! - [`store`]: append-only version store over object storage
//! - [`models`]: per-project-kind decision logic (single vs composite)
//! - [`cdn`]: best-effort artifact publication
//! - [`idempotency`]: at-most-once execution keyed by checksum
//! - [`directory`]: read-only resolution of owning entities
//! - [`coordinator`]: the public entrypoint tying it all together

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod cdn;
pub mod coordinator;
pub mod directory;
pub mod idempotency;
pub mod model;
pub mod models;
pub mod store;

pub use cdn::{CdnPublisher, CdnResource, CdnStore, StorageCdnStore};
pub use coordinator::{
    DeletedSchema, OrchestratorSet, RegistryScope, RequestContext, SchemaCheckPayload,
    SchemaDeleteResult, SchemaLifecycleCoordinator, SchemaPublishPayload,
};
pub use directory::{MemoryDirectory, RegistryDirectory};
pub use idempotency::IdempotencyRunner;
pub use model::{
    Action, ActionKind, LiveEdge, Organization, Project, ProjectKind, Schema, Target, Version,
};
pub use models::{CheckInput, DeleteInput, PublishInput};
pub use store::{NewAction, NewVersion, ObjectVersionStore, VersionStore};
