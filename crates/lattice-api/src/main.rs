//! Registry API server binary.
//!
//! Wires the in-memory backends behind the storage/directory/token traits
//! and serves the GraphQL endpoint. When `LATTICE_DEV_TOKEN` is set, a
//! development organization, project and target are seeded and bound to
//! that token with full registry access.

use std::collections::HashSet;
use std::sync::Arc;

use lattice_core::id::{OrganizationId, ProjectId, TargetId};
use lattice_core::observability::init_logging;
use lattice_core::storage::MemoryBackend;
use lattice_registry::{
    CdnPublisher, IdempotencyRunner, MemoryDirectory, ObjectVersionStore, OrchestratorSet,
    Organization, Project, RegistryScope, SchemaLifecycleCoordinator, StorageCdnStore, Target,
};
use lattice_schema::FederationOrchestrator;

use lattice_api::auth::{AuthService, MemoryTokenResolver, TokenInfo};
use lattice_api::config::ApiConfig;
use lattice_api::{build_schema, router, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    init_logging(config.log_format);
    tracing::info!(?config, "starting registry api");

    let storage = Arc::new(MemoryBackend::new());
    let directory = Arc::new(MemoryDirectory::new());
    let resolver = Arc::new(MemoryTokenResolver::new());

    if let Some(dev_token) = &config.dev_token {
        seed_dev_entities(&config, &directory, &resolver, dev_token);
    }

    let coordinator = Arc::new(SchemaLifecycleCoordinator::new(
        directory,
        Arc::new(ObjectVersionStore::new(storage.clone())),
        CdnPublisher::new(Arc::new(StorageCdnStore::new(storage.clone()))),
        IdempotencyRunner::new(storage),
        OrchestratorSet::new(Arc::new(FederationOrchestrator::new(
            config.composition_service_url.clone(),
        ))),
    ));

    let schema = build_schema(coordinator);
    let auth = Arc::new(AuthService::new(resolver));
    serve(config.listen_addr, router(schema, auth)).await
}

fn seed_dev_entities(
    config: &ApiConfig,
    directory: &MemoryDirectory,
    resolver: &MemoryTokenResolver,
    dev_token: &str,
) {
    let organization_id = OrganizationId::generate();
    let project_id = ProjectId::generate();
    let target_id = TargetId::generate();

    directory.insert_organization(Organization {
        id: organization_id,
        name: "dev".to_string(),
    });
    directory.insert_project(Project {
        id: project_id,
        organization_id,
        name: "dev".to_string(),
        kind: config.dev_project_kind,
        is_using_legacy_registry_model: config.dev_legacy_model,
        external_composition: None,
        git_repository: None,
        validation_url: None,
        build_url: None,
    });
    directory.insert_target(Target {
        id: target_id,
        project_id,
        organization_id,
        name: "development".to_string(),
        base_schema: None,
    });
    resolver.insert(
        dev_token,
        TokenInfo {
            target_id,
            scopes: HashSet::from([RegistryScope::RegistryRead, RegistryScope::RegistryWrite]),
        },
    );

    tracing::info!(
        target = %target_id,
        kind = ?config.dev_project_kind,
        legacy = config.dev_legacy_model,
        "seeded development target for LATTICE_DEV_TOKEN"
    );
}
