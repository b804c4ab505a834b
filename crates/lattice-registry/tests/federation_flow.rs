//! Federation publish flow against a mock composition service.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Json;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use lattice_core::id::{OrganizationId, ProjectId, TargetId};
use lattice_core::storage::{MemoryBackend, StorageBackend};
use lattice_registry::{
    CdnPublisher, CdnResource, IdempotencyRunner, MemoryDirectory, ObjectVersionStore,
    OrchestratorSet, Organization, Project, ProjectKind, PublishInput, RegistryScope,
    RequestContext, SchemaLifecycleCoordinator, SchemaPublishPayload, StorageCdnStore, Target,
};
use lattice_schema::FederationOrchestrator;

const COMPOSED_SDL: &str = "type Query { ping: String pong: String }";
const SUPERGRAPH_SDL: &str =
    "schema { query: Query }\ntype Query { ping: String pong: String }";

async fn spawn_composition_service() -> (String, oneshot::Sender<()>) {
    let app = Router::new()
        .route(
            "/trpc/validate",
            post(|| async { Json(serde_json::json!({ "errors": [] })) }),
        )
        .route(
            "/trpc/build",
            post(|| async {
                Json(serde_json::json!({ "raw": COMPOSED_SDL, "source": "federation" }))
            }),
        )
        .route(
            "/trpc/supergraph",
            post(|| async { Json(serde_json::json!({ "supergraph": SUPERGRAPH_SDL })) }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("serve");
    });
    (format!("http://{addr}"), shutdown_tx)
}

fn setup(
    composition_url: &str,
) -> (SchemaLifecycleCoordinator, TargetId, Arc<MemoryBackend>) {
    let storage = Arc::new(MemoryBackend::new());
    let directory = Arc::new(MemoryDirectory::new());

    let organization_id = OrganizationId::generate();
    let project_id = ProjectId::generate();
    let target_id = TargetId::generate();

    directory.insert_organization(Organization {
        id: organization_id,
        name: "acme".into(),
    });
    directory.insert_project(Project {
        id: project_id,
        organization_id,
        name: "gateway".into(),
        kind: ProjectKind::Federation,
        is_using_legacy_registry_model: false,
        external_composition: None,
        git_repository: None,
        validation_url: None,
        build_url: None,
    });
    directory.insert_target(Target {
        id: target_id,
        project_id,
        organization_id,
        name: "production".into(),
        base_schema: None,
    });

    let coordinator = SchemaLifecycleCoordinator::new(
        directory,
        Arc::new(ObjectVersionStore::new(storage.clone())),
        CdnPublisher::new(Arc::new(StorageCdnStore::new(storage.clone()))),
        IdempotencyRunner::new(storage.clone()),
        OrchestratorSet::new(Arc::new(FederationOrchestrator::new(composition_url))),
    );
    (coordinator, target_id, storage)
}

fn writer() -> RequestContext {
    RequestContext::new(
        "token:writer",
        HashSet::from([RegistryScope::RegistryRead, RegistryScope::RegistryWrite]),
        "req-test",
    )
}

fn subgraph_input(service: &str, sdl: &str, commit: &str) -> PublishInput {
    PublishInput {
        sdl: sdl.into(),
        service_name: Some(service.into()),
        service_url: Some(format!("https://{service}.example/graphql")),
        author: "dev".into(),
        commit: commit.into(),
        force: false,
        experimental_accept_breaking_changes: false,
        metadata: None,
        checksum: None,
        github: false,
    }
}

#[tokio::test]
async fn federation_publish_uploads_supergraph() {
    let (url, shutdown) = spawn_composition_service().await;
    let (coordinator, target, storage) = setup(&url);
    let ctx = writer();

    let payload = coordinator
        .publish(
            &ctx,
            target,
            subgraph_input("ping", "type Query { ping: String }", "c1"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Success { initial, valid, .. } = payload else {
        panic!("expected success, got {payload:?}");
    };
    assert!(initial);
    assert!(valid);

    let supergraph = storage
        .get(&StorageCdnStore::resource_path(
            target,
            CdnResource::Supergraph,
        ))
        .await
        .unwrap();
    assert_eq!(supergraph, bytes::Bytes::from(SUPERGRAPH_SDL));

    let schema_list = storage
        .get(&StorageCdnStore::resource_path(target, CdnResource::Schema))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&schema_list).unwrap();
    assert!(value.is_array());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn federation_publish_requires_service_url() {
    let (url, shutdown) = spawn_composition_service().await;
    let (coordinator, target, _) = setup(&url);
    let ctx = writer();

    let mut input = subgraph_input("ping", "type Query { ping: String }", "c1");
    input.service_url = None;
    let payload = coordinator.publish(&ctx, target, input).await.unwrap();
    assert!(matches!(
        payload,
        SchemaPublishPayload::MissingServiceUrl { .. }
    ));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unreachable_composition_service_rejects_but_does_not_crash() {
    let (coordinator, target, _) = setup("http://127.0.0.1:1");
    let ctx = writer();

    let payload = coordinator
        .publish(
            &ctx,
            target,
            subgraph_input("ping", "type Query { ping: String }", "c1"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Error { errors, .. } = payload else {
        panic!("expected rejection, got {payload:?}");
    };
    assert!(errors
        .iter()
        .any(|e| e.message.contains("Failed to validate schemas")));
}

#[tokio::test]
async fn sync_republishes_cdn_artifacts() {
    let (url, shutdown) = spawn_composition_service().await;
    let (coordinator, target, storage) = setup(&url);
    let ctx = writer();

    coordinator
        .publish(
            &ctx,
            target,
            subgraph_input("ping", "type Query { ping: String }", "c1"),
        )
        .await
        .unwrap();

    // Simulate a lost CDN object.
    storage
        .delete(&StorageCdnStore::resource_path(
            target,
            CdnResource::Supergraph,
        ))
        .await
        .unwrap();

    coordinator.sync(&ctx, target).await.unwrap();

    let supergraph = storage
        .get(&StorageCdnStore::resource_path(
            target,
            CdnResource::Supergraph,
        ))
        .await
        .unwrap();
    assert!(!supergraph.is_empty());

    let _ = shutdown.send(());
}
