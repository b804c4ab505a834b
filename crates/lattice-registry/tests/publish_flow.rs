//! End-to-end publish flows through the coordinator over in-memory
//! backends.

use std::collections::HashSet;
use std::sync::Arc;

use lattice_core::id::{OrganizationId, ProjectId, TargetId};
use lattice_core::storage::MemoryBackend;
use lattice_registry::{
    CdnPublisher, IdempotencyRunner, MemoryDirectory, ObjectVersionStore, OrchestratorSet,
    Organization, Project, ProjectKind, PublishInput, RegistryScope, RequestContext, Schema,
    SchemaLifecycleCoordinator, SchemaPublishPayload, StorageCdnStore, Target,
};
use lattice_schema::FederationOrchestrator;

fn setup(kind: ProjectKind, legacy: bool) -> (SchemaLifecycleCoordinator, TargetId) {
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
        kind,
        is_using_legacy_registry_model: legacy,
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
        IdempotencyRunner::new(storage),
        // No federation project in these tests; the endpoint is never hit.
        OrchestratorSet::new(Arc::new(FederationOrchestrator::new("http://127.0.0.1:1"))),
    );
    (coordinator, target_id)
}

fn writer() -> RequestContext {
    RequestContext::new(
        "token:writer",
        HashSet::from([RegistryScope::RegistryRead, RegistryScope::RegistryWrite]),
        "req-test",
    )
}

fn service_input(service: &str, sdl: &str, commit: &str) -> PublishInput {
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

fn single_input(sdl: &str, commit: &str) -> PublishInput {
    PublishInput {
        sdl: sdl.into(),
        service_name: None,
        service_url: None,
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
async fn noop_republish_returns_neutral_success() {
    let (coordinator, target) = setup(ProjectKind::Single, false);
    let ctx = writer();

    let first = coordinator
        .publish(&ctx, target, single_input("type Query { ping: String }", "c1"))
        .await
        .unwrap();
    let SchemaPublishPayload::Success { initial, valid, .. } = first else {
        panic!("expected success, got {first:?}");
    };
    assert!(initial);
    assert!(valid);

    // Same SDL, same author, different formatting: a noop.
    let second = coordinator
        .publish(
            &ctx,
            target,
            single_input("type Query {\n  ping: String\n}", "c2"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Success {
        initial,
        valid,
        changes,
    } = second
    else {
        panic!("expected success, got {second:?}");
    };
    assert!(!initial);
    assert!(valid);
    assert!(changes.is_empty());

    // Only one version was written.
    let versions = coordinator.versions(&ctx, target, 10, None).await.unwrap();
    assert_eq!(versions.len(), 1);
}

#[tokio::test]
async fn modify_keeps_live_set_at_one_and_repoints_action() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    coordinator
        .publish(
            &ctx,
            target,
            service_input("reviews", "type Query { reviews: [String] }", "c1"),
        )
        .await
        .unwrap();
    coordinator
        .publish(
            &ctx,
            target,
            service_input(
                "reviews",
                "type Query { reviews: [String] reviewCount: Int }",
                "c2",
            ),
        )
        .await
        .unwrap();

    let (version, schemas) = coordinator
        .latest_version(&ctx, target)
        .await
        .unwrap()
        .expect("latest version");
    assert_eq!(schemas.len(), 1);
    assert!(matches!(schemas[0], Schema::ModifiedComposite { .. }));
    assert_eq!(version.action_id, schemas[0].action_id());
}

#[tokio::test]
async fn composite_publish_keeps_other_services_live() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    coordinator
        .publish(
            &ctx,
            target,
            service_input("ping", "type Query { ping: String }", "c1"),
        )
        .await
        .unwrap();
    coordinator
        .publish(
            &ctx,
            target,
            service_input("pong", "type Query { pong: String }", "c2"),
        )
        .await
        .unwrap();
    coordinator
        .publish(
            &ctx,
            target,
            service_input("ping", "type Query { ping: String pingCount: Int }", "c3"),
        )
        .await
        .unwrap();

    let (_, schemas) = coordinator
        .latest_version(&ctx, target)
        .await
        .unwrap()
        .expect("latest version");
    assert_eq!(schemas.len(), 2);

    let ping = schemas
        .iter()
        .find(|s| s.service_name() == Some("ping"))
        .expect("ping is live");
    assert!(ping.sdl().unwrap().contains("pingCount"));
    assert!(schemas.iter().any(|s| s.service_name() == Some("pong")));
}

#[tokio::test]
async fn legacy_model_rejects_breaking_publish_unless_forced() {
    let (coordinator, target) = setup(ProjectKind::Stitching, true);
    let ctx = writer();

    coordinator
        .publish(
            &ctx,
            target,
            service_input("api", "type Query { a: String b: String }", "c1"),
        )
        .await
        .unwrap();

    let rejected = coordinator
        .publish(
            &ctx,
            target,
            service_input("api", "type Query { a: String }", "c2"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Error { errors, .. } = rejected else {
        panic!("expected rejection, got {rejected:?}");
    };
    assert!(errors
        .iter()
        .any(|e| e.message.starts_with("Breaking Change:")));

    let mut forced = service_input("api", "type Query { a: String }", "c3");
    forced.force = true;
    let accepted = coordinator.publish(&ctx, target, forced).await.unwrap();
    let SchemaPublishPayload::Success { valid, .. } = accepted else {
        panic!("expected success, got {accepted:?}");
    };
    assert!(valid);
}

#[tokio::test]
async fn modern_model_tolerates_breaking_changes() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    coordinator
        .publish(
            &ctx,
            target,
            service_input("api", "type Query { a: String b: String }", "c1"),
        )
        .await
        .unwrap();

    let payload = coordinator
        .publish(
            &ctx,
            target,
            service_input("api", "type Query { a: String }", "c2"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Success { valid, changes, .. } = payload else {
        panic!("expected success, got {payload:?}");
    };
    assert!(valid);
    assert!(changes.iter().any(|c| c.message.contains("was removed")));
}

#[tokio::test]
async fn non_composing_publish_is_rejected_on_modern_model() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    let payload = coordinator
        .publish(
            &ctx,
            target,
            service_input("api", "type Query { thing: Missing }", "c1"),
        )
        .await
        .unwrap();
    let SchemaPublishPayload::Error { errors, .. } = payload else {
        panic!("expected rejection, got {payload:?}");
    };
    assert!(errors.iter().any(|e| e.message.contains("Missing")));

    assert!(coordinator
        .latest_version(&ctx, target)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_service_name_yields_typed_payload() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    let mut input = service_input("x", "type Query { a: ID }", "c1");
    input.service_name = None;
    let payload = coordinator.publish(&ctx, target, input).await.unwrap();
    assert!(matches!(
        payload,
        SchemaPublishPayload::MissingServiceName { .. }
    ));
}

#[tokio::test]
async fn publish_requires_write_scope() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let reader = RequestContext::new(
        "token:reader",
        HashSet::from([RegistryScope::RegistryRead]),
        "req-test",
    );

    let err = coordinator
        .publish(
            &reader,
            target,
            service_input("api", "type Query { a: ID }", "c1"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("target:registry:write"));

    let ctx = writer();
    assert!(coordinator
        .latest_version(&ctx, target)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn github_flag_shapes_the_payload() {
    let (coordinator, target) = setup(ProjectKind::Stitching, false);
    let ctx = writer();

    let mut input = service_input("api", "type Query { a: ID }", "c1");
    input.github = true;
    let payload = coordinator.publish(&ctx, target, input).await.unwrap();
    assert!(matches!(
        payload,
        SchemaPublishPayload::GitHubSuccess { .. }
    ));
}
