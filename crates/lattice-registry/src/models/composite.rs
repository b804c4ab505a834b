//! Model for federated and stitched projects: a named set of service
//! schemas per target, maintained by ADD/MODIFY/DELETE actions.

use lattice_schema::{validate_schemas, SchemaError, SchemaInput, ValidationRequest};

use crate::model::{schema_inputs, ActionKind, Schema, Version};
use crate::store::NewAction;

use super::{
    accept_breaking_changes, service_set_checksum, swap_services, CheckOutcome, DeleteInput,
    DeleteOutcome, ModelContext, PublishDecision, PublishInput, PublishOutcome,
};

/// Decision logic for composite (federation/stitching) targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeModel;

impl CompositeModel {
    /// Dry-runs a service schema change.
    pub async fn check(
        ctx: &ModelContext<'_>,
        service_name: &str,
        sdl_text: &str,
        service_url: Option<&str>,
        accept_breaking: bool,
        current: &[Schema],
    ) -> CheckOutcome {
        let is_initial = current.is_empty();

        let mut incoming = SchemaInput::new(sdl_text, service_name);
        incoming.url = service_url.map(ToString::to_string);

        let before = schema_inputs(current);
        let after = swap_services(&before, incoming);

        // Federation does not support the base-schema affordance.
        let base_schema = if ctx.project.kind.supports_base_schema() {
            ctx.target.base_schema.clone()
        } else {
            None
        };

        let validation = validate_schemas(
            ctx.orchestrator,
            ctx.config,
            ValidationRequest {
                is_initial,
                compare: None,
                base_schema,
                before,
                after,
                accept_breaking_changes: accept_breaking,
            },
        )
        .await;

        CheckOutcome {
            validation,
            is_initial,
        }
    }

    /// Decides a publish.
    pub async fn publish(
        ctx: &ModelContext<'_>,
        input: &PublishInput,
        current: &[Schema],
        latest: Option<&Version>,
    ) -> PublishOutcome {
        let Some(service_name) = input
            .service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            return PublishOutcome::MissingServiceName;
        };

        let service_url = input
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        if ctx.project.kind.requires_service_url() && service_url.is_none() {
            return PublishOutcome::MissingServiceUrl;
        }

        let accept = accept_breaking_changes(input, ctx.project);
        let existing = current
            .iter()
            .find(|schema| schema.service_name() == Some(service_name));
        let action_kind = if existing.is_some() {
            ActionKind::Modify
        } else {
            ActionKind::Add
        };

        let check = Self::check(ctx, service_name, &input.sdl, service_url, accept, current).await;
        let validation = check.validation;

        // URL-only changes are only detectable once a version exists.
        let has_new_url = latest.is_some()
            && existing.map_or(false, |schema| schema.service_url() != service_url);
        let has_schema_changes = !validation.changes.is_empty();
        let has_errors = !validation.errors.is_empty();
        let has_different_checksum = {
            let before = schema_inputs(current);
            let mut incoming = SchemaInput::new(&input.sdl, service_name);
            incoming.url = service_url.map(ToString::to_string);
            service_set_checksum(&before) != service_set_checksum(&swap_services(&before, incoming))
        };
        let is_modified =
            has_new_url || has_schema_changes || has_errors || has_different_checksum;
        if !is_modified && !check.is_initial {
            return PublishOutcome::Neutral;
        }

        let conclusion = if ctx.project.is_using_legacy_registry_model {
            (validation.is_composable && !validation.has_breaking_changes) || input.force
        } else {
            validation.is_composable
        };
        if !conclusion {
            return PublishOutcome::Reject {
                errors: validation.errors.clone(),
                changes: validation.changes.clone(),
            };
        }

        // Breaking changes gate the conclusion, not the stored flag:
        // composability is purely a composition property.
        let version_composable = validation.is_composable;

        let supergraph = if ctx.project.kind.supports_supergraph() && version_composable {
            let before = schema_inputs(current);
            let mut incoming = SchemaInput::new(&input.sdl, service_name);
            incoming.url = service_url.map(ToString::to_string);
            let after = swap_services(&before, incoming);
            match ctx.orchestrator.supergraph(&after, ctx.config).await {
                Ok(supergraph) => supergraph,
                Err(e) => {
                    tracing::warn!(error = %e, "supergraph generation failed");
                    None
                }
            }
        } else {
            None
        };

        PublishOutcome::Publish(PublishDecision {
            action: NewAction {
                author: input.author.clone(),
                commit: input.commit.clone(),
                kind: action_kind,
                service_name: Some(service_name.to_string()),
                service_url: service_url.map(ToString::to_string),
                sdl: Some(input.sdl.clone()),
                metadata: input.metadata.clone(),
            },
            version_composable,
            supergraph,
            is_initial: check.is_initial,
            validation,
        })
    }

    /// Decides a delete.
    pub async fn delete(
        ctx: &ModelContext<'_>,
        input: &DeleteInput,
        current: &[Schema],
    ) -> DeleteOutcome {
        if ctx.project.is_using_legacy_registry_model {
            return DeleteOutcome::Rejected {
                errors: vec![SchemaError::new(
                    "Deleting a service is not available for projects using the legacy registry model",
                )],
            };
        }

        let exists = current
            .iter()
            .any(|schema| schema.service_name() == Some(input.service_name.as_str()));
        if !exists {
            return DeleteOutcome::Rejected {
                errors: vec![SchemaError::new(format!(
                    "Service \"{}\" not found",
                    input.service_name
                ))],
            };
        }

        let before = schema_inputs(current);
        let after: Vec<SchemaInput> = before
            .iter()
            .filter(|schema| schema.source != input.service_name)
            .cloned()
            .collect();

        let base_schema = if ctx.project.kind.supports_base_schema() {
            ctx.target.base_schema.clone()
        } else {
            None
        };

        let validation = validate_schemas(
            ctx.orchestrator,
            ctx.config,
            ValidationRequest {
                is_initial: false,
                compare: None,
                base_schema,
                before,
                after,
                accept_breaking_changes: input.force,
            },
        )
        .await;

        let conclusion = input.force
            || (validation.is_composable && !validation.has_breaking_changes);
        if !conclusion {
            return DeleteOutcome::Rejected {
                errors: validation.errors.clone(),
            };
        }

        let version_composable = validation.is_composable;
        DeleteOutcome::Deleted {
            validation,
            service_name: input.service_name.clone(),
            version_composable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, ProjectKind, Target};
    use lattice_core::id::{ActionId, OrganizationId, ProjectId, TargetId};
    use lattice_schema::{OrchestratorConfig, StitchingOrchestrator};

    fn project(kind: ProjectKind, legacy: bool) -> Project {
        Project {
            id: ProjectId::generate(),
            organization_id: OrganizationId::generate(),
            name: "gateway".into(),
            kind,
            is_using_legacy_registry_model: legacy,
            external_composition: None,
            git_repository: None,
            validation_url: None,
            build_url: None,
        }
    }

    fn target(project: &Project) -> Target {
        Target {
            id: TargetId::generate(),
            project_id: project.id,
            organization_id: project.organization_id,
            name: "production".into(),
            base_schema: None,
        }
    }

    fn live(service: &str, sdl: &str) -> Schema {
        Schema::AddedComposite {
            action_id: ActionId::generate(),
            service_name: service.to_string(),
            service_url: Some(format!("https://{service}.example/graphql")),
            sdl: sdl.to_string(),
            metadata: None,
            date: chrono::Utc::now(),
        }
    }

    fn publish_input(service: &str, sdl: &str) -> PublishInput {
        PublishInput {
            sdl: sdl.into(),
            service_name: Some(service.into()),
            service_url: Some(format!("https://{service}.example/graphql")),
            author: "dev".into(),
            commit: "c1".into(),
            force: false,
            experimental_accept_breaking_changes: false,
            metadata: None,
            checksum: None,
            github: false,
        }
    }

    #[tokio::test]
    async fn missing_service_name_is_typed() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };

        let mut input = publish_input("x", "type Query { a: ID }");
        input.service_name = Some("   ".into());
        let outcome = CompositeModel::publish(&ctx, &input, &[], None).await;
        assert!(matches!(outcome, PublishOutcome::MissingServiceName));
    }

    #[tokio::test]
    async fn federation_requires_service_url() {
        let project = project(ProjectKind::Federation, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };

        let mut input = publish_input("reviews", "type Query { a: ID }");
        input.service_url = None;
        let outcome = CompositeModel::publish(&ctx, &input, &[], None).await;
        assert!(matches!(outcome, PublishOutcome::MissingServiceUrl));
    }

    #[tokio::test]
    async fn first_service_is_an_add() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };

        let outcome = CompositeModel::publish(
            &ctx,
            &publish_input("users", "type Query { user: ID }"),
            &[],
            None,
        )
        .await;
        let PublishOutcome::Publish(decision) = outcome else {
            panic!("expected publish");
        };
        assert_eq!(decision.action.kind, ActionKind::Add);
        assert!(decision.is_initial);
    }

    #[tokio::test]
    async fn existing_service_is_a_modify() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };
        let current = vec![live("users", "type Query { user: ID }")];

        let outcome = CompositeModel::publish(
            &ctx,
            &publish_input("users", "type Query { user: ID name: String }"),
            &current,
            None,
        )
        .await;
        let PublishOutcome::Publish(decision) = outcome else {
            panic!("expected publish");
        };
        assert_eq!(decision.action.kind, ActionKind::Modify);
        assert!(!decision.is_initial);
    }

    #[tokio::test]
    async fn identical_republish_is_neutral() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };
        let current = vec![live("users", "type Query { user: ID }")];

        let outcome = CompositeModel::publish(
            &ctx,
            &publish_input("users", "type Query { user: ID }"),
            &current,
            None,
        )
        .await;
        assert!(matches!(outcome, PublishOutcome::Neutral));
    }

    #[tokio::test]
    async fn legacy_delete_is_not_available() {
        let project = project(ProjectKind::Federation, true);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };

        let outcome = CompositeModel::delete(
            &ctx,
            &DeleteInput {
                service_name: "ping".into(),
                force: true,
            },
            &[live("ping", "type Query { ping: String }")],
        )
        .await;
        let DeleteOutcome::Rejected { errors } = outcome else {
            panic!("expected rejection");
        };
        assert!(errors[0].message.contains("not available"));
    }

    #[tokio::test]
    async fn delete_of_unknown_service_is_a_single_error() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };

        let outcome = CompositeModel::delete(
            &ctx,
            &DeleteInput {
                service_name: "ghost".into(),
                force: true,
            },
            &[live("ping", "type Query { ping: String }")],
        )
        .await;
        let DeleteOutcome::Rejected { errors } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("\"ghost\" not found"));
    }

    #[tokio::test]
    async fn unforced_breaking_delete_is_rejected() {
        let project = project(ProjectKind::Stitching, false);
        let target = target(&project);
        let ctx = ModelContext {
            orchestrator: &StitchingOrchestrator,
            config: &OrchestratorConfig::default(),
            project: &project,
            target: &target,
        };
        let current = vec![
            live("ping", "type Query { ping: String }"),
            live("pong", "type Query { pong: String }"),
        ];

        let outcome = CompositeModel::delete(
            &ctx,
            &DeleteInput {
                service_name: "ping".into(),
                force: false,
            },
            &current,
        )
        .await;
        let DeleteOutcome::Rejected { errors } = outcome else {
            panic!("expected rejection");
        };
        assert!(errors
            .iter()
            .any(|e| e.message.starts_with("Breaking Change:")));

        let forced = CompositeModel::delete(
            &ctx,
            &DeleteInput {
                service_name: "ping".into(),
                force: true,
            },
            &current,
        )
        .await;
        assert!(matches!(forced, DeleteOutcome::Deleted { .. }));
    }
}
