//! Model for single-schema (and custom) projects: one live schema per
//! target, no services, no deletes.

use lattice_schema::{
    sdl, validate_schemas, SchemaComparison, SchemaError, SchemaInput, ValidationRequest,
};

use crate::model::{schema_inputs, ActionKind, Schema, Version};
use crate::store::NewAction;

use super::{
    accept_breaking_changes, CheckOutcome, DeleteOutcome, ModelContext, PublishDecision,
    PublishInput, PublishOutcome,
};

/// Decision logic for single-schema targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleModel;

impl SingleModel {
    /// Dry-runs a schema change.
    pub async fn check(
        ctx: &ModelContext<'_>,
        sdl_text: &str,
        accept_breaking: bool,
        current: &[Schema],
    ) -> CheckOutcome {
        let is_initial = current.is_empty();
        let compare = current.first().and_then(|existing| {
            existing.sdl().map(|existing_sdl| SchemaComparison {
                existing_sdl: existing_sdl.to_string(),
                incoming_sdl: sdl_text.to_string(),
            })
        });

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
                compare,
                base_schema,
                before: schema_inputs(current),
                after: vec![SchemaInput::new(sdl_text, ctx.target.name.clone())],
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
        _latest: Option<&Version>,
    ) -> PublishOutcome {
        if current.len() > 1 {
            return PublishOutcome::Reject {
                errors: vec![SchemaError::new(
                    "Found more than one live schema for a single-schema target",
                )],
                changes: Vec::new(),
            };
        }

        let accept = accept_breaking_changes(input, ctx.project);
        let check = Self::check(ctx, &input.sdl, accept, current).await;
        let validation = check.validation;

        let existing_sdl = current.first().and_then(Schema::sdl);
        let has_different_fingerprint = existing_sdl
            .map_or(true, |existing| {
                sdl::hash_schema(existing) != sdl::hash_schema(&input.sdl)
            });
        let is_modified = has_different_fingerprint
            || !validation.changes.is_empty()
            || !validation.errors.is_empty();

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

        PublishOutcome::Publish(PublishDecision {
            action: NewAction {
                author: input.author.clone(),
                commit: input.commit.clone(),
                kind: ActionKind::NotApplicable,
                service_name: None,
                service_url: None,
                sdl: Some(input.sdl.clone()),
                metadata: input.metadata.clone(),
            },
            version_composable,
            supergraph: None,
            is_initial: check.is_initial,
            validation,
        })
    }

    /// Deletes are meaningless without services.
    #[must_use]
    pub fn delete() -> DeleteOutcome {
        DeleteOutcome::Rejected {
            errors: vec![SchemaError::new(
                "Deleting schemas is not supported for single-schema projects",
            )],
        }
    }
}
