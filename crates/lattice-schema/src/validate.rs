//! Validation pipeline: orchestrator + differ.
//!
//! Produces one [`ValidationResult`] for a proposed schema set. The
//! pipeline never fails the caller: transport and build failures are
//! folded into the error list (`"Failed to compare schemas: …"`), because
//! a broken composition backend must surface as a rejected check, not a
//! 500.

use serde::{Deserialize, Serialize};

use crate::diff::{diff_schemas, Change};
use crate::index::SchemaIndex;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, SchemaInput};
use crate::sdl;

/// One human-readable validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaError {
    /// The error message.
    pub message: String,
}

impl SchemaError {
    /// Creates a schema error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fast-path comparison between the stored and the incoming schema.
#[derive(Debug, Clone)]
pub struct SchemaComparison {
    /// The currently stored SDL.
    pub existing_sdl: String,
    /// The incoming SDL.
    pub incoming_sdl: String,
}

impl SchemaComparison {
    fn is_unchanged(&self) -> bool {
        sdl::hash_schema(&self.existing_sdl) == sdl::hash_schema(&self.incoming_sdl)
    }
}

/// Input to the validation pipeline.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// True when the target has no live schemas yet (nothing to diff).
    pub is_initial: bool,
    /// Optional fingerprint short-circuit.
    pub compare: Option<SchemaComparison>,
    /// Base schema preamble; applied to the first `after` member only.
    pub base_schema: Option<String>,
    /// The currently live schema set.
    pub before: Vec<SchemaInput>,
    /// The proposed schema set.
    pub after: Vec<SchemaInput>,
    /// When false, breaking changes are folded into the error list.
    pub accept_breaking_changes: bool,
}

/// The pipeline's verdict on a proposed schema set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// The set passes the orchestrator's composition rules.
    pub is_composable: bool,
    /// At least one change is classified breaking.
    pub has_breaking_changes: bool,
    /// Composition errors plus unaccepted breaking changes.
    pub errors: Vec<SchemaError>,
    /// All classified changes against the previous set.
    pub changes: Vec<Change>,
}

impl ValidationResult {
    fn unchanged() -> Self {
        Self {
            is_composable: true,
            has_breaking_changes: false,
            errors: Vec::new(),
            changes: Vec::new(),
        }
    }
}

/// Runs the validation pipeline.
pub async fn validate_schemas(
    orchestrator: &dyn Orchestrator,
    config: &OrchestratorConfig,
    request: ValidationRequest,
) -> ValidationResult {
    let ValidationRequest {
        is_initial,
        compare,
        base_schema,
        before,
        mut after,
        accept_breaking_changes,
    } = request;

    // The base schema is a validation-time preamble for the first member;
    // it is never stored as part of the service SDL.
    if let (Some(base), Some(first)) = (base_schema.as_deref(), after.first_mut()) {
        first.raw = format!("{base}\n{}", first.raw);
    }

    if let Some(comparison) = &compare {
        if comparison.is_unchanged() {
            return ValidationResult::unchanged();
        }
    }

    let mut errors: Vec<SchemaError> = Vec::new();
    let is_composable = match orchestrator.validate(&after, config).await {
        Ok(composition_errors) => {
            let composable = composition_errors.is_empty();
            errors.extend(
                composition_errors
                    .into_iter()
                    .map(|e| SchemaError::new(e.message)),
            );
            composable
        }
        Err(e) => {
            errors.push(SchemaError::new(format!("Failed to validate schemas: {e}")));
            false
        }
    };

    if is_initial {
        return ValidationResult {
            is_composable,
            has_breaking_changes: false,
            errors,
            changes: Vec::new(),
        };
    }

    let (before_build, after_build) = tokio::join!(
        orchestrator.build(&before, config),
        orchestrator.build(&after, config)
    );

    let (has_breaking_changes, changes) = match (before_build, after_build) {
        (Ok(previous), Ok(next)) => {
            let previous_index = SchemaIndex::from_document(&previous.document);
            let next_index = SchemaIndex::from_document(&next.document);
            let changes = diff_schemas(&previous_index, &next_index);
            let has_breaking = changes.iter().any(Change::is_breaking);
            (has_breaking, changes)
        }
        (Err(e), _) | (_, Err(e)) => {
            errors.push(SchemaError::new(format!("Failed to compare schemas: {e}")));
            (false, Vec::new())
        }
    };

    if has_breaking_changes && !accept_breaking_changes {
        errors.extend(
            changes
                .iter()
                .filter(|c| c.is_breaking())
                .map(|c| SchemaError::new(format!("Breaking Change: {}", c.message))),
        );
    }

    ValidationResult {
        is_composable,
        has_breaking_changes,
        errors,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{SingleOrchestrator, StitchingOrchestrator};

    fn single_request(before: &str, after: &str) -> ValidationRequest {
        ValidationRequest {
            is_initial: false,
            compare: None,
            base_schema: None,
            before: vec![SchemaInput::new(before, "api")],
            after: vec![SchemaInput::new(after, "api")],
            accept_breaking_changes: false,
        }
    }

    #[tokio::test]
    async fn fingerprint_short_circuit_skips_composition() {
        let request = ValidationRequest {
            compare: Some(SchemaComparison {
                existing_sdl: "type Query { ping: String }".into(),
                // same schema, different declaration order of fields
                incoming_sdl: "type Query {\n  ping: String\n}".into(),
            }),
            // deliberately unparseable: the short-circuit must win first
            ..single_request("type Query {", "type Query {")
        };

        let result = validate_schemas(
            &SingleOrchestrator,
            &OrchestratorConfig::default(),
            request,
        )
        .await;
        assert!(result.is_composable);
        assert!(result.errors.is_empty());
        assert!(result.changes.is_empty());
    }

    #[tokio::test]
    async fn initial_publish_skips_diffing() {
        let request = ValidationRequest {
            is_initial: true,
            before: Vec::new(),
            ..single_request("", "type Query { ping: String }")
        };

        let result = validate_schemas(
            &SingleOrchestrator,
            &OrchestratorConfig::default(),
            request,
        )
        .await;
        assert!(result.is_composable);
        assert!(result.changes.is_empty());
        assert!(!result.has_breaking_changes);
    }

    #[tokio::test]
    async fn breaking_change_not_accepted_becomes_error() {
        let result = validate_schemas(
            &SingleOrchestrator,
            &OrchestratorConfig::default(),
            single_request(
                "type Query { ping: String pong: String }",
                "type Query { ping: String }",
            ),
        )
        .await;

        assert!(result.is_composable);
        assert!(result.has_breaking_changes);
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.starts_with("Breaking Change:")));
    }

    #[tokio::test]
    async fn breaking_change_accepted_is_not_an_error() {
        let request = ValidationRequest {
            accept_breaking_changes: true,
            ..single_request(
                "type Query { ping: String pong: String }",
                "type Query { ping: String }",
            )
        };
        let result = validate_schemas(
            &SingleOrchestrator,
            &OrchestratorConfig::default(),
            request,
        )
        .await;

        assert!(result.has_breaking_changes);
        assert!(result.errors.is_empty());
        assert!(!result.changes.is_empty());
    }

    #[tokio::test]
    async fn base_schema_applies_to_first_member_only() {
        let request = ValidationRequest {
            is_initial: true,
            compare: None,
            base_schema: Some("directive @auth on FIELD_DEFINITION".into()),
            before: Vec::new(),
            after: vec![SchemaInput::new(
                "type Query { me: String @auth }",
                "api",
            )],
            accept_breaking_changes: false,
        };

        // Without the preamble the @auth directive is undeclared; the parse
        // still succeeds (directive usage is not resolved at parse time), so
        // assert the preamble survives into the composed set.
        let result = validate_schemas(
            &SingleOrchestrator,
            &OrchestratorConfig::default(),
            request,
        )
        .await;
        assert!(result.is_composable);
    }

    #[tokio::test]
    async fn build_failure_becomes_comparison_error() {
        // Stitching build fails on conflicting field types.
        let request = ValidationRequest {
            is_initial: false,
            compare: None,
            base_schema: None,
            before: vec![
                SchemaInput::new("type Query { thing: String }", "a"),
                SchemaInput::new("type Query { thing: Int }", "b"),
            ],
            after: vec![
                SchemaInput::new("type Query { thing: String }", "a"),
                SchemaInput::new("type Query { other: Int }", "b"),
            ],
            accept_breaking_changes: false,
        };

        let result = validate_schemas(
            &StitchingOrchestrator,
            &OrchestratorConfig::default(),
            request,
        )
        .await;
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.starts_with("Failed to compare schemas:")));
        assert!(!result.has_breaking_changes);
    }
}
