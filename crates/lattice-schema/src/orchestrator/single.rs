//! Orchestrator for single-schema projects.
//!
//! There is nothing to compose: validation is a parse, the build is the
//! input itself, and there is no supergraph.

use async_trait::async_trait;

use super::{
    ComposedSchema, CompositionError, Orchestrator, OrchestratorConfig, SchemaBuildError,
    SchemaInput,
};
use crate::sdl;

/// Composition front-end for single-schema projects.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleOrchestrator;

impl SingleOrchestrator {
    fn only<'a>(schemas: &'a [SchemaInput]) -> Result<&'a SchemaInput, SchemaBuildError> {
        match schemas {
            [schema] => Ok(schema),
            _ => Err(SchemaBuildError::InvalidSchemaCount(schemas.len())),
        }
    }
}

#[async_trait]
impl Orchestrator for SingleOrchestrator {
    async fn validate(
        &self,
        schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<Vec<CompositionError>, SchemaBuildError> {
        let schema = match Self::only(schemas) {
            Ok(schema) => schema,
            Err(e) => return Ok(vec![CompositionError::new(e.to_string())]),
        };

        match sdl::parse_sdl(&schema.raw) {
            Ok(_) => Ok(Vec::new()),
            Err(message) => Ok(vec![CompositionError::new(message)]),
        }
    }

    async fn build(
        &self,
        schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<ComposedSchema, SchemaBuildError> {
        let schema = Self::only(schemas)?;
        let document = sdl::parse_sdl(&schema.raw).map_err(|message| SchemaBuildError::Parse {
            source_name: schema.source.clone(),
            message,
        })?;

        Ok(ComposedSchema {
            document,
            raw: schema.raw.clone(),
            source: schema.source.clone(),
        })
    }

    async fn supergraph(
        &self,
        _schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<Option<String>, SchemaBuildError> {
        Ok(None)
    }
}
