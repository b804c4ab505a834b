//! Orchestrator for projects with tenant-supplied composition hooks.
//!
//! The project carries a validation URL and a build URL; the registry POSTs
//! the raw SDL set to them and trusts the response. No supergraph exists
//! for custom projects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    ComposedSchema, CompositionError, Orchestrator, OrchestratorConfig, SchemaBuildError,
    SchemaInput,
};
use crate::sdl;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Composition front-end calling tenant-supplied HTTP hooks.
#[derive(Debug, Clone)]
pub struct CustomOrchestrator {
    client: reqwest::Client,
}

impl Default for CustomOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomOrchestrator {
    /// Creates a hook client with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Creates a hook client with a caller-supplied HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        schemas: &[SchemaInput],
    ) -> Result<T, SchemaBuildError> {
        let body = HookRequest {
            schemas: schemas.iter().map(|s| s.raw.as_str()).collect(),
        };

        let response = self
            .client
            .post(url)
            .header("x-request-id", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| SchemaBuildError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchemaBuildError::Transport(format!(
                "composition hook returned {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SchemaBuildError::InvalidResponse(e.to_string()))
    }
}

#[derive(Serialize)]
struct HookRequest<'a> {
    schemas: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct HookError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct HookValidateResponse {
    #[serde(default)]
    errors: Vec<HookError>,
}

#[derive(Debug, Deserialize)]
struct HookBuildResponse {
    #[serde(default)]
    errors: Vec<HookError>,
    sdl: Option<String>,
}

#[async_trait]
impl Orchestrator for CustomOrchestrator {
    async fn validate(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<Vec<CompositionError>, SchemaBuildError> {
        let url = config
            .validation_url
            .as_deref()
            .ok_or(SchemaBuildError::MissingEndpoint("validation url"))?;
        let response: HookValidateResponse = self.post(url, schemas).await?;
        Ok(response
            .errors
            .into_iter()
            .map(|e| CompositionError::new(e.message))
            .collect())
    }

    async fn build(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<ComposedSchema, SchemaBuildError> {
        let url = config
            .build_url
            .as_deref()
            .ok_or(SchemaBuildError::MissingEndpoint("build url"))?;
        let response: HookBuildResponse = self.post(url, schemas).await?;
        if !response.errors.is_empty() {
            let joined: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(SchemaBuildError::Composition(joined.join("; ")));
        }

        let raw = response.sdl.ok_or_else(|| {
            SchemaBuildError::InvalidResponse("build hook returned neither errors nor sdl".into())
        })?;
        let document = sdl::parse_sdl(&raw).map_err(|message| SchemaBuildError::Parse {
            source_name: "custom".to_string(),
            message,
        })?;

        Ok(ComposedSchema {
            document,
            raw,
            source: "custom".to_string(),
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
