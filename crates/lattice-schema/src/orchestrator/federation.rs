//! Orchestrator for federated projects.
//!
//! Federation composition runs out of process: the composition library is
//! large and evolves independently, so the registry talks to it through a
//! small typed RPC client. Every request carries an `x-request-id` header
//! and a deadline. When the project uses external composition, the request
//! forwards `{endpoint, encryptedSecret}` and the remote service signs a
//! webhook call to the tenant's own composer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_graphql_parser::types::{TypeKind, TypeSystemDefinition};

use super::{
    ComposedSchema, CompositionError, Orchestrator, OrchestratorConfig, SchemaBuildError,
    SchemaInput,
};
use crate::sdl;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC client for the federation composition service.
#[derive(Debug, Clone)]
pub struct FederationOrchestrator {
    base_url: String,
    client: reqwest::Client,
}

impl FederationOrchestrator {
    /// Creates a client targeting the composition service base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(base_url, client)
    }

    /// Creates a client with a caller-supplied HTTP client (tests, custom
    /// timeouts).
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/trpc/{operation}", self.base_url.trim_end_matches('/'))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<T, SchemaBuildError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = CompositionRequest {
            kind: "federation",
            schemas: schemas
                .iter()
                .map(|s| SubgraphPayload {
                    raw: &s.raw,
                    source: &s.source,
                    url: s.url.as_deref(),
                })
                .collect(),
            external: config.external.as_ref().map(|e| ExternalPayload {
                endpoint: &e.endpoint,
                encrypted_secret: &e.encrypted_secret,
            }),
        };

        tracing::debug!(
            operation = operation,
            request_id = %request_id,
            schemas = schemas.len(),
            external = config.external.is_some(),
            "calling composition service"
        );

        let response = self
            .client
            .post(self.endpoint(operation))
            .header("x-request-id", &request_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| SchemaBuildError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchemaBuildError::Transport(format!(
                "composition service returned {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SchemaBuildError::InvalidResponse(e.to_string()))
    }
}

#[derive(Serialize)]
struct CompositionRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    schemas: Vec<SubgraphPayload<'a>>,
    external: Option<ExternalPayload<'a>>,
}

#[derive(Serialize)]
struct SubgraphPayload<'a> {
    raw: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct ExternalPayload<'a> {
    endpoint: &'a str,
    #[serde(rename = "encryptedSecret")]
    encrypted_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    errors: Vec<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    #[serde(default)]
    errors: Vec<RemoteError>,
    raw: Option<String>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SupergraphResponse {
    supergraph: Option<String>,
}

#[async_trait]
impl Orchestrator for FederationOrchestrator {
    async fn validate(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<Vec<CompositionError>, SchemaBuildError> {
        let response: ValidateResponse = self.call("validate", schemas, config).await?;
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
        let response: BuildResponse = self.call("build", schemas, config).await?;
        if !response.errors.is_empty() {
            let joined: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(SchemaBuildError::Composition(joined.join("; ")));
        }

        let raw = response.raw.ok_or_else(|| {
            SchemaBuildError::InvalidResponse("build response carries neither errors nor raw".into())
        })?;
        let source = response.source.unwrap_or_else(|| "federation".to_string());

        let raw = if config.strip_federation_machinery {
            strip_federation_machinery(&raw)?
        } else {
            raw
        };

        let document = sdl::parse_sdl(&raw).map_err(|message| SchemaBuildError::Parse {
            source_name: source.clone(),
            message,
        })?;

        Ok(ComposedSchema {
            document,
            raw,
            source,
        })
    }

    async fn supergraph(
        &self,
        schemas: &[SchemaInput],
        config: &OrchestratorConfig,
    ) -> Result<Option<String>, SchemaBuildError> {
        let response: SupergraphResponse = self.call("supergraph", schemas, config).await?;
        Ok(response.supergraph)
    }
}

fn is_federation_directive(name: &str) -> bool {
    name == "core" || name.starts_with("join__")
}

fn is_federation_type(name: &str) -> bool {
    name == "core" || name.starts_with("join__") || name.starts_with("core__")
}

/// Strips federation-injected machinery from a composed public SDL.
///
/// The supergraph keeps the full document; only the public build result is
/// cleaned. Removes the `join__Graph` / `join__FieldSet` / `core__Purpose`
/// types, every `join__*` directive definition, the `core` directive, and
/// all `@join__*` / `@core` directive applications.
fn strip_federation_machinery(raw: &str) -> Result<String, SchemaBuildError> {
    let mut document = sdl::parse_sdl(raw).map_err(|message| SchemaBuildError::Parse {
        source_name: "federation".to_string(),
        message,
    })?;

    document.definitions.retain(|definition| match definition {
        TypeSystemDefinition::Directive(dd) => !is_federation_directive(dd.node.name.node.as_str()),
        TypeSystemDefinition::Type(td) => !is_federation_type(td.node.name.node.as_str()),
        TypeSystemDefinition::Schema(_) => true,
    });

    for definition in &mut document.definitions {
        match definition {
            TypeSystemDefinition::Schema(sd) => {
                sd.node
                    .directives
                    .retain(|d| !is_federation_directive(d.node.name.node.as_str()));
            }
            TypeSystemDefinition::Type(td) => {
                td.node
                    .directives
                    .retain(|d| !is_federation_directive(d.node.name.node.as_str()));
                match &mut td.node.kind {
                    TypeKind::Object(object) => {
                        for field in &mut object.fields {
                            field
                                .node
                                .directives
                                .retain(|d| !is_federation_directive(d.node.name.node.as_str()));
                        }
                    }
                    TypeKind::Interface(interface) => {
                        for field in &mut interface.fields {
                            field
                                .node
                                .directives
                                .retain(|d| !is_federation_directive(d.node.name.node.as_str()));
                        }
                    }
                    TypeKind::Enum(enum_type) => {
                        for value in &mut enum_type.values {
                            value
                                .node
                                .directives
                                .retain(|d| !is_federation_directive(d.node.name.node.as_str()));
                        }
                    }
                    _ => {}
                }
            }
            TypeSystemDefinition::Directive(_) => {}
        }
    }

    Ok(sdl::print_document(&document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ExternalComposition;
    use axum::extract::Json;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    async fn spawn_server(app: Router) -> (String, oneshot::Sender<()>) {
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

    const SUPERGRAPH_SDL: &str = r#"
        schema @core(feature: "https://specs.apollo.dev/core/v0.2") {
          query: Query
        }
        directive @core(feature: String!) repeatable on SCHEMA
        directive @join__field(graph: join__Graph) on FIELD_DEFINITION
        scalar join__FieldSet
        enum join__Graph { PING PONG }
        enum core__Purpose { EXECUTION SECURITY }
        type Query {
          ping: String @join__field(graph: PING)
          pong: String @join__field(graph: PONG)
        }
    "#;

    #[test]
    fn strip_removes_machinery_but_keeps_fields() {
        let stripped = strip_federation_machinery(SUPERGRAPH_SDL).unwrap();
        assert!(!stripped.contains("join__"));
        assert!(!stripped.contains("@core"));
        assert!(!stripped.contains("core__Purpose"));
        assert!(stripped.contains("ping"));
        assert!(stripped.contains("pong"));
        crate::sdl::parse_sdl(&stripped).expect("stripped SDL parses");
    }

    #[tokio::test]
    async fn validate_maps_remote_errors() {
        let app = Router::new().route(
            "/trpc/validate",
            post(|| async {
                Json(serde_json::json!({ "errors": [{ "message": "boom" }] }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let orchestrator = FederationOrchestrator::new(base_url);
        let errors = orchestrator
            .validate(
                &[SchemaInput::new("type Query { ping: String }", "ping")],
                &OrchestratorConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn requests_carry_request_id_and_external_settings() {
        let (seen_tx, seen_rx) = oneshot::channel::<(Option<String>, serde_json::Value)>();
        let seen_tx = std::sync::Arc::new(std::sync::Mutex::new(Some(seen_tx)));

        let app = Router::new().route(
            "/trpc/validate",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let seen_tx = seen_tx.clone();
                async move {
                    let request_id = headers
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string);
                    if let Some(tx) = seen_tx.lock().unwrap().take() {
                        let _ = tx.send((request_id, body));
                    }
                    Json(serde_json::json!({ "errors": [] }))
                }
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let orchestrator = FederationOrchestrator::new(base_url);
        let config = OrchestratorConfig {
            external: Some(ExternalComposition {
                endpoint: "https://composer.tenant.example".to_string(),
                encrypted_secret: "opaque-ciphertext".to_string(),
            }),
            ..OrchestratorConfig::default()
        };
        orchestrator
            .validate(
                &[SchemaInput::new("type Query { ping: String }", "ping")
                    .with_url("https://ping.example/graphql")],
                &config,
            )
            .await
            .unwrap();

        let (request_id, body) = seen_rx.await.unwrap();
        assert!(request_id.is_some());
        assert_eq!(body["type"], "federation");
        assert_eq!(body["external"]["encryptedSecret"], "opaque-ciphertext");
        assert_eq!(body["schemas"][0]["url"], "https://ping.example/graphql");
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn build_errors_become_composition_failure() {
        let app = Router::new().route(
            "/trpc/build",
            post(|| async {
                Json(serde_json::json!({ "errors": [{ "message": "no joinable fields" }] }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let orchestrator = FederationOrchestrator::new(base_url);
        let err = orchestrator
            .build(
                &[SchemaInput::new("type Query { ping: String }", "ping")],
                &OrchestratorConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaBuildError::Composition(_)));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn build_strips_machinery_on_modern_model() {
        let app = Router::new().route(
            "/trpc/build",
            post(|| async {
                Json(serde_json::json!({ "raw": SUPERGRAPH_SDL, "source": "federation" }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let orchestrator = FederationOrchestrator::new(base_url);
        let config = OrchestratorConfig {
            strip_federation_machinery: true,
            ..OrchestratorConfig::default()
        };
        let composed = orchestrator
            .build(
                &[SchemaInput::new("type Query { ping: String }", "ping")],
                &config,
            )
            .await
            .unwrap();
        assert!(!composed.raw.contains("join__"));
        assert!(composed.raw.contains("ping"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn supergraph_passthrough() {
        let app = Router::new().route(
            "/trpc/supergraph",
            post(|| async { Json(serde_json::json!({ "supergraph": "schema { query: Query }" })) }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let orchestrator = FederationOrchestrator::new(base_url);
        let supergraph = orchestrator
            .supergraph(
                &[SchemaInput::new("type Query { ping: String }", "ping")],
                &OrchestratorConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(supergraph.as_deref(), Some("schema { query: Query }"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let orchestrator = FederationOrchestrator::with_client(
            "http://127.0.0.1:1",
            reqwest::Client::builder()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
        );
        let err = orchestrator
            .validate(
                &[SchemaInput::new("type Query { ping: String }", "ping")],
                &OrchestratorConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaBuildError::Transport(_)));
    }
}
