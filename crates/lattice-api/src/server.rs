//! HTTP server: the GraphQL endpoint plus a liveness probe.

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;
use crate::graphql::RegistrySchema;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The executable GraphQL schema.
    pub schema: RegistrySchema,
    /// Header authentication.
    pub auth: Arc<AuthService>,
}

/// Builds the application router.
#[must_use]
pub fn router(schema: RegistrySchema, auth: Arc<AuthService>) -> Router {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { schema, auth })
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Some(session) = state.auth.authenticate(&headers).await {
        request = request.data(session);
    }
    state.schema.execute(request).await.into()
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the router until shutdown is requested.
///
/// # Errors
///
/// Returns an error when binding or serving fails.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "registry api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
    tracing::info!("shutting down");
}
