//! Server configuration, loaded from environment variables.

use std::net::SocketAddr;

use lattice_core::observability::LogFormat;
use lattice_registry::ProjectKind;

/// Configuration for the registry API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Socket address to listen on.
    pub listen_addr: SocketAddr,
    /// Log output format.
    pub log_format: LogFormat,
    /// Base URL of the federation composition service.
    pub composition_service_url: String,
    /// Development token seeded with full access to a development target.
    pub dev_token: Option<String>,
    /// Project kind of the seeded development project.
    pub dev_project_kind: ProjectKind,
    /// Seed the development project on the legacy registry model.
    pub dev_legacy_model: bool,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("listen_addr", &self.listen_addr)
            .field("log_format", &self.log_format)
            .field("composition_service_url", &self.composition_service_url)
            .field("dev_token", &self.dev_token.as_ref().map(|_| "[REDACTED]"))
            .field("dev_project_kind", &self.dev_project_kind)
            .field("dev_legacy_model", &self.dev_legacy_model)
            .finish()
    }
}

impl ApiConfig {
    /// Loads the configuration from `LATTICE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable values.
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = match std::env::var("LATTICE_LISTEN_ADDR") {
            Ok(value) => value.parse()?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 4000)),
        };

        let log_format = match std::env::var("LATTICE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let composition_service_url = std::env::var("LATTICE_COMPOSITION_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3069".to_string());

        let dev_project_kind = match std::env::var("LATTICE_DEV_PROJECT_KIND").as_deref() {
            Ok("single") => ProjectKind::Single,
            Ok("stitching") => ProjectKind::Stitching,
            Ok("custom") => ProjectKind::Custom,
            _ => ProjectKind::Federation,
        };

        Ok(Self {
            listen_addr,
            log_format,
            composition_service_url,
            dev_token: std::env::var("LATTICE_DEV_TOKEN").ok().filter(|t| !t.is_empty()),
            dev_project_kind,
            dev_legacy_model: std::env::var("LATTICE_DEV_LEGACY_MODEL")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
