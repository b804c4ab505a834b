//! # lattice-api
//!
//! Inbound surface of the Lattice registry: an axum HTTP server exposing
//! the registry GraphQL endpoint (`schemaPublish` / `schemaCheck` /
//! `schemaDelete` plus version queries), with bearer / `x-api-token`
//! authentication resolving to target-scoped grants.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod auth;
pub mod config;
pub mod graphql;
pub mod server;

pub use auth::{AuthService, MemoryTokenResolver, Session, TokenInfo, TokenResolver};
pub use config::ApiConfig;
pub use graphql::{build_schema, RegistrySchema};
pub use server::{router, serve};
