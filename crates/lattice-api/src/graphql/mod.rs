//! GraphQL schema assembly for the registry endpoint.
//!
//! The schema is injected with the [`SchemaLifecycleCoordinator`]; the
//! per-request [`Session`] arrives through request data, attached by the
//! HTTP handler after header authentication.

pub mod types;

use async_graphql::{Context, EmptySubscription, Object, Result as GqlResult, Schema, ID};
use std::sync::Arc;

use lattice_core::id::VersionId;
use lattice_registry::SchemaLifecycleCoordinator;

use crate::auth::Session;
use types::{
    schema_version, RegistryVersion, RegistryVersionConnection, SchemaCheckInput,
    SchemaCheckPayloadGql, SchemaDeleteInput, SchemaDeleteResultGql, SchemaPublishInput,
    SchemaPublishPayloadGql, SchemaVersion,
};

/// The full GraphQL schema type for the registry endpoint.
pub type RegistrySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Builds the GraphQL schema with the shared coordinator.
#[must_use]
pub fn build_schema(coordinator: Arc<SchemaLifecycleCoordinator>) -> RegistrySchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(coordinator)
        .finish()
}

fn session<'ctx>(ctx: &'ctx Context<'_>) -> GqlResult<&'ctx Session> {
    ctx.data_opt::<Session>()
        .ok_or_else(|| async_graphql::Error::new("Missing or invalid registry token"))
}

fn coordinator<'ctx>(ctx: &'ctx Context<'_>) -> &'ctx Arc<SchemaLifecycleCoordinator> {
    ctx.data_unchecked::<Arc<SchemaLifecycleCoordinator>>()
}

/// Query root of the registry endpoint.
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The latest version of the token's target.
    async fn latest_version(&self, ctx: &Context<'_>) -> GqlResult<Option<SchemaVersion>> {
        let session = session(ctx)?;
        let result = coordinator(ctx)
            .latest_version(&session.context, session.target_id)
            .await
            .map_err(to_gql_error)?;
        Ok(result.map(|(version, schemas)| schema_version(&version, &schemas)))
    }

    /// The latest composable version of the token's target.
    async fn latest_composable_version(
        &self,
        ctx: &Context<'_>,
    ) -> GqlResult<Option<SchemaVersion>> {
        let session = session(ctx)?;
        let result = coordinator(ctx)
            .latest_composable_version(&session.context, session.target_id)
            .await
            .map_err(to_gql_error)?;
        Ok(result.map(|(version, schemas)| schema_version(&version, &schemas)))
    }

    /// Newest-first page of the target's versions.
    async fn registry_versions(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        after: Option<ID>,
    ) -> GqlResult<RegistryVersionConnection> {
        let session = session(ctx)?;
        let limit = limit.unwrap_or(25).clamp(1, 100) as usize;
        let after = match after {
            Some(id) => Some(
                id.parse::<VersionId>()
                    .map_err(|e| async_graphql::Error::new(e.to_string()))?,
            ),
            None => None,
        };

        let versions = coordinator(ctx)
            .versions(&session.context, session.target_id, limit, after)
            .await
            .map_err(to_gql_error)?;

        Ok(RegistryVersionConnection {
            nodes: versions
                .into_iter()
                .map(|version| RegistryVersion {
                    id: ID(version.id.to_string()),
                    date: version.created_at,
                    valid: version.is_composable,
                })
                .collect(),
        })
    }
}

/// Mutation root of the registry endpoint.
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Records a new schema revision for the token's target.
    async fn schema_publish(
        &self,
        ctx: &Context<'_>,
        input: SchemaPublishInput,
    ) -> GqlResult<SchemaPublishPayloadGql> {
        let session = session(ctx)?;
        let payload = coordinator(ctx)
            .publish(&session.context, session.target_id, input.into())
            .await
            .map_err(to_gql_error)?;
        Ok(payload.into())
    }

    /// Dry-runs a schema change against the token's target.
    async fn schema_check(
        &self,
        ctx: &Context<'_>,
        input: SchemaCheckInput,
    ) -> GqlResult<SchemaCheckPayloadGql> {
        let session = session(ctx)?;
        let payload = coordinator(ctx)
            .check(&session.context, session.target_id, input.into())
            .await
            .map_err(to_gql_error)?;
        Ok(payload.into())
    }

    /// Retires a service from the token's target.
    async fn schema_delete(
        &self,
        ctx: &Context<'_>,
        input: SchemaDeleteInput,
    ) -> GqlResult<SchemaDeleteResultGql> {
        let session = session(ctx)?;
        let result = coordinator(ctx)
            .delete(&session.context, session.target_id, input.into())
            .await
            .map_err(to_gql_error)?;
        Ok(result.into())
    }
}

fn to_gql_error(error: lattice_core::Error) -> async_graphql::Error {
    async_graphql::Error::new(error.to_string())
}
