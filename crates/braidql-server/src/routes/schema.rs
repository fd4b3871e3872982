//! `GET /api/v1/schema` — introspected schemas for the tenant.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use braidql_core::db::DatabaseSchema;

use crate::error::ApiError;
use crate::extractors::ProjectKey;
use crate::state::AppContext;

/// Return the per-database schema map for the resolved tenant.
///
/// Cheap after the first call for an account: schemas are memoized inside
/// the adapters.
pub async fn get_schemas(
    State(context): State<Arc<AppContext>>,
    key: ProjectKey,
) -> Result<Json<HashMap<String, DatabaseSchema>>, ApiError> {
    let account = context.resolver.resolve(key.as_deref()).await?;
    let schemas = context.factory.get_all_schemas(&account).await?;
    Ok(Json(schemas))
}
