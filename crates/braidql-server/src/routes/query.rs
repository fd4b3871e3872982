//! `POST /api/v1/query` — the natural-language query endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use braidql_core::account::AccountConfig;
use braidql_core::plan::{QueryRequest, QueryResult, SecurityContext};

use crate::error::ApiError;
use crate::extractors::ProjectKey;
use crate::state::AppContext;

/// Execute a natural-language query for the resolved tenant.
pub async fn execute_query(
    State(context): State<Arc<AppContext>>,
    key: ProjectKey,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let account = context.resolver.resolve(key.as_deref()).await?;
    let security_ctx = security_context_for(&account);

    let result = context.service.execute(&request, &security_ctx, &account).await?;
    Ok(Json(result))
}

/// Security context for API-key callers.
///
/// Row filters and field masks come from the account's policy store once
/// one exists; key-only callers currently get an unrestricted context
/// scoped to their account.
fn security_context_for(account: &AccountConfig) -> SecurityContext {
    SecurityContext {
        user_id: format!("project:{}", account.id),
        role: "api".to_string(),
        account_id: Some(account.id.clone()),
        permissions: vec!["query:execute".to_string()],
        ..SecurityContext::default()
    }
}
