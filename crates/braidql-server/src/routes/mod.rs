//! HTTP route handlers.

mod health;
mod query;
mod schema;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppContext;

/// Build the full application router.
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/query", post(query::execute_query))
        .route("/api/v1/schema", get(schema::get_schemas))
        .with_state(context)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host:                "127.0.0.1".to_string(),
            port:                0,
            model_key:           Some("test-key".to_string()),
            model:               "gemini-2.0-flash".to_string(),
            model_fallback:      String::new(),
            encryption_key:      "test-secret".to_string(),
            demo_enabled:        false,
            demo_relational_url: None,
            demo_document_url:   None,
            log_filter:          "braidql=info".to_string(),
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let context = AppContext::build(test_config()).expect("context builds");
        let app = router(context);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_without_key_and_demo_disabled_is_unauthorized() {
        let context = AppContext::build(test_config()).expect("context builds");
        let app = router(context);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/query")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"intent":"Get all users"}"#))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
