//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Header carrying the tenant's project key.
pub const PROJECT_KEY_HEADER: &str = "x-project-key";

/// Optional `X-Project-Key` header value.
///
/// Absence is not an error here — a missing key selects the demo tenant
/// downstream in the resolver.
#[derive(Debug, Clone)]
pub struct ProjectKey(pub Option<String>);

impl ProjectKey {
    /// Borrow the key when present.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for ProjectKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(PROJECT_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(Self(key))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<Body>) -> ProjectKey {
        let (mut parts, _) = request.into_parts();
        ProjectKey::from_request_parts(&mut parts, &()).await.expect("infallible")
    }

    #[tokio::test]
    async fn test_header_present() {
        let request = Request::builder()
            .header("X-Project-Key", "braidql_abc")
            .body(Body::empty())
            .expect("request");
        assert_eq!(extract(request).await.as_deref(), Some("braidql_abc"));
    }

    #[tokio::test]
    async fn test_header_absent_or_blank() {
        let request = Request::builder().body(Body::empty()).expect("request");
        assert!(extract(request).await.as_deref().is_none());

        let request = Request::builder()
            .header("X-Project-Key", "   ")
            .body(Body::empty())
            .expect("request");
        assert!(extract(request).await.as_deref().is_none());
    }
}
