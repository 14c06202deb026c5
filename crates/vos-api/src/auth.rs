//! # Bearer Token Authentication
//!
//! When a token is configured every `/v1/*` request must carry
//! `Authorization: Bearer <token>`. Without one, auth is disabled.

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Injected into request extensions by [`crate::app`].
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Compare without leaking the position of the first mismatch.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let failure = match provided {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if constant_time_token_eq(token, &expected) => None,
            Some(_) => Some("invalid bearer token"),
            None => Some("authorization header must use Bearer scheme"),
        },
        None => Some("missing authorization header"),
    };

    match failure {
        None => next.run(request).await,
        Some(reason) => {
            tracing::warn!(reason, path = %request.uri().path(), "authentication failed");
            AppError::Unauthorized(reason.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_app(token: Option<&str>) -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig {
                token: token.map(str::to_string),
            }))
    }

    async fn status(app: Router, authorization: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn valid_token_accepted() {
        assert_eq!(status(test_app(Some("s3cret")), Some("Bearer s3cret")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_or_missing_token_rejected() {
        for header in [Some("Bearer nope"), Some("Basic s3cret"), Some("Bearer s3cre"), None] {
            assert_eq!(
                status(test_app(Some("s3cret")), header).await,
                StatusCode::UNAUTHORIZED,
                "{header:?}"
            );
        }
    }

    #[tokio::test]
    async fn no_token_disables_auth() {
        assert_eq!(status(test_app(None), None).await, StatusCode::OK);
    }

    #[test]
    fn token_is_redacted() {
        let config = AuthConfig {
            token: Some("s3cret".into()),
        };
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
