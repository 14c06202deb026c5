//! # vos-api — HTTP Surface for the Automation Core
//!
//! ## API Surface
//!
//! | Prefix               | Module                  | Purpose                     |
//! |----------------------|-------------------------|-----------------------------|
//! | `/v1/facts/*`        | [`routes::facts`]       | Record and query facts      |
//! | `/v1/events/*`       | [`routes::events`]      | Submit triggers, bus status |
//! | `/v1/approvals/*`    | [`routes::approvals`]   | Approval gate decisions     |
//! | `/v1/actions/*`      | [`routes::actions`]     | Dispatch ledger             |
//! | `/v1/audit`          | [`routes::actions`]     | Audit trail                 |
//! | `/v1/rules`          | [`routes::catalog`]     | Loaded rule set             |
//! | `/v1/products`       | [`routes::catalog`]     | Product registry            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

pub use error::AppError;
pub use state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Assemble the application router.
///
/// Health routes (`/health/*`) are mounted outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::facts::router())
        .merge(routes::events::router())
        .merge(routes::approvals::router())
        .merge(routes::actions::router())
        .merge(routes::catalog::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /health/liveness: the process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// GET /health/readiness: rules are loaded and, when configured, the bus has
/// subscribers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.runtime.engine().rules().len();
    let handlers = state.bus.as_ref().map(|bus| bus.handler_names().len());
    let ready = handlers != Some(0);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "rules": rules,
        "products": state.runtime.registry().len(),
        "bus_handlers": handlers,
    });
    (status, Json(body))
}
