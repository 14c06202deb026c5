//! # Dispatch Ledger and Audit
//!
//! Read-only views over what the dispatcher has done with each action, and
//! the combined audit trail of the engine and dispatcher.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use vos_core::{ActionId, AuditEntry};
use vos_dispatch::DispatchRecord;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/actions/failed", get(list_failed))
        .route("/v1/actions/deferred", get(list_deferred))
        .route("/v1/actions/in_flight", get(list_in_flight))
        .route("/v1/actions/:action_id", get(get_action))
        .route("/v1/audit", get(list_audit))
}

/// GET /v1/actions/failed: actions that will not be dispatched.
async fn list_failed(State(state): State<AppState>) -> Json<Vec<DispatchRecord>> {
    Json(state.runtime.dispatcher().failures())
}

/// GET /v1/actions/deferred: actions waiting on approval.
async fn list_deferred(State(state): State<AppState>) -> Json<Vec<DispatchRecord>> {
    Json(state.runtime.dispatcher().deferred())
}

/// GET /v1/actions/in_flight: actions being performed or awaiting redelivery.
async fn list_in_flight(State(state): State<AppState>) -> Json<Vec<DispatchRecord>> {
    Json(state.runtime.dispatcher().in_flight())
}

async fn get_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<DispatchRecord>, AppError> {
    let action_id = ActionId::from_str(&action_id)?;
    state
        .runtime
        .dispatcher()
        .record(action_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("action {action_id}")))
}

/// GET /v1/audit: engine and dispatcher entries merged by timestamp.
async fn list_audit(State(state): State<AppState>) -> Json<Vec<AuditEntry>> {
    let mut entries = state.runtime.engine().audit_entries();
    entries.extend(state.runtime.dispatcher().audit_entries());
    entries.sort_by_key(|entry| entry.timestamp);
    Json(entries)
}
