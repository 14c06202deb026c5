//! # Approval Gates
//!
//! High-impact actions wait here until an operator decides. Approval
//! dispatches the action through the normal retry path; rejection discards
//! it and records why.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use vos_core::{Action, ActionId};
use vos_dispatch::{ApprovalGate, DispatchResult};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

const MAX_APPROVER_LEN: usize = 128;
const MAX_REASON_LEN: usize = 1024;

#[derive(Debug, Serialize)]
pub struct PendingApproval {
    pub gate: ApprovalGate,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    pub approver: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    pub approver: String,
    #[serde(default)]
    pub reason: Option<String>,
}

fn validate_approver(approver: &str) -> Result<(), String> {
    if approver.trim().is_empty() {
        return Err("approver must not be empty".to_string());
    }
    if approver.len() > MAX_APPROVER_LEN {
        return Err(format!("approver must not exceed {MAX_APPROVER_LEN} characters"));
    }
    Ok(())
}

impl Validate for ApproveRequest {
    fn validate(&self) -> Result<(), String> {
        validate_approver(&self.approver)
    }
}

impl Validate for RejectRequest {
    fn validate(&self) -> Result<(), String> {
        validate_approver(&self.approver)?;
        match &self.reason {
            Some(reason) if reason.len() > MAX_REASON_LEN => {
                Err(format!("reason must not exceed {MAX_REASON_LEN} characters"))
            }
            _ => Ok(()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/approvals", get(list_pending))
        .route("/v1/approvals/:action_id/approve", post(approve))
        .route("/v1/approvals/:action_id/reject", post(reject))
}

/// GET /v1/approvals: gates awaiting a decision, oldest first.
async fn list_pending(State(state): State<AppState>) -> Json<Vec<PendingApproval>> {
    let pending = state
        .runtime
        .dispatcher()
        .gates()
        .pending()
        .into_iter()
        .map(|(gate, action)| PendingApproval { gate, action })
        .collect();
    Json(pending)
}

/// POST /v1/approvals/:action_id/approve
///
/// Responds once the dispatch attempt has finished, with its result.
async fn approve(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<DispatchResult>, AppError> {
    let action_id = ActionId::from_str(&action_id)?;
    let req = extract_validated_json(body)?;
    let result = state
        .runtime
        .dispatcher()
        .approve(action_id, &req.approver)
        .await?;
    Ok(Json(result))
}

/// POST /v1/approvals/:action_id/reject
async fn reject(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<DispatchResult>, AppError> {
    let action_id = ActionId::from_str(&action_id)?;
    let req = extract_validated_json(body)?;
    let result = state
        .runtime
        .dispatcher()
        .reject(action_id, &req.approver, req.reason)?;
    Ok(Json(result))
}
