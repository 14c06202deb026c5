//! # Trigger Submission
//!
//! Webhooks and agents submit trigger events. With an event bus the event is
//! queued and processed asynchronously (202); without one it is evaluated
//! and dispatched inline and the full report is returned (200).

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vos_bus::{BusStats, DeadLetter};
use vos_core::{EventId, ProductId, TriggerEvent};
use vos_runtime::TriggerReport;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitEventRequest {
    pub event_type: String,
    /// Producer name. Events from one source must arrive in timestamp order;
    /// events without a source are treated as independent.
    #[serde(default)]
    pub source: Option<String>,
    /// `None` addresses every product.
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Reuse an id to make retries of the same submission idempotent.
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Validate for SubmitEventRequest {
    fn validate(&self) -> Result<(), String> {
        if self.event_type.trim().is_empty() {
            return Err("event_type must not be empty".to_string());
        }
        if self.event_type.len() > MAX_NAME_LEN {
            return Err(format!("event_type must not exceed {MAX_NAME_LEN} characters"));
        }
        match &self.source {
            Some(source) if source.trim().is_empty() => {
                Err("source must not be empty when present".to_string())
            }
            Some(source) if source.len() > MAX_NAME_LEN => {
                Err(format!("source must not exceed {MAX_NAME_LEN} characters"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResponse {
    Queued { event_id: EventId, handlers: usize },
    Handled { report: TriggerReport },
}

#[derive(Debug, Serialize)]
pub struct BusResponse {
    pub handlers: Vec<String>,
    pub stats: BusStats,
    pub dead_letters: Vec<DeadLetter>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/events", post(submit_event))
        .route("/v1/events/bus", get(bus_status))
}

/// An event produced by this API on its own behalf, with a source of its own.
pub(crate) fn api_event(event_type: &str) -> TriggerEvent {
    let event = TriggerEvent::new("api", event_type);
    let source = format!("api:{}", event.event_id);
    TriggerEvent { source, ..event }
}

/// Publish to the bus if there is one, otherwise handle inline.
pub(crate) async fn submit(state: &AppState, event: TriggerEvent) -> Result<SubmitResponse, AppError> {
    match &state.bus {
        Some(bus) => {
            let event_id = event.event_id;
            let handlers = bus.publish(event).await?;
            Ok(SubmitResponse::Queued { event_id, handlers })
        }
        None => {
            let report = state.runtime.handle_trigger(event).await?;
            Ok(SubmitResponse::Handled { report })
        }
    }
}

/// POST /v1/events: submit a trigger.
async fn submit_event(
    State(state): State<AppState>,
    body: Result<Json<SubmitEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let req = extract_validated_json(body)?;

    let mut event = match req.source {
        Some(source) => TriggerEvent::new(source, req.event_type),
        None => api_event(&req.event_type),
    }
    .with_payload(req.payload);
    if let Some(product_id) = req.product_id {
        event = event.with_product(ProductId::new(product_id)?);
    }
    if let Some(event_id) = req.event_id {
        event = event.with_event_id(event_id);
    }
    if let Some(timestamp) = req.timestamp {
        event = event.with_timestamp(timestamp);
    }

    tracing::debug!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        source = %event.source,
        "event submitted"
    );
    let response = submit(&state, event).await?;
    let status = match response {
        SubmitResponse::Queued { .. } => StatusCode::ACCEPTED,
        SubmitResponse::Handled { .. } => StatusCode::OK,
    };
    Ok((status, Json(response)))
}

/// GET /v1/events/bus: handler list, delivery counters and dead letters.
async fn bus_status(State(state): State<AppState>) -> Result<Json<BusResponse>, AppError> {
    let bus = state
        .bus
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("no event bus is running".to_string()))?;
    Ok(Json(BusResponse {
        handlers: bus.handler_names(),
        stats: bus.stats(),
        dead_letters: bus.dead_letters(),
    }))
}
