//! # Fact Ingestion and Queries
//!
//! Metric producers push observations; operators read the latest value,
//! a time window, or a product's full snapshot.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vos_core::{event_types, EventId, MetricName, ProductId};
use vos_facts::{Fact, FactSnapshot};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::events::{api_event, submit};
use crate::state::AppState;

const MAX_VALUES_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordFactsRequest {
    pub product_id: String,
    /// Defaults to the time of receipt.
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    /// Metric name to raw value. Fractional amounts must be strings.
    pub values: BTreeMap<String, serde_json::Value>,
    /// Submit a `facts.updated` trigger for the product once recorded.
    #[serde(default)]
    pub trigger: bool,
}

impl Validate for RecordFactsRequest {
    fn validate(&self) -> Result<(), String> {
        if self.values.is_empty() {
            return Err("values must not be empty".to_string());
        }
        if self.values.len() > MAX_VALUES_PER_REQUEST {
            return Err(format!(
                "values must not exceed {MAX_VALUES_PER_REQUEST} entries"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordedFact {
    pub metric: MetricName,
    pub sequence: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordFactsResponse {
    pub product_id: ProductId,
    pub recorded: Vec<RecordedFact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    /// Inclusive lower bound; defaults to the start of the series.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowResponse {
    pub product_id: ProductId,
    pub metric: MetricName,
    pub facts: Vec<Fact>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/facts", post(record_facts))
        .route("/v1/facts/:product_id", get(get_snapshot))
        .route("/v1/facts/:product_id/:metric", get(get_latest))
        .route("/v1/facts/:product_id/:metric/window", get(get_window))
}

/// POST /v1/facts: Record one or more observations for a product.
///
/// Every value is type-checked before any is recorded, so a request is
/// either fully recorded or rejected with 422.
async fn record_facts(
    State(state): State<AppState>,
    body: Result<Json<RecordFactsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecordFactsResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let product_id = ProductId::new(req.product_id)?;
    let observed_at = req.observed_at.unwrap_or_else(Utc::now);
    let store = state.runtime.facts();

    let mut typed = Vec::with_capacity(req.values.len());
    for (name, raw) in &req.values {
        let metric = MetricName::new(name.as_str())?;
        let value = store.schema().coerce(&product_id, &metric, raw)?;
        typed.push((metric, value));
    }

    let mut recorded = Vec::with_capacity(typed.len());
    for (metric, value) in typed {
        let sequence = store.record_value(product_id.clone(), metric.clone(), value, observed_at)?;
        recorded.push(RecordedFact { metric, sequence });
    }

    let event_id = if req.trigger {
        let metrics: Vec<&str> = recorded.iter().map(|r| r.metric.as_str()).collect();
        let event = api_event(event_types::FACTS_UPDATED)
            .with_product(product_id.clone())
            .with_payload(json!({ "metrics": metrics }));
        let event_id = event.event_id;
        submit(&state, event).await?;
        Some(event_id)
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(RecordFactsResponse {
            product_id,
            recorded,
            event_id,
        }),
    ))
}

/// GET /v1/facts/:product_id: Latest value of every metric.
async fn get_snapshot(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<FactSnapshot>, AppError> {
    let product_id = ProductId::new(product_id)?;
    Ok(Json(state.runtime.facts().snapshot(&product_id)))
}

/// GET /v1/facts/:product_id/:metric: Most recent fact.
async fn get_latest(
    State(state): State<AppState>,
    Path((product_id, metric)): Path<(String, String)>,
) -> Result<Json<Fact>, AppError> {
    let product_id = ProductId::new(product_id)?;
    let metric = MetricName::new(metric)?;
    Ok(Json(state.runtime.facts().latest(&product_id, &metric)?))
}

/// GET /v1/facts/:product_id/:metric/window?since=: Facts in timestamp order.
async fn get_window(
    State(state): State<AppState>,
    Path((product_id, metric)): Path<(String, String)>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<WindowResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let product_id = ProductId::new(product_id)?;
    let metric = MetricName::new(metric)?;
    let since = query.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let facts = state
        .runtime
        .facts()
        .window(&product_id, &metric, since)
        .iter()
        .cloned()
        .collect();
    Ok(Json(WindowResponse {
        product_id,
        metric,
        facts,
    }))
}
