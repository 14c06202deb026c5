//! # Rule and Product Catalog
//!
//! The loaded rule set and product registry, as the runtime sees them.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use vos_core::ProductId;
use vos_rules::RuleDef;
use vos_runtime::ProductConfig;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RuleSummary {
    #[serde(flatten)]
    pub definition: RuleDef,
    /// Effective gate requirement, including the high-impact default.
    pub requires_approval: bool,
}

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub config: ProductConfig,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/rules", get(list_rules))
        .route("/v1/products", get(list_products))
}

/// GET /v1/rules: rules in evaluation order.
async fn list_rules(State(state): State<AppState>) -> Json<Vec<RuleSummary>> {
    let rules = state.runtime.engine().rules();
    let summaries = rules
        .iter()
        .map(|rule| RuleSummary {
            definition: rule.definition().clone(),
            requires_approval: rule.requires_approval(),
        })
        .collect();
    Json(summaries)
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<ProductSummary>> {
    let products = state
        .runtime
        .registry()
        .iter()
        .map(|(product_id, config)| ProductSummary {
            product_id: product_id.clone(),
            config: config.clone(),
        })
        .collect();
    Json(products)
}
