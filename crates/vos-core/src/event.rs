//! # Trigger Events
//!
//! A [`TriggerEvent`] is anything that should cause rule evaluation: a timer
//! tick, an inbound webhook, an agent signal, a fact change. Events flow
//! through the bus unchanged; the runtime fans a product-less event out to
//! every registered product with [`TriggerEvent::for_product`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{EventId, ProductId};

/// Standard event types.
pub mod event_types {
    /// Periodic health check timer.
    pub const HEALTH_CHECK: &str = "schedule.health_check";
    /// Periodic advertising optimization timer.
    pub const ADS_OPTIMIZATION: &str = "schedule.ads_optimization";
    /// Hourly timer.
    pub const HOURLY: &str = "schedule.hourly";
    /// Daily timer.
    pub const DAILY: &str = "schedule.daily";
    /// Weekly timer.
    pub const WEEKLY: &str = "schedule.weekly";
    /// Daily revenue report timer.
    pub const DAILY_REVENUE: &str = "schedule.daily_revenue";
    /// Weekly content calendar timer.
    pub const WEEKLY_CONTENT: &str = "schedule.weekly_content";
    /// Weekly SEO audit timer.
    pub const WEEKLY_SEO: &str = "schedule.weekly_seo";
    /// Error-rate spike reported by monitoring.
    pub const ERROR_SPIKE: &str = "monitoring.error_spike";
    /// Latency spike reported by monitoring.
    pub const LATENCY_SPIKE: &str = "monitoring.latency_spike";
    /// Downtime reported by monitoring.
    pub const DOWNTIME: &str = "monitoring.downtime";
    /// Advertising metric crossed a threshold.
    pub const AD_THRESHOLD: &str = "marketing.ad_threshold";
    /// New paying signup.
    pub const SIGNUP: &str = "revenue.signup";
    /// Subscription cancelled.
    pub const SUBSCRIPTION_CANCELLED: &str = "revenue.subscription_cancelled";
    /// Payment received.
    pub const PAYMENT_RECEIVED: &str = "revenue.payment_received";
    /// Support ticket opened.
    pub const TICKET_CREATED: &str = "support.ticket_created";
    /// Support conversation escalated to a human.
    pub const ESCALATION: &str = "support.escalation";
    /// New facts were recorded for a product.
    pub const FACTS_UPDATED: &str = "facts.updated";
    /// Pull request merged.
    pub const PR_MERGED: &str = "github.pr.merged";
    /// Release published.
    pub const RELEASE: &str = "github.release";
}

/// An occurrence that causes rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Identity of the event; redeliveries share it.
    pub event_id: EventId,
    /// Who produced the event (e.g. `scheduler:health_check`, `webhook:billing`).
    pub source: String,
    /// Dotted event type (see [`event_types`]).
    pub event_type: String,
    /// The product concerned, or `None` for every product.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    /// When the event occurred at its source.
    pub timestamp: DateTime<Utc>,
    /// Source-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TriggerEvent {
    /// A new event with a fresh identifier, timestamped now, for every product.
    pub fn new(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            source: source.into(),
            event_type: event_type.into(),
            product_id: None,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Restrict the event to one product.
    pub fn with_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Override the event timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Use a specific event identifier (redelivery, external idempotency keys).
    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    /// The copy of this event addressed to one product. The event identifier
    /// is preserved so deduplication still applies per product.
    pub fn for_product(&self, product_id: &ProductId) -> Self {
        Self {
            product_id: Some(product_id.clone()),
            ..self.clone()
        }
    }

    /// Whether the event is addressed to every product.
    pub fn is_broadcast(&self) -> bool {
        self.product_id.is_none()
    }
}
