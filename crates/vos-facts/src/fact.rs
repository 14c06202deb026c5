//! A single timestamped observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vos_core::{FactValue, MetricName, ProductId};

/// Identifies one time series in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub product_id: ProductId,
    pub metric: MetricName,
}

/// A timestamped, typed observation of a metric for a product. Immutable
/// once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub product_id: ProductId,
    pub metric: MetricName,
    pub value: FactValue,
    /// When the value was observed at its source.
    pub observed_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(
        product_id: ProductId,
        metric: MetricName,
        value: FactValue,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            metric,
            value,
            observed_at,
        }
    }

    pub fn key(&self) -> FactKey {
        FactKey {
            product_id: self.product_id.clone(),
            metric: self.metric.clone(),
        }
    }
}
