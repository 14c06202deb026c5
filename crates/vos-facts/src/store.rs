//! # Fact Store
//!
//! Append-only, per-(product, metric) time series. Each series is an
//! immutable `Arc<Vec<Fact>>` sorted by `observed_at`; a write builds the next
//! version (copy-on-write when readers still hold the previous one) and
//! swaps it in under the write lock. Readers therefore never observe a
//! partially applied write, and a [`FactWindow`] keeps iterating the version
//! it was created from.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use vos_core::{FactValue, MetricName, ProductId};

use crate::error::{FactError, FactResult};
use crate::fact::Fact;
use crate::log::{FactRecord, FactSink};
use crate::schema::FactSchema;

type Series = Arc<Vec<Fact>>;

#[derive(Default)]
struct StoreInner {
    products: HashMap<ProductId, BTreeMap<MetricName, Series>>,
    next_sequence: u64,
    len: usize,
}

impl StoreInner {
    fn insert(&mut self, fact: Fact) {
        let series = self
            .products
            .entry(fact.product_id.clone())
            .or_default()
            .entry(fact.metric.clone())
            .or_default();
        let facts = Arc::make_mut(series);
        // Equal timestamps keep arrival order, so the last recorded wins.
        let pos = facts.partition_point(|f| f.observed_at <= fact.observed_at);
        facts.insert(pos, fact);
        self.len += 1;
    }

    fn series(&self, product_id: &ProductId, metric: &MetricName) -> Option<&Series> {
        self.products.get(product_id)?.get(metric)
    }
}

/// The system of record for observed metrics. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct FactStore {
    inner: Arc<RwLock<StoreInner>>,
    schema: Arc<FactSchema>,
    sink: Option<Arc<dyn FactSink>>,
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore")
            .field("facts", &self.len())
            .field("metrics", &self.schema.len())
            .field("persistent", &self.sink.is_some())
            .finish()
    }
}

impl FactStore {
    pub fn new(schema: FactSchema) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            schema: Arc::new(schema),
            sink: None,
        }
    }

    /// Persist every recorded fact to `sink` before it becomes visible.
    pub fn with_sink(mut self, sink: Arc<dyn FactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn schema(&self) -> &FactSchema {
        &self.schema
    }

    /// Record a fact. Returns its sequence number.
    ///
    /// Rejected with [`FactError::InvalidFact`] if the metric is not declared
    /// or the value has the wrong type. If a sink is configured and the
    /// append fails, the fact is not recorded.
    pub fn record(&self, fact: Fact) -> FactResult<u64> {
        self.schema.check(&fact)?;

        let mut inner = self.inner.write();
        let sequence = inner.next_sequence;
        if let Some(sink) = &self.sink {
            sink.append(sequence, &fact)?;
        }
        inner.next_sequence += 1;

        tracing::debug!(
            product_id = %fact.product_id,
            metric = %fact.metric,
            value = %fact.value,
            sequence,
            "fact recorded"
        );
        inner.insert(fact);
        Ok(sequence)
    }

    /// Record a typed value observed at `observed_at`.
    pub fn record_value(
        &self,
        product_id: ProductId,
        metric: MetricName,
        value: FactValue,
        observed_at: DateTime<Utc>,
    ) -> FactResult<u64> {
        self.record(Fact::new(product_id, metric, value, observed_at))
    }

    /// Record an untyped JSON value, coerced through the schema.
    pub fn record_raw(
        &self,
        product_id: ProductId,
        metric: MetricName,
        raw: &serde_json::Value,
        observed_at: DateTime<Utc>,
    ) -> FactResult<u64> {
        let value = self.schema.coerce(&product_id, &metric, raw)?;
        self.record(Fact::new(product_id, metric, value, observed_at))
    }

    /// Rebuild state from persisted records without writing them back to
    /// the sink. Records must already be chain-verified.
    pub fn restore(&self, records: impl IntoIterator<Item = FactRecord>) -> FactResult<usize> {
        let mut inner = self.inner.write();
        let mut restored = 0;
        for record in records {
            self.schema.check(&record.fact)?;
            inner.next_sequence = inner.next_sequence.max(record.sequence + 1);
            inner.insert(record.fact);
            restored += 1;
        }
        tracing::info!(restored, "fact store restored from log");
        Ok(restored)
    }

    /// The fact with the greatest timestamp for the key.
    pub fn latest(&self, product_id: &ProductId, metric: &MetricName) -> FactResult<Fact> {
        let inner = self.inner.read();
        inner
            .series(product_id, metric)
            .and_then(|series| series.last())
            .cloned()
            .ok_or_else(|| FactError::NotFound {
                product_id: product_id.clone(),
                metric: metric.clone(),
            })
    }

    /// Facts for the key observed at or after `since`, ascending.
    ///
    /// The window is lazy and restartable: it holds the series version that
    /// existed when it was created and can be iterated any number of times.
    pub fn window(
        &self,
        product_id: &ProductId,
        metric: &MetricName,
        since: DateTime<Utc>,
    ) -> FactWindow {
        let series = {
            let inner = self.inner.read();
            inner
                .series(product_id, metric)
                .cloned()
                .unwrap_or_default()
        };
        let start = series.partition_point(|f| f.observed_at < since);
        FactWindow { series, start }
    }

    /// Latest value of every metric recorded for the product.
    pub fn snapshot(&self, product_id: &ProductId) -> FactSnapshot {
        let inner = self.inner.read();
        let mut snapshot = FactSnapshot::new(product_id.clone());
        if let Some(metrics) = inner.products.get(product_id) {
            for (metric, series) in metrics {
                if let Some(fact) = series.last() {
                    snapshot.insert(metric.clone(), fact.value.clone());
                }
            }
        }
        snapshot
    }

    /// Products with at least one recorded fact, sorted.
    pub fn products(&self) -> Vec<ProductId> {
        let inner = self.inner.read();
        let mut ids: Vec<ProductId> = inner.products.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Total number of facts held.
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// FactWindow
// ---------------------------------------------------------------------------

/// A time-ordered view over one series from a point in time onward.
#[derive(Debug, Clone)]
pub struct FactWindow {
    series: Series,
    start: usize,
}

impl FactWindow {
    /// Iterate the window from the beginning, ascending by timestamp.
    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.series[self.start..].iter()
    }

    pub fn len(&self) -> usize {
        self.series.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&Fact> {
        self.series.get(self.start)
    }

    pub fn last(&self) -> Option<&Fact> {
        if self.is_empty() {
            None
        } else {
            self.series.last()
        }
    }
}

impl<'a> IntoIterator for &'a FactWindow {
    type Item = &'a Fact;
    type IntoIter = std::slice::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// FactSnapshot
// ---------------------------------------------------------------------------

/// Latest values of a product's metrics at one point in time: the input to
/// rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSnapshot {
    product_id: ProductId,
    values: BTreeMap<MetricName, FactValue>,
}

impl FactSnapshot {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, metric: MetricName, value: FactValue) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: MetricName, value: FactValue) {
        self.values.insert(metric, value);
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn get(&self, metric: &MetricName) -> Option<&FactValue> {
        self.values.get(metric)
    }

    pub fn contains(&self, metric: &MetricName) -> bool {
        self.values.contains_key(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricName, &FactValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
