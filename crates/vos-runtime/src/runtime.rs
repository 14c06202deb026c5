//! # Trigger Orchestration
//!
//! ```text
//!   TriggerEvent
//!     │  resolve products (event product, or every known product)
//!     ├──────────────┬──────────────┐      products run concurrently
//!     ▼              ▼              ▼
//!   lock(acme)     lock(beacon)   ...      one evaluation per product at a time
//!   on_trigger     on_trigger
//!   unlock         unlock
//!     │              │
//!   dispatch       dispatch                 network I/O outside the lock
//!     └──────┬───────┘
//!            ▼
//!      TriggerReport
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use vos_core::{Action, EventId, ProductId, TriggerEvent};
use vos_dispatch::{ActionDispatcher, DispatchResult, WebhookTarget};
use vos_facts::{FactError, FactSchema, FactStore, JsonlFactLog};
use vos_rules::{RuleSet, RulesEngine, TriggerOutcome};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::locks::ProductLocks;
use crate::registry::ProductRegistry;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub action: Action,
    pub result: DispatchResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductReport {
    pub outcome: TriggerOutcome,
    pub dispatched: Vec<ActionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReport {
    pub event_id: EventId,
    pub event_type: String,
    /// One entry per product, sorted by product id.
    pub products: Vec<ProductReport>,
}

impl TriggerReport {
    /// Every emitted action with its dispatch result.
    pub fn actions(&self) -> impl Iterator<Item = &ActionReport> {
        self.products.iter().flat_map(|p| p.dispatched.iter())
    }

    pub fn product(&self, product_id: &ProductId) -> Option<&ProductReport> {
        self.products
            .iter()
            .find(|p| &p.outcome.product_id == product_id)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// The assembled automation core. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Runtime {
    engine: Arc<RulesEngine>,
    dispatcher: Arc<ActionDispatcher>,
    registry: Arc<ProductRegistry>,
    locks: Arc<ProductLocks>,
}

impl Runtime {
    pub fn new(engine: RulesEngine, dispatcher: ActionDispatcher, registry: ProductRegistry) -> Self {
        Self {
            engine: Arc::new(engine),
            dispatcher: Arc::new(dispatcher),
            registry: Arc::new(registry),
            locks: Arc::new(ProductLocks::new()),
        }
    }

    /// Build the runtime described by `config`.
    ///
    /// 1. Load the fact schema (or the standard schema).
    /// 2. Open the fact log, if configured, and replay it into the store.
    /// 3. Load and type-check the rule set. A bad rule aborts startup.
    /// 4. Load the product registry and seed its targets as facts.
    /// 5. Register a log target for every system, replaced by any configured
    ///    webhook.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let schema = match &config.schema {
            Some(path) => FactSchema::load(path)?,
            None => FactSchema::standard(),
        };

        let mut facts = FactStore::new(schema);
        if let Some(path) = &config.fact_log {
            facts = open_fact_log(facts, path)?;
        }

        let rules = if config.rules.is_empty() {
            RuleSet::standard(facts.schema())?
        } else {
            RuleSet::load(&config.rules, facts.schema())?
        };

        let registry = match &config.products {
            Some(path) => ProductRegistry::load(path)?,
            None => ProductRegistry::new(),
        };
        registry.seed_facts(&facts, Utc::now())?;

        let mut dispatcher = ActionDispatcher::new(config.retry)
            .with_log_targets()
            .with_audit_capacity(config.engine.audit_capacity);
        for (system, webhook) in &config.webhooks {
            let target = WebhookTarget::from_config(format!("{system}-webhook"), webhook)
                .map_err(|source| RuntimeError::Webhook {
                    system: *system,
                    source,
                })?;
            tracing::info!(system = %system, url = %target.url(), "webhook target configured");
            dispatcher = dispatcher.with_target(*system, Arc::new(target));
        }

        tracing::info!(
            rules = rules.len(),
            products = registry.len(),
            facts = facts.len(),
            "runtime ready"
        );
        let engine = RulesEngine::new(rules, facts)
            .with_dedup_capacity(config.engine.dedup_capacity)
            .with_audit_capacity(config.engine.audit_capacity);
        Ok(Self::new(engine, dispatcher, registry))
    }

    pub fn engine(&self) -> &Arc<RulesEngine> {
        &self.engine
    }

    pub fn facts(&self) -> &FactStore {
        self.engine.facts()
    }

    pub fn dispatcher(&self) -> &Arc<ActionDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &ProductRegistry {
        &self.registry
    }

    /// Products a trigger applies to: its own product, or for a broadcast
    /// every registered product and every product with recorded facts.
    pub fn products_for(&self, event: &TriggerEvent) -> Vec<ProductId> {
        match &event.product_id {
            Some(product_id) => vec![product_id.clone()],
            None => {
                let mut ids = self.registry.ids();
                ids.extend(self.facts().products());
                ids.sort();
                ids.dedup();
                ids
            }
        }
    }

    /// Evaluate and dispatch a trigger for every product it applies to.
    pub async fn handle_trigger(&self, event: TriggerEvent) -> Result<TriggerReport, RuntimeError> {
        let products = self.products_for(&event);
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            products = products.len(),
            "handling trigger"
        );

        let mut reports = if let [product_id] = products.as_slice() {
            vec![self.process_product(&event, product_id).await]
        } else {
            let event = Arc::new(event.clone());
            let mut tasks = JoinSet::new();
            for product_id in products {
                let runtime = self.clone();
                let event = Arc::clone(&event);
                tasks.spawn(async move { runtime.process_product(&event, &product_id).await });
            }
            let mut reports = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                reports.push(joined.map_err(|e| RuntimeError::Task(e.to_string()))?);
            }
            reports
        };
        reports.sort_by(|a, b| a.outcome.product_id.cmp(&b.outcome.product_id));

        Ok(TriggerReport {
            event_id: event.event_id,
            event_type: event.event_type,
            products: reports,
        })
    }

    /// Evaluate under the product's lock, then dispatch after releasing it.
    ///
    /// Replayed outcomes are dispatched again. The dispatcher returns the
    /// recorded result for decided actions and finishes any dispatch that a
    /// cancelled first delivery left behind.
    pub async fn process_product(&self, event: &TriggerEvent, product_id: &ProductId) -> ProductReport {
        let outcome = {
            let _guard = self.locks.acquire(product_id).await;
            self.engine.on_trigger(event, product_id)
        };

        let mut dispatched = Vec::with_capacity(outcome.actions.len());
        for action in &outcome.actions {
            let result = self.dispatcher.dispatch(action.clone()).await;
            dispatched.push(ActionReport {
                action: action.clone(),
                result,
            });
        }
        ProductReport {
            outcome,
            dispatched,
        }
    }
}

fn open_fact_log(facts: FactStore, path: &Path) -> Result<FactStore, RuntimeError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(FactError::Io)?;
    }
    let (log, records) = JsonlFactLog::open(path)?;
    let facts = facts.with_sink(Arc::new(log));
    facts.restore(records)?;
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use vos_core::{event_types, ActionKind, Decimal, FactValue, MetricName, TargetSystem};
    use vos_dispatch::{ActionTarget, AuthorizedAction, LogTarget, RetryPolicy, TargetError};

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn record(runtime: &Runtime, product: &str, metric: &str, value: FactValue) {
        runtime
            .facts()
            .record_value(pid(product), MetricName::new(metric).unwrap(), value, Utc::now())
            .unwrap();
    }

    fn money(v: i64) -> FactValue {
        FactValue::Currency(Decimal::from_int(v))
    }

    fn runtime_with(ads: Arc<dyn ActionTarget>) -> Runtime {
        let schema = FactSchema::standard();
        let rules = RuleSet::standard(&schema).unwrap();
        let engine = RulesEngine::new(rules, FactStore::new(schema));
        let dispatcher = ActionDispatcher::new(RetryPolicy::default())
            .with_log_targets()
            .with_target(TargetSystem::AdPlatform, ads);
        Runtime::new(engine, dispatcher, ProductRegistry::new())
    }

    fn losing_campaign(runtime: &Runtime, product: &str) {
        record(runtime, product, "spend", money(300));
        record(runtime, product, "target_cpa", money(100));
        record(runtime, product, "conversions", FactValue::Integer(0));
    }

    fn ads_event(product: &str) -> TriggerEvent {
        TriggerEvent::new("test", event_types::ADS_OPTIMIZATION).with_product(pid(product))
    }

    #[tokio::test]
    async fn trigger_evaluates_and_dispatches() {
        let ads = Arc::new(LogTarget::new("ads"));
        let runtime = runtime_with(ads.clone());
        losing_campaign(&runtime, "acme");

        let report = runtime.handle_trigger(ads_event("acme")).await.unwrap();
        let actions: Vec<&ActionReport> = report.actions().collect();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action.kind, ActionKind::Pause);
        assert_eq!(actions[0].result, DispatchResult::Succeeded { attempts: 1 });
        assert_eq!(ads.performed().len(), 1);
    }

    #[tokio::test]
    async fn redelivered_trigger_is_not_dispatched_again() {
        let ads = Arc::new(LogTarget::new("ads"));
        let runtime = runtime_with(ads.clone());
        losing_campaign(&runtime, "acme");
        let event = ads_event("acme");

        let first = runtime.handle_trigger(event.clone()).await.unwrap();
        let second = runtime.handle_trigger(event).await.unwrap();

        let replay = second.product(&pid("acme")).unwrap();
        assert!(replay.outcome.replayed);
        assert_eq!(
            first.actions().map(|a| &a.result).collect::<Vec<_>>(),
            second.actions().map(|a| &a.result).collect::<Vec<_>>()
        );
        assert_eq!(ads.performed().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_fans_out_to_known_products() {
        let ads = Arc::new(LogTarget::new("ads"));
        let runtime = runtime_with(ads.clone());
        losing_campaign(&runtime, "acme");
        losing_campaign(&runtime, "beacon");
        record(&runtime, "quill", "spend", money(5));

        let event = TriggerEvent::new("test", event_types::ADS_OPTIMIZATION);
        let report = runtime.handle_trigger(event).await.unwrap();

        let products: Vec<&str> = report
            .products
            .iter()
            .map(|p| p.outcome.product_id.as_str())
            .collect();
        assert_eq!(products, vec!["acme", "beacon", "quill"]);
        assert_eq!(ads.performed().len(), 2);
        assert!(report.product(&pid("quill")).unwrap().dispatched.is_empty());
    }

    #[tokio::test]
    async fn gated_actions_are_deferred() {
        let ads = Arc::new(LogTarget::new("ads"));
        let runtime = runtime_with(ads.clone());
        record(&runtime, "acme", "cpa", money(75));
        record(&runtime, "acme", "target_cpa", money(100));
        record(&runtime, "acme", "conversions", FactValue::Integer(12));

        let report = runtime.handle_trigger(ads_event("acme")).await.unwrap();
        let scale = report.actions().next().unwrap();
        assert_eq!(scale.action.kind, ActionKind::Scale20Pct);
        assert!(scale.result.is_deferred());
        assert!(ads.performed().is_empty());
        assert_eq!(runtime.dispatcher().gates().pending().len(), 1);
    }

    /// Never returns from its first call; later calls succeed.
    #[derive(Default)]
    struct HangsOnce {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ActionTarget for HangsOnce {
        fn name(&self) -> &str {
            "hangs-once"
        }

        async fn perform(&self, _action: &AuthorizedAction) -> Result<(), TargetError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn redelivery_completes_a_cancelled_dispatch() {
        let target = Arc::new(HangsOnce::default());
        let runtime = runtime_with(target.clone());
        losing_campaign(&runtime, "acme");
        let event = ads_event("acme");

        // The first delivery is abandoned after evaluation, mid-dispatch.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), runtime.handle_trigger(event.clone())).await;
        assert!(abandoned.is_err());
        let in_flight = runtime.dispatcher().in_flight();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].action.kind, ActionKind::Pause);

        let report = runtime.handle_trigger(event).await.unwrap();
        assert!(report.product(&pid("acme")).unwrap().outcome.replayed);
        let pause = report.actions().next().unwrap();
        assert_eq!(pause.result, DispatchResult::Succeeded { attempts: 1 });
        assert!(runtime.dispatcher().in_flight().is_empty());
        assert_eq!(target.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    /// Blocks every call until released.
    struct Stalled {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ActionTarget for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn perform(&self, _action: &AuthorizedAction) -> Result<(), TargetError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_dispatch_does_not_hold_the_product_lock() {
        let target = Arc::new(Stalled {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let runtime = runtime_with(target.clone());
        losing_campaign(&runtime, "acme");

        let first = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.handle_trigger(ads_event("acme")).await })
        };
        target.entered.notified().await;

        let unrelated = TriggerEvent::new("test", event_types::SIGNUP).with_product(pid("acme"));
        let second = tokio::time::timeout(Duration::from_secs(1), runtime.handle_trigger(unrelated))
            .await
            .expect("evaluation blocked behind an in-flight dispatch")
            .unwrap();
        assert_eq!(second.product(&pid("acme")).unwrap().outcome.evaluated, 0);

        target.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(first.actions().next().unwrap().result.is_succeeded());
    }

    #[tokio::test]
    async fn from_config_loads_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let products = dir.path().join("products.yaml");
        std::fs::write(
            &products,
            "products:\n  acme:\n    name: Acme\n    target_cpa: 100\n    monthly_ad_budget: 3000\n",
        )
        .unwrap();
        let config = RuntimeConfig {
            products: Some(products),
            fact_log: Some(dir.path().join("data/facts.jsonl")),
            ..RuntimeConfig::default()
        };

        let runtime = Runtime::from_config(&config).unwrap();
        assert_eq!(runtime.registry().len(), 1);
        record(&runtime, "acme", "spend", money(300));
        record(&runtime, "acme", "conversions", FactValue::Integer(0));
        assert_eq!(runtime.facts().len(), 4);

        drop(runtime);
        let reopened = Runtime::from_config(&config).unwrap();
        assert_eq!(reopened.facts().len(), 4);
        let snapshot = reopened.facts().snapshot(&pid("acme"));
        assert_eq!(
            snapshot.get(&MetricName::new("daily_budget").unwrap()),
            Some(&money(100))
        );

        let report = reopened.handle_trigger(ads_event("acme")).await.unwrap();
        assert_eq!(report.actions().next().unwrap().action.kind, ActionKind::Pause);
    }

    #[test]
    fn bad_rules_abort_startup() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("bad.yaml");
        std::fs::write(
            &rules,
            "rules:\n  - id: bad.rule\n    condition: \"spend > 3\"\n    action: { kind: pause }\n",
        )
        .unwrap();
        let config = RuntimeConfig {
            rules: vec![rules],
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            Runtime::from_config(&config),
            Err(RuntimeError::Rules(_))
        ));
    }
}
