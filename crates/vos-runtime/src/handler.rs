//! Bus subscription for the runtime.

use async_trait::async_trait;
use vos_bus::{EventHandler, HandlerError};
use vos_core::TriggerEvent;

use crate::runtime::Runtime;

pub const RULES_HANDLER: &str = "rules_engine";

/// Feeds every published trigger into [`Runtime::handle_trigger`].
///
/// Redelivery is safe: the engine answers a repeated event id from its
/// dedup cache and the dispatcher never performs a decided action twice.
#[derive(Debug, Clone)]
pub struct RulesHandler {
    runtime: Runtime,
}

impl RulesHandler {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl EventHandler for RulesHandler {
    fn name(&self) -> &str {
        RULES_HANDLER
    }

    async fn handle(&self, event: &TriggerEvent) -> Result<(), HandlerError> {
        let report = self
            .runtime
            .handle_trigger(event.clone())
            .await
            .map_err(|e| HandlerError::Transient(e.to_string()))?;
        let actions = report.actions().count();
        if actions > 0 {
            tracing::info!(
                event_id = %report.event_id,
                event_type = %report.event_type,
                products = report.products.len(),
                actions,
                "trigger handled"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::Utc;
    use vos_bus::{BusConfig, EventBus};
    use vos_core::{event_types, Decimal, FactValue, MetricName, ProductId};

    use crate::config::RuntimeConfig;

    #[tokio::test]
    async fn published_events_reach_the_runtime() {
        let runtime = Runtime::from_config(&RuntimeConfig::default()).unwrap();
        let acme = ProductId::new("acme").unwrap();
        for (metric, value) in [
            ("spend", FactValue::Currency(Decimal::from_int(300))),
            ("target_cpa", FactValue::Currency(Decimal::from_int(100))),
            ("conversions", FactValue::Integer(0)),
        ] {
            runtime
                .facts()
                .record_value(acme.clone(), MetricName::new(metric).unwrap(), value, Utc::now())
                .unwrap();
        }

        let bus = Arc::new(EventBus::new(BusConfig::default()));
        bus.subscribe(Arc::new(RulesHandler::new(runtime.clone())))
            .unwrap();
        bus.publish(TriggerEvent::new("test", event_types::ADS_OPTIMIZATION).with_product(acme))
            .await
            .unwrap();

        bus.shutdown().await;

        let failures = runtime.dispatcher().failures();
        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(runtime.dispatcher().audit_entries().len(), 1);
        assert_eq!(bus.stats().delivered, 1);
    }
}
