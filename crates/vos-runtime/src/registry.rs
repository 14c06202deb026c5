//! # Product Registry
//!
//! The products under management, loaded from `products.yaml`:
//!
//! ```yaml
//! products:
//!   acme:
//!     name: Acme Analytics
//!     domain: acme.io
//!     ad_platforms: [google, meta]
//!     target_cpa: 50
//!     monthly_ad_budget: 1500
//! ```
//!
//! Per-product targets are seeded into the fact store as `target_cpa` and
//! `daily_budget` facts so rule conditions can compare against them.
//! `daily_budget` falls back to `monthly_ad_budget / 30`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vos_core::{Decimal, FactValue, MetricName, ProductId};
use vos_facts::{FactError, FactStore};

use crate::config::{read_file, ConfigError};

const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Free-form product category (`saas`, `marketplace`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub ad_platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpa: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_ad_budget: Option<Decimal>,
}

impl ProductConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Explicit daily budget, else a thirtieth of the monthly budget.
    pub fn effective_daily_budget(&self) -> Option<Decimal> {
        self.daily_budget.or_else(|| {
            self.monthly_ad_budget
                .and_then(|m| m.checked_div(Decimal::from_int(DAYS_PER_MONTH)))
        })
    }

    /// Target facts for this product.
    pub fn target_facts(&self) -> Vec<(&'static str, FactValue)> {
        let mut facts = Vec::new();
        if let Some(cpa) = self.target_cpa {
            facts.push(("target_cpa", FactValue::Currency(cpa)));
        }
        if let Some(budget) = self.effective_daily_budget() {
            facts.push(("daily_budget", FactValue::Currency(budget)));
        }
        facts
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductsFile {
    #[serde(default)]
    products: BTreeMap<ProductId, ProductConfig>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRegistry {
    products: BTreeMap<ProductId, ProductConfig>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: ProductsFile = serde_yaml::from_str(yaml)?;
        Ok(Self {
            products: file.products,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        let registry = Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), products = registry.len(), "product registry loaded");
        Ok(registry)
    }

    pub fn with_product(mut self, id: ProductId, config: ProductConfig) -> Self {
        self.products.insert(id, config);
        self
    }

    pub fn get(&self, id: &ProductId) -> Option<&ProductConfig> {
        self.products.get(id)
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.products.contains_key(id)
    }

    /// Registered product ids, sorted.
    pub fn ids(&self) -> Vec<ProductId> {
        self.products.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, &ProductConfig)> {
        self.products.iter()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Record every product's target facts observed at `at`. Targets whose
    /// metric the schema does not declare are skipped, as are targets whose
    /// latest recorded value is unchanged. Returns the number recorded.
    pub fn seed_facts(&self, store: &FactStore, at: DateTime<Utc>) -> Result<usize, FactError> {
        let mut seeded = 0;
        for (product_id, config) in &self.products {
            for (metric, value) in config.target_facts() {
                let metric = MetricName::new(metric)?;
                if store.schema().value_type(&metric).is_none() {
                    tracing::debug!(product_id = %product_id, metric = %metric, "schema does not declare target metric; not seeded");
                    continue;
                }
                match store.latest(product_id, &metric) {
                    Ok(existing) if existing.value == value => continue,
                    _ => {}
                }
                store.record_value(product_id.clone(), metric, value, at)?;
                seeded += 1;
            }
        }
        if seeded > 0 {
            tracing::info!(facts = seeded, "seeded product targets");
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vos_facts::FactSchema;

    const PRODUCTS: &str = r#"
products:
  acme:
    name: Acme Analytics
    description: Product analytics for small teams
    repo: acme/analytics
    domain: acme.io
    type: saas
    ad_platforms: [google, meta]
    target_cpa: 50
    monthly_ad_budget: 1500
  beacon:
    name: Beacon
    target_cpa: "42.50"
    daily_budget: 80
  quill:
    name: Quill
"#;

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    #[test]
    fn parses_products() {
        let registry = ProductRegistry::from_yaml_str(PRODUCTS).unwrap();
        assert_eq!(registry.ids(), vec![pid("acme"), pid("beacon"), pid("quill")]);
        let acme = registry.get(&pid("acme")).unwrap();
        assert_eq!(acme.category.as_deref(), Some("saas"));
        assert_eq!(acme.ad_platforms, vec!["google", "meta"]);
    }

    #[test]
    fn daily_budget_derives_from_monthly() {
        let registry = ProductRegistry::from_yaml_str(PRODUCTS).unwrap();
        assert_eq!(
            registry.get(&pid("acme")).unwrap().effective_daily_budget(),
            Some(Decimal::from_int(50))
        );
        assert_eq!(
            registry.get(&pid("beacon")).unwrap().effective_daily_budget(),
            Some(Decimal::from_int(80))
        );
        assert_eq!(registry.get(&pid("quill")).unwrap().effective_daily_budget(), None);
    }

    #[test]
    fn float_targets_are_rejected() {
        let yaml = "products:\n  acme:\n    name: Acme\n    target_cpa: 42.5\n";
        assert!(ProductRegistry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn invalid_product_ids_are_rejected() {
        let yaml = "products:\n  Not An Id:\n    name: Bad\n";
        assert!(ProductRegistry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn seeding_records_targets_once() {
        let registry = ProductRegistry::from_yaml_str(PRODUCTS).unwrap();
        let store = FactStore::new(FactSchema::standard());

        assert_eq!(registry.seed_facts(&store, Utc::now()).unwrap(), 4);
        let cpa = store
            .latest(&pid("beacon"), &MetricName::new("target_cpa").unwrap())
            .unwrap();
        assert_eq!(cpa.value, FactValue::Currency(Decimal::parse("42.5").unwrap()));

        assert_eq!(registry.seed_facts(&store, Utc::now()).unwrap(), 0);
        assert!(store.snapshot(&pid("quill")).is_empty());
    }
}
