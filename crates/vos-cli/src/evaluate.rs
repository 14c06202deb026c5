//! # Evaluate CLI Subcommand
//!
//! Dry run of one trigger for one product. Facts come from a YAML file
//! mapping metric names to values; product registry targets are seeded
//! first, so a registered `target_cpa` need not be repeated. The outcome,
//! including suppressions and faults, is printed as JSON. Nothing is
//! dispatched.
//!
//! ```yaml
//! spend: "412.50"     # currency and decimal values as strings
//! target_cpa: 50
//! conversions: 0
//! in_learning_phase: false
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use vos_core::{event_types, MetricName, ProductId, TriggerEvent};
use vos_facts::FactStore;
use vos_rules::{RulesEngine, TriggerOutcome};

use crate::source::{load, Loaded, SourceArgs};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// YAML file of metric values.
    #[arg(long)]
    pub facts: PathBuf,

    /// Product to evaluate.
    #[arg(long)]
    pub product: String,

    /// Trigger event type.
    #[arg(long, default_value = event_types::FACTS_UPDATED)]
    pub event_type: String,

    /// Exit with status 2 if any rule faulted.
    #[arg(long)]
    pub strict: bool,
}

pub fn run_evaluate(args: &EvaluateArgs, source: &SourceArgs) -> Result<u8> {
    let config = source.runtime_config()?;
    let loaded = load(&config)?;
    let facts = read_facts(&args.facts)?;
    let product_id = ProductId::new(args.product.as_str())
        .with_context(|| format!("invalid product id {:?}", args.product))?;

    let outcome = evaluate(loaded, &facts, &product_id, &args.event_type)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if args.strict && !outcome.faults.is_empty() {
        tracing::warn!(faults = outcome.faults.len(), "evaluation faulted");
        return Ok(2);
    }
    Ok(0)
}

fn read_facts(path: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read facts {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse facts {}", path.display()))
}

/// Record `facts` into a fresh store and evaluate one trigger against it.
pub fn evaluate(
    loaded: Loaded,
    facts: &BTreeMap<String, serde_json::Value>,
    product_id: &ProductId,
    event_type: &str,
) -> Result<TriggerOutcome> {
    let event = TriggerEvent::new("cli", event_type).with_product(product_id.clone());
    let store = FactStore::new(loaded.schema);
    loaded.products.seed_facts(&store, event.timestamp)?;

    for (name, raw) in facts {
        let metric = MetricName::new(name.as_str())?;
        store
            .record_raw(product_id.clone(), metric, raw, event.timestamp)
            .with_context(|| format!("fact {name}"))?;
    }

    let engine = RulesEngine::new(loaded.rules, store);
    Ok(engine.on_trigger(&event, product_id))
}
