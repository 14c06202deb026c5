//! Where the schema, rules and products come from.
//!
//! Every subcommand accepts `--config` and may override individual paths
//! with `--schema`, `--rules` and `--products`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vos_facts::FactSchema;
use vos_rules::RuleSet;
use vos_runtime::{ProductRegistry, RuntimeConfig};

#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// Runtime configuration file (vos.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Fact schema file. Defaults to the standard schema.
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Rule file or directory of `.yaml` rule files. Repeatable. Defaults
    /// to the standard rule set.
    #[arg(long = "rules", global = true)]
    pub rules: Vec<PathBuf>,

    /// Product registry file.
    #[arg(long, global = true)]
    pub products: Option<PathBuf>,
}

impl SourceArgs {
    /// The runtime configuration with command-line paths applied on top.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RuntimeConfig::default(),
        };
        if let Some(schema) = &self.schema {
            config.schema = Some(schema.clone());
        }
        if !self.rules.is_empty() {
            config.rules = self.rules.clone();
        }
        if let Some(products) = &self.products {
            config.products = Some(products.clone());
        }
        Ok(config)
    }
}

/// Static inputs loaded without opening the fact log.
#[derive(Debug)]
pub struct Loaded {
    pub schema: FactSchema,
    pub rules: RuleSet,
    pub products: ProductRegistry,
}

pub fn load(config: &RuntimeConfig) -> Result<Loaded> {
    let schema = match &config.schema {
        Some(path) => FactSchema::load(path)
            .with_context(|| format!("failed to load schema {}", path.display()))?,
        None => FactSchema::standard(),
    };
    let rules = if config.rules.is_empty() {
        RuleSet::standard(&schema).context("standard rule set failed to compile")?
    } else {
        RuleSet::load(&config.rules, &schema).context("failed to load rules")?
    };
    let products = match &config.products {
        Some(path) => ProductRegistry::load(path)
            .with_context(|| format!("failed to load products {}", path.display()))?,
        None => ProductRegistry::new(),
    };
    Ok(Loaded {
        schema,
        rules,
        products,
    })
}
