//! Runtime errors.

use thiserror::Error;
use vos_core::TargetSystem;
use vos_dispatch::WebhookConfigError;
use vos_facts::FactError;
use vos_rules::RuleLoadError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Facts(#[from] FactError),

    /// The rule set failed to load; the runtime does not start.
    #[error(transparent)]
    Rules(#[from] RuleLoadError),

    #[error("webhook target for {system}: {source}")]
    Webhook {
        system: TargetSystem,
        source: WebhookConfigError,
    },

    /// A per-product processing task panicked or was cancelled.
    #[error("trigger processing task failed: {0}")]
    Task(String),
}
