//! # Validate CLI Subcommand
//!
//! Loads the schema, rule files and product registry exactly as `vos serve`
//! would and reports the first problem. Every rule condition is parsed and
//! type-checked against the schema.

use anyhow::Result;
use clap::Args;

use crate::source::{load, SourceArgs};

#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Print nothing on success.
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn run_validate(args: &ValidateArgs, source: &SourceArgs) -> Result<u8> {
    let config = source.runtime_config()?;
    let loaded = load(&config)?;

    let gated = loaded
        .rules
        .iter()
        .filter(|rule| rule.requires_approval())
        .count();
    let disabled = loaded.rules.iter().filter(|rule| !rule.enabled()).count();
    tracing::info!(
        metrics = loaded.schema.len(),
        rules = loaded.rules.len(),
        products = loaded.products.len(),
        "configuration valid"
    );

    if !args.quiet {
        println!("schema:   {} metrics", loaded.schema.len());
        println!(
            "rules:    {} rules ({gated} require approval, {disabled} disabled)",
            loaded.rules.len()
        );
        println!("products: {}", loaded.products.len());
        println!("OK");
    }
    Ok(0)
}
