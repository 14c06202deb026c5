//! # Rules CLI Subcommand
//!
//! Lists the loaded rules in evaluation order (priority descending, then
//! id).

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use vos_rules::{Rule, RuleDef};

use crate::source::{load, SourceArgs};

#[derive(Args, Debug, Default)]
pub struct RulesArgs {
    /// Print rule definitions as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Only rules listening to this event type.
    #[arg(long)]
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct RuleListing<'a> {
    #[serde(flatten)]
    definition: &'a RuleDef,
    requires_approval: bool,
}

pub fn run_rules(args: &RulesArgs, source: &SourceArgs) -> Result<u8> {
    let config = source.runtime_config()?;
    let loaded = load(&config)?;
    let rules = select(loaded.rules.rules(), args.event_type.as_deref());

    if args.json {
        let listing: Vec<RuleListing<'_>> = rules
            .iter()
            .map(|rule| RuleListing {
                definition: rule.definition(),
                requires_approval: rule.requires_approval(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(0);
    }

    println!(
        "{:>5}  {:<34} {:<12} {:<8} CONDITION",
        "PRIO", "ID", "ACTION", "GATED"
    );
    for rule in &rules {
        let mut id = rule.id().as_str().to_string();
        if !rule.enabled() {
            id.push_str(" (off)");
        }
        println!(
            "{:>5}  {:<34} {:<12} {:<8} {}",
            rule.priority(),
            id,
            rule.action().kind.as_str(),
            if rule.requires_approval() { "yes" } else { "no" },
            rule.definition().condition,
        );
    }
    println!();
    println!("Total: {} rules", rules.len());
    Ok(0)
}

fn select<'a>(rules: &'a [Rule], event_type: Option<&str>) -> Vec<&'a Rule> {
    rules
        .iter()
        .filter(|rule| event_type.map_or(true, |t| rule.listens_to(t)))
        .collect()
}
