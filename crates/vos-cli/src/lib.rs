//! # vos-cli — Command-Line Interface
//!
//! ## Subcommands
//!
//! - `vos validate`: load the schema, rule files and product registry and
//!   report the first problem.
//! - `vos rules`: list rules in evaluation order.
//! - `vos evaluate`: dry run. Load facts from a YAML file, evaluate one
//!   trigger for one product, print the outcome as JSON. Nothing is
//!   dispatched.
//! - `vos serve`: run the fact store, rules engine, event bus, timer source
//!   and HTTP API until interrupted.
//!
//! ```bash
//! vos validate --config config/vos.yaml
//! vos rules --rules config/rules
//! vos evaluate --facts facts.yaml --product acme --event-type schedule.ads_optimization
//! vos -v serve --config config/vos.yaml
//! ```

pub mod evaluate;
pub mod rules;
pub mod serve;
pub mod source;
pub mod validate;
