//! # vos CLI entry point
//!
//! Parses command-line arguments, initializes tracing, and dispatches to
//! subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vos_cli::evaluate::{run_evaluate, EvaluateArgs};
use vos_cli::rules::{run_rules, RulesArgs};
use vos_cli::serve::{run_serve, ServeArgs};
use vos_cli::source::SourceArgs;
use vos_cli::validate::{run_validate, ValidateArgs};

/// Vaspera automation core.
///
/// Evaluates declarative rules over per-product facts when triggers arrive
/// and dispatches the resulting actions, holding high-impact ones for human
/// approval.
#[derive(Parser, Debug)]
#[command(name = "vos", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and type-check the schema, rules and product registry.
    Validate(ValidateArgs),

    /// List rules in evaluation order.
    Rules(RulesArgs),

    /// Evaluate one trigger against facts from a file, without dispatching.
    Evaluate(EvaluateArgs),

    /// Run the engine, event bus, timers and HTTP API.
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(verbose: u8, format: LogFormat, default_level: &str) {
    // RUST_LOG wins when no -v flag is given.
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };
    init_tracing(cli.verbose, cli.log_format, default_level);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "vos starting");

    let result = match &cli.command {
        Commands::Validate(args) => run_validate(args, &cli.source),
        Commands::Rules(args) => run_rules(args, &cli.source),
        Commands::Evaluate(args) => run_evaluate(args, &cli.source),
        Commands::Serve(args) => run_serve(args, &cli.source).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
