//! Operator-facing command surface over the helm runtime: package install,
//! gate dry-runs, ledger chain verification, cross-tier queries, and config
//! inspection. Talks to the in-process components directly — this is an
//! embedded kernel, not a fleet-managed daemon reached over the network.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod archive;
mod commands;
mod config;
mod error;
mod output;

use commands::ledger::LedgerCommands;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "helm")]
#[command(about = "Helm governance runtime CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Install root (also `HELM_ROOT` / `CONTROL_PLANE_ROOT`)
    #[arg(long, env = "HELM_ROOT")]
    root: Option<String>,

    /// Config file path (also `HELM_CONFIG`)
    #[arg(long, env = "HELM_CONFIG")]
    config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from a tar.gz archive
    Install {
        archive: PathBuf,
        #[arg(long)]
        dev: bool,
        #[arg(long)]
        force: bool,
    },

    /// Dry-run the install gate pipeline against a tar.gz archive without committing anything
    GateCheck {
        archive: PathBuf,
        #[arg(long)]
        gate: Option<String>,
        #[arg(long)]
        all: bool,
    },

    /// Ledger chain operations
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Run a cross-tier ledger query: a literal JSON object or `@file.json`
    Query { request: String },

    /// Show the effective configuration
    Config,

    /// Summarize ledger partitions and runtime flags under the install root
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::failure(err.to_string());
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    let dev = matches!(cli.command, Commands::Install { dev: true, .. });
    let helm_config = config::load_config(cli.config.as_deref(), dev)?;
    let root = config::resolve_root(cli.root, &helm_config);

    match cli.command {
        Commands::Install { archive, dev, force } => {
            commands::install::run(archive, dev, force, root, &helm_config).await
        }
        Commands::GateCheck { archive, gate, all } => {
            commands::gate_check::run(archive, gate, all, root, &helm_config).await
        }
        Commands::Ledger { command } => commands::ledger::execute(command, root, &helm_config.ledger).await,
        Commands::Query { request } => {
            commands::query::run(request, root, &helm_config.ledger, &helm_config.query).await
        }
        Commands::Config => commands::config::show(&helm_config, cli.output),
        Commands::Status => commands::status::run(root, &helm_config, cli.output),
    }
}
