//! bankreport CLI - spreadsheet reconciliation for bank back-office reporting

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use bankreport_core::Role;
use commands::{export, import, logs, new, status};

/// bankreport - reconcile bank balance spreadsheets
#[derive(Parser)]
#[command(name = "brp", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store counts and known bankers
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a balance spreadsheet: preview, inspect, commit
    Import {
        #[command(subcommand)]
        command: import::ImportCommands,
    },

    /// Generate a banker performance report
    Export {
        /// Comma-separated banker ids
        #[arg(long, value_delimiter = ',', required = true)]
        bankers: Vec<i64>,
        /// First report date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last report date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Year whose closing balances are the baseline
        #[arg(long)]
        baseline_year: i32,
        /// Return the job key without waiting
        #[arg(long)]
        background: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create new records
    New {
        #[command(subcommand)]
        command: new::NewCommands,
    },

    /// View and manage job logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Whether the command changes stored data or starts jobs
    fn writes(&self) -> bool {
        match self {
            Commands::Status { .. } => false,
            Commands::Logs { command } => matches!(command, logs::LogsCommands::Clear { .. }),
            Commands::Import { command } => !matches!(command, import::ImportCommands::Status { .. }),
            Commands::Export { .. } | Commands::New { .. } => true,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let role = commands::get_role()?;
    if cli.command.writes() && !role.can_write() {
        bail!("Role '{}' may only view status and logs", role.as_str());
    }

    match cli.command {
        Commands::Status { json } => status::run(json).map(|_| ExitCode::SUCCESS),
        Commands::Import { command } => import::run(command),
        Commands::Export {
            bankers,
            start,
            end,
            baseline_year,
            background,
            json,
        } => export::run(bankers, &start, &end, baseline_year, background, json)
            .map(|_| ExitCode::SUCCESS),
        Commands::New { command } => new::run(command).map(|_| ExitCode::SUCCESS),
        Commands::Logs { command } => logs::run(command).map(|_| ExitCode::SUCCESS),
    }
}
