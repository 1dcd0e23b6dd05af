//! # Auditor Agent CLI (`auditor`)
//!
//! The `auditor` binary runs the document-audit worker and offers an
//! offline mode for exercising the deterministic checks against a local
//! text file.
//!
//! ## Usage
//!
//! ```bash
//! auditor --config ./config/auditor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `auditor run` | Start the worker: pull jobs, run the pipeline, serve health checks |
//! | `auditor check <file>` | Extract transactions from a local text file and print findings |
//!
//! ## Examples
//!
//! ```bash
//! # Run the worker
//! auditor run --config ./config/auditor.toml
//!
//! # Audit a locally extracted text file, with custom round-number params
//! auditor check ./ledger.txt --round-threshold 50 --round-min-amount 500
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auditor_agent::checks::{run_all_checks, CheckParams};
use auditor_agent::config;
use auditor_agent::extract::extract_transactions;
use auditor_agent::worker;

/// Auditor Agent — a document-audit worker with deterministic
/// fraud/anomaly checks.
#[derive(Parser)]
#[command(
    name = "auditor",
    about = "Auditor Agent — a document-audit worker with deterministic fraud checks",
    version,
    long_about = "Auditor Agent pulls jobs referencing uploaded documents, extracts their text \
    via a multimodal model, indexes the content, extracts transaction records, runs \
    deterministic fraud checks, and persists findings and a Markdown audit report."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/auditor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the worker loop and health server.
    ///
    /// Pulls jobs from the edge queue in batches, runs the full audit
    /// pipeline for each, and acknowledges them. Stops gracefully on
    /// SIGINT/SIGTERM.
    Run,

    /// Run extraction and checks over a local text file.
    ///
    /// Useful for inspecting what the deterministic core would produce
    /// for a given document, without any external services. Prints the
    /// findings as JSON to stdout.
    Check {
        /// Path to a UTF-8 text file (e.g. previously extracted document text).
        path: PathBuf,

        /// Round-number rule: amount must be divisible by this value.
        #[arg(long, default_value_t = 100.0)]
        round_threshold: f64,

        /// Round-number rule: minimum absolute amount to flag.
        #[arg(long, default_value_t = 1000.0)]
        round_min_amount: f64,

        /// Also print the extracted transactions.
        #[arg(long)]
        show_txns: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let cfg = config::load_config(&cli.config)?;
            init_tracing(&cfg.worker.log_level);
            worker::run_worker(cfg).await?;
        }
        Commands::Check {
            path,
            round_threshold,
            round_min_amount,
            show_txns,
        } => {
            init_tracing("warn");
            run_check(&path, round_threshold, round_min_amount, show_txns)?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_check(
    path: &PathBuf,
    round_threshold: f64,
    round_min_amount: f64,
    show_txns: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let txns = extract_transactions(&text);
    let params = CheckParams {
        round_threshold,
        round_min_amount,
    };
    let findings = run_all_checks(&txns, &params);

    if show_txns {
        println!("{}", serde_json::to_string_pretty(&txns)?);
    }
    println!("{}", serde_json::to_string_pretty(&findings)?);
    eprintln!(
        "{} transactions, {} findings",
        txns.len(),
        findings.len()
    );

    Ok(())
}
