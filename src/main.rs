//! Capture Ledger CLI
//!
//! Command-line interface for turning captured payment events into a ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --rules rules.json events.csv > ledger.csv
//! cargo run -- --strategy sync --rules rules.json events.csv > ledger.csv
//! cargo run -- --strategy async --max-producers 8 --batch-size 512 --rules rules.json events.csv > ledger.csv
//! RUST_LOG=capture_ledger=debug cargo run -- --rules rules.json events.csv > ledger.csv
//! ```
//!
//! The program reads captured events from the input CSV file, runs them
//! through the capture pipeline using the selected processing strategy, and
//! writes the resulting ledger to stdout. Logs go to stderr.
//!
//! # Processing Strategies
//!
//! - **sync**: single-threaded extraction and inline commits
//! - **async**: concurrent extraction, commits through the single commit worker (default)
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, malformed rule book, etc.)

use capture_ledger::cli;
use capture_ledger::strategy;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse command-line arguments using clap
    let args = cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let strategy = strategy::create_strategy(args.strategy, args.to_pipeline_config());

    // Ledger goes to stdout
    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.events_file, &args.rules_file, &mut output) {
        tracing::error!(error = %e, "run failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
