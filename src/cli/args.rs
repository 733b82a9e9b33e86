use crate::core::PipelineConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Turn captured payment events into a deduplicated, categorized ledger
#[derive(Parser, Debug)]
#[command(name = "capture-ledger")]
#[command(
    about = "Turn captured payment events into a deduplicated, categorized ledger",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing captured events
    #[arg(value_name = "EVENTS", help = "Path to the events CSV file")]
    pub events_file: PathBuf,

    /// Rule book with categories, extraction rules and category rules
    #[arg(
        long = "rules",
        value_name = "RULES",
        help = "Path to the rule book JSON file"
    )]
    pub rules_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for single-threaded or 'async' for concurrent extraction"
    )]
    pub strategy: StrategyType,

    #[arg(
        long = "queue-capacity",
        value_name = "COUNT",
        help = "Bound of the commit queue (default: 64)"
    )]
    pub queue_capacity: Option<usize>,

    #[arg(
        long = "max-producers",
        value_name = "COUNT",
        help = "Concurrent extractions, async mode only (default: CPU cores)"
    )]
    pub max_producers: Option<usize>,

    #[arg(
        long = "script-timeout-ms",
        value_name = "MS",
        help = "Wall-clock bound on one extraction, async mode only (default: 5000)"
    )]
    pub script_timeout_ms: Option<u64>,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Events read per batch, async mode only (default: 256)"
    )]
    pub batch_size: Option<usize>,

    /// Disable grouping of duplicate reports
    #[arg(long = "no-dedup", help = "Store every transaction in its own group")]
    pub no_dedup: bool,

    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "warn",
        help = "Log filter used when RUST_LOG is not set"
    )]
    pub log_level: String,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a PipelineConfig from CLI arguments
    ///
    /// Unset options keep their defaults; zero values fall back to the
    /// defaults with a warning.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let default = PipelineConfig::default();

        PipelineConfig {
            queue_capacity: self.queue_capacity.unwrap_or(default.queue_capacity),
            max_producers: self.max_producers.unwrap_or(default.max_producers),
            script_timeout: self
                .script_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.script_timeout),
            batch_size: self.batch_size.unwrap_or(default.batch_size),
            dedup_enabled: !self.no_dedup,
            ..default
        }
        .normalized()
    }
}
