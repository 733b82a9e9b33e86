//! Processing strategy module for batch event processing
//!
//! This module defines the Strategy pattern for complete processing runs,
//! covering CSV reading, rule evaluation, commits and ledger output. This
//! allows different implementations (synchronous, asynchronous) to be
//! selected at runtime.

use std::io::Write;
use std::path::Path;

use crate::cli::StrategyType;
use crate::core::PipelineConfig;
use crate::types::PipelineError;

pub mod r#async;
pub mod sync;

pub use self::r#async::AsyncProcessingStrategy;
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete runs
///
/// Each strategy reads captured events from a CSV file, runs them through the
/// pipeline with the rules of a rule book, and writes the resulting ledger.
/// For the same inputs every strategy writes the same ledger.
pub trait ProcessingStrategy: Send + Sync {
    /// Process events and write the ledger
    ///
    /// # Arguments
    ///
    /// * `events_path` - Path to the events CSV file
    /// * `rules_path` - Path to the rule book JSON file
    /// * `output` - Writer receiving the ledger CSV
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the run completed (individual events may have been skipped)
    /// * `Err(PipelineError)` if a fatal error occurred
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either input file cannot be opened or parsed as a whole
    /// - The pipeline cannot be started
    /// - Output cannot be written
    ///
    /// Per-event failures (bad rows, repeated triggers, failed commits) are
    /// logged and skipped.
    fn process(
        &self,
        events_path: &Path,
        rules_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), PipelineError>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `config` - Pipeline configuration shared by both strategies
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    config: PipelineConfig,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(config)),
        StrategyType::Async => Box::new(AsyncProcessingStrategy::new(config)),
    }
}
