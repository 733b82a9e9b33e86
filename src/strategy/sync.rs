//! Synchronous processing strategy
//!
//! A single-threaded implementation of the ProcessingStrategy trait. Events
//! are read, extracted and committed one at a time on the calling thread.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Repeated-trigger filtering to `TriggerFilter`
//! - Rule evaluation to `Extractor`
//! - Category resolution and grouping to `CommitProcessor`
//! - CSV output to `event_format::write_ledger_csv`
//!
//! Commits are already serialized by construction here, so no commit queue
//! is involved. Extraction has no wall-clock bound in this strategy; the
//! sandbox limits still apply.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::{
    commit_processor, CommitProcessor, Extractor, LedgerStore, PipelineConfig, RuleStore,
    TriggerFilter,
};
use crate::io::event_format::write_ledger_csv;
use crate::io::rules_file::RuleBook;
use crate::io::sync_reader::SyncReader;
use crate::strategy::ProcessingStrategy;
use crate::types::{PipelineError, RawEvent, Transaction};

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use capture_ledger::core::PipelineConfig;
/// use capture_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(PipelineConfig::default());
/// let mut output = std::io::stdout();
///
/// strategy
///     .process(Path::new("events.csv"), Path::new("rules.json"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    config: PipelineConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(
        &self,
        events_path: &Path,
        rules_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), PipelineError> {
        let book = RuleBook::load(rules_path)?;
        let rules: Arc<dyn RuleStore> = Arc::new(book.rule_store());
        let ledger = Arc::new(book.ledger_store());
        let reader = SyncReader::new(events_path)?;

        let filter = TriggerFilter::new(self.config.trigger_window_ms);
        let extractor = Extractor::new(Arc::clone(&rules), self.config.sandbox());
        let processor = commit_processor(&self.config, rules, ledger.clone(), None);

        let mut committed = 0usize;
        for event in reader {
            let result =
                event.and_then(|event| commit_event(&filter, &extractor, &processor, &event));
            match result {
                Ok(Some(_)) => committed += 1,
                Ok(None) => {}
                Err(e) if e.is_recoverable() => warn!(error = %e, "event skipped"),
                Err(e) => return Err(e),
            }
        }
        info!(committed, "sync run finished");

        write_ledger_csv(&ledger.list()?, output)
    }
}

fn commit_event(
    filter: &TriggerFilter,
    extractor: &Extractor,
    processor: &CommitProcessor,
    event: &RawEvent,
) -> Result<Option<Transaction>, PipelineError> {
    filter.check(event)?;
    match extractor.extract(event)? {
        Some(found) => processor
            .process(Transaction::from_extraction(&found, event))
            .map(Some),
        None => Ok(None),
    }
}
