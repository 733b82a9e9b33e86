//! Asynchronous processing strategy
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── PipelineConfig (batch_size, max_producers, queue_capacity, ...)
//!     ├── AsyncReader (batch CSV reading)
//!     └── CapturePipeline
//!         ├── TriggerFilter (admission, in file order)
//!         ├── Extractor (concurrent, up to max_producers at a time)
//!         └── SerializedCommitQueue (single commit worker)
//! ```
//!
//! # Ordering
//!
//! Within each batch:
//! 1. Events are admitted through the trigger filter in file order
//! 2. Admitted events are extracted concurrently, results kept in file order
//! 3. Candidates are enqueued in file order, then all commits are awaited
//!
//! Commits therefore hit the ledger in the same order as in the sync
//! strategy, and both strategies write the same ledger.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::core::{CapturePipeline, LedgerStore, PipelineConfig};
use crate::io::async_reader::AsyncReader;
use crate::io::event_format::write_ledger_csv;
use crate::io::rules_file::RuleBook;
use crate::strategy::ProcessingStrategy;
use crate::types::{PipelineError, RawEvent};

/// Asynchronous processing strategy
///
/// # Configuration
///
/// - `batch_size`: events read per batch (default: 256)
/// - `max_producers`: concurrent extractions and runtime worker threads
///   (default: CPU cores)
/// - `queue_capacity`: commit queue bound (default: 64)
#[derive(Debug, Clone, Default)]
pub struct AsyncProcessingStrategy {
    config: PipelineConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy with the specified configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        pipeline: &CapturePipeline,
        events_path: &Path,
    ) -> Result<usize, PipelineError> {
        let file = tokio::fs::File::open(events_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
                path: events_path.display().to_string(),
            },
            _ => PipelineError::from(e),
        })?;

        // Wrap tokio file in a compatibility layer for csv-async
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = AsyncReader::new(compat_file);

        let mut committed = 0;
        loop {
            let batch = reader.read_batch(self.config.batch_size).await;
            if batch.is_empty() {
                break;
            }
            committed += self.process_batch(pipeline, batch).await?;
        }
        Ok(committed)
    }

    /// Admit, extract and commit one batch
    ///
    /// Per-event failures are logged and skipped; a closed commit queue ends
    /// the run.
    async fn process_batch(
        &self,
        pipeline: &CapturePipeline,
        batch: Vec<RawEvent>,
    ) -> Result<usize, PipelineError> {
        let admitted: Vec<RawEvent> = batch
            .into_iter()
            .filter(|event| match pipeline.admit(event) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "event skipped");
                    false
                }
            })
            .collect();

        let candidates: Vec<_> = stream::iter(admitted.iter())
            .map(|event| pipeline.extract(event))
            .buffered(self.config.max_producers.max(1))
            .collect()
            .await;

        let mut pending = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match candidate {
                Ok(Some(transaction)) => pending.push(pipeline.enqueue(transaction).await?),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => warn!(error = %e, "event skipped"),
                Err(e) => return Err(e),
            }
        }

        let mut committed = 0;
        for commit in pending {
            match commit.wait().await {
                Ok(_) => committed += 1,
                Err(e) if e.is_recoverable() => warn!(error = %e, "commit failed"),
                Err(e) => return Err(e),
            }
        }
        Ok(committed)
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Process events and write the ledger
    ///
    /// Builds a multi-threaded tokio runtime sized by `max_producers`, starts
    /// the capture pipeline, streams the events file batch by batch, then
    /// drains the commit queue and writes the ledger.
    fn process(
        &self,
        events_path: &Path,
        rules_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), PipelineError> {
        let book = RuleBook::load(rules_path)?;
        let rules = Arc::new(book.rule_store());
        let ledger = Arc::new(book.ledger_store());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_producers.max(1))
            .enable_all()
            .build()?;

        let pipeline = CapturePipeline::start(&self.config, rules, ledger.clone(), None)?;
        let result = runtime.block_on(self.run(&pipeline, events_path));
        pipeline.shutdown();

        let committed = result?;
        info!(committed, "async run finished");

        write_ledger_csv(&ledger.list()?, output)
    }
}
