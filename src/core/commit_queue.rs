//! Serialized commit queue
//!
//! Category resolution, duplicate detection and the final store write must
//! never run concurrently for two transactions: the dedup window lookup reads
//! the store, decides, then writes, and two interleaved commits could both
//! miss each other. This module funnels every commit through one worker.
//!
//! # Architecture
//!
//! ```text
//! producer ──┐
//! producer ──┼──► bounded channel ──► commit-worker thread ──► CommitProcessor
//! producer ──┘         (FIFO)              │
//!     ▲                                    │
//!     └────────── oneshot result slot ◄────┘
//! ```
//!
//! - One dedicated OS thread owns the `CommitProcessor`
//! - Each task carries a oneshot result slot, filled exactly once
//! - Producers wait on their slot, asynchronously or blocking
//!
//! # Cancellation
//!
//! A producer that drops or cancels its `PendingCommit` closes the slot. The
//! worker checks the slot before starting a task and skips closed ones, so a
//! task abandoned while still queued is never committed. A task already
//! running when its producer gives up still completes.
//!
//! # Failure isolation
//!
//! A panic while processing one task is caught; that task's producer receives
//! `WorkerPanicked` and the worker moves on to the next task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::core::category_resolver::CategoryResolver;
use crate::core::deduplicator::Deduplicator;
use crate::core::traits::CategoryRequest;
use crate::types::{PipelineError, Transaction};

type CommitResult = Result<Transaction, PipelineError>;

/// One unit of serialized work
struct CommitTask {
    transaction: Transaction,
    result_slot: oneshot::Sender<CommitResult>,
}

/// Resolve, deduplicate and persist one transaction
///
/// Not synchronized by itself. Run it from a single thread, either directly
/// (sync strategy) or behind a `SerializedCommitQueue`.
pub struct CommitProcessor {
    resolver: CategoryResolver,
    deduplicator: Deduplicator,
}

impl CommitProcessor {
    pub fn new(resolver: CategoryResolver, deduplicator: Deduplicator) -> Self {
        CommitProcessor {
            resolver,
            deduplicator,
        }
    }

    /// Commit one transaction
    ///
    /// A transaction that already carries a category keeps it; otherwise the
    /// resolver's answer is used. Resolution problems never block the commit.
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - the stored row
    /// * `Err(PipelineError)` - the store rejected the write
    pub fn process(&self, mut transaction: Transaction) -> CommitResult {
        if transaction.category.is_empty() {
            match self.resolver.resolve(&CategoryRequest::for_transaction(&transaction)) {
                Ok(Some(assignment)) => transaction.category = assignment.category_name,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "category resolution failed, committing uncategorized"),
            }
        }
        self.deduplicator.commit(transaction)
    }
}

/// Handle to a queued commit
pub struct PendingCommit {
    receiver: oneshot::Receiver<CommitResult>,
}

impl PendingCommit {
    /// Wait for the worker to finish this commit
    pub async fn wait(self) -> CommitResult {
        self.receiver.await.map_err(|_| PipelineError::QueueClosed)?
    }

    /// Blocking variant of `wait`. Must not be called from an async context.
    pub fn wait_blocking(self) -> CommitResult {
        self.receiver
            .blocking_recv()
            .map_err(|_| PipelineError::QueueClosed)?
    }

    /// Give up on this commit
    ///
    /// Returns the result if the worker had already finished the task, and
    /// `CommitCancelled` otherwise. A task that is still queued is skipped; one
    /// that is already running still completes, its result discarded.
    pub fn cancel(mut self) -> CommitResult {
        self.receiver.close();
        match self.receiver.try_recv() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::CommitCancelled),
        }
    }
}

/// Single-consumer FIFO queue in front of a `CommitProcessor`
pub struct SerializedCommitQueue {
    sender: Option<mpsc::Sender<CommitTask>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SerializedCommitQueue {
    /// Start the commit worker
    ///
    /// # Arguments
    ///
    /// * `processor` - Moved onto the worker thread; nothing else may use it
    /// * `capacity` - Channel bound; producers wait when it is full
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread could not be spawned.
    pub fn start(processor: CommitProcessor, capacity: usize) -> Result<Self, PipelineError> {
        let (sender, mut receiver) = mpsc::channel::<CommitTask>(capacity.max(1));

        let worker = thread::Builder::new()
            .name("commit-worker".to_string())
            .spawn(move || {
                while let Some(task) = receiver.blocking_recv() {
                    if task.result_slot.is_closed() {
                        debug!("producer gave up, skipping queued commit");
                        continue;
                    }

                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        processor.process(task.transaction)
                    }))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        error!(panic = %message, "commit panicked, worker continues");
                        Err(PipelineError::worker_panicked(message))
                    });

                    if task.result_slot.send(result).is_err() {
                        debug!("producer left before its commit finished");
                    }
                }
                debug!("commit queue closed, worker exiting");
            })?;

        Ok(SerializedCommitQueue {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn sender(&self) -> Result<&mpsc::Sender<CommitTask>, PipelineError> {
        self.sender.as_ref().ok_or(PipelineError::QueueClosed)
    }

    fn task(transaction: Transaction) -> (CommitTask, PendingCommit) {
        let (result_slot, receiver) = oneshot::channel();
        (
            CommitTask {
                transaction,
                result_slot,
            },
            PendingCommit { receiver },
        )
    }

    /// Queue a transaction without waiting for its commit
    ///
    /// Waits only while the channel is full. Tasks are processed in the order
    /// `enqueue` calls return.
    pub async fn enqueue(&self, transaction: Transaction) -> Result<PendingCommit, PipelineError> {
        let (task, pending) = Self::task(transaction);
        self.sender()?
            .send(task)
            .await
            .map_err(|_| PipelineError::QueueClosed)?;
        Ok(pending)
    }

    /// Blocking variant of `enqueue`. Must not be called from an async context.
    pub fn enqueue_blocking(&self, transaction: Transaction) -> Result<PendingCommit, PipelineError> {
        let (task, pending) = Self::task(transaction);
        self.sender()?
            .blocking_send(task)
            .map_err(|_| PipelineError::QueueClosed)?;
        Ok(pending)
    }

    /// Queue a transaction and wait for the stored result
    pub async fn submit(&self, transaction: Transaction) -> CommitResult {
        self.enqueue(transaction).await?.wait().await
    }

    /// Blocking variant of `submit`. Must not be called from an async context.
    pub fn submit_blocking(&self, transaction: Transaction) -> CommitResult {
        self.enqueue_blocking(transaction)?.wait_blocking()
    }

    /// Queue a transaction and wait at most `timeout` for the result
    ///
    /// On timeout the task is abandoned: skipped if still queued, completed
    /// anyway if already running.
    pub async fn submit_with_timeout(
        &self,
        transaction: Transaction,
        timeout: Duration,
    ) -> CommitResult {
        let pending = self.enqueue(transaction).await?;
        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "commit did not finish in time");
                Err(PipelineError::commit_timeout(timeout_ms))
            }
        }
    }

    /// Stop accepting work, drain the queue and join the worker
    ///
    /// Blocks until every queued task has been handled.
    pub fn shutdown(mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("commit worker terminated abnormally");
            }
        }
    }
}

impl Drop for SerializedCommitQueue {
    fn drop(&mut self) {
        // The worker drains what is queued, then exits on its own
        self.sender.take();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
