//! Capture Ledger Library
//! # Overview
//!
//! This library turns captured payment events (notifications, text messages,
//! in-app signals) into ledger entries. User-editable rule scripts extract the
//! transaction, a fallback chain assigns a category, and near-duplicate
//! reports of the same payment are folded into one transaction group.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (RawEvent, Rule, Transaction, etc.)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Pipeline components:
//!   - [`core::assembler`] - Builds one executable script from stored rules
//!   - [`core::sandbox`] - Evaluates scripts in a fresh, bounded JS context
//!   - [`core::extractor`] - RawEvent to ExtractionResult
//!   - [`core::category_resolver`] - User rules, then system rules, then classifier
//!   - [`core::deduplicator`] - Groups reports of the same payment
//!   - [`core::commit_queue`] - Single-worker commit serialization
//!   - [`core::pipeline`] - Configuration and end-to-end wiring
//! - [`io`] - Event CSV readers, rule book loading, ledger output
//! - [`strategy`] - Sync and async processing runs
//!
//! # Pipeline
//!
//! ```text
//! RawEvent ─► TriggerFilter ─► Extractor ─► SerializedCommitQueue
//!                                              └─► CategoryResolver ─► Deduplicator ─► LedgerStore
//! ```
//!
//! Extraction may run for many events at once; every read-decide-write on
//! the ledger happens on the single commit worker, in submission order.
//!
//! # Grouping
//!
//! A transaction joins an existing group when, within the preceding
//! 180 seconds, a row with the same amount and direction was stored and a
//! member of its group shares the transaction's channel. Otherwise it starts
//! a new group whose id is its own row id.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{CapturePipeline, InMemoryLedgerStore, InMemoryRuleStore, PipelineConfig};
pub use io::{write_ledger_csv, RuleBook};
pub use types::{
    CategoryRule, Creator, Direction, EventType, ExtractionResult, PipelineError, RawEvent, Rule,
    Transaction,
};
