//! Core pipeline module
//!
//! This module contains the extraction, classification and deduplication
//! components:
//! - `traits` - Seams to the rule store, ledger store and classifier
//! - `assembler` - Builds executable scripts from rule data
//! - `sandbox` - Runs scripts in disposable contexts
//! - `extractor` - RawEvent to ExtractionResult
//! - `category_resolver` - Category fallback chain
//! - `deduplicator` - Transaction grouping within the dedup window
//! - `commit_queue` - Single-worker commit serialization
//! - `trigger_filter` - Drops repeated captures
//! - `memory_store` - In-memory store implementations
//! - `pipeline` - Configuration and end-to-end wiring

pub mod assembler;
pub mod category_resolver;
pub mod commit_queue;
pub mod deduplicator;
pub mod extractor;
pub mod memory_store;
pub mod pipeline;
pub mod sandbox;
pub mod traits;
pub mod trigger_filter;

pub use assembler::{RuleAssembler, Script};
pub use category_resolver::CategoryResolver;
pub use commit_queue::{CommitProcessor, PendingCommit, SerializedCommitQueue};
pub use deduplicator::{Deduplicator, DEDUP_WINDOW_MS};
pub use extractor::Extractor;
pub use memory_store::{InMemoryLedgerStore, InMemoryRuleStore};
pub use pipeline::{commit_processor, CapturePipeline, PipelineConfig};
pub use sandbox::{SandboxLimits, ScriptSandbox};
pub use traits::{CategoryRequest, Classifier, LedgerStore, RuleStore, WindowQuery};
pub use trigger_filter::TriggerFilter;
