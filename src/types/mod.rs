//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `event`: captured events and their kinds
//! - `rule`: extraction and category rules
//! - `transaction`: extraction results, category assignments and ledger records
//! - `error`: Error types for the pipeline

pub mod error;
pub mod event;
pub mod rule;
pub mod transaction;

pub use error::PipelineError;
pub use event::{EventType, RawEvent, Timestamp};
pub use rule::{CategoryRule, Creator, Rule};
pub use transaction::{
    CategoryAssignment, Direction, ExtractionResult, GroupId, Transaction, TransactionId,
};
