//! Seams between the pipeline core and its external collaborators
//!
//! The rule source, the ledger store and the optional classifier are all
//! injected through these traits so the core holds no global state and every
//! component can be tested against an in-memory implementation.

use rust_decimal::Decimal;

use crate::types::{
    CategoryRule, Direction, EventType, GroupId, PipelineError, Rule, Timestamp, Transaction,
    TransactionId,
};

/// Source of extraction and category rules
pub trait RuleStore: Send + Sync {
    /// Rules for one source application and event type, in stored order
    ///
    /// Disabled rules may be included; the assembler filters them.
    fn rules_for(&self, target_app: &str, event_type: EventType)
        -> Result<Vec<Rule>, PipelineError>;

    /// All category rules, in stored order
    fn category_rules(&self) -> Result<Vec<CategoryRule>, PipelineError>;
}

/// Window used by the deduplicator's lookups
///
/// Matches rows with the same amount and direction whose timestamp lies in
/// `[since, until]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowQuery {
    pub amount: Decimal,
    pub direction: Direction,
    pub since: Timestamp,
    pub until: Timestamp,
}

impl WindowQuery {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.amount == self.amount
            && transaction.direction == self.direction
            && transaction.timestamp >= self.since
            && transaction.timestamp <= self.until
    }
}

/// Read/write contract of the ledger store
///
/// Only the commit worker calls the mutating methods. Read-only methods may be
/// called from anywhere.
pub trait LedgerStore: Send + Sync {
    /// Persist a new row and return its assigned id
    fn insert(&self, transaction: &Transaction) -> Result<TransactionId, PipelineError>;

    /// Overwrite an existing row, matched by id
    fn update(&self, transaction: &Transaction) -> Result<(), PipelineError>;

    /// Distinct non-zero group ids among rows matching the window, in natural order
    fn find_distinct_group_ids(&self, query: &WindowQuery) -> Result<Vec<GroupId>, PipelineError>;

    /// Rows matching the window that belong to `group_id`, in natural order
    fn find_group_members(
        &self,
        query: &WindowQuery,
        group_id: GroupId,
    ) -> Result<Vec<Transaction>, PipelineError>;

    /// The row whose id is `group_id`
    fn find_group_head(&self, group_id: GroupId) -> Result<Option<Transaction>, PipelineError>;

    /// The closed category set
    fn category_names(&self) -> Result<Vec<String>, PipelineError>;

    /// Every row, ordered by id
    fn list(&self) -> Result<Vec<Transaction>, PipelineError>;
}

/// What the external classifier is told about a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRequest {
    pub amount: Decimal,
    pub direction: Direction,
    pub counterparty: String,
    pub item_detail: String,
    pub timestamp: Timestamp,
    pub matched_rule_name: String,
}

impl CategoryRequest {
    pub fn for_transaction(transaction: &Transaction) -> Self {
        CategoryRequest {
            amount: transaction.amount,
            direction: transaction.direction,
            counterparty: transaction.counterparty().to_string(),
            item_detail: transaction.item_detail.clone(),
            timestamp: transaction.timestamp,
            matched_rule_name: transaction.rule_name.clone(),
        }
    }
}

/// Last-resort category classifier (e.g. a network model)
///
/// Best effort: an `Err` or an empty answer both mean "no category".
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        request: &CategoryRequest,
        categories: &[String],
    ) -> Result<Option<String>, PipelineError>;
}
