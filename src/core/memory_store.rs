//! In-memory store implementations
//!
//! Reference implementations of `LedgerStore` and `RuleStore` backed by
//! `DashMap`. The CLI runs against them and the core's tests use them; a
//! relational store plugs into the same traits.
//!
//! # Design
//!
//! - Rows are keyed by id; ids come from an atomic sequence starting at 1
//! - "Natural order" for every query is ascending id, the order rows were
//!   inserted in
//! - The category set is closed: it only changes through `add_category`
//!
//! # Thread Safety
//!
//! All operations take `&self` and are safe from any thread. The commit path
//! relies on the single commit worker for read-decide-write atomicity, not on
//! the store.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::core::traits::{LedgerStore, RuleStore, WindowQuery};
use crate::types::{
    CategoryRule, EventType, GroupId, PipelineError, Rule, Transaction, TransactionId,
};

/// Ledger rows kept in memory
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    rows: DashMap<TransactionId, Transaction>,
    next_id: AtomicI64,
    /// Category name to insertion position
    categories: DashMap<String, usize>,
    next_category: AtomicUsize,
}

impl InMemoryLedgerStore {
    /// Create an empty store with an empty category set
    pub fn new() -> Self {
        InMemoryLedgerStore {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
            categories: DashMap::new(),
            next_category: AtomicUsize::new(0),
        }
    }

    /// Create an empty store with the given category set
    pub fn with_categories<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for name in names {
            store.add_category(name);
        }
        store
    }

    /// Add a name to the category set; existing names keep their position
    pub fn add_category(&self, name: impl Into<String>) {
        self.categories
            .entry(name.into())
            .or_insert_with(|| self.next_category.fetch_add(1, Ordering::SeqCst));
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fetch one row by id
    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.rows.get(&id).map(|entry| entry.value().clone())
    }

    fn matching(&self, query: &WindowQuery) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self
            .rows
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert(&self, transaction: &Transaction) -> Result<TransactionId, PipelineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut row = transaction.clone();
        row.id = id;
        self.rows.insert(id, row);
        Ok(id)
    }

    fn update(&self, transaction: &Transaction) -> Result<(), PipelineError> {
        match self.rows.get_mut(&transaction.id) {
            Some(mut row) => {
                *row = transaction.clone();
                Ok(())
            }
            None => Err(PipelineError::store(
                "update",
                format!("no row with id {}", transaction.id),
            )),
        }
    }

    fn find_distinct_group_ids(&self, query: &WindowQuery) -> Result<Vec<GroupId>, PipelineError> {
        let mut group_ids: Vec<GroupId> = Vec::new();
        for row in self.matching(query) {
            if row.group_id != 0 && !group_ids.contains(&row.group_id) {
                group_ids.push(row.group_id);
            }
        }
        Ok(group_ids)
    }

    fn find_group_members(
        &self,
        query: &WindowQuery,
        group_id: GroupId,
    ) -> Result<Vec<Transaction>, PipelineError> {
        Ok(self
            .matching(query)
            .into_iter()
            .filter(|row| row.group_id == group_id)
            .collect())
    }

    fn find_group_head(&self, group_id: GroupId) -> Result<Option<Transaction>, PipelineError> {
        Ok(self.get(group_id))
    }

    fn category_names(&self) -> Result<Vec<String>, PipelineError> {
        let mut names: Vec<(usize, String)> = self
            .categories
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        names.sort();
        Ok(names.into_iter().map(|(_, name)| name).collect())
    }

    fn list(&self) -> Result<Vec<Transaction>, PipelineError> {
        let mut rows: Vec<Transaction> = self.rows.iter().map(|entry| entry.value().clone()).collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

/// Rules kept in memory, in the order they were added
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: DashMap<(String, EventType), Vec<Rule>>,
    category_rules: DashMap<usize, CategoryRule>,
    next_category_rule: AtomicUsize,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extraction rule after the existing rules for its app and event type
    pub fn add_rule(&self, rule: Rule) {
        self.rules
            .entry((rule.target_app.clone(), rule.event_type))
            .or_default()
            .push(rule);
    }

    /// Append a category rule
    pub fn add_category_rule(&self, rule: CategoryRule) {
        let position = self.next_category_rule.fetch_add(1, Ordering::SeqCst);
        self.category_rules.insert(position, rule);
    }
}

impl RuleStore for InMemoryRuleStore {
    fn rules_for(
        &self,
        target_app: &str,
        event_type: EventType,
    ) -> Result<Vec<Rule>, PipelineError> {
        Ok(self
            .rules
            .get(&(target_app.to_string(), event_type))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn category_rules(&self) -> Result<Vec<CategoryRule>, PipelineError> {
        let mut rules: Vec<(usize, CategoryRule)> = self
            .category_rules
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        rules.sort_by_key(|(position, _)| *position);
        Ok(rules.into_iter().map(|(_, rule)| rule).collect())
    }
}
