//! Transaction deduplication
//!
//! One real-world payment is often reported more than once (an in-app signal
//! and a push notification for the same transfer). The Deduplicator folds such
//! reports into a single transaction group.
//!
//! # Algorithm
//!
//! For a new candidate at time `t`:
//! 1. Look back over `[t - 180_000, t]` for rows with the same amount and
//!    direction, and collect their distinct non-zero group ids.
//! 2. Scan the groups in store order. The first group with a member on the
//!    same channel and direction as the candidate is the candidate's group.
//! 3. On a hit, widen the group head's fields with the candidate's, persist
//!    the head, then persist the candidate under the shared group id.
//! 4. Otherwise insert the candidate once and make it its own group head.
//!
//! The read-decide-write sequence is not atomic on its own; callers must run
//! commits one at a time (see `SerializedCommitQueue`).

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::traits::{LedgerStore, WindowQuery};
use crate::types::{GroupId, PipelineError, Transaction};

/// Lookback window for duplicate detection, in milliseconds
pub const DEDUP_WINDOW_MS: i64 = 180_000;

/// Separator between merged item detail fragments
const ITEM_DETAIL_SEPARATOR: &str = " / ";

/// Groups near-duplicate transactions and persists them
pub struct Deduplicator {
    store: Arc<dyn LedgerStore>,
    enabled: bool,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Deduplicator {
            store,
            enabled: true,
        }
    }

    /// Turn grouping off; every commit then starts its own group
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Persist a candidate, merging it into an existing group when one matches
    ///
    /// # Arguments
    ///
    /// * `candidate` - Unsaved transaction (its `id` and `group_id` are ignored)
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - the stored row, carrying its id and group id
    /// * `Err(PipelineError)` - a store call failed, or a matched group has no head
    ///
    /// # Errors
    ///
    /// A failure after the head was updated leaves the head widened and the
    /// candidate unsaved. Widening is idempotent, so the caller may resubmit.
    pub fn commit(&self, mut candidate: Transaction) -> Result<Transaction, PipelineError> {
        candidate.id = 0;
        candidate.group_id = 0;

        let group_id = if self.enabled {
            self.find_group(&candidate)?
        } else {
            None
        };

        match group_id {
            Some(group_id) => self.merge_into(group_id, candidate),
            None => self.start_group(candidate),
        }
    }

    fn find_group(&self, candidate: &Transaction) -> Result<Option<GroupId>, PipelineError> {
        let query = WindowQuery {
            amount: candidate.amount,
            direction: candidate.direction,
            since: candidate.timestamp.saturating_sub(DEDUP_WINDOW_MS),
            until: candidate.timestamp,
        };

        for group_id in self.store.find_distinct_group_ids(&query)? {
            let members = self.store.find_group_members(&query, group_id)?;
            let same_source = members.iter().any(|member| {
                member.channel == candidate.channel && member.direction == candidate.direction
            });
            if same_source {
                debug!(group_id, channel = %candidate.channel, "candidate matches existing group");
                return Ok(Some(group_id));
            }
        }
        Ok(None)
    }

    fn merge_into(
        &self,
        group_id: GroupId,
        mut candidate: Transaction,
    ) -> Result<Transaction, PipelineError> {
        let mut head = self
            .store
            .find_group_head(group_id)?
            .ok_or_else(|| PipelineError::group_head_missing(group_id))?;

        widen(&mut head.counterparty_from, &candidate.counterparty_from);
        widen(&mut head.counterparty_to, &candidate.counterparty_to);
        widen(&mut head.memo, &candidate.memo);
        append_detail(&mut head.item_detail, &candidate.item_detail);
        if !candidate.category.is_empty() {
            head.category = candidate.category.clone();
        }
        self.store.update(&head)?;

        candidate.group_id = group_id;
        candidate.id = self.store.insert(&candidate)?;
        info!(id = candidate.id, group_id, "merged transaction into group");
        Ok(candidate)
    }

    fn start_group(&self, mut candidate: Transaction) -> Result<Transaction, PipelineError> {
        candidate.id = self.store.insert(&candidate)?;
        candidate.group_id = candidate.id;
        self.store.update(&candidate)?;
        info!(id = candidate.id, "started new transaction group");
        Ok(candidate)
    }
}

/// Append `addition` to `field` unless it is already contained
fn widen(field: &mut String, addition: &str) {
    let addition = addition.trim();
    if addition.is_empty() || field.contains(addition) {
        return;
    }
    if !field.is_empty() {
        field.push(' ');
    }
    field.push_str(addition);
}

/// Append item detail fragments not already present
fn append_detail(field: &mut String, addition: &str) {
    for fragment in addition.split(ITEM_DETAIL_SEPARATOR) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        let present = field
            .split(ITEM_DETAIL_SEPARATOR)
            .any(|existing| existing.trim() == fragment);
        if present {
            continue;
        }
        if !field.is_empty() {
            field.push_str(ITEM_DETAIL_SEPARATOR);
        }
        field.push_str(fragment);
    }
}
