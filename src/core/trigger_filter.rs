//! Repeated-trigger filter
//!
//! Capture sources sometimes deliver the exact same payload several times
//! (a notification re-posted on update, a listener attached twice). Such
//! repeats are dropped before extraction, keyed by a fingerprint of the whole
//! event.
//!
//! The filter works on capture time, not wall-clock time, so replaying a
//! recorded event stream behaves the same as live capture.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{PipelineError, RawEvent, Timestamp};

/// Rejects events already seen within a time window
#[derive(Debug)]
pub struct TriggerFilter {
    window_ms: i64,
    /// Fingerprint to the capture time it was last accepted at
    seen: DashMap<String, Timestamp>,
}

impl TriggerFilter {
    pub fn new(window_ms: i64) -> Self {
        TriggerFilter {
            window_ms,
            seen: DashMap::new(),
        }
    }

    /// Accept an event, or reject it as a repeat
    ///
    /// # Errors
    ///
    /// `DuplicateTrigger` if an identical event was accepted within the window.
    pub fn check(&self, event: &RawEvent) -> Result<(), PipelineError> {
        let now = event.captured_at;
        let window = u64::try_from(self.window_ms).unwrap_or(0);
        self.seen
            .retain(|_, accepted_at| now.saturating_sub(*accepted_at) <= self.window_ms);

        match self.seen.entry(fingerprint(event)) {
            Entry::Occupied(entry) if now.abs_diff(*entry.get()) <= window => {
                debug!(source_app = %event.source_app, "repeated trigger dropped");
                Err(PipelineError::duplicate_trigger(&event.source_app))
            }
            Entry::Occupied(mut entry) => {
                entry.insert(now);
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
        }
    }

    /// Number of fingerprints currently remembered
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Hex sha256 over source app, event type and payload
fn fingerprint(event: &RawEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.source_app.as_bytes());
    hasher.update([0u8]);
    hasher.update(event.event_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(event.payload.as_bytes());
    hex::encode(hasher.finalize())
}
