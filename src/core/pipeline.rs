//! Capture pipeline
//!
//! Wires the pieces together: repeated-trigger filter, extraction, and the
//! serialized commit path.
//!
//! # Architecture
//!
//! ```text
//! CapturePipeline
//!     ├── TriggerFilter          (drops repeated captures)
//!     ├── Extractor              (rules → ExtractionResult, on blocking threads)
//!     └── SerializedCommitQueue  (single worker)
//!         └── CommitProcessor
//!             ├── CategoryResolver
//!             └── Deduplicator
//! ```
//!
//! Extraction runs concurrently for any number of producers; everything that
//! touches the ledger goes through the one commit worker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::category_resolver::CategoryResolver;
use crate::core::commit_queue::{CommitProcessor, PendingCommit, SerializedCommitQueue};
use crate::core::deduplicator::Deduplicator;
use crate::core::extractor::Extractor;
use crate::core::sandbox::{SandboxLimits, ScriptSandbox};
use crate::core::traits::{Classifier, LedgerStore, RuleStore};
use crate::core::trigger_filter::TriggerFilter;
use crate::types::{PipelineError, RawEvent, Transaction};

/// Configuration for the capture pipeline
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Bound of the commit queue channel
    pub queue_capacity: usize,
    /// Concurrent extractions (async strategy)
    pub max_producers: usize,
    /// Caller-side bound on one extraction
    pub script_timeout: Duration,
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    /// When false every commit starts its own group
    pub dedup_enabled: bool,
    /// Repeated-trigger window, in milliseconds
    pub trigger_window_ms: i64,
    /// Events read per batch (async strategy)
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_producers: num_cpus::get(),
            script_timeout: Duration::from_secs(5),
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
            dedup_enabled: true,
            trigger_window_ms: 300_000,
            batch_size: 256,
        }
    }
}

impl PipelineConfig {
    /// Replace zero values with their defaults, warning for each
    pub fn normalized(self) -> Self {
        let default = Self::default();

        Self {
            queue_capacity: or_default("queue_capacity", self.queue_capacity, default.queue_capacity),
            max_producers: or_default("max_producers", self.max_producers, default.max_producers),
            script_timeout: if self.script_timeout.is_zero() {
                warn!(
                    default_ms = default.script_timeout.as_millis() as u64,
                    "invalid script_timeout (0), using default"
                );
                default.script_timeout
            } else {
                self.script_timeout
            },
            loop_iteration_limit: or_default(
                "loop_iteration_limit",
                self.loop_iteration_limit,
                default.loop_iteration_limit,
            ),
            recursion_limit: or_default("recursion_limit", self.recursion_limit, default.recursion_limit),
            dedup_enabled: self.dedup_enabled,
            trigger_window_ms: if self.trigger_window_ms <= 0 {
                warn!(
                    value = self.trigger_window_ms,
                    default = default.trigger_window_ms,
                    "invalid trigger_window_ms, using default"
                );
                default.trigger_window_ms
            } else {
                self.trigger_window_ms
            },
            batch_size: or_default("batch_size", self.batch_size, default.batch_size),
        }
    }

    /// Sandbox carrying this configuration's limits
    pub fn sandbox(&self) -> ScriptSandbox {
        ScriptSandbox::new(SandboxLimits {
            loop_iteration_limit: self.loop_iteration_limit,
            recursion_limit: self.recursion_limit,
        })
    }

    fn script_timeout_ms(&self) -> u64 {
        u64::try_from(self.script_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn or_default<T>(name: &str, value: T, default: T) -> T
where
    T: Copy + Default + PartialEq + std::fmt::Display,
{
    if value == T::default() {
        warn!(setting = name, default = %default, "invalid value (0), using default");
        default
    } else {
        value
    }
}

/// Build the commit processor for a set of collaborators
///
/// Used directly by single-threaded callers and moved onto the commit worker
/// by `CapturePipeline`.
pub fn commit_processor(
    config: &PipelineConfig,
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn LedgerStore>,
    classifier: Option<Arc<dyn Classifier>>,
) -> CommitProcessor {
    let mut resolver = CategoryResolver::new(rules, Arc::clone(&ledger), config.sandbox());
    if let Some(classifier) = classifier {
        resolver = resolver.with_classifier(classifier);
    }
    let deduplicator = Deduplicator::new(ledger).with_enabled(config.dedup_enabled);
    CommitProcessor::new(resolver, deduplicator)
}

/// Event-to-ledger pipeline for concurrent producers
pub struct CapturePipeline {
    trigger_filter: TriggerFilter,
    extractor: Extractor,
    queue: SerializedCommitQueue,
    script_timeout: Duration,
    script_timeout_ms: u64,
}

impl CapturePipeline {
    /// Start the pipeline and its commit worker
    ///
    /// # Arguments
    ///
    /// * `config` - Pipeline configuration (normalized by the caller)
    /// * `rules` - Extraction and category rules
    /// * `ledger` - Ledger the commit worker writes to
    /// * `classifier` - Optional last-resort classifier
    ///
    /// # Errors
    ///
    /// Returns an error if the commit worker could not be started.
    pub fn start(
        config: &PipelineConfig,
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn LedgerStore>,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Result<Self, PipelineError> {
        let processor = commit_processor(config, Arc::clone(&rules), ledger, classifier);
        let queue = SerializedCommitQueue::start(processor, config.queue_capacity)?;

        Ok(CapturePipeline {
            trigger_filter: TriggerFilter::new(config.trigger_window_ms),
            extractor: Extractor::new(rules, config.sandbox()),
            queue,
            script_timeout: config.script_timeout,
            script_timeout_ms: config.script_timeout_ms(),
        })
    }

    /// Filter and extract one event, without committing it
    ///
    /// # Returns
    ///
    /// * `Ok(Some(transaction))` - candidate ready to commit
    /// * `Ok(None)` - no rule matched
    /// * `Err(PipelineError)` - repeated trigger, timeout, or rule store failure
    pub async fn prepare(&self, event: &RawEvent) -> Result<Option<Transaction>, PipelineError> {
        self.admit(event)?;
        self.extract(event).await
    }

    /// Run the repeated-trigger filter on one event
    ///
    /// Callers that extract events concurrently admit them first, in capture
    /// order, so the same event wins regardless of scheduling.
    pub fn admit(&self, event: &RawEvent) -> Result<(), PipelineError> {
        self.trigger_filter.check(event)
    }

    /// Extract a candidate from an admitted event
    ///
    /// Extraction runs on a blocking thread and is bounded by the configured
    /// script timeout. A timed-out evaluation keeps running until the sandbox
    /// limits stop it, but its result is discarded.
    pub async fn extract(&self, event: &RawEvent) -> Result<Option<Transaction>, PipelineError> {
        let extractor = self.extractor.clone();
        let captured = event.clone();
        let extraction = tokio::task::spawn_blocking(move || extractor.extract(&captured));

        let extraction = match tokio::time::timeout(self.script_timeout, extraction).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(PipelineError::worker_panicked(join_error.to_string()))
            }
            Err(_) => {
                warn!(
                    source_app = %event.source_app,
                    timeout_ms = self.script_timeout_ms,
                    "extraction timed out"
                );
                return Err(PipelineError::extraction_timeout(self.script_timeout_ms));
            }
        };

        Ok(extraction.map(|found| Transaction::from_extraction(&found, event)))
    }

    /// Queue a prepared transaction for commit
    pub async fn enqueue(&self, transaction: Transaction) -> Result<PendingCommit, PipelineError> {
        self.queue.enqueue(transaction).await
    }

    /// Filter, extract and commit one event
    ///
    /// # Returns
    ///
    /// * `Ok(Some(transaction))` - the stored row
    /// * `Ok(None)` - no rule matched, nothing was stored
    /// * `Err(PipelineError)` - the event was rejected or the commit failed
    pub async fn ingest(&self, event: &RawEvent) -> Result<Option<Transaction>, PipelineError> {
        match self.prepare(event).await? {
            Some(candidate) => {
                let stored = self.queue.submit(candidate).await?;
                debug!(id = stored.id, group_id = stored.group_id, "event committed");
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    /// Drain the commit queue and stop the worker
    pub fn shutdown(self) {
        self.queue.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::{InMemoryLedgerStore, InMemoryRuleStore};
    use crate::types::{CategoryRule, Creator, EventType, Rule};
    use rstest::rstest;
    use rust_decimal::Decimal;

    const PAY_RULE: &str = r#"return {
        get(data) {
            return {
                amount: common.match(data, "paid ([0-9.]+)"),
                type: "Expend",
                channel: common.match(data, "via (\\w+)"),
                itemDetail: common.match(data, "for (\\w+)"),
            };
        }
    };"#;

    fn stores() -> (Arc<InMemoryRuleStore>, Arc<InMemoryLedgerStore>) {
        let rules = InMemoryRuleStore::new();
        rules.add_rule(Rule::new("pay", PAY_RULE, "pay", EventType::Notice, Creator::System));
        rules.add_rule(Rule::new("pay_app", PAY_RULE, "pay", EventType::App, Creator::System));
        rules.add_category_rule(CategoryRule::new(
            "coffee",
            "return shopItem === 'coffee' ? 'Food' : null;",
            Creator::User,
        ));
        let ledger = InMemoryLedgerStore::with_categories(["Food"]);
        (Arc::new(rules), Arc::new(ledger))
    }

    fn pipeline(config: PipelineConfig) -> (Arc<InMemoryLedgerStore>, CapturePipeline) {
        let (rules, ledger) = stores();
        let pipeline = CapturePipeline::start(&config, rules, ledger.clone(), None).unwrap();
        (ledger, pipeline)
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.script_timeout, Duration::from_secs(5));
        assert_eq!(config.trigger_window_ms, 300_000);
        assert!(config.dedup_enabled);
        assert_eq!(config.sandbox().limits(), SandboxLimits::default());
    }

    #[rstest]
    #[case::queue(PipelineConfig { queue_capacity: 0, ..PipelineConfig::default() })]
    #[case::producers(PipelineConfig { max_producers: 0, ..PipelineConfig::default() })]
    #[case::timeout(PipelineConfig { script_timeout: Duration::ZERO, ..PipelineConfig::default() })]
    #[case::loops(PipelineConfig { loop_iteration_limit: 0, ..PipelineConfig::default() })]
    #[case::recursion(PipelineConfig { recursion_limit: 0, ..PipelineConfig::default() })]
    #[case::window(PipelineConfig { trigger_window_ms: -1, ..PipelineConfig::default() })]
    #[case::batch(PipelineConfig { batch_size: 0, ..PipelineConfig::default() })]
    fn test_zero_values_fall_back_to_defaults(#[case] config: PipelineConfig) {
        assert_eq!(config.normalized(), PipelineConfig::default());
    }

    #[test]
    fn test_normalized_keeps_valid_values() {
        let config = PipelineConfig {
            queue_capacity: 3,
            dedup_enabled: false,
            ..PipelineConfig::default()
        };
        assert_eq!(config.clone().normalized(), config);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_commits_categorized_transaction() {
        let (ledger, pipeline) = pipeline(PipelineConfig::default());

        let event = RawEvent::new("pay", EventType::Notice, "paid 4.20 via wechat for coffee", 1_000);
        let stored = pipeline.ingest(&event).await.unwrap().unwrap();

        assert_eq!(stored.amount, Decimal::new(420, 2));
        assert_eq!(stored.channel, "wechat");
        assert_eq!(stored.category, "Food");
        assert_eq!(stored.rule_name, "pay");
        assert_eq!(ledger.list().unwrap(), vec![stored]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_reports_of_one_payment_share_a_group() {
        let (ledger, pipeline) = pipeline(PipelineConfig::default());

        let notice = RawEvent::new("pay", EventType::Notice, "paid 10 via wechat for coffee", 0);
        let in_app = RawEvent::new("pay", EventType::App, "paid 10 via wechat for bagel", 60_000);
        let first = pipeline.ingest(&notice).await.unwrap().unwrap();
        let second = pipeline.ingest(&in_app).await.unwrap().unwrap();

        assert_eq!(second.group_id, first.id);
        assert_eq!(ledger.get(first.id).unwrap().item_detail, "coffee / bagel");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unmatched_event_stores_nothing() {
        let (ledger, pipeline) = pipeline(PipelineConfig::default());

        let event = RawEvent::new("pay", EventType::Notice, "your statement is ready", 0);
        assert_eq!(pipeline.ingest(&event).await.unwrap(), None);
        assert!(ledger.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_trigger_is_rejected() {
        let (ledger, pipeline) = pipeline(PipelineConfig::default());

        let event = RawEvent::new("pay", EventType::Notice, "paid 1 via card", 0);
        pipeline.ingest(&event).await.unwrap();
        let repeat = pipeline.ingest(&event).await;

        assert_eq!(repeat, Err(PipelineError::duplicate_trigger("pay")));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runaway_rule_is_bounded() {
        let rules = InMemoryRuleStore::new();
        rules.add_rule(Rule::new(
            "spin",
            "return { get(data) { while (true) {} } };",
            "pay",
            EventType::Notice,
            Creator::User,
        ));
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let config = PipelineConfig {
            loop_iteration_limit: 10_000,
            ..PipelineConfig::default()
        };
        let pipeline = CapturePipeline::start(&config, Arc::new(rules), ledger.clone(), None).unwrap();

        let event = RawEvent::new("pay", EventType::Notice, "paid 1", 0);
        assert_eq!(pipeline.ingest(&event).await.unwrap(), None);
        pipeline.shutdown();
        assert!(ledger.is_empty());
    }
}
