//! Event extraction
//!
//! This module provides the Extractor that turns one RawEvent into at most one
//! ExtractionResult by coordinating the RuleStore, the RuleAssembler and the
//! ScriptSandbox.
//!
//! The extractor enforces:
//! - Rules are looked up by the event's source application and event type
//! - Only enabled rules run, in stored order, first positive amount wins
//! - Each rule runs in its own sandbox context, so a rule that hits a
//!   runtime limit is skipped like one that throws
//! - Anything the sandbox returns that is not a structured result is "no match"

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::assembler::RuleAssembler;
use crate::core::sandbox::ScriptSandbox;
use crate::core::traits::RuleStore;
use crate::types::{ExtractionResult, PipelineError, RawEvent};

/// Runs a RawEvent through its applicable rules
///
/// Cheap to clone; clones share the rule store.
#[derive(Clone)]
pub struct Extractor {
    rules: Arc<dyn RuleStore>,
    assembler: RuleAssembler,
    sandbox: ScriptSandbox,
}

impl Extractor {
    /// Create a new Extractor
    ///
    /// # Arguments
    ///
    /// * `rules` - Source of extraction rules
    /// * `sandbox` - Sandbox (and its limits) used for every evaluation
    pub fn new(rules: Arc<dyn RuleStore>, sandbox: ScriptSandbox) -> Self {
        Extractor {
            rules,
            assembler: RuleAssembler::new(),
            sandbox,
        }
    }

    /// Extract a candidate transaction from one event
    ///
    /// # Arguments
    ///
    /// * `event` - The captured event
    ///
    /// # Returns
    ///
    /// * `Ok(Some(result))` if a rule matched with a positive amount
    /// * `Ok(None)` if no enabled rule matched
    /// * `Err(PipelineError)` if the rule store could not be read
    pub fn extract(&self, event: &RawEvent) -> Result<Option<ExtractionResult>, PipelineError> {
        let rules = self.rules.rules_for(&event.source_app, event.event_type)?;
        let scripts = self.assembler.assemble_each(&rules);
        if scripts.is_empty() {
            debug!(
                source_app = %event.source_app,
                event_type = %event.event_type,
                "no enabled rules for event"
            );
            return Ok(None);
        }

        // One context per rule: a rule stopped by a runtime limit only ends its own turn
        for script in &scripts {
            let output = self.sandbox.evaluate(script, &event.payload);
            trace!(rules = ?script.rule_names(), output = %output, "rule script finished");

            if let Some(found) = ExtractionResult::from_script_output(&output) {
                debug!(
                    rule = %found.matched_rule_name,
                    amount = %found.amount,
                    "rule matched"
                );
                return Ok(Some(found));
            }
        }

        debug!(
            source_app = %event.source_app,
            rules = scripts.len(),
            "no rule matched"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::InMemoryRuleStore;
    use crate::core::sandbox::SandboxLimits;
    use crate::types::{Creator, Direction, EventType, Rule};
    use rstest::rstest;
    use rust_decimal::Decimal;

    const MATCHING_RULE: &str = r#"return {
        get(data) {
            const amount = common.match(data, "paid ([0-9.]+)");
            return { amount: amount, type: "Expend", counterpartyTo: common.match(data, "to (\\w+)") };
        }
    };"#;

    fn extractor(rules: Vec<Rule>) -> Extractor {
        let store = InMemoryRuleStore::new();
        for rule in rules {
            store.add_rule(rule);
        }
        Extractor::new(Arc::new(store), ScriptSandbox::default())
    }

    fn extractor_with_limits(rules: Vec<Rule>, limits: SandboxLimits) -> Extractor {
        let store = InMemoryRuleStore::new();
        for rule in rules {
            store.add_rule(rule);
        }
        Extractor::new(Arc::new(store), ScriptSandbox::new(limits))
    }

    fn rule(name: &str, body: &str) -> Rule {
        Rule::new(name, body, "pay", EventType::Notice, Creator::System)
    }

    fn event(payload: &str) -> RawEvent {
        RawEvent::new("pay", EventType::Notice, payload, 1_000)
    }

    #[rstest]
    #[case::first_throws("return { get(data) { throw new Error('nope'); } };")]
    #[case::first_returns_null("return { get(data) { return null; } };")]
    #[case::first_returns_zero("return { get(data) { return { amount: 0 }; } };")]
    #[case::first_has_no_get("return {};")]
    #[case::first_syntax_error("return { get(data) { ")]
    #[case::first_runs_away("return { get(data) { while (true) {} } };")]
    #[case::first_recurses_forever(
        "return { get(data) { const deeper = (n) => deeper(n + 1); return { amount: deeper(0) }; } };"
    )]
    #[case::first_amount_not_a_number("return { get(data) { return { amount: 'n/a' }; } };")]
    fn test_first_positive_rule_wins(#[case] first_body: &str) {
        let extractor = extractor_with_limits(
            vec![rule("r1", first_body), rule("r2", MATCHING_RULE)],
            SandboxLimits {
                loop_iteration_limit: 10_000,
                recursion_limit: 64,
            },
        );

        let result = extractor
            .extract(&event("paid 12.50 to Cafe"))
            .unwrap()
            .unwrap();

        assert_eq!(result.matched_rule_name, "r2");
        assert_eq!(result.amount, Decimal::new(1250, 2));
        assert_eq!(result.direction, Direction::Expense);
        assert_eq!(result.counterparty_to, "Cafe");
    }

    #[rstest]
    #[case::currency_prefix("'¥12.50'")]
    #[case::currency_suffix("'12.50元'")]
    #[case::thousands_separator("'1,2.50'")]
    fn test_decorated_amount_is_normalized(#[case] amount: &str) {
        let first = format!("return {{ get(data) {{ return {{ amount: {} }}; }} }};", amount);
        let second = r#"return { get(data) { return { amount: 5 }; } };"#;
        let extractor = extractor(vec![rule("r1", &first), rule("r2", second)]);

        let result = extractor.extract(&event("paid")).unwrap().unwrap();
        assert_eq!(result.matched_rule_name, "r1");
        assert_eq!(result.amount, Decimal::new(1250, 2));
    }

    #[test]
    fn test_stops_at_first_match() {
        let second = r#"return { get(data) { return { amount: 99 }; } };"#;
        let extractor = extractor(vec![rule("r1", MATCHING_RULE), rule("r2", second)]);

        let result = extractor.extract(&event("paid 3 to Bob")).unwrap().unwrap();
        assert_eq!(result.matched_rule_name, "r1");
        assert_eq!(result.amount, Decimal::from(3));
    }

    #[test]
    fn test_no_match_produces_nothing() {
        let extractor = extractor(vec![
            rule("r1", "return { get(data) { return { amount: -1 }; } };"),
            rule("r2", MATCHING_RULE),
        ]);

        assert_eq!(extractor.extract(&event("nothing here")).unwrap(), None);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let extractor = extractor(vec![rule("r1", MATCHING_RULE).disabled()]);
        assert_eq!(extractor.extract(&event("paid 5 to Bob")).unwrap(), None);
    }

    #[test]
    fn test_rules_are_scoped_to_app_and_event_type() {
        let other_app = Rule::new("elsewhere", MATCHING_RULE, "bank", EventType::Notice, Creator::User);
        let other_type = Rule::new("sms", MATCHING_RULE, "pay", EventType::Sms, Creator::User);
        let extractor = extractor(vec![other_app, other_type]);

        assert_eq!(extractor.extract(&event("paid 5 to Bob")).unwrap(), None);
    }

    #[test]
    fn test_unknown_app_has_no_rules() {
        let extractor = extractor(vec![]);
        assert_eq!(extractor.extract(&event("paid 5 to Bob")).unwrap(), None);
    }
}
