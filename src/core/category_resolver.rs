//! Category resolution
//!
//! Resolves a category for a transaction through an ordered fallback chain:
//!
//! 1. Enabled user-authored category rules
//! 2. Enabled system-authored category rules
//! 3. The optional external classifier
//!
//! Each stage runs only if the previous one produced nothing usable. A stage
//! that fails (script error, classifier error) counts as "nothing usable".
//!
//! # Closed category set
//!
//! Every answer is checked against `LedgerStore::category_names()` at the time
//! of resolution. Names outside the set are dropped and the chain moves on, so
//! a misbehaving script or a free-text classifier answer can never introduce a
//! new category.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::assembler::RuleAssembler;
use crate::core::sandbox::ScriptSandbox;
use crate::core::traits::{CategoryRequest, Classifier, LedgerStore, RuleStore};
use crate::types::{CategoryAssignment, CategoryRule, Creator, PipelineError};

/// Which link of the chain produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    UserRules,
    SystemRules,
    Classifier,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::UserRules => "user rules",
            Stage::SystemRules => "system rules",
            Stage::Classifier => "classifier",
        }
    }
}

/// Resolves categories through the fallback chain
pub struct CategoryResolver {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn LedgerStore>,
    classifier: Option<Arc<dyn Classifier>>,
    assembler: RuleAssembler,
    sandbox: ScriptSandbox,
}

impl CategoryResolver {
    /// Create a resolver without an external classifier
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn LedgerStore>,
        sandbox: ScriptSandbox,
    ) -> Self {
        CategoryResolver {
            rules,
            ledger,
            classifier: None,
            assembler: RuleAssembler::new(),
            sandbox,
        }
    }

    /// Attach the last-resort classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Resolve a category for one transaction
    ///
    /// # Arguments
    ///
    /// * `request` - What the chain is told about the transaction
    ///
    /// # Returns
    ///
    /// * `Ok(Some(assignment))` with a name from the closed category set
    /// * `Ok(None)` if no stage produced a usable name
    /// * `Err(PipelineError)` only if the category set or the rules could not be read
    pub fn resolve(
        &self,
        request: &CategoryRequest,
    ) -> Result<Option<CategoryAssignment>, PipelineError> {
        let categories = self.ledger.category_names()?;
        if categories.is_empty() {
            debug!("category set is empty, skipping resolution");
            return Ok(None);
        }

        let category_rules = self.rules.category_rules()?;
        for (stage, creator) in [
            (Stage::UserRules, Creator::User),
            (Stage::SystemRules, Creator::System),
        ] {
            let fragments: Vec<&CategoryRule> = category_rules
                .iter()
                .filter(|rule| rule.creator == creator && rule.enabled)
                .collect();
            if fragments.is_empty() {
                continue;
            }

            let answer = self.run_fragments(&fragments, request);
            if let Some(found) = accept(stage, answer, &categories) {
                return Ok(Some(found));
            }
        }

        if let Some(classifier) = &self.classifier {
            let answer = match classifier.classify(request, &categories) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(error = %e, "classifier failed, leaving category empty");
                    None
                }
            };
            if let Some(found) = accept(Stage::Classifier, answer, &categories) {
                return Ok(Some(found));
            }
        }

        debug!(rule = %request.matched_rule_name, "no category resolved");
        Ok(None)
    }

    /// First non-empty answer from a stage's fragments
    ///
    /// Each fragment gets its own context, so one stopped by a runtime limit
    /// is skipped like one that throws.
    fn run_fragments(&self, fragments: &[&CategoryRule], request: &CategoryRequest) -> Option<String> {
        let input = script_input(request).to_string();
        fragments.iter().find_map(|fragment| {
            let script = self.assembler.assemble_category(std::slice::from_ref(fragment));
            let output = self.sandbox.evaluate(&script, &input);

            match serde_json::from_str::<Value>(output.trim()) {
                Ok(value) => value
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                Err(_) => {
                    debug!(fragment = %fragment.name, output = %output, "category fragment produced no result");
                    None
                }
            }
        })
    }
}

/// Inputs handed to category fragments through `data`
fn script_input(request: &CategoryRequest) -> Value {
    json!({
        "amount": request.amount.to_f64().unwrap_or(0.0),
        "type": request.direction.as_str(),
        "counterparty": request.counterparty,
        "itemDetail": request.item_detail,
        "timestamp": request.timestamp,
        "ruleName": request.matched_rule_name,
    })
}

fn accept(stage: Stage, answer: Option<String>, categories: &[String]) -> Option<CategoryAssignment> {
    let name = answer?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    if !categories.iter().any(|known| *known == name) {
        warn!(stage = stage.as_str(), category = %name, "category outside the known set, ignoring");
        return None;
    }
    debug!(stage = stage.as_str(), category = %name, "category resolved");
    Some(CategoryAssignment {
        category_name: name,
    })
}
