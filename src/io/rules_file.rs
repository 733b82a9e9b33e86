//! Rule book loading
//!
//! A rule book is a JSON document carrying everything the pipeline needs
//! besides the events themselves:
//!
//! ```json
//! {
//!   "categories": ["Food", "Travel"],
//!   "rules": [{"name": "...", "js": "...", "app": "...", "type": "notice", "creator": "system"}],
//!   "categoryRules": [{"name": "...", "js": "...", "creator": "user"}]
//! }
//! ```
//!
//! Every key is optional. Rules keep the order they appear in.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::core::memory_store::{InMemoryLedgerStore, InMemoryRuleStore};
use crate::types::{CategoryRule, PipelineError, Rule};

/// Parsed rule book
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleBook {
    /// The closed category set
    pub categories: Vec<String>,
    /// Extraction rules, in evaluation order
    pub rules: Vec<Rule>,
    /// Category fragments, in evaluation order
    pub category_rules: Vec<CategoryRule>,
}

impl RuleBook {
    /// Parse a rule book from JSON text
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a rule book from disk
    ///
    /// # Errors
    ///
    /// * `FileNotFound` if the file does not exist
    /// * `IoError` if it cannot be read
    /// * `RuleBook` if it is not a valid rule book
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => PipelineError::from(e),
        })?;

        let book = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            categories = book.categories.len(),
            rules = book.rules.len(),
            category_rules = book.category_rules.len(),
            "rule book loaded"
        );
        Ok(book)
    }

    /// Seed a rule store from this book
    pub fn rule_store(&self) -> InMemoryRuleStore {
        let store = InMemoryRuleStore::new();
        for rule in &self.rules {
            store.add_rule(rule.clone());
        }
        for rule in &self.category_rules {
            store.add_category_rule(rule.clone());
        }
        store
    }

    /// Empty ledger carrying this book's category set
    pub fn ledger_store(&self) -> InMemoryLedgerStore {
        InMemoryLedgerStore::with_categories(self.categories.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{LedgerStore, RuleStore};
    use crate::types::{Creator, EventType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BOOK: &str = r#"{
        "categories": ["Food", "Travel"],
        "rules": [
            {"name": "n1", "js": "return {};", "app": "pay", "type": "notification", "creator": "system"},
            {"name": "n2", "js": "return {};", "targetApp": "pay", "eventType": "notice", "creator": "user", "enabled": false}
        ],
        "categoryRules": [
            {"name": "c1", "js": "return 'Food';", "creator": "user"}
        ]
    }"#;

    #[test]
    fn test_parse_rule_book() {
        let book = RuleBook::from_json(BOOK).unwrap();

        assert_eq!(book.categories, vec!["Food", "Travel"]);
        assert_eq!(book.rules.len(), 2);
        assert_eq!(book.rules[0].target_app, "pay");
        assert_eq!(book.rules[0].event_type, EventType::Notice);
        assert!(book.rules[0].enabled);
        assert_eq!(book.rules[1].creator, Creator::User);
        assert!(!book.rules[1].enabled);
        assert_eq!(book.category_rules[0].name, "c1");
    }

    #[test]
    fn test_stores_seeded_from_book() {
        let book = RuleBook::from_json(BOOK).unwrap();

        let rules = book.rule_store();
        let names: Vec<String> = rules
            .rules_for("pay", EventType::Notice)
            .unwrap()
            .into_iter()
            .map(|rule| rule.name)
            .collect();
        assert_eq!(names, vec!["n1", "n2"]);
        assert_eq!(rules.category_rules().unwrap().len(), 1);

        let ledger = book.ledger_store();
        assert_eq!(ledger.category_names().unwrap(), vec!["Food", "Travel"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_empty_object_is_an_empty_book() {
        assert_eq!(RuleBook::from_json("{}").unwrap(), RuleBook::default());
    }

    #[test]
    fn test_invalid_json_is_a_rule_book_error() {
        assert!(matches!(
            RuleBook::from_json("{\"rules\": [{}]}"),
            Err(PipelineError::RuleBook { .. })
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(BOOK.as_bytes()).unwrap();
        file.flush().unwrap();

        assert_eq!(RuleBook::load(file.path()).unwrap().rules.len(), 2);
        assert!(matches!(
            RuleBook::load(Path::new("missing-rules.json")),
            Err(PipelineError::FileNotFound { .. })
        ));
    }
}
