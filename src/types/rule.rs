//! Rule types
//!
//! Rules are data, not code: each one is a script body authored either by the
//! rule vendor (`system`) or by the user. They are immutable for the duration of
//! an evaluation.

use super::event::EventType;
use serde::{Deserialize, Serialize};

/// Who authored a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    /// Shipped with rule updates
    System,
    /// Written by the user
    User,
}

/// Extraction rule for one source application and event type
///
/// The script body must evaluate, as a function body, to an object exposing
/// `get(data)` that returns `{amount, type, ...}` or throws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,

    /// JavaScript function body
    #[serde(rename = "js")]
    pub script_body: String,

    /// Package/application identifier the rule applies to
    #[serde(alias = "app")]
    pub target_app: String,

    #[serde(alias = "type")]
    pub event_type: EventType,

    pub creator: Creator,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Category rule fragment
///
/// A fragment is a function body evaluated with the category parameters in
/// scope; it returns a category name (or `{category}`) to claim the
/// transaction, or nothing to pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRule {
    pub name: String,

    #[serde(rename = "js")]
    pub script_body: String,

    pub creator: Creator,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        script_body: impl Into<String>,
        target_app: impl Into<String>,
        event_type: EventType,
        creator: Creator,
    ) -> Self {
        Rule {
            name: name.into(),
            script_body: script_body.into(),
            target_app: target_app.into(),
            event_type,
            creator,
            enabled: true,
        }
    }

    /// Same rule with the enabled flag cleared
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, script_body: impl Into<String>, creator: Creator) -> Self {
        CategoryRule {
            name: name.into(),
            script_body: script_body.into(),
            creator,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_from_rule_book_shape() {
        let json = r#"{
            "name": "wechat_transfer",
            "js": "return { get(data) { return null; } };",
            "targetApp": "com.tencent.mm",
            "eventType": "notice",
            "creator": "system"
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.name, "wechat_transfer");
        assert_eq!(rule.target_app, "com.tencent.mm");
        assert_eq!(rule.event_type, EventType::Notice);
        assert_eq!(rule.creator, Creator::System);
        assert!(rule.enabled, "rules are enabled unless stated otherwise");
    }

    #[test]
    fn test_rule_accepts_short_field_aliases() {
        let json = r#"{"name":"r","js":"","app":"a","type":"sms","creator":"user","enabled":false}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.target_app, "a");
        assert_eq!(rule.event_type, EventType::Sms);
        assert!(!rule.enabled);
    }

    #[test]
    fn test_disabled_builders() {
        let rule = Rule::new("r", "", "app", EventType::App, Creator::User).disabled();
        assert!(!rule.enabled);
        let category_rule = CategoryRule::new("c", "", Creator::User).disabled();
        assert!(!category_rule.enabled);
    }
}
