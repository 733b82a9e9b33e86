//! Transaction-related types for the capture pipeline
//!
//! This module defines the candidate produced by rule extraction, the category
//! assignment produced by the resolver, and the ledger record that is finally
//! stored and grouped.

use super::event::{RawEvent, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Ledger row identifier, assigned by the store on insert
///
/// `0` means "not stored yet".
pub type TransactionId = i64;

/// Group identifier
///
/// - `0`: not grouped yet
/// - equal to the row's own id: group head (or sole member)
/// - any other id: merged into the group headed by that row
pub type GroupId = i64;

/// Money flow direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money leaving the user
    Expense,
    /// Money arriving to the user
    Income,
    /// Money moving between the user's own assets
    Transfer,
}

impl Direction {
    /// Lenient parse used for script output
    ///
    /// Rule authors use several spellings (`Expend`, `expense`, `IncomeRefund`,
    /// `ExpendLending`...). Anything that does not start with `income` or
    /// `transfer` is an expense.
    pub fn from_script(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        if value.starts_with("income") {
            Direction::Income
        } else if value.starts_with("transfer") {
            Direction::Transfer
        } else {
            Direction::Expense
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Expense => "expense",
            Direction::Income => "income",
            Direction::Transfer => "transfer",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured candidate transaction produced by a matching rule
///
/// Only exists when the matched rule reported `amount > 0`; every other
/// script outcome is "no match".
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub amount: Decimal,
    pub direction: Direction,
    pub counterparty_from: String,
    pub counterparty_to: String,
    pub memo: String,
    pub item_detail: String,
    /// Payment channel reported by the rule, empty when the rule did not say
    pub channel: String,
    pub fee: Decimal,
    pub currency: String,
    /// Transaction time reported by the rule, if any
    pub time: Option<Timestamp>,
    pub matched_rule_name: String,
}

impl ExtractionResult {
    /// Parse the text printed by an assembled extraction script
    ///
    /// Returns `None` for anything that is not a JSON object with a positive
    /// numeric `amount` (or its `money` alias), which includes the failure
    /// messages the sandbox returns in place of output.
    pub fn from_script_output(output: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(output.trim()).ok()?;
        let object = value.as_object()?;

        let amount = field(object, &["amount", "money"]).and_then(decimal_from_json)?;
        if amount <= Decimal::ZERO {
            return None;
        }

        Some(ExtractionResult {
            amount,
            direction: Direction::from_script(&text(object, &["type", "direction"])),
            counterparty_from: text(object, &["counterpartyFrom", "accountNameFrom"]),
            counterparty_to: text(object, &["counterpartyTo", "accountNameTo"]),
            memo: text(object, &["memo", "shopName"]),
            item_detail: text(object, &["itemDetail", "shopItem"]),
            channel: text(object, &["channel"]),
            fee: field(object, &["fee"])
                .and_then(decimal_from_json)
                .unwrap_or(Decimal::ZERO),
            currency: text(object, &["currency"]),
            time: field(object, &["time"]).and_then(timestamp_from_json),
            matched_rule_name: text(object, &["ruleName", "matchedRuleName"]),
        })
    }
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

fn text(object: &Map<String, Value>, keys: &[&str]) -> String {
    match field(object, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().replace(',', ""),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

fn timestamp_from_json(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Category chosen for a transaction
///
/// The name always comes from the store's closed category set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAssignment {
    pub category_name: String,
}

/// Ledger record
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Decimal,
    pub direction: Direction,
    /// Payment channel, the source identity used for grouping
    pub channel: String,
    pub timestamp: Timestamp,
    pub counterparty_from: String,
    pub counterparty_to: String,
    pub memo: String,
    pub item_detail: String,
    /// Empty until the resolver assigns one
    pub category: String,
    pub group_id: GroupId,
    pub source_app: String,
    pub rule_name: String,
}

impl Transaction {
    /// Unsaved, ungrouped transaction with empty text fields
    pub fn new(
        amount: Decimal,
        direction: Direction,
        channel: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Transaction {
            id: 0,
            amount,
            direction,
            channel: channel.into(),
            timestamp,
            counterparty_from: String::new(),
            counterparty_to: String::new(),
            memo: String::new(),
            item_detail: String::new(),
            category: String::new(),
            group_id: 0,
            source_app: String::new(),
            rule_name: String::new(),
        }
    }

    /// Build the candidate ledger record for an extraction
    ///
    /// The rule's own time wins over the capture time, and a rule that does
    /// not name a channel gets the source application as channel.
    pub fn from_extraction(extraction: &ExtractionResult, event: &RawEvent) -> Self {
        let channel = if extraction.channel.is_empty() {
            event.source_app.clone()
        } else {
            extraction.channel.clone()
        };

        Transaction {
            id: 0,
            amount: extraction.amount,
            direction: extraction.direction,
            channel,
            timestamp: extraction.time.unwrap_or(event.captured_at),
            counterparty_from: extraction.counterparty_from.clone(),
            counterparty_to: extraction.counterparty_to.clone(),
            memo: extraction.memo.clone(),
            item_detail: extraction.item_detail.clone(),
            category: String::new(),
            group_id: 0,
            source_app: event.source_app.clone(),
            rule_name: extraction.matched_rule_name.clone(),
        }
    }

    pub fn with_item_detail(mut self, item_detail: impl Into<String>) -> Self {
        self.item_detail = item_detail.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id != 0
    }

    pub fn is_group_head(&self) -> bool {
        self.id != 0 && self.group_id == self.id
    }

    /// The other party, as seen by category rules
    ///
    /// Incoming money is described by who sent it, everything else by who
    /// received it; falls back to whichever side is filled.
    pub fn counterparty(&self) -> &str {
        let (primary, secondary) = match self.direction {
            Direction::Income => (&self.counterparty_from, &self.counterparty_to),
            Direction::Expense | Direction::Transfer => {
                (&self.counterparty_to, &self.counterparty_from)
            }
        };
        if primary.is_empty() {
            secondary
        } else {
            primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use rstest::rstest;

    #[rstest]
    #[case::expend("Expend", Direction::Expense)]
    #[case::expense("expense", Direction::Expense)]
    #[case::income("Income", Direction::Income)]
    #[case::income_refund("IncomeRefund", Direction::Income)]
    #[case::expend_lending("ExpendLending", Direction::Expense)]
    #[case::transfer("TRANSFER", Direction::Transfer)]
    #[case::unknown("gift", Direction::Expense)]
    fn test_direction_from_script(#[case] input: &str, #[case] expected: Direction) {
        assert_eq!(Direction::from_script(input), expected);
    }

    #[test]
    fn test_parse_full_script_output() {
        let output = r#"{"amount":12.5,"type":"Expend","counterpartyFrom":"Balance",
            "counterpartyTo":"Coffee Shop","memo":"latte","itemDetail":"2 cups",
            "channel":"wechat[pay]","fee":0.1,"currency":"CNY","time":1700000000000,
            "ruleName":"wechat_pay"}"#;

        let result = ExtractionResult::from_script_output(output).unwrap();
        assert_eq!(result.amount, Decimal::new(125, 1));
        assert_eq!(result.direction, Direction::Expense);
        assert_eq!(result.counterparty_from, "Balance");
        assert_eq!(result.counterparty_to, "Coffee Shop");
        assert_eq!(result.memo, "latte");
        assert_eq!(result.item_detail, "2 cups");
        assert_eq!(result.channel, "wechat[pay]");
        assert_eq!(result.fee, Decimal::new(1, 1));
        assert_eq!(result.time, Some(1_700_000_000_000));
        assert_eq!(result.matched_rule_name, "wechat_pay");
    }

    #[test]
    fn test_parse_accepts_legacy_field_names() {
        let output = r#"{"money":"1,024.00","type":"Income","shopName":"Boss",
            "shopItem":"salary","accountNameFrom":"Employer","accountNameTo":"Card"}"#;

        let result = ExtractionResult::from_script_output(output).unwrap();
        assert_eq!(result.amount, Decimal::new(102400, 2));
        assert_eq!(result.direction, Direction::Income);
        assert_eq!(result.memo, "Boss");
        assert_eq!(result.item_detail, "salary");
        assert_eq!(result.counterparty_from, "Employer");
        assert_eq!(result.counterparty_to, "Card");
    }

    #[rstest]
    #[case::zero_amount(r#"{"amount":0}"#)]
    #[case::negative_amount(r#"{"amount":-3}"#)]
    #[case::missing_amount(r#"{"type":"Expend"}"#)]
    #[case::null_amount(r#"{"amount":null}"#)]
    #[case::garbage_amount(r#"{"amount":"lots"}"#)]
    #[case::not_json("ReferenceError: foo is not defined")]
    #[case::empty("")]
    #[case::array("[1,2,3]")]
    fn test_unusable_output_is_no_match(#[case] output: &str) {
        assert!(ExtractionResult::from_script_output(output).is_none());
    }

    #[test]
    fn test_from_extraction_defaults_channel_and_time() {
        let extraction = ExtractionResult::from_script_output(r#"{"amount":10}"#).unwrap();
        let event = RawEvent::new("com.eg.android.AlipayGphone", EventType::Notice, "", 5_000);

        let tx = Transaction::from_extraction(&extraction, &event);
        assert_eq!(tx.channel, "com.eg.android.AlipayGphone");
        assert_eq!(tx.timestamp, 5_000);
        assert_eq!(tx.id, 0);
        assert_eq!(tx.group_id, 0);
        assert!(tx.category.is_empty());
    }

    #[test]
    fn test_from_extraction_prefers_rule_channel_and_time() {
        let extraction =
            ExtractionResult::from_script_output(r#"{"amount":10,"channel":"card","time":42}"#)
                .unwrap();
        let event = RawEvent::new("bank", EventType::Sms, "", 5_000);

        let tx = Transaction::from_extraction(&extraction, &event);
        assert_eq!(tx.channel, "card");
        assert_eq!(tx.timestamp, 42);
    }

    #[rstest]
    #[case::expense_uses_receiver(Direction::Expense, "me", "shop", "shop")]
    #[case::income_uses_sender(Direction::Income, "boss", "me", "boss")]
    #[case::falls_back_when_empty(Direction::Expense, "me", "", "me")]
    fn test_counterparty(
        #[case] direction: Direction,
        #[case] from: &str,
        #[case] to: &str,
        #[case] expected: &str,
    ) {
        let mut tx = Transaction::new(Decimal::ONE, direction, "c", 0);
        tx.counterparty_from = from.to_string();
        tx.counterparty_to = to.to_string();
        assert_eq!(tx.counterparty(), expected);
    }

    #[test]
    fn test_group_head_flags() {
        let mut tx = Transaction::new(Decimal::ONE, Direction::Expense, "c", 0);
        assert!(!tx.is_grouped());
        assert!(!tx.is_group_head());

        tx.id = 7;
        tx.group_id = 7;
        assert!(tx.is_group_head());

        tx.group_id = 3;
        assert!(tx.is_grouped());
        assert!(!tx.is_group_head());
    }
}
