//! Rule assembly
//!
//! Turns a list of rules into one executable script: the shared `common`
//! helper prelude, every enabled rule bound to its own name, and a driver that
//! runs the rules in stored order.
//!
//! # Extraction script layout
//!
//! ```text
//! const common = { ... };                     // helper prelude
//! const rule_0 = { name: "...", body: "..." }; // one binding per enabled rule
//! const rule_1 = { ... };
//! (driver)                                    // try each rule, print first hit
//! ```
//!
//! Rule bodies are embedded as string literals and compiled with
//! `new Function` inside the driver's `try`, so a rule with a syntax error
//! fails on its own turn instead of breaking the whole script. Runtime limits
//! abort the whole script, which is what `assemble_each` is for.

use crate::types::{CategoryRule, Rule};
use serde_json::Value;

/// Helper library available to every rule and category fragment as `common`
pub const PRELUDE: &str = r#"const common = Object.freeze({
  number(value) {
    if (typeof value === "number") return value;
    if (value === null || value === undefined) return NaN;
    const cleaned = String(value).replace(/[^0-9.\-]/g, "");
    return cleaned === "" ? NaN : parseFloat(cleaned);
  },
  match(text, pattern, group) {
    const found = new RegExp(pattern).exec(String(text));
    if (!found) return "";
    const value = found[group === undefined ? 1 : group];
    return value === undefined ? "" : value;
  },
  lines(text) {
    return String(text)
      .split(/\r?\n/)
      .map((line) => line.trim())
      .filter((line) => line.length > 0);
  },
  json(text) {
    try {
      return JSON.parse(text);
    } catch (e) {
      return null;
    }
  },
  clock(timestamp) {
    const date = new Date(Number(timestamp));
    if (isNaN(date.getTime())) return "";
    const pad = (n) => (n < 10 ? "0" + n : "" + n);
    return pad(date.getUTCHours()) + ":" + pad(date.getUTCMinutes());
  },
  isTimeInRange(min, max, time) {
    const minutes = (hhmm) => {
      const parts = String(hhmm).split(":");
      return Number(parts[0]) * 60 + Number(parts[1]);
    };
    const start = minutes(min);
    const end = minutes(max);
    const now = minutes(time);
    if (isNaN(start) || isNaN(end) || isNaN(now)) return false;
    return start <= end ? now >= start && now <= end : now >= start || now <= end;
  },
  categoryOf(claim) {
    if (typeof claim === "string") return claim.trim();
    if (claim && typeof claim.category === "string") return claim.category.trim();
    return "";
  },
});
"#;

const EXTRACTION_DRIVER: &str = r#"(function () {
  for (const entry of __rules) {
    try {
      const rule = new Function("common", entry.body)(common);
      if (!rule || typeof rule.get !== "function") continue;
      const result = rule.get(data);
      if (result === null || typeof result !== "object") continue;
      const amount = common.number(result.amount !== undefined ? result.amount : result.money);
      if (!(amount > 0)) continue;
      result.amount = amount;
      result.ruleName = entry.name;
      print(JSON.stringify(result));
      return;
    } catch (e) {
      // a failing rule hands over to the next one
    }
  }
})();
"#;

const CATEGORY_DRIVER: &str = r#"const __input = JSON.parse(data);
function __categorize(amount, type, counterparty, itemDetail, timestamp, ruleName) {
  const currentTime = common.clock(timestamp);
  for (const fragment of __fragments) {
    try {
      const claim = new Function(
        "amount", "type", "counterparty", "itemDetail", "timestamp", "ruleName",
        "money", "shopName", "shopItem", "currentTime", "common",
        fragment.body
      )(amount, type, counterparty, itemDetail, timestamp, ruleName,
        amount, counterparty, itemDetail, currentTime, common);
      const name = common.categoryOf(claim);
      if (name) return name;
    } catch (e) {
      // a failing fragment passes
    }
  }
  return null;
}
print(JSON.stringify({
  category: __categorize(
    __input.amount, __input.type, __input.counterparty,
    __input.itemDetail, __input.timestamp, __input.ruleName
  ),
}));
"#;

/// An assembled, ready-to-run script
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    source: String,
    rule_names: Vec<String>,
}

impl Script {
    /// Wrap hand-written source (no prelude, no driver)
    pub fn raw(source: impl Into<String>) -> Self {
        Script {
            source: source.into(),
            rule_names: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the rules the driver will try, in order
    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    pub fn is_empty(&self) -> bool {
        self.rule_names.is_empty()
    }
}

/// Builds extraction and category scripts from rule data
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleAssembler;

impl RuleAssembler {
    pub fn new() -> Self {
        RuleAssembler
    }

    /// Assemble the extraction script for a rule set
    ///
    /// Disabled rules are left out; the remaining rules keep their stored
    /// order, which is the order the driver tries them in.
    ///
    /// # Arguments
    ///
    /// * `rules` - Rules for one source application and event type
    ///
    /// # Returns
    ///
    /// A `Script` that prints the first positive-amount result as JSON, tagged
    /// with `ruleName`, and prints nothing when no rule matches.
    pub fn assemble(&self, rules: &[Rule]) -> Script {
        let enabled: Vec<&Rule> = rules.iter().filter(|rule| rule.enabled).collect();

        let mut source = String::from(PRELUDE);
        for (index, rule) in enabled.iter().enumerate() {
            source.push_str(&binding(index, &rule.name, &rule.script_body));
        }
        source.push_str(&rule_list(enabled.len(), "__rules"));
        source.push_str(EXTRACTION_DRIVER);

        Script {
            source,
            rule_names: enabled.iter().map(|rule| rule.name.clone()).collect(),
        }
    }

    /// Assemble one extraction script per enabled rule, in stored order
    ///
    /// Runtime-limit errors cannot be caught inside a script, so callers that
    /// must survive a runaway rule evaluate these one at a time, each in its
    /// own context.
    pub fn assemble_each(&self, rules: &[Rule]) -> Vec<Script> {
        rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| self.assemble(std::slice::from_ref(rule)))
            .collect()
    }

    /// Assemble a category script from category fragments
    ///
    /// The script reads its inputs as a JSON object from `data` and prints
    /// `{"category": name-or-null}`.
    pub fn assemble_category(&self, rules: &[&CategoryRule]) -> Script {
        let enabled: Vec<&&CategoryRule> = rules.iter().filter(|rule| rule.enabled).collect();

        let mut source = String::from(PRELUDE);
        for (index, rule) in enabled.iter().enumerate() {
            source.push_str(&binding(index, &rule.name, &rule.script_body));
        }
        source.push_str(&rule_list(enabled.len(), "__fragments"));
        source.push_str(CATEGORY_DRIVER);

        Script {
            source,
            rule_names: enabled.iter().map(|rule| rule.name.clone()).collect(),
        }
    }
}

fn binding(index: usize, name: &str, body: &str) -> String {
    format!(
        "const rule_{} = {{ name: {}, body: {} }};\n",
        index,
        js_string(name),
        js_string(body)
    )
}

fn rule_list(count: usize, list_name: &str) -> String {
    let names: Vec<String> = (0..count).map(|index| format!("rule_{}", index)).collect();
    format!("const {} = [{}];\n", list_name, names.join(", "))
}

/// JSON string literals are valid JavaScript string literals
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}
