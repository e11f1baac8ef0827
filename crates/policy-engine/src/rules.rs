//! Policy documents, rules and conditions

use kove_core::ObjectRef;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;

static TRAILING_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)$").expect("static regex"));

/// One policy source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub package: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

fn default_rule_query() -> String {
    "violation".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    /// Query this rule answers.
    #[serde(default = "default_rule_query")]
    pub query: String,
    /// Reported rule set; the rule name when absent.
    #[serde(default)]
    pub ruleset: Option<String>,
    /// Reported data; a condition-specific detail when absent.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, rename = "match")]
    pub selector: RuleMatch,
    pub check: Condition,
}

/// Which objects a rule applies to. Empty lists match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub api_versions: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl RuleMatch {
    pub fn matches(&self, obj: &ObjectRef) -> bool {
        (self.kinds.is_empty() || self.kinds.iter().any(|k| k.eq_ignore_ascii_case(obj.kind())))
            && (self.api_versions.is_empty()
                || kove_core::contains(&self.api_versions, obj.api_version()))
            && (self.namespaces.is_empty() || kove_core::contains(&self.namespaces, obj.namespace()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    RequiredLabel { key: String },
    RequiredAnnotation { key: String },
    /// The trailing `X.Y.Z` of a label value must be at least `minimum`.
    LabelVersionAtLeast { key: String, minimum: String },
    /// `path` is a `/`-separated pointer into the object body.
    FieldEquals { path: String, value: Value },
    FieldAbsent { path: String },
}

impl Condition {
    /// Returns the violation detail when the object fails the condition.
    pub fn violation(&self, obj: &ObjectRef) -> Option<String> {
        match self {
            Condition::RequiredLabel { key } => {
                (!obj.labels().contains_key(key)).then(|| format!("missing label {}", key))
            }
            Condition::RequiredAnnotation { key } => (!obj.annotations().contains_key(key))
                .then(|| format!("missing annotation {}", key)),
            Condition::LabelVersionAtLeast { key, minimum } => {
                let Some(value) = obj.labels().get(key) else {
                    return Some(format!("missing label {}", key));
                };
                match (parse_version(value), parse_version(minimum)) {
                    (Some(found), Some(min)) if found >= min => None,
                    _ => Some(value.clone()),
                }
            }
            Condition::FieldEquals { path, value } => match obj.body().pointer(&pointer(path)) {
                Some(found) if found == value => None,
                Some(found) => Some(format!("{} is {}", path, found)),
                None => Some(format!("{} is missing", path)),
            },
            Condition::FieldAbsent { path } => obj
                .body()
                .pointer(&pointer(path))
                .map(|found| format!("{} is {}", path, found)),
        }
    }
}

impl PolicyRule {
    /// Evaluate the rule and render a violation document on failure.
    pub fn evaluate(&self, obj: &ObjectRef) -> Option<Value> {
        if !self.selector.matches(obj) {
            return None;
        }
        let detail = self.check.violation(obj)?;
        Some(json!({
            "Name": obj.name(),
            "Namespace": obj.namespace(),
            "Kind": obj.kind(),
            "ApiVersion": obj.api_version(),
            "RuleSet": self.ruleset.as_deref().unwrap_or(&self.name),
            "Data": self.data.clone().unwrap_or(detail),
        }))
    }
}

fn pointer(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn parse_version(value: &str) -> Option<(u64, u64, u64)> {
    let caps = TRAILING_VERSION.captures(value)?;
    let part = |i: usize| caps.get(i)?.as_str().parse::<u64>().ok();
    Some((part(1)?, part(2)?, part(3)?))
}
