//! Violation records produced by policy evaluation

use crate::error::{KoveError, Result};
use crate::object::ObjectKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One offending rule instance for one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub api_version: String,
    pub rule_set: String,
    pub data: String,
}

impl ViolationRecord {
    /// Convert a raw violation document (`Name`, `Namespace`, `Kind`,
    /// `ApiVersion`, optional `RuleSet` and `Data`) as emitted by a policy.
    ///
    /// The four identity fields are mandatory; a document without them is a
    /// contract violation by the evaluator.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let required = |field: &str| {
            doc.get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| KoveError::MalformedViolation {
                    field: field.to_string(),
                })
        };
        let optional = |field: &str| {
            doc.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            name: required("Name")?,
            namespace: required("Namespace")?,
            kind: required("Kind")?,
            api_version: required("ApiVersion")?,
            rule_set: optional("RuleSet"),
            data: optional("Data"),
        })
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}
