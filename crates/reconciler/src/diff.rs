//! Structural diff of object bodies

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Remove,
    Update,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Add => "add",
            ChangeType::Remove => "remove",
            ChangeType::Update => "update",
        })
    }
}

/// One structural difference between two bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub change_type: ChangeType,
    pub path: Vec<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl ChangeEntry {
    /// Path segments joined with `/`.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".to_string(), Value::to_string);
        write!(
            f,
            "{} {}: {} -> {}",
            self.change_type,
            self.path_string(),
            render(&self.old_value),
            render(&self.new_value)
        )
    }
}

pub type ChangeSet = Vec<ChangeEntry>;

/// Compute the ordered change set turning `old` into `new`.
pub fn diff(old: &Value, new: &Value) -> ChangeSet {
    let mut changes = Vec::new();
    walk(&mut Vec::new(), old, new, &mut changes);
    changes
}

fn walk(path: &mut Vec<String>, old: &Value, new: &Value, out: &mut ChangeSet) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                path.push(key.clone());
                compare(path, a.get(key.as_str()), b.get(key.as_str()), out);
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                path.push(index.to_string());
                compare(path, a.get(index), b.get(index), out);
                path.pop();
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(entry(ChangeType::Update, path, Some(a), Some(b))),
    }
}

fn compare(path: &mut Vec<String>, old: Option<&Value>, new: Option<&Value>, out: &mut ChangeSet) {
    match (old, new) {
        (Some(a), Some(b)) => walk(path, a, b, out),
        (Some(a), None) => out.push(entry(ChangeType::Remove, path, Some(a), None)),
        (None, Some(b)) => out.push(entry(ChangeType::Add, path, None, Some(b))),
        (None, None) => {}
    }
}

fn entry(change_type: ChangeType, path: &[String], old: Option<&Value>, new: Option<&Value>) -> ChangeEntry {
    ChangeEntry {
        change_type,
        path: path.to_vec(),
        old_value: old.cloned(),
        new_value: new.cloned(),
    }
}
