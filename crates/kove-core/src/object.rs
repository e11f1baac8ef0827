//! Dynamic object envelope
//!
//! Watched objects arrive as schema-less JSON. [`ObjectRef`] lifts the fixed
//! envelope fields out of the body once, and keeps the body itself untouched
//! for diffing and policy input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Back-link from a child object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

impl OwnerReference {
    fn from_map(map: &Map<String, Value>) -> Self {
        let field = |name: &str| {
            map.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            api_version: field("apiVersion"),
            kind: field("kind"),
            name: field("name"),
            uid: field("uid"),
        }
    }
}

/// Identity of one object: the label subset used for partial-match deletion
/// and the key tasks are serialized on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind.to_lowercase(), self.name)
        } else {
            write!(
                f,
                "{}/{}/{}",
                self.kind.to_lowercase(),
                self.namespace,
                self.name
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
    resource_version: String,
    owner_references: Vec<OwnerReference>,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    body: Value,
}

impl ObjectRef {
    /// Build an envelope from a raw object body. Missing envelope fields are
    /// left empty, in owner references too; only non-map owner entries are
    /// skipped.
    pub fn from_value(body: Value) -> Self {
        let metadata = body.get("metadata");
        let meta_str = |field: &str| {
            metadata
                .and_then(|m| m.get(field))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let meta_map = |field: &str| -> BTreeMap<String, String> {
            metadata
                .and_then(|m| m.get(field))
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default()
        };

        let owner_references = metadata
            .and_then(|m| m.get("ownerReferences"))
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(Value::as_object)
                    .map(OwnerReference::from_map)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_version: body
                .get("apiVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            kind: body
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            namespace: meta_str("namespace"),
            name: meta_str("name"),
            resource_version: meta_str("resourceVersion"),
            owner_references,
            annotations: meta_map("annotations"),
            labels: meta_map("labels"),
            body,
        }
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        &self.owner_references
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// The raw object, used as policy input and diff source.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn has_owner_references(&self) -> bool {
        !self.owner_references.is_empty()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl From<Value> for ObjectRef {
    fn from(body: Value) -> Self {
        Self::from_value(body)
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Builder for object bodies, mostly useful in tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct ObjectBuilder {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
    resource_version: String,
    owner_references: Vec<OwnerReference>,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    extra: Map<String, Value>,
}

impl ObjectBuilder {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn resource_version(mut self, version: &str) -> Self {
        self.resource_version = version.to_string();
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    /// Set a top-level field outside `metadata`, e.g. `spec`.
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> ObjectRef {
        let mut metadata = Map::new();
        metadata.insert("namespace".into(), Value::String(self.namespace));
        metadata.insert("name".into(), Value::String(self.name));
        metadata.insert(
            "resourceVersion".into(),
            Value::String(self.resource_version),
        );
        metadata.insert("annotations".into(), string_map(self.annotations));
        metadata.insert("labels".into(), string_map(self.labels));
        if !self.owner_references.is_empty() {
            let refs = self
                .owner_references
                .into_iter()
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect();
            metadata.insert("ownerReferences".into(), Value::Array(refs));
        }

        let mut body = Map::new();
        body.insert("apiVersion".into(), Value::String(self.api_version));
        body.insert("kind".into(), Value::String(self.kind));
        body.insert("metadata".into(), Value::Object(metadata));
        body.extend(self.extra);

        ObjectRef::from_value(Value::Object(body))
    }
}

fn string_map(map: BTreeMap<String, String>) -> Value {
    Value::Object(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}
