//! # Kove CLI
//!
//! Offline versions of the exporter's decisions: evaluate one object, diff
//! two revisions of an object, and compute a watch list from a discovery
//! snapshot.

use anyhow::{bail, Context};
use kove_core::config::{DEFAULT_IGNORE_KINDS, DEFAULT_IGNORE_PATHS};
use kove_core::{ObjectRef, ViolationRecord, WatchedResource};
use kove_reconciler::{diff, ChangeEntry, ChangeFilter, ResourceSelector};
use policy_engine::{PolicyEngine, PolicyEvaluator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use watch_queue::StaticDiscovery;

/// Read an object body from a JSON or YAML file.
pub fn read_object(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("invalid object {}", path.display()))
}

/// Evaluate the object in `object` against `policies`.
pub fn evaluate(policies: &[PathBuf], query: &str, object: &Path) -> anyhow::Result<Vec<ViolationRecord>> {
    let input = read_object(object)?;
    let documents = PolicyEngine::new().evaluate(query, policies, &input)?;
    documents
        .iter()
        .map(|doc| ViolationRecord::from_document(doc).map_err(Into::into))
        .collect()
}

/// One diff entry and whether the change filter ignores it.
#[derive(Debug, Clone)]
pub struct DiffLine {
    pub entry: ChangeEntry,
    pub ignorable: bool,
}

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub lines: Vec<DiffLine>,
    pub legitimate: bool,
}

/// Diff two revisions of an object with the default ignorable paths plus
/// `extra_paths`.
pub fn diff_objects(old: &Path, new: &Path, extra_paths: &[String]) -> anyhow::Result<DiffReport> {
    let old = ObjectRef::from_value(read_object(old)?);
    let new = ObjectRef::from_value(read_object(new)?);
    let filter = ChangeFilter::new(
        DEFAULT_IGNORE_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(extra_paths.iter().map(|p| p.trim_matches('/').to_string()))
            .collect(),
    );

    let changes = diff(old.body(), new.body());
    Ok(DiffReport {
        legitimate: filter.legitimate_change(&changes),
        lines: changes
            .into_iter()
            .map(|entry| DiffLine {
                ignorable: filter.is_ignorable(&entry),
                entry,
            })
            .collect(),
    })
}

/// Parse `group/version/resource`, or `version/resource` for the core group.
pub fn parse_resource(raw: &str) -> anyhow::Result<WatchedResource> {
    match raw.split('/').collect::<Vec<_>>().as_slice() {
        [version, resource] => Ok(WatchedResource::new("", version, resource)),
        [group, version, resource] => Ok(WatchedResource::new(group, version, resource)),
        _ => bail!("expected group/version/resource, got '{}'", raw),
    }
}

/// The watch list the agent would use for this snapshot and settings.
pub fn select(
    discovery: &Path,
    namespace: Option<&str>,
    extra_ignore_kinds: &[String],
    objects: &[String],
) -> anyhow::Result<Vec<WatchedResource>> {
    let discovery = StaticDiscovery::from_file(discovery)?;
    let objects = objects
        .iter()
        .map(|o| parse_resource(o))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let ignore_kinds = DEFAULT_IGNORE_KINDS
        .iter()
        .map(|k| k.to_string())
        .chain(extra_ignore_kinds.iter().cloned())
        .collect();

    let selector = ResourceSelector::new(
        objects,
        ignore_kinds,
        namespace.is_some_and(|ns| !ns.is_empty()),
    );
    Ok(selector.select(Some(&discovery)))
}
