//! Update filtering
//!
//! Resyncs and heartbeats touch only bookkeeping fields. Re-evaluating on
//! those would repeat identical work and churn logs and metrics.

use crate::diff::{ChangeEntry, ChangeType};
use kove_core::{contains, KoveConfig};

#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    ignorable_paths: Vec<String>,
}

impl ChangeFilter {
    pub fn new(ignorable_paths: Vec<String>) -> Self {
        Self { ignorable_paths }
    }

    pub fn from_config(config: &KoveConfig) -> Self {
        Self::new(config.ignorable_paths())
    }

    pub fn ignorable_paths(&self) -> &[String] {
        &self.ignorable_paths
    }

    /// Only updates of ignorable paths are ignorable; additions and
    /// removals always count.
    pub fn is_ignorable(&self, change: &ChangeEntry) -> bool {
        change.change_type == ChangeType::Update
            && contains(&self.ignorable_paths, &change.path_string())
    }

    /// Whether a change set warrants re-evaluation: it must be non-empty and
    /// hold at least one entry that is not ignorable.
    pub fn legitimate_change(&self, changes: &[ChangeEntry]) -> bool {
        changes.iter().any(|change| !self.is_ignorable(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use kove_core::config::DEFAULT_IGNORE_PATHS;
    use kove_core::ObjectBuilder;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn filter() -> ChangeFilter {
        ChangeFilter::new(DEFAULT_IGNORE_PATHS.iter().map(|p| p.to_string()).collect())
    }

    fn body(name: &str, rv: &str) -> Value {
        ObjectBuilder::new("extensions/v1beta1", "deployment", "test", name)
            .resource_version(rv)
            .field("spec", json!("test"))
            .build()
            .body()
            .clone()
    }

    fn change(change_type: ChangeType, path: &str) -> ChangeEntry {
        ChangeEntry {
            change_type,
            path: path.split('/').map(str::to_string).collect(),
            old_value: None,
            new_value: None,
        }
    }

    #[test]
    fn test_legitimate_change() {
        let cases = [
            ("same resource", body("test", "1"), body("test", "1"), false),
            ("rename", body("test", "1"), body("test2", "2"), true),
            ("only resource version", body("test", "1"), body("test", "2"), false),
        ];

        for (name, old, new, want) in cases {
            assert_eq!(filter().legitimate_change(&diff(&old, &new)), want, "{}", name);
        }
    }

    #[test]
    fn test_all_default_paths_ignorable_together() {
        let changes = vec![
            change(ChangeType::Update, "metadata/resourceVersion"),
            change(ChangeType::Update, "metadata/managedFields/0/time"),
            change(ChangeType::Update, "status/observedGeneration"),
        ];
        assert!(!filter().legitimate_change(&changes));
        assert!(!filter().legitimate_change(&changes[..2]));
    }

    #[test]
    fn test_add_remove_on_ignorable_path_is_legitimate() {
        assert!(filter().legitimate_change(&[change(ChangeType::Add, "status/observedGeneration")]));
        assert!(filter().legitimate_change(&[change(ChangeType::Remove, "metadata/resourceVersion")]));
    }

    #[test]
    fn test_user_paths() {
        let mut paths: Vec<String> = DEFAULT_IGNORE_PATHS.iter().map(|p| p.to_string()).collect();
        paths.push("metadata/generation".to_string());
        let filter = ChangeFilter::new(paths);
        assert!(!filter.legitimate_change(&[change(ChangeType::Update, "metadata/generation")]));
    }

    fn ignorable_path() -> impl Strategy<Value = String> {
        prop::sample::select(DEFAULT_IGNORE_PATHS).prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_ignorable_updates_never_legitimate(paths in prop::collection::vec(ignorable_path(), 0..8)) {
            let changes: Vec<ChangeEntry> = paths
                .iter()
                .map(|p| change(ChangeType::Update, p))
                .collect();
            prop_assert!(!filter().legitimate_change(&changes));
        }

        #[test]
        fn prop_one_add_or_remove_makes_legitimate(
            paths in prop::collection::vec(ignorable_path(), 0..8),
            extra in ignorable_path(),
            add in any::<bool>(),
            position in 0usize..8,
        ) {
            let mut changes: Vec<ChangeEntry> = paths
                .iter()
                .map(|p| change(ChangeType::Update, p))
                .collect();
            let kind = if add { ChangeType::Add } else { ChangeType::Remove };
            changes.insert(position.min(changes.len()), change(kind, &extra));
            prop_assert!(filter().legitimate_change(&changes));
        }

        #[test]
        fn prop_non_ignorable_update_makes_legitimate(segment in "[a-z]{1,8}") {
            let changes = vec![
                change(ChangeType::Update, "metadata/resourceVersion"),
                change(ChangeType::Update, &format!("spec/{}", segment)),
            ];
            prop_assert!(filter().legitimate_change(&changes));
        }
    }
}
