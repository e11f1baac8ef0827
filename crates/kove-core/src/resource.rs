//! Resource kinds and discovery entries

use serde::{Deserialize, Serialize};
use std::fmt;

/// A watchable resource kind, identified by group/version/resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchedResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl WatchedResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for WatchedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_version(), self.resource)
    }
}

/// One entry of a discovery snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. `deployments` or `deployments/status`.
    pub resource_name: String,
    #[serde(default)]
    pub namespaced: bool,
    #[serde(default)]
    pub supported_verbs: Vec<String>,
}

impl ApiResource {
    pub fn watched_resource(&self) -> WatchedResource {
        WatchedResource::new(&self.group, &self.version, &self.resource_name)
    }

    pub fn is_subresource(&self) -> bool {
        self.resource_name.contains('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_trims_core_group() {
        assert_eq!(WatchedResource::new("", "v1", "configmaps").to_string(), "v1/configmaps");
        assert_eq!(
            WatchedResource::new("apps", "v1", "deployments").to_string(),
            "apps/v1/deployments"
        );
    }
}
