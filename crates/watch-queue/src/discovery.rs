//! Resource discovery
//!
//! Discovery snapshots use the shape the API server returns for
//! `/apis/<group>/<version>`: a list of resource lists, each tagged with its
//! group version.

use kove_core::{ApiResource, KoveError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub trait ResourceDiscovery: Send + Sync {
    /// Every resource kind the server exposes.
    fn list_resources(&self) -> Result<Vec<ApiResource>>;

    /// Error when the server does not serve `group_version`.
    fn supports_version(&self, group_version: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    pub group_version: String,
    #[serde(default)]
    pub resources: Vec<ApiResourceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResourceEntry {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub namespaced: bool,
    #[serde(default)]
    pub verbs: Vec<String>,
}

impl ApiResourceList {
    fn split_group_version(&self) -> (&str, &str) {
        match self.group_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.group_version.as_str()),
        }
    }

    pub fn api_resources(&self) -> impl Iterator<Item = ApiResource> + '_ {
        let (group, version) = self.split_group_version();
        self.resources.iter().map(move |entry| ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            kind: entry.kind.clone(),
            resource_name: entry.name.clone(),
            namespaced: entry.namespaced,
            supported_verbs: entry.verbs.clone(),
        })
    }
}

/// Discovery answered from a recorded snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    lists: Vec<ApiResourceList>,
}

impl StaticDiscovery {
    pub fn new(lists: Vec<ApiResourceList>) -> Self {
        Self { lists }
    }

    /// Load a YAML or JSON snapshot.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| KoveError::DiscoveryError {
            reason: format!("unable to read {}: {}", path.display(), e),
        })?;
        let lists: Vec<ApiResourceList> =
            serde_yaml::from_str(&raw).map_err(|e| KoveError::DiscoveryError {
                reason: format!("invalid snapshot {}: {}", path.display(), e),
            })?;
        Ok(Self::new(lists))
    }
}

impl ResourceDiscovery for StaticDiscovery {
    fn list_resources(&self) -> Result<Vec<ApiResource>> {
        Ok(self.lists.iter().flat_map(|l| l.api_resources()).collect())
    }

    fn supports_version(&self, group_version: &str) -> Result<()> {
        if self.lists.iter().any(|l| l.group_version == group_version) {
            Ok(())
        } else {
            Err(KoveError::UnsupportedVersion {
                group_version: group_version.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
- groupVersion: v1
  resources:
    - name: configmaps
      kind: ConfigMap
      namespaced: true
      verbs: [create, delete, deletecollection, get, list, patch, update, watch]
- groupVersion: apps/v1
  resources:
    - name: deployments
      kind: Deployment
      namespaced: true
      verbs: [create, delete, get, list, patch, update, watch]
    - name: deployments/status
      kind: Deployment
      namespaced: true
      verbs: [get, patch, update]
"#;

    #[test]
    fn test_snapshot_flattening() {
        let lists: Vec<ApiResourceList> = serde_yaml::from_str(SNAPSHOT).unwrap();
        let discovery = StaticDiscovery::new(lists);
        let resources = discovery.list_resources().unwrap();

        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].group, "");
        assert_eq!(resources[0].version, "v1");
        assert_eq!(resources[1].group, "apps");
        assert_eq!(resources[1].watched_resource().to_string(), "apps/v1/deployments");
        assert!(resources[2].is_subresource());
    }

    #[test]
    fn test_supports_version() {
        let lists: Vec<ApiResourceList> = serde_yaml::from_str(SNAPSHOT).unwrap();
        let discovery = StaticDiscovery::new(lists);
        assert!(discovery.supports_version("apps/v1").is_ok());
        assert!(matches!(
            discovery.supports_version("extensions/v1beta1"),
            Err(KoveError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_missing_snapshot_is_a_discovery_error() {
        let err = StaticDiscovery::from_file("/nonexistent/discovery.yaml").unwrap_err();
        assert!(matches!(err, KoveError::DiscoveryError { .. }));
    }
}
