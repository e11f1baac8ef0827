//! Exporter configuration
//!
//! Read once at startup from a YAML file and immutable afterwards.

use crate::error::{KoveError, Result};
use crate::resource::WatchedResource;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Kinds that churn constantly or are internal to the control plane.
pub const DEFAULT_IGNORE_KINDS: &[&str] = &[
    "apiservice",
    "endpoint",
    "endpoints",
    "event",
    "flowschema",
    "lease",
    "limitrange",
    "namespace",
    "prioritylevelconfiguration",
    "replicationcontroller",
    "runtimeclass",
];

/// Bookkeeping fields touched by resyncs and heartbeats.
pub const DEFAULT_IGNORE_PATHS: &[&str] = &[
    "metadata/resourceVersion",
    "metadata/managedFields/0/time",
    "status/observedGeneration",
];

pub const DEFAULT_QUERY: &str = "data.kove.violation";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KoveConfig {
    /// Restrict watching to one namespace; empty means all namespaces.
    #[serde(default)]
    pub namespace: String,
    /// Explicit resource kinds to watch. Empty means use discovery.
    #[serde(default)]
    pub objects: Vec<WatchedResource>,
    /// Policy source files or directories.
    #[serde(default)]
    pub policies: Vec<PathBuf>,
    #[serde(default = "default_query", alias = "regoQuery")]
    pub query: String,
    #[serde(default)]
    pub ignore_children: bool,
    #[serde(default = "default_ignore_kinds")]
    pub ignore_kinds: Vec<String>,
    /// Additional ignorable diff paths, relative to the object root.
    #[serde(default)]
    pub ignore_differing_paths: Vec<String>,
    /// Discovery snapshot used when `objects` is empty.
    #[serde(default)]
    pub discovery: Option<PathBuf>,
    /// Recorded watch events, `-` for stdin.
    #[serde(default = "default_watch")]
    pub watch: String,
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

fn default_ignore_kinds() -> Vec<String> {
    DEFAULT_IGNORE_KINDS.iter().map(|k| k.to_string()).collect()
}

fn default_watch() -> String {
    "-".to_string()
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Default for KoveConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            objects: Vec::new(),
            policies: Vec::new(),
            query: default_query(),
            ignore_children: false,
            ignore_kinds: default_ignore_kinds(),
            ignore_differing_paths: Vec::new(),
            discovery: None,
            watch: default_watch(),
            listen: default_listen(),
        }
    }
}

impl KoveConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| KoveError::InvalidConfig {
            reason: format!("unable to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.policies.is_empty() {
            return Err(KoveError::InvalidConfig {
                reason: "at least one policy source is required".to_string(),
            });
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|_| KoveError::InvalidConfig {
            reason: format!("invalid listen address '{}'", self.listen),
        })
    }

    /// Defaults followed by user additions, normalised to `a/b/c`.
    pub fn ignorable_paths(&self) -> Vec<String> {
        DEFAULT_IGNORE_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(
                self.ignore_differing_paths
                    .iter()
                    .map(|p| p.trim_matches('/').to_string()),
            )
            .collect()
    }

    /// Ignore-kind set, lower-cased.
    pub fn ignored_kinds(&self) -> Vec<String> {
        self.ignore_kinds.iter().map(|k| k.to_lowercase()).collect()
    }

    pub fn namespace_scope(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }
}
