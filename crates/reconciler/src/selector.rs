//! Resource selection
//!
//! Decides once, before watching starts, which resource kinds get a watch.

use kove_core::{contains, ApiResource, KoveConfig, WatchedResource};
use std::collections::BTreeSet;
use tracing::{info, warn};
use watch_queue::ResourceDiscovery;

/// Verbs a user-managed, mutable resource is expected to support.
pub const WANTED_VERBS: &[&str] = &["create", "delete", "get", "list", "patch", "update", "watch"];

#[derive(Debug, Clone, Default)]
pub struct ResourceSelector {
    objects: Vec<WatchedResource>,
    ignore_kinds: Vec<String>,
    namespace_scope_required: bool,
}

impl ResourceSelector {
    pub fn new(
        objects: Vec<WatchedResource>,
        ignore_kinds: Vec<String>,
        namespace_scope_required: bool,
    ) -> Self {
        Self {
            objects,
            ignore_kinds: ignore_kinds.into_iter().map(|k| k.to_lowercase()).collect(),
            namespace_scope_required,
        }
    }

    pub fn from_config(config: &KoveConfig) -> Self {
        Self::new(
            config.objects.clone(),
            config.ignored_kinds(),
            config.namespace_scope().is_some(),
        )
    }

    /// The watch list: the explicit object list when configured, otherwise
    /// the important kinds of the discovery snapshot. Never fails; problems
    /// are logged and degrade to a smaller (possibly empty) list.
    pub fn select(&self, discovery: Option<&dyn ResourceDiscovery>) -> Vec<WatchedResource> {
        if !self.objects.is_empty() {
            if let Some(discovery) = discovery {
                for resource in &self.objects {
                    if let Err(err) = discovery.supports_version(&resource.group_version()) {
                        warn!(resource = %resource, error = %err, "unsupported object");
                    }
                }
            }
            let mut seen = BTreeSet::new();
            return self
                .objects
                .iter()
                .filter(|r| seen.insert((*r).clone()))
                .cloned()
                .collect();
        }

        let Some(discovery) = discovery else {
            warn!("no explicit objects and no discovery snapshot, nothing to watch");
            return Vec::new();
        };

        match discovery.list_resources() {
            Ok(resources) => {
                let selected: BTreeSet<WatchedResource> = resources
                    .iter()
                    .filter(|r| self.is_important(r))
                    .map(ApiResource::watched_resource)
                    .collect();
                info!(
                    discovered = resources.len(),
                    selected = selected.len(),
                    "resource kinds selected from discovery"
                );
                selected.into_iter().collect()
            }
            Err(err) => {
                warn!(error = %err, "unable to retrieve list of registered resources");
                Vec::new()
            }
        }
    }

    /// Single predicate for both cluster-wide and namespace-scoped watching.
    pub fn is_important(&self, resource: &ApiResource) -> bool {
        !resource.is_subresource()
            && !contains(&self.ignore_kinds, &resource.kind.to_lowercase())
            && WANTED_VERBS
                .iter()
                .all(|verb| contains(&resource.supported_verbs, verb))
            && (!self.namespace_scope_required || resource.namespaced)
    }
}
