//! Child object suppression

use kove_core::ObjectRef;
use tracing::debug;

/// Skips objects owned by another object when `ignore_children` is set, so
/// fleets of generated children are not evaluated one by one.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipFilter {
    ignore_children: bool,
}

impl OwnershipFilter {
    pub fn new(ignore_children: bool) -> Self {
        Self { ignore_children }
    }

    pub fn suppresses(&self, obj: &ObjectRef) -> bool {
        if self.ignore_children && obj.has_owner_references() {
            debug!(object = %obj.key(), "ignoring child object");
            return true;
        }
        false
    }
}
