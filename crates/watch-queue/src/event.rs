//! Watch notifications

use kove_core::{ObjectRef, WatchedResource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added {
        resource: WatchedResource,
        object: ObjectRef,
    },
    Modified {
        resource: WatchedResource,
        old: ObjectRef,
        new: ObjectRef,
    },
    Deleted {
        resource: WatchedResource,
        object: ObjectRef,
    },
}

impl WatchEvent {
    pub fn resource(&self) -> &WatchedResource {
        match self {
            WatchEvent::Added { resource, .. }
            | WatchEvent::Modified { resource, .. }
            | WatchEvent::Deleted { resource, .. } => resource,
        }
    }

    /// The current object: the new copy for modifications.
    pub fn object(&self) -> &ObjectRef {
        match self {
            WatchEvent::Added { object, .. } | WatchEvent::Deleted { object, .. } => object,
            WatchEvent::Modified { new, .. } => new,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            WatchEvent::Added { .. } => EventType::Added,
            WatchEvent::Modified { .. } => EventType::Modified,
            WatchEvent::Deleted { .. } => EventType::Deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// One line of a recorded watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource: WatchedResource,
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<Value>,
}

impl From<&WatchEvent> for RawWatchEvent {
    fn from(event: &WatchEvent) -> Self {
        let old_object = match event {
            WatchEvent::Modified { old, .. } => Some(old.body().clone()),
            _ => None,
        };
        Self {
            event_type: event.event_type(),
            resource: event.resource().clone(),
            object: event.object().body().clone(),
            old_object,
        }
    }
}
