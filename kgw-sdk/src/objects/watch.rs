//! Watch stream frames.

use super::event::Event;
use super::meta::{ObjectMeta, Status};
use serde::{Deserialize, Serialize};

/// Bookmark frames only carry a resource version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

/// One frame of a `?watch=1` response: `{"type": "...", "object": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent {
    Added(Event),
    Modified(Event),
    Deleted(Event),
    Bookmark(Bookmark),
    Error(Status),
}

impl WatchEvent {
    /// Resource version carried by the frame, if any.
    pub fn resource_version(&self) -> Option<&str> {
        let version = match self {
            WatchEvent::Added(e) | WatchEvent::Modified(e) | WatchEvent::Deleted(e) => {
                e.metadata.resource_version.as_str()
            }
            WatchEvent::Bookmark(b) => b.metadata.resource_version.as_str(),
            WatchEvent::Error(_) => return None,
        };
        (!version.is_empty()).then_some(version)
    }
}
