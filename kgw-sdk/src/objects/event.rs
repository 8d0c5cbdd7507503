//! Kubernetes core `v1.Event`.

use super::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Reference to the object an event is about (`v1.ObjectReference`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A cluster lifecycle event.
///
/// The gateway only interprets `involved_object` and `reason`; everything
/// else (message, counts, timestamps, source) rides along in `extra` and is
/// forwarded verbatim in the build payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub involved_object: ObjectReference,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    /// Cache and queue key of this event.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Build type derived from the event: `<Kind>:<Reason>`.
    pub fn build_type(&self) -> String {
        format!("{}:{}", self.involved_object.kind, self.reason)
    }
}
