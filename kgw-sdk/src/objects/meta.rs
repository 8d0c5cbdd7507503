//! Kubernetes object metadata shared by every resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subset of `metav1.ObjectMeta` the gateway reads or writes.
///
/// Unknown fields are preserved in `extra` so that an object can be
/// re-serialized without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ObjectMeta {
    /// The `namespace/name` cache key, or just `name` for cluster-scoped objects.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

/// `metav1.ListMeta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, rename = "continue", skip_serializing_if = "String::is_empty")]
    pub continue_token: String,
}

/// A list response such as `EventList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        Self {
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

/// `metav1.Status`, returned on failed requests and in watch `ERROR` frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.code, self.reason, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_with_and_without_namespace() {
        let mut meta = ObjectMeta {
            name: "web-1.17a".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        assert_eq!(meta.key(), "default/web-1.17a");

        meta.namespace.clear();
        assert_eq!(meta.key(), "web-1.17a");
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let json = r#"{"name":"a","namespace":"b","creationTimestamp":"2024-01-01T00:00:00Z"}"#;
        let meta: ObjectMeta = serde_json::from_str(json).unwrap();
        assert_eq!(
            meta.extra.get("creationTimestamp").and_then(|v| v.as_str()),
            Some("2024-01-01T00:00:00Z")
        );
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["creationTimestamp"], "2024-01-01T00:00:00Z");
    }
}
