//! Kubernetes core `v1.Secret`, used as the project and build record.

use super::meta::ObjectMeta;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A secret whose `data` values are base64-encoded on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub secret_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Decode a data entry. Returns `None` when the key is missing or not valid base64.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data
            .get(key)
            .and_then(|encoded| STANDARD.decode(encoded.as_bytes()).ok())
    }

    /// Decode a data entry as UTF-8 text.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|raw| String::from_utf8(raw).ok())
    }

    /// Encode and store a data entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<[u8]>) {
        self.data.insert(key.into(), STANDARD.encode(value.as_ref()));
    }
}
