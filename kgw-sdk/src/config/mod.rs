//! Gateway configuration file format.
//!
//! The file is JSON and is read once at startup by the server crate:
//!
//! ```json
//! {
//!   "project": "brigade-4625a05cf6914c556b4f3f6e5ab0f1dc3ab7b0a0",
//!   "filters": [
//!     {"kind": "Pod", "reasons": ["Killing"], "action": "reject"},
//!     {"kind": "Pod", "action": "accept"}
//!   ]
//! }
//! ```

mod filter;

pub use filter::{FilterAction, FilterRule};

use serde::{Deserialize, Deserializer, Serialize};

/// Root gateway configuration.
///
/// The default value (no project, no filters) rejects every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// ID of the project builds are created for.
    #[serde(default, deserialize_with = "null_as_default")]
    pub project: String,
    /// Rules evaluated in order against incoming events.
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<FilterRule>,
}

impl GatewayConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Read an explicit `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
