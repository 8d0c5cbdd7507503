//! Build requests handed to the downstream project store.

use serde::{Deserialize, Serialize};

/// Provider tag identifying builds created by this gateway.
pub const PROVIDER: &str = "k8s-gateway";

/// Revision every gateway build runs against.
pub const DEFAULT_REVISION_REF: &str = "refs/heads/master";

/// VCS revision a build should run against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit: String,
    #[serde(rename = "ref", default)]
    pub reference: String,
}

/// A request to run a build for a project.
///
/// Constructed fresh for each accepted event and not retained after it has
/// been handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub project_id: String,
    /// `<Kind>:<Reason>` of the triggering event.
    #[serde(rename = "type")]
    pub event_type: String,
    pub provider: String,
    pub revision: Revision,
    /// The serialized triggering event.
    #[serde(with = "super::base64_bytes")]
    pub payload: Vec<u8>,
    /// Enrichment script; empty when none was fetched.
    #[serde(with = "super::base64_bytes")]
    pub script: Vec<u8>,
}

impl BuildRequest {
    /// Create a request with the gateway's provider tag and default revision.
    pub fn new(project_id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            project_id: project_id.into(),
            event_type: event_type.into(),
            provider: PROVIDER.to_string(),
            revision: Revision {
                commit: String::new(),
                reference: DEFAULT_REVISION_REF.to_string(),
            },
            payload,
            script: Vec::new(),
        }
    }
}
