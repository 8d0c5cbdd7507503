use serde::{Deserialize, Serialize};

/// Source repository of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    /// Repository identity, e.g. `github.com/org/app`.
    pub name: String,
    #[serde(default, rename = "cloneURL", skip_serializing_if = "String::is_empty")]
    pub clone_url: String,
}

/// A project known to the downstream store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub repo: Repo,
}
