//! Filter rules applied to incoming events.

use serde::{Deserialize, Serialize};

/// What to do with an event that matches a rule.
///
/// Anything other than `accept` or `reject` is kept as `Unknown` and behaves
/// like a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterAction {
    Accept,
    Reject,
    Unknown(String),
}

impl FilterAction {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterAction::Accept)
    }
}

impl Default for FilterAction {
    /// A rule without an action is treated as unknown.
    fn default() -> Self {
        FilterAction::Unknown(String::new())
    }
}

impl From<String> for FilterAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "accept" => FilterAction::Accept,
            "reject" => FilterAction::Reject,
            _ => FilterAction::Unknown(value),
        }
    }
}

impl From<FilterAction> for String {
    fn from(value: FilterAction) -> Self {
        match value {
            FilterAction::Accept => "accept".to_string(),
            FilterAction::Reject => "reject".to_string(),
            FilterAction::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for FilterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterAction::Accept => f.write_str("accept"),
            FilterAction::Reject => f.write_str("reject"),
            FilterAction::Unknown(other) => write!(f, "{other:?}"),
        }
    }
}

/// A single accept/reject rule.
///
/// Empty `namespace`, `kind` or `reasons` act as wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Namespace of the involved object.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub namespace: String,
    /// Kind of the involved object, e.g. `Pod` or `Node`.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub kind: String,
    /// Event reasons, evaluated first to last.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub reasons: Vec<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub action: FilterAction,
}
