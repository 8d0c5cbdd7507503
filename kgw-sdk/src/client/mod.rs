//! Kubernetes REST client.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod kube;
mod kubeconfig;
mod watch;

pub use kube::KubeClient;
pub use kubeconfig::{ConnectionConfig, Kubeconfig, KubeconfigError, resolve_kubeconfig_path};
pub use watch::WatchStream;

use reqwest::StatusCode;

use crate::objects::Status;

/// Errors produced by the Kubernetes client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A namespace or name cannot be used as a path segment, or the base URL
    /// cannot take a path.
    #[error("invalid request path: {0:?}")]
    Path(String),

    /// Connection settings could not be turned into a client.
    #[error("invalid connection config: {0}")]
    Config(#[from] KubeconfigError),
}

impl ClientError {
    /// Whether the API server answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// The `metav1.Status` carried by an API error, if the body holds one.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Api { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
