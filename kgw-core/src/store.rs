//! Downstream project/build store capability.

use async_trait::async_trait;
use kgw_sdk::objects::{BuildRequest, Project};
use thiserror::Error;

/// Errors reported by a [`BuildStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// The backend is unreachable or refused the request.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("invalid stored record: {0}")]
    Decode(String),
}

/// Where projects are looked up and builds are submitted.
#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<Project, StoreError>;

    async fn create_build(&self, build: &BuildRequest) -> Result<(), StoreError>;
}
