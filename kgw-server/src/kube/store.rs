//! Project and build records stored as Kubernetes secrets.
//!
//! Projects are secrets named by the project ID with the repository in the
//! `repository` data key. Each build is a new secret `build-<id>` labelled
//! with its project, which downstream workers pick up.

use async_trait::async_trait;
use kgw_core::{BuildStore, StoreError};
use kgw_sdk::client::{ClientError, KubeClient};
use kgw_sdk::objects::{BuildRequest, Project, Repo, Secret};
use tracing::debug;
use uuid::Uuid;

const PROJECT_NAME_ANNOTATION: &str = "projectName";
const BUILD_SECRET_TYPE: &str = "brigade.sh/build";

/// Reads projects and creates builds in one namespace.
pub struct KubeStore {
    client: KubeClient,
    namespace: String,
}

impl KubeStore {
    pub fn new(client: KubeClient, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }
}

fn backend(e: ClientError) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Decode a project record.
fn project_from_secret(id: &str, secret: &Secret) -> Result<Project, StoreError> {
    let name = secret
        .metadata
        .extra
        .get("annotations")
        .and_then(|a| a.get(PROJECT_NAME_ANNOTATION))
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string();
    let repo_name = match secret.get_string("repository") {
        Some(repo) => repo,
        None if !name.is_empty() => name.clone(),
        None => {
            return Err(StoreError::Decode(format!(
                "project {id} has no repository"
            )));
        }
    };

    Ok(Project {
        id: id.to_string(),
        name,
        repo: Repo {
            name: repo_name,
            clone_url: secret.get_string("cloneURL").unwrap_or_default(),
        },
    })
}

/// Encode a build as a new secret with the given ID.
fn build_secret(build_id: &str, build: &BuildRequest) -> Secret {
    let mut secret = Secret {
        secret_type: BUILD_SECRET_TYPE.to_string(),
        ..Default::default()
    };
    secret.metadata.name = format!("build-{build_id}");
    for (label, value) in [
        ("heritage", "brigade"),
        ("component", "build"),
        ("project", build.project_id.as_str()),
        ("build", build_id),
    ] {
        secret
            .metadata
            .labels
            .insert(label.to_string(), value.to_string());
    }

    secret.insert("build_id", build_id);
    secret.insert("project_id", &build.project_id);
    secret.insert("event_type", &build.event_type);
    secret.insert("event_provider", &build.provider);
    secret.insert("commit_ref", &build.revision.reference);
    if !build.revision.commit.is_empty() {
        secret.insert("commit_id", &build.revision.commit);
    }
    secret.insert("payload", &build.payload);
    secret.insert("script", &build.script);
    secret
}

#[async_trait]
impl BuildStore for KubeStore {
    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        if id.is_empty() {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        }
        let secret = self
            .client
            .get_secret(&self.namespace, id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    StoreError::ProjectNotFound(id.to_string())
                } else {
                    backend(e)
                }
            })?;
        project_from_secret(id, &secret)
    }

    async fn create_build(&self, build: &BuildRequest) -> Result<(), StoreError> {
        let build_id = Uuid::now_v7().to_string();
        let secret = build_secret(&build_id, build);
        self.client
            .create_secret(&self.namespace, &secret)
            .await
            .map_err(backend)?;
        debug!(build = %build_id, secret = %secret.metadata.name, "Build secret created");
        Ok(())
    }
}
