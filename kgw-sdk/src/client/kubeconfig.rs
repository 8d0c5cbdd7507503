//! Connection settings: kubeconfig files and in-cluster service accounts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Where the service account token and CA are mounted inside a pod.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Errors that can occur while resolving connection settings.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse kubeconfig: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("kubeconfig has no current context")]
    NoCurrentContext,

    #[error("context {0:?} not found in kubeconfig")]
    MissingContext(String),

    #[error("cluster {0:?} not found in kubeconfig")]
    MissingCluster(String),

    #[error("user {0:?} not found in kubeconfig")]
    MissingUser(String),

    #[error("invalid server url: {0}")]
    InvalidServer(#[from] url::ParseError),

    #[error("invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("not running inside a cluster: KUBERNETES_SERVICE_HOST/PORT not set")]
    NotInCluster,

    #[error("client certificate and key must be given together")]
    IncompleteClientCert,
}

/// A parsed kubeconfig file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: String,
    /// Directory relative file references are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
    pub certificate_authority: Option<String>,
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    pub token: Option<String>,
    #[serde(rename = "tokenFile")]
    pub token_file: Option<String>,
    pub client_certificate: Option<String>,
    pub client_certificate_data: Option<String>,
    pub client_key: Option<String>,
    pub client_key_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Everything needed to open a connection to an API server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server: Url,
    /// PEM bundle of additional trusted roots.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM client certificate followed by its private key.
    pub identity_pem: Option<Vec<u8>>,
    pub token: Option<String>,
    pub insecure_skip_tls_verify: bool,
}

impl ConnectionConfig {
    /// A plain connection to `server` without credentials.
    pub fn new(server: &str) -> Result<Self, KubeconfigError> {
        Ok(Self {
            server: Url::parse(server)?,
            ca_pem: None,
            identity_pem: None,
            token: None,
            insecure_skip_tls_verify: false,
        })
    }

    /// Resolve settings the way `kubectl`-style tools do from their flags.
    ///
    /// With neither a master URL nor a kubeconfig the in-cluster service
    /// account is used. A master URL overrides the kubeconfig's server.
    pub fn from_flags(
        master: Option<&str>,
        kubeconfig: Option<&Path>,
    ) -> Result<Self, KubeconfigError> {
        let master = master.filter(|m| !m.is_empty());
        let kubeconfig = kubeconfig.filter(|p| !p.as_os_str().is_empty());

        match (master, kubeconfig) {
            (None, None) => Self::in_cluster(),
            (Some(master), None) => Self::new(master),
            (master, Some(path)) => {
                let mut config = Kubeconfig::load(path)?.connection(None)?;
                if let Some(master) = master {
                    config.server = Url::parse(master)?;
                }
                Ok(config)
            }
        }
    }

    /// Settings from the pod's mounted service account.
    pub fn in_cluster() -> Result<Self, KubeconfigError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| KubeconfigError::NotInCluster)?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").map_err(|_| KubeconfigError::NotInCluster)?;
        Self::in_cluster_from(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    fn in_cluster_from(host: &str, port: &str, dir: &Path) -> Result<Self, KubeconfigError> {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let mut config = Self::new(&format!("https://{host}:{port}"))?;
        let token = read_file(&dir.join("token"))?;
        config.token = Some(String::from_utf8_lossy(&token).trim().to_string());
        config.ca_pem = Some(read_file(&dir.join("ca.crt"))?);
        Ok(config)
    }
}

impl Kubeconfig {
    /// Parse kubeconfig YAML.
    pub fn from_yaml(raw: &str) -> Result<Self, KubeconfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Read and parse a kubeconfig file.
    pub fn load(path: &Path) -> Result<Self, KubeconfigError> {
        let raw = read_file(path)?;
        let mut config = Self::from_yaml(&String::from_utf8_lossy(&raw))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Connection settings for `context`, or the current context when `None`.
    pub fn connection(&self, context: Option<&str>) -> Result<ConnectionConfig, KubeconfigError> {
        let context_name = match context {
            Some(name) => name,
            None if self.current_context.is_empty() => return Err(KubeconfigError::NoCurrentContext),
            None => self.current_context.as_str(),
        };
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| KubeconfigError::MissingContext(context_name.to_string()))?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| KubeconfigError::MissingCluster(context.cluster.clone()))?;
        let user = if context.user.is_empty() {
            User::default()
        } else {
            self.users
                .iter()
                .find(|u| u.name == context.user)
                .map(|u| u.user.clone())
                .ok_or_else(|| KubeconfigError::MissingUser(context.user.clone()))?
        };

        let mut config = ConnectionConfig::new(&cluster.server)?;
        config.insecure_skip_tls_verify = cluster.insecure_skip_tls_verify;
        config.ca_pem = self.inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
        )?;

        config.token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => {
                let raw = read_file(&self.resolve(file))?;
                Some(String::from_utf8_lossy(&raw).trim().to_string())
            }
            (None, None) => None,
        };

        let cert = self.inline_or_file(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
        )?;
        let key = self.inline_or_file(user.client_key_data.as_deref(), user.client_key.as_deref())?;
        config.identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                if !cert.ends_with(b"\n") {
                    cert.push(b'\n');
                }
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => return Err(KubeconfigError::IncompleteClientCert),
        };

        Ok(config)
    }

    fn inline_or_file(
        &self,
        data: Option<&str>,
        file: Option<&str>,
    ) -> Result<Option<Vec<u8>>, KubeconfigError> {
        match (data, file) {
            (Some(data), _) => Ok(Some(STANDARD.decode(data.trim().as_bytes())?)),
            (None, Some(file)) => Ok(Some(read_file(&self.resolve(file))?)),
            (None, None) => Ok(None),
        }
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, KubeconfigError> {
    std::fs::read(path).map_err(|source| KubeconfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick the kubeconfig file from a `KUBECONFIG`-style path list.
///
/// The first entry that is an existing file wins. When none exists the first
/// non-empty entry is returned so that loading reports it. An empty list
/// yields `None`.
pub fn resolve_kubeconfig_path(list: &OsStr) -> Option<PathBuf> {
    let entries: Vec<PathBuf> = std::env::split_paths(list)
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    entries
        .iter()
        .find(|p| p.is_file())
        .or_else(|| entries.first())
        .cloned()
}
