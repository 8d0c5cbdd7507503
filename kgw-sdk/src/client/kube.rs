//! Typed client for the handful of core/v1 endpoints the gateway uses.

use reqwest::{Certificate, Client, Identity};
use std::time::Duration;
use url::Url;

use super::watch::WatchStream;
use super::{ClientError, ConnectionConfig, parse_response};
use crate::objects::{Event, ObjectList, Secret};

/// Server-side timeout requested for each watch call.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Typed HTTP client for the Kubernetes API server.
///
/// Holds two `reqwest` clients: one with the request timeout for ordinary
/// calls, and one without it for long-lived watch streams.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    watch_http: Client,
    base_url: Url,
    token: Option<String>,
}

impl KubeClient {
    /// Create a new `KubeClient` from resolved connection settings.
    pub fn new(config: &ConnectionConfig, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: Self::builder(config)?.timeout(timeout).build()?,
            watch_http: Self::builder(config)?.build()?,
            base_url: config.server.clone(),
            token: config.token.clone(),
        })
    }

    fn builder(config: &ConnectionConfig) -> Result<reqwest::ClientBuilder, ClientError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        if let Some(ca) = &config.ca_pem {
            for cert in Certificate::from_pem_bundle(ca)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(identity) = &config.identity_pem {
            builder = builder.identity(Identity::from_pem(identity)?);
        }
        Ok(builder)
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    ///
    /// Empty, `.` and `..` segments are refused so a missing name can never
    /// address the parent collection.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ClientError::Path(bad.to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Path(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET /api/v1/namespaces/{ns}/events` – list current events.
    pub async fn list_events(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList<Event>, ClientError> {
        let url = self.url(&["api", "v1", "namespaces", namespace, "events"])?;
        let mut request = self.http.get(url);
        if !label_selector.is_empty() {
            request = request.query(&[("labelSelector", label_selector)]);
        }
        let resp = self.authorize(request).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/namespaces/{ns}/events?watch=1` – stream changes after
    /// `resource_version`.
    pub async fn watch_events(
        &self,
        namespace: &str,
        label_selector: &str,
        resource_version: &str,
    ) -> Result<WatchStream, ClientError> {
        let url = self.url(&["api", "v1", "namespaces", namespace, "events"])?;
        let timeout = WATCH_TIMEOUT_SECS.to_string();
        let mut query = vec![
            ("watch", "1"),
            ("allowWatchBookmarks", "true"),
            ("timeoutSeconds", timeout.as_str()),
        ];
        if !resource_version.is_empty() {
            query.push(("resourceVersion", resource_version));
        }
        if !label_selector.is_empty() {
            query.push(("labelSelector", label_selector));
        }

        let resp = self
            .authorize(self.watch_http.get(url).query(&query))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(WatchStream::new(resp))
    }

    /// `GET /api/v1/namespaces/{ns}/secrets/{name}`.
    pub async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClientError> {
        let url = self.url(&["api", "v1", "namespaces", namespace, "secrets", name])?;
        let resp = self.authorize(self.http.get(url)).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/namespaces/{ns}/secrets`.
    pub async fn create_secret(
        &self,
        namespace: &str,
        secret: &Secret,
    ) -> Result<Secret, ClientError> {
        let url = self.url(&["api", "v1", "namespaces", namespace, "secrets"])?;
        let resp = self
            .authorize(self.http.post(url).json(secret))
            .send()
            .await?;
        parse_response(resp).await
    }
}
