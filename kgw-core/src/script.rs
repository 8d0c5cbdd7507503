//! Fetching the build script that is attached to each build request.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Default host serving raw repository files.
pub const DEFAULT_SCRIPT_BASE_URL: &str = "https://raw.githubusercontent.com";

/// File fetched from the repository root.
const SCRIPT_FILE: &str = "brigade.js";

/// Errors that can occur while fetching a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Any non-200 answer
    #[error("could not get {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("invalid script url: {0}")]
    Url(#[from] url::ParseError),
}

/// Source of enrichment scripts.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    /// Fetch the script for `repo` (e.g. `github.com/org/app`) at `reference`.
    async fn fetch(&self, repo: &str, reference: &str) -> Result<Vec<u8>, ScriptError>;
}

/// Fetches `brigade.js` from a raw-file host with a plain GET.
///
/// No retries or caching happen here; a failure is reported to the caller.
pub struct HttpScriptFetcher {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpScriptFetcher {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ScriptError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url,
        })
    }

    /// URL of the script for `repo` at `reference`.
    pub fn script_url(&self, repo: &str, reference: &str) -> Result<Url, ScriptError> {
        let repo = repo.strip_prefix("github.com/").unwrap_or(repo);
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{repo}/{reference}/{SCRIPT_FILE}"))?)
    }
}

#[async_trait]
impl ScriptFetcher for HttpScriptFetcher {
    async fn fetch(&self, repo: &str, reference: &str) -> Result<Vec<u8>, ScriptError> {
        let url = self.script_url(repo, reference)?;
        info!(%url, "Fetching script");

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScriptError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(base: &str) -> HttpScriptFetcher {
        HttpScriptFetcher::new(Url::parse(base).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_script_url() {
        let f = fetcher(DEFAULT_SCRIPT_BASE_URL);
        assert_eq!(
            f.script_url("github.com/Azure/brigade", "master").unwrap().as_str(),
            "https://raw.githubusercontent.com/Azure/brigade/master/brigade.js"
        );
        assert_eq!(
            f.script_url("Azure/brigade", "v1").unwrap().as_str(),
            "https://raw.githubusercontent.com/Azure/brigade/v1/brigade.js"
        );
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/app/master/brigade.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("events.on('exec', () => {})"))
            .expect(1)
            .mount(&server)
            .await;

        let script = fetcher(&server.uri())
            .fetch("github.com/org/app", "master")
            .await
            .unwrap();
        assert_eq!(script, b"events.on('exec', () => {})");
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/app/master/brigade.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(&server.uri())
            .fetch("github.com/org/app", "master")
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let f = HttpScriptFetcher::new(Url::parse(&server.uri()).unwrap(), Duration::from_millis(100))
            .unwrap();
        let err = f.fetch("org/app", "master").await.unwrap_err();
        assert!(matches!(err, ScriptError::Request(e) if e.is_timeout()));
    }
}
