//! Event source over the core/v1 events API.

use async_trait::async_trait;
use kgw_core::events::{WatchReceiver, watch_channel};
use kgw_core::{EventSource, SourceError};
use kgw_sdk::client::KubeClient;
use kgw_sdk::objects::{Event, ObjectList};
use tracing::debug;

/// Lists and watches events in one namespace.
pub struct KubeEventSource {
    client: KubeClient,
    namespace: String,
    label_selector: String,
}

impl KubeEventSource {
    pub fn new(client: KubeClient, namespace: &str, label_selector: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn list(&self) -> Result<ObjectList<Event>, SourceError> {
        self.client
            .list_events(&self.namespace, &self.label_selector)
            .await
            .map_err(|e| SourceError::List(e.to_string()))
    }

    /// Open a watch and forward its frames from a background task.
    ///
    /// The task ends when the stream ends, fails, or the receiver is dropped.
    async fn watch(&self, resource_version: &str) -> Result<WatchReceiver, SourceError> {
        let mut stream = self
            .client
            .watch_events(&self.namespace, &self.label_selector, resource_version)
            .await
            .map_err(|e| SourceError::Watch(e.to_string()))?;

        let (tx, rx) = watch_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = stream.next() => match next {
                        Ok(Some(frame)) => {
                            if tx.send(Ok(frame)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(SourceError::Watch(e.to_string()))).await;
                            break;
                        }
                    }
                }
            }
            debug!("Watch stream ended");
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgw_sdk::client::ConnectionConfig;
    use kgw_sdk::objects::WatchEvent;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn source(server: &MockServer) -> KubeEventSource {
        let config = ConnectionConfig::new(&server.uri()).unwrap();
        let client = KubeClient::new(&config, Duration::from_secs(5)).unwrap();
        KubeEventSource::new(client, "default", "")
    }

    #[tokio::test]
    async fn test_watch_forwards_frames_until_stream_ends() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"type":"ADDED","object":{"metadata":{"name":"a","namespace":"default","resourceVersion":"11"},"involvedObject":{"kind":"Pod"},"reason":"Started"}}"#,
            "\n",
            r#"{"type":"ERROR","object":{"code":410,"reason":"Expired","message":"too old"}}"#,
            "\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/events"))
            .and(query_param("watch", "1"))
            .and(query_param("resourceVersion", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut rx = source(&server).await.watch("10").await.unwrap();
        match rx.recv().await {
            Some(Ok(WatchEvent::Added(event))) => assert_eq!(event.key(), "default/a"),
            other => panic!("unexpected frame: {other:?}"),
        }
        match rx.recv().await {
            Some(Ok(WatchEvent::Error(status))) => assert_eq!(status.code, 410),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_list_failure_is_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/events"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = source(&server).await.list().await.unwrap_err();
        assert!(matches!(err, SourceError::List(_)));
    }
}
