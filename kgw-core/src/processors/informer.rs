//! Informer processor.
//!
//! The Informer is responsible for:
//! - Listing current events and replacing the local cache with them
//! - Watching for changes from the list's resource version
//! - Adding the key of every newly observed event to the work queue
//! - Relisting after a watch error or a failed list
//!
//! Only *new* keys are queued. An update to an event that is already cached
//! refreshes the cache; workers read the fresh state when they process the
//! key.

use crate::cache::EventCache;
use crate::queue::RateLimitingQueue;
use crate::source::{EventSource, SourceError};
use kgw_sdk::objects::{Event, WatchEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Pause before relisting after a failure.
const DEFAULT_RELIST_DELAY: Duration = Duration::from_secs(1);

enum WatchExit {
    Shutdown,
    Relist,
}

/// Keeps an [`EventCache`] in step with an [`EventSource`] and feeds the queue.
pub struct Informer {
    source: Arc<dyn EventSource>,
    cache: EventCache,
    queue: Arc<RateLimitingQueue<String>>,
    synced_tx: watch::Sender<bool>,
    relist_delay: Duration,
}

impl Informer {
    /// Create a new Informer.
    ///
    /// # Arguments
    ///
    /// * `source` - Where events are listed and watched
    /// * `cache` - Cache to keep up to date (shared with the workers)
    /// * `queue` - Queue receiving the keys of new events
    pub fn new(
        source: Arc<dyn EventSource>,
        cache: EventCache,
        queue: Arc<RateLimitingQueue<String>>,
    ) -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            source,
            cache,
            queue,
            synced_tx,
            relist_delay: DEFAULT_RELIST_DELAY,
        }
    }

    pub fn with_relist_delay(mut self, delay: Duration) -> Self {
        self.relist_delay = delay;
        self
    }

    /// Flips to `true` once the first list has populated the cache.
    pub fn synced(&self) -> watch::Receiver<bool> {
        self.synced_tx.subscribe()
    }

    /// Run the Informer until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Watching for new events");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let resource_version = match self.list_and_replace().await {
                Ok(version) => version,
                Err(e) => {
                    warn!(error = %e, "Failed to list events");
                    if self.pause(&mut shutdown_rx).await {
                        break;
                    }
                    continue;
                }
            };

            match self.watch(resource_version, &mut shutdown_rx).await {
                WatchExit::Shutdown => break,
                WatchExit::Relist => {
                    if self.pause(&mut shutdown_rx).await {
                        break;
                    }
                }
            }
        }

        info!("Informer shutdown complete");
    }

    /// List, replace the cache and queue unseen keys. Returns the list's
    /// resource version.
    async fn list_and_replace(&self) -> Result<String, SourceError> {
        let list = self.source.list().await?;
        let count = list.items.len();
        let added = self.cache.replace(list.items);
        for key in added {
            debug!(%key, "Adding to workqueue");
            self.queue.add(key);
        }
        self.synced_tx.send_replace(true);
        debug!(
            events = count,
            resource_version = %list.metadata.resource_version,
            "Cache replaced from list"
        );
        Ok(list.metadata.resource_version)
    }

    async fn watch(
        &self,
        mut resource_version: String,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> WatchExit {
        loop {
            let mut rx = match self.source.watch(&resource_version).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(error = %e, "Failed to start watch");
                    return WatchExit::Relist;
                }
            };

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return WatchExit::Shutdown;
                        }
                    }

                    item = rx.recv() => match item {
                        Some(Ok(WatchEvent::Error(status))) => {
                            warn!(%status, "Watch error, relisting");
                            return WatchExit::Relist;
                        }
                        Some(Ok(frame)) => {
                            if let Some(version) = frame.resource_version() {
                                resource_version = version.to_string();
                            }
                            self.apply(frame);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Watch failed, relisting");
                            return WatchExit::Relist;
                        }
                        None => break,
                    }
                }
            }

            debug!(%resource_version, "Watch closed, resuming");
        }
    }

    fn apply(&self, frame: WatchEvent) {
        match frame {
            WatchEvent::Added(event) | WatchEvent::Modified(event) => self.store(event),
            WatchEvent::Deleted(event) => {
                let key = event.key();
                debug!(%key, "Removing from cache");
                self.cache.remove(&key);
            }
            WatchEvent::Bookmark(_) | WatchEvent::Error(_) => {}
        }
    }

    fn store(&self, event: Event) {
        let key = event.key();
        if self.cache.upsert(event) {
            debug!(%key, "Adding to workqueue");
            self.queue.add(key);
        }
    }

    /// Sleep for the relist delay. Returns `true` if shutdown fired meanwhile.
    async fn pause(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
            _ = tokio::time::sleep(self.relist_delay) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EventLookup;
    use crate::events::{WatchSender, watch_channel};
    use async_trait::async_trait;
    use kgw_sdk::objects::{ListMeta, ObjectList, Status};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(name: &str, reason: &str, version: &str) -> Event {
        let mut event = Event::default();
        event.metadata.name = name.to_string();
        event.metadata.namespace = "default".to_string();
        event.metadata.resource_version = version.to_string();
        event.involved_object.kind = "Pod".to_string();
        event.reason = reason.to_string();
        event
    }

    fn list(version: &str, items: Vec<Event>) -> ObjectList<Event> {
        ObjectList {
            metadata: ListMeta {
                resource_version: version.to_string(),
                ..Default::default()
            },
            items,
        }
    }

    /// Scripted source: hands out queued list results and watch channels in order.
    #[derive(Default)]
    struct ScriptedSource {
        lists: Mutex<VecDeque<ObjectList<Event>>>,
        watches: Mutex<VecDeque<crate::events::WatchReceiver>>,
        list_calls: AtomicUsize,
        watch_versions: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn push_list(&self, l: ObjectList<Event>) {
            self.lists.lock().unwrap().push_back(l);
        }

        fn push_watch(&self) -> WatchSender {
            let (tx, rx) = watch_channel();
            self.watches.lock().unwrap().push_back(rx);
            tx
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn list(&self) -> Result<ObjectList<Event>, SourceError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.lists
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SourceError::List("no more lists".to_string()))
        }

        async fn watch(&self, resource_version: &str) -> Result<crate::events::WatchReceiver, SourceError> {
            self.watch_versions
                .lock()
                .unwrap()
                .push(resource_version.to_string());
            self.watches
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SourceError::Watch("no more watches".to_string()))
        }
    }

    async fn next_key(queue: &RateLimitingQueue<String>) -> String {
        let key = tokio::time::timeout(Duration::from_secs(5), queue.get())
            .await
            .unwrap()
            .unwrap();
        queue.done(&key);
        key
    }

    fn setup(source: Arc<ScriptedSource>) -> (Informer, EventCache, Arc<RateLimitingQueue<String>>) {
        let cache = EventCache::new();
        let queue = Arc::new(RateLimitingQueue::with_default_limiter());
        let informer = Informer::new(source, cache.clone(), queue.clone())
            .with_relist_delay(Duration::from_millis(10));
        (informer, cache, queue)
    }

    #[tokio::test]
    async fn test_initial_list_populates_cache_and_queue() {
        let source = Arc::new(ScriptedSource::default());
        source.push_list(list("10", vec![event("a", "Started", "9"), event("b", "Killing", "10")]));
        let _watch = source.push_watch();

        let (informer, cache, queue) = setup(source.clone());
        let mut synced = informer.synced();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));

        synced.wait_for(|s| *s).await.unwrap();
        assert_eq!(next_key(&queue).await, "default/a");
        assert_eq!(next_key(&queue).await, "default/b");
        assert_eq!(cache.len(), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(source.watch_versions.lock().unwrap().as_slice(), ["10"]);
    }

    #[tokio::test]
    async fn test_watch_frames_update_cache() {
        let source = Arc::new(ScriptedSource::default());
        source.push_list(list("10", vec![event("a", "Started", "9")]));
        let watch_tx = source.push_watch();

        let (informer, cache, queue) = setup(source.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));
        assert_eq!(next_key(&queue).await, "default/a");

        // Update of a known event refreshes the cache without queuing.
        watch_tx
            .send(Ok(WatchEvent::Modified(event("a", "Killing", "11"))))
            .await
            .unwrap();
        watch_tx
            .send(Ok(WatchEvent::Added(event("b", "Started", "12"))))
            .await
            .unwrap();
        assert_eq!(next_key(&queue).await, "default/b");
        assert_eq!(cache.get_by_key("default/a").unwrap().unwrap().reason, "Killing");

        watch_tx
            .send(Ok(WatchEvent::Deleted(event("b", "Started", "13"))))
            .await
            .unwrap();
        watch_tx
            .send(Ok(WatchEvent::Added(event("c", "Started", "14"))))
            .await
            .unwrap();
        assert_eq!(next_key(&queue).await, "default/c");
        assert!(cache.get_by_key("default/b").unwrap().is_none());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_error_triggers_relist() {
        let source = Arc::new(ScriptedSource::default());
        source.push_list(list("10", vec![event("a", "Started", "9")]));
        let first_watch = source.push_watch();
        source.push_list(list("20", vec![event("a", "Started", "9"), event("d", "Started", "19")]));
        let _second_watch = source.push_watch();

        let (informer, cache, queue) = setup(source.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));
        assert_eq!(next_key(&queue).await, "default/a");

        first_watch
            .send(Ok(WatchEvent::Error(Status {
                code: 410,
                reason: "Expired".to_string(),
                message: "too old resource version".to_string(),
            })))
            .await
            .unwrap();

        // Only the key that is new after the relist is queued.
        assert_eq!(next_key(&queue).await, "default/d");
        assert_eq!(source.list_calls(), 2);
        assert_eq!(cache.len(), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(source.watch_versions.lock().unwrap().as_slice(), ["10", "20"]);
    }

    #[tokio::test]
    async fn test_closed_watch_resumes_from_last_version() {
        let source = Arc::new(ScriptedSource::default());
        source.push_list(list("10", Vec::new()));
        let first_watch = source.push_watch();
        let _second_watch = source.push_watch();

        let (informer, _cache, queue) = setup(source.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));

        first_watch
            .send(Ok(WatchEvent::Added(event("a", "Started", "15"))))
            .await
            .unwrap();
        assert_eq!(next_key(&queue).await, "default/a");
        drop(first_watch);

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.watch_versions.lock().unwrap().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(source.watch_versions.lock().unwrap().as_slice(), ["10", "15"]);
        assert_eq!(source.list_calls(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_quiet_watch_timeout_resumes_without_relist() {
        let source = Arc::new(ScriptedSource::default());
        source.push_list(list("10", vec![event("a", "Started", "9")]));
        let first_watch = source.push_watch();
        let _second_watch = source.push_watch();

        let (informer, _cache, queue) = setup(source.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));
        assert_eq!(next_key(&queue).await, "default/a");

        // Server-side timeout with nothing to report.
        drop(first_watch);

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.watch_versions.lock().unwrap().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.watch_versions.lock().unwrap().as_slice(), ["10", "10"]);
        assert_eq!(source.list_calls(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_failure_retries_until_shutdown() {
        let source = Arc::new(ScriptedSource::default());
        let (informer, _cache, _queue) = setup(source.clone());
        let synced = informer.synced();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.list_calls() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!*synced.borrow());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
