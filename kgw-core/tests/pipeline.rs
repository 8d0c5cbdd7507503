//! End-to-end runs of the informer and gateway over in-memory capabilities.

use async_trait::async_trait;
use kgw_core::events::{WatchReceiver, WatchSender, dropped_item_channel, watch_channel};
use kgw_core::script::ScriptError;
use kgw_core::{
    BuildStore, EventCache, EventSource, Gateway, GatewayStats, Informer, RateLimitingQueue,
    ScriptFetcher, SourceError, StoreError,
};
use kgw_sdk::config::{FilterAction, FilterRule, GatewayConfig};
use kgw_sdk::objects::{BuildRequest, Event, ObjectList, Project, Repo, WatchEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

struct FakeSource {
    list: ObjectList<Event>,
    watches: Mutex<VecDeque<WatchReceiver>>,
    parked: Mutex<Vec<WatchSender>>,
}

impl FakeSource {
    /// A source listing `events` whose first watch is fed through the
    /// returned sender.
    fn new(events: Vec<Event>) -> (Self, WatchSender) {
        let (tx, rx) = watch_channel();
        let mut list = ObjectList::default();
        list.metadata.resource_version = "100".to_string();
        list.items = events;
        let source = Self {
            list,
            watches: Mutex::new(VecDeque::from([rx])),
            parked: Mutex::new(Vec::new()),
        };
        (source, tx)
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn list(&self) -> Result<ObjectList<Event>, SourceError> {
        Ok(self.list.clone())
    }

    async fn watch(&self, _resource_version: &str) -> Result<WatchReceiver, SourceError> {
        if let Some(rx) = self.watches.lock().unwrap().pop_front() {
            return Ok(rx);
        }
        // Later watches stay open and quiet.
        let (tx, rx) = watch_channel();
        self.parked.lock().unwrap().push(tx);
        Ok(rx)
    }
}

#[derive(Default)]
struct MemoryStore {
    builds: Mutex<Vec<BuildRequest>>,
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        if id != "brigade-demo" {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        }
        Ok(Project {
            id: id.to_string(),
            name: "org/demo".to_string(),
            repo: Repo {
                name: "github.com/org/demo".to_string(),
                clone_url: "https://github.com/org/demo.git".to_string(),
            },
        })
    }

    async fn create_build(&self, build: &BuildRequest) -> Result<(), StoreError> {
        self.builds.lock().unwrap().push(build.clone());
        Ok(())
    }
}

struct StaticScript;

#[async_trait]
impl ScriptFetcher for StaticScript {
    async fn fetch(&self, _repo: &str, _reference: &str) -> Result<Vec<u8>, ScriptError> {
        Ok(b"console.log('hello')".to_vec())
    }
}

fn event(name: &str, kind: &str, reason: &str) -> Event {
    let mut event = Event::default();
    event.metadata.name = name.to_string();
    event.metadata.namespace = "default".to_string();
    event.metadata.resource_version = "100".to_string();
    event.involved_object.kind = kind.to_string();
    event.involved_object.namespace = "default".to_string();
    event.reason = reason.to_string();
    event
}

fn config(project: &str) -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        project: project.to_string(),
        filters: vec![
            FilterRule {
                kind: "Pod".to_string(),
                reasons: vec!["Killing".to_string()],
                action: FilterAction::Reject,
                ..Default::default()
            },
            FilterRule {
                kind: "Pod".to_string(),
                action: FilterAction::Accept,
                ..Default::default()
            },
        ],
    })
}

async fn wait_for(gateway: &Gateway, done: impl Fn(GatewayStats) -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done(gateway.stats()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("gateway did not reach the expected state");
}

#[tokio::test]
async fn test_listed_and_watched_events_become_builds() {
    let (source, watch_tx) = FakeSource::new(vec![
        event("started", "Pod", "Started"),
        event("killing", "Pod", "Killing"),
        event("scaled", "Deployment", "ScalingReplicaSet"),
    ]);
    let cache = EventCache::new();
    let queue = Arc::new(RateLimitingQueue::with_default_limiter());
    let store = Arc::new(MemoryStore::default());

    let informer = Informer::new(Arc::new(source), cache.clone(), queue.clone());
    let synced_rx = informer.synced();
    let gateway = Arc::new(Gateway::new(
        config("brigade-demo"),
        Arc::new(cache.clone()),
        store.clone(),
        Arc::new(StaticScript),
        queue.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let informer_task = tokio::spawn(informer.run(shutdown_rx.clone()));
    let gateway_task = tokio::spawn(gateway.clone().run(2, synced_rx, shutdown_rx));

    wait_for(&gateway, |s| s.processed >= 3).await;

    let mut pulled = event("pulled", "Pod", "Pulled");
    pulled.metadata.resource_version = "101".to_string();
    watch_tx.send(Ok(WatchEvent::Added(pulled))).await.unwrap();
    // Updates to known events refresh the cache without queueing again.
    let mut restarted = event("started", "Pod", "Started");
    restarted.metadata.resource_version = "102".to_string();
    watch_tx.send(Ok(WatchEvent::Modified(restarted))).await.unwrap();

    wait_for(&gateway, |s| s.dispatched >= 2).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        informer_task.await.unwrap();
        gateway_task.await.unwrap();
    })
    .await
    .unwrap();

    let stats = gateway.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.dropped, 0);
    assert_eq!(cache.len(), 4);

    let mut types: Vec<_> = store
        .builds
        .lock()
        .unwrap()
        .iter()
        .map(|b| b.event_type.clone())
        .collect();
    types.sort();
    assert_eq!(types, ["Pod:Pulled", "Pod:Started"]);
    assert!(
        store
            .builds
            .lock()
            .unwrap()
            .iter()
            .all(|b| b.project_id == "brigade-demo" && b.script == b"console.log('hello')")
    );
}

#[tokio::test]
async fn test_persistent_failure_is_dropped_and_reported() {
    let (source, _watch_tx) = FakeSource::new(vec![event("started", "Pod", "Started")]);
    let cache = EventCache::new();
    let queue = Arc::new(RateLimitingQueue::with_default_limiter());
    let (dropped_tx, mut dropped_rx) = dropped_item_channel();

    let informer = Informer::new(Arc::new(source), cache.clone(), queue.clone());
    let synced_rx = informer.synced();
    let gateway = Arc::new(
        Gateway::new(
            config("brigade-unknown"),
            Arc::new(cache.clone()),
            Arc::new(MemoryStore::default()),
            Arc::new(StaticScript),
            queue.clone(),
        )
        .with_drop_reporter(dropped_tx),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let informer_task = tokio::spawn(informer.run(shutdown_rx.clone()));
    let gateway_task = tokio::spawn(gateway.clone().run(1, synced_rx, shutdown_rx));

    let dropped = tokio::time::timeout(Duration::from_secs(10), dropped_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dropped.key, "default/started");
    assert_eq!(dropped.attempts, 6);
    assert!(dropped.error.contains("brigade-unknown"));

    let stats = gateway.stats();
    assert_eq!(stats.processed, 6);
    assert_eq!(stats.retried, 5);
    assert_eq!(stats.dropped, 1);
    assert_eq!(queue.num_requeues(&"default/started".to_string()), 0);

    shutdown_tx.send(true).unwrap();
    informer_task.await.unwrap();
    gateway_task.await.unwrap();
}

#[tokio::test]
async fn test_deleted_event_is_gone_for_workers() {
    let (source, watch_tx) = FakeSource::new(Vec::new());
    let cache = EventCache::new();
    let queue = Arc::new(RateLimitingQueue::with_default_limiter());
    let store = Arc::new(MemoryStore::default());

    let informer = Informer::new(Arc::new(source), cache.clone(), queue.clone());
    let gateway = Gateway::new(
        config("brigade-demo"),
        Arc::new(cache.clone()),
        store.clone(),
        Arc::new(StaticScript),
        queue.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let informer_task = tokio::spawn(informer.run(shutdown_rx));

    let short = event("short-lived", "Pod", "Started");
    watch_tx.send(Ok(WatchEvent::Added(short.clone()))).await.unwrap();
    watch_tx.send(Ok(WatchEvent::Deleted(short))).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.is_empty() || !cache.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(gateway.process_next_item().await);
    assert_eq!(gateway.stats().gone, 1);
    assert!(store.builds.lock().unwrap().is_empty());

    shutdown_tx.send(true).unwrap();
    informer_task.await.unwrap();
}
