//! Gateway processor.
//!
//! The Gateway is responsible for:
//! - Running a fixed pool of workers that pull keys from the queue
//! - Looking each key up in the local cache (a missing key is a no-op)
//! - Filtering the event against the configured rules
//! - Building a `BuildRequest` for accepted events, attaching the project's
//!   script, and submitting it to the store
//! - Retrying failed keys with backoff, and dropping them once the retry
//!   budget is spent
//!
//! A key is owned by one worker from `get` to `done`; per-item failures
//! never leave the worker except as queue transitions and drop reports.

use crate::cache::{EventLookup, LookupError};
use crate::events::{DroppedItem, DroppedItemSender};
use crate::filter::accept_event;
use crate::queue::RateLimitingQueue;
use crate::script::{ScriptError, ScriptFetcher};
use crate::store::{BuildStore, StoreError};
use kgw_sdk::config::GatewayConfig;
use kgw_sdk::objects::{BuildRequest, Event};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Failed attempts after which a key is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Branch the script is fetched from.
pub const DEFAULT_SCRIPT_REF: &str = "master";

/// Errors that fail a single sync attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cache lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("script fetch failed: {0}")]
    Script(#[from] ScriptError),
}

/// What a successful sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The event is no longer cached; nothing to do.
    Gone,
    /// The filter rejected the event.
    Rejected,
    /// A build was created.
    Dispatched { build_type: String },
}

/// Whether a build may be created without its script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptPolicy {
    /// A failed fetch fails the sync and goes through the retry policy.
    #[default]
    Required,
    /// A failed fetch is logged and the build is sent with an empty script.
    Optional,
}

/// Tunables for the Gateway.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Requeues allowed before a failing key is dropped.
    pub max_retries: u32,
    /// Reference the script is fetched at.
    pub script_ref: String,
    pub script_policy: ScriptPolicy,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            script_ref: DEFAULT_SCRIPT_REF.to_string(),
            script_policy: ScriptPolicy::default(),
        }
    }
}

/// Snapshot of the Gateway's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub processed: u64,
    pub gone: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub retried: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    gone: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Gateway turns queued event keys into builds.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cache: Arc<dyn EventLookup>,
    store: Arc<dyn BuildStore>,
    scripts: Arc<dyn ScriptFetcher>,
    queue: Arc<RateLimitingQueue<String>>,
    options: GatewayOptions,
    dropped_tx: Option<DroppedItemSender>,
    counters: Counters,
}

impl Gateway {
    /// Create a new Gateway.
    ///
    /// # Arguments
    ///
    /// * `config` - Project and filter rules, fixed for the Gateway's lifetime
    /// * `cache` - Lookup of the latest state of each event
    /// * `store` - Where projects are read and builds created
    /// * `scripts` - Source of the script attached to each build
    /// * `queue` - Work queue shared with the informer
    pub fn new(
        config: Arc<GatewayConfig>,
        cache: Arc<dyn EventLookup>,
        store: Arc<dyn BuildStore>,
        scripts: Arc<dyn ScriptFetcher>,
        queue: Arc<RateLimitingQueue<String>>,
    ) -> Self {
        Self {
            config,
            cache,
            store,
            scripts,
            queue,
            options: GatewayOptions::default(),
            dropped_tx: None,
            counters: Counters::default(),
        }
    }

    pub fn with_options(mut self, options: GatewayOptions) -> Self {
        self.options = options;
        self
    }

    /// Report dropped keys on `tx` in addition to logging them.
    pub fn with_drop_reporter(mut self, tx: DroppedItemSender) -> Self {
        self.dropped_tx = Some(tx);
        self
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            gone: self.counters.gone.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Run `num_workers` workers until shutdown is signaled.
    ///
    /// Workers start once `synced_rx` reports the cache as synced. On
    /// shutdown the queue is shut down and every worker is joined before
    /// this returns.
    pub async fn run(
        self: Arc<Self>,
        num_workers: usize,
        mut synced_rx: watch::Receiver<bool>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        if !wait_for_cache_sync(&mut synced_rx, &mut shutdown_rx).await {
            warn!("Stopped before caches synced");
            self.queue.shut_down();
            return;
        }

        let num_workers = num_workers.max(1);
        info!(workers = num_workers, "Gateway started");
        let mut workers = JoinSet::new();
        for id in 0..num_workers {
            let gateway = Arc::clone(&self);
            workers.spawn(async move { gateway.run_worker(id).await });
        }

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        info!("Gateway received shutdown signal");
        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        info!(stats = ?self.stats(), "Gateway shutdown complete");
    }

    async fn run_worker(&self, id: usize) {
        debug!(worker = id, "Worker started");
        while self.process_next_item().await {}
        debug!(worker = id, "Worker stopped");
    }

    /// Pull one key, sync it and settle it with the queue.
    ///
    /// Returns `false` once the queue has shut down.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let result = self.sync(&key).await;
        self.handle_result(&key, result);
        self.queue.done(&key);
        true
    }

    /// Reconcile one key against the current cache state.
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome, SyncError> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let Some(event) = self.cache.get_by_key(key)? else {
            info!(%key, "Key is gone");
            return Ok(SyncOutcome::Gone);
        };

        debug!(
            %key,
            kind = %event.involved_object.kind,
            reason = %event.reason,
            "Processing event"
        );
        if !accept_event(&self.config.filters, &event) {
            info!(%key, "Rejecting by filter");
            return Ok(SyncOutcome::Rejected);
        }

        self.dispatch(key, &event).await
    }

    async fn dispatch(&self, key: &str, event: &Event) -> Result<SyncOutcome, SyncError> {
        // A payload that fails to serialize is dropped, not the build.
        let payload = serde_json::to_vec(event).unwrap_or_else(|e| {
            warn!(%key, error = %e, "Failed to serialize event payload");
            Vec::new()
        });
        let mut build = BuildRequest::new(&self.config.project, event.build_type(), payload);

        let project = self.store.get_project(&self.config.project).await?;
        match self
            .scripts
            .fetch(&project.repo.name, &self.options.script_ref)
            .await
        {
            Ok(script) => build.script = script,
            Err(e) if self.options.script_policy == ScriptPolicy::Optional => {
                warn!(
                    %key,
                    repo = %project.repo.name,
                    error = %e,
                    "Script fetch failed, creating build without script"
                );
            }
            Err(e) => return Err(e.into()),
        }

        if let Ok(json) = serde_json::to_string_pretty(&build) {
            debug!(%key, "Build: {json}");
        }
        self.store.create_build(&build).await?;

        info!(
            %key,
            project = %build.project_id,
            build_type = %build.event_type,
            "Build created"
        );
        Ok(SyncOutcome::Dispatched {
            build_type: build.event_type,
        })
    }

    /// Apply the retry policy to the result of a sync.
    ///
    /// Success forgets the key's failure history. A failure is requeued with
    /// backoff while fewer than `max_retries` requeues have happened;
    /// otherwise the key is forgotten and reported as dropped.
    pub fn handle_result(&self, key: &str, result: Result<SyncOutcome, SyncError>) {
        let key = key.to_string();
        let error = match result {
            Ok(outcome) => {
                let counter = match outcome {
                    SyncOutcome::Gone => &self.counters.gone,
                    SyncOutcome::Rejected => &self.counters.rejected,
                    SyncOutcome::Dispatched { .. } => &self.counters.dispatched,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.queue.forget(&key);
                return;
            }
            Err(e) => e,
        };

        let requeues = self.queue.num_requeues(&key);
        if requeues < self.options.max_retries {
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            warn!(%key, error = %error, attempt = requeues + 1, "Retrying");
            self.queue.add_rate_limited(key);
            return;
        }

        self.queue.forget(&key);
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        error!(%key, error = %error, attempts = requeues + 1, "Dropping from queue");

        if let Some(tx) = &self.dropped_tx {
            let report = DroppedItem {
                key,
                attempts: requeues + 1,
                error: error.to_string(),
                dropped_at: time::OffsetDateTime::now_utc(),
            };
            if let Err(e) = tx.try_send(report) {
                warn!(error = %e, "Drop report discarded");
            }
        }
    }
}

/// Wait until the cache is synced. Returns `false` if shutdown came first or
/// the informer went away.
async fn wait_for_cache_sync(
    synced_rx: &mut watch::Receiver<bool>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *shutdown_rx.borrow() {
            return false;
        }
        if *synced_rx.borrow() {
            return true;
        }
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = synced_rx.changed() => {
                if changed.is_err() {
                    return *synced_rx.borrow();
                }
            }
        }
    }
}
