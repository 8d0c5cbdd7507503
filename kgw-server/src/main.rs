//! k8s-gateway
//!
//! Watches Kubernetes events in a namespace, filters them against the
//! configured rules and creates a build for each accepted event.

mod config;
mod kube;
mod shutdown;

use clap::Parser;
use config::ConfigLoader;
use kgw_core::events::{DroppedItemReceiver, dropped_item_channel};
use kgw_core::processors::{DEFAULT_MAX_RETRIES, DEFAULT_SCRIPT_REF};
use kgw_core::script::DEFAULT_SCRIPT_BASE_URL;
use kgw_core::{
    EventCache, Gateway, GatewayOptions, HttpScriptFetcher, Informer, RateLimitingQueue,
    ScriptPolicy,
};
use kgw_sdk::client::{ConnectionConfig, KubeClient, resolve_kubeconfig_path};
use kube::{KubeEventSource, KubeStore};
use shutdown::spawn_shutdown_handler;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// k8s-gateway - Kubernetes event gateway for Brigade
#[derive(Parser, Debug)]
#[command(name = "k8s-gateway")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the kubeconfig file. A `KUBECONFIG` list uses its first existing file
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<OsString>,

    /// Master URL, overrides the kubeconfig's server
    #[arg(long)]
    master: Option<String>,

    /// Kubernetes namespace to watch and to store builds in
    #[arg(long, env = "GATEWAY_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Path to the JSON configuration file. Without one every event is rejected
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Number of sync workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Retries before a failing event is dropped
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Base URL scripts are fetched from
    #[arg(long, default_value = DEFAULT_SCRIPT_BASE_URL)]
    script_base_url: Url,

    /// Git reference scripts are fetched at
    #[arg(long, default_value = DEFAULT_SCRIPT_REF)]
    script_ref: String,

    /// Create builds without a script when the fetch fails
    #[arg(long)]
    optional_script: bool,

    /// Timeout for API and script requests, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Only watch events matching this label selector
    #[arg(long, default_value = "")]
    label_selector: String,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting k8s-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ConfigLoader::new(args.config.as_deref())
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    let config = Arc::new(config);

    // Create the Kubernetes client
    let kubeconfig = args.kubeconfig.as_deref().and_then(resolve_kubeconfig_path);
    let connection = ConnectionConfig::from_flags(args.master.as_deref(), kubeconfig.as_deref())
        .map_err(|e| {
            tracing::error!("Failed to build Kubernetes connection: {}", e);
            e
        })?;
    let timeout = Duration::from_secs(args.request_timeout_secs);
    let client = KubeClient::new(&connection, timeout)?;
    tracing::info!(server = %connection.server, "Kubernetes client ready");

    let scripts = HttpScriptFetcher::new(args.script_base_url.clone(), timeout)?;

    // Wire the pipeline
    let cache = EventCache::new();
    let queue = Arc::new(RateLimitingQueue::with_default_limiter());
    let source = Arc::new(KubeEventSource::new(
        client.clone(),
        &args.namespace,
        &args.label_selector,
    ));
    let store = Arc::new(KubeStore::new(client, &args.namespace));

    let informer = Informer::new(source, cache.clone(), queue.clone());
    let synced_rx = informer.synced();

    let (dropped_tx, dropped_rx) = dropped_item_channel();
    let options = GatewayOptions {
        max_retries: args.max_retries,
        script_ref: args.script_ref.clone(),
        script_policy: if args.optional_script {
            ScriptPolicy::Optional
        } else {
            ScriptPolicy::Required
        },
    };
    let gateway = Arc::new(
        Gateway::new(config, Arc::new(cache), store, Arc::new(scripts), queue)
            .with_options(options)
            .with_drop_reporter(dropped_tx),
    );

    // Start tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_handle = spawn_shutdown_handler(shutdown_tx)?;
    let drop_logger = tokio::spawn(log_dropped(dropped_rx));

    tracing::info!(namespace = %args.namespace, "Listening for new events");
    let informer_handle = tokio::spawn(informer.run(shutdown_rx.clone()));
    gateway.clone().run(args.workers, synced_rx, shutdown_rx).await;

    if let Err(e) = informer_handle.await {
        tracing::error!("Informer task failed: {}", e);
    }
    signal_handle.abort();

    let stats = gateway.stats();
    drop(gateway);
    if let Err(e) = drop_logger.await {
        tracing::error!("Drop logger task failed: {}", e);
    }

    tracing::info!(
        processed = stats.processed,
        dispatched = stats.dispatched,
        rejected = stats.rejected,
        dropped = stats.dropped,
        "Gateway shutdown complete"
    );
    Ok(())
}

/// Log every dropped key until the gateway goes away.
async fn log_dropped(mut rx: DroppedItemReceiver) {
    while let Some(item) = rx.recv().await {
        tracing::warn!(
            key = %item.key,
            attempts = item.attempts,
            error = %item.error,
            dropped_at = %item.dropped_at,
            "Event dropped"
        );
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kgw_core=info,reqwest=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
