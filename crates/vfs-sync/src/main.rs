use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vfs_sync::{
    Config, ConnectionState, DocumentContent, Store, StoreConfig, SyncMiddleware, SyncPhase,
    VfsService,
};
use vfs_sync_worker::{InProcessOptions, InProcessTransport, MemoryEngine};

/// Synced part of the demo store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counter {
    counter: i64,
    #[serde(default)]
    label: String,
}

type CounterStore = Store<Counter, CounterActions>;

struct CounterActions {
    increment: Arc<dyn Fn(&CounterStore) + Send + Sync>,
    reset: Arc<dyn Fn(&CounterStore) + Send + Sync>,
}

fn counter_actions() -> CounterActions {
    CounterActions {
        increment: Arc::new(|store: &CounterStore| store.update(|data| data.counter += 1)),
        reset: Arc::new(|store: &CounterStore| store.update(|data| data.counter = 0)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Starting vfs-sync demo");
    info!("  Manifest: {}", config.manifest_url);
    info!("  State file: {}", config.state_path);
    if let Some(server_url) = &config.server_url {
        info!("  Sync server: {}", server_url);
    }

    tokio::select! {
        result = run(&config) => result,
        _ = signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::new());
    let transport = Arc::new(InProcessTransport::with_options(
        engine.clone(),
        InProcessOptions {
            auto_initialized: config.auto_initialized,
        },
    ));
    let service = VfsService::new(transport.clone(), config.service_config());

    let _states = service.on_connection_state_change(|state: ConnectionState| {
        info!("Connection: {}", state);
    });
    service.on_watchers_reestablished(|report| {
        info!(
            "Watchers re-established: {} restored, {} failed",
            report.restored.len(),
            report.failed.len()
        );
    });

    service
        .initialize(&config.manifest_url, config.server_url.as_deref())
        .await
        .context("failed to initialize the VFS service")?;
    if service.is_offline() {
        warn!("Manifest could not be loaded, running offline");
    }

    let sync = SyncMiddleware::new(service.clone(), config.state_path.clone());
    let store = Store::new(
        StoreConfig::new(Counter::default(), counter_actions()).with_middleware(sync.clone()),
    );
    store.subscribe(|data: &Counter| info!("Counter is now {}", data.counter));

    tokio::time::timeout(Duration::from_secs(5), sync.wait_for_phase(SyncPhase::Watching))
        .await
        .context("store did not start watching its file")?;

    (store.actions().reset)(&store);
    for _ in 0..config.increments {
        (store.actions().increment)(&store);
    }
    store.update(|data| data.label = "demo".to_string());

    // Simulate the worker losing and regaining its relay link
    if let Some(host) = transport.host() {
        host.disconnect();
        host.reconnect();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A change made by another peer
    let remote = json!({ "counter": store.get().counter + 100, "label": "remote" });
    engine
        .apply_remote(&config.state_path, DocumentContent::json(remote))
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let counter = store.get();
    info!("Final store state: counter={} label={}", counter.counter, counter.label);
    let stored = service.read_file(&config.state_path).await?;
    info!("Stored file: {}", stored.content);

    let stats = service.stats();
    info!(
        "Operations: {} ({} errors, average latency {:?})",
        stats.total_operations, stats.total_errors, stats.average_latency
    );

    if let Some(path) = &config.export_bundle {
        let bundle = service.export_bundle().await?;
        tokio::fs::write(path, &bundle)
            .await
            .with_context(|| format!("failed to write bundle to {}", path.display()))?;
        info!("Exported bundle ({} bytes) to {}", bundle.len(), path.display());
    }

    drop(store);
    service.destroy().await;
    info!("Demo complete");
    Ok(())
}
