//! Dispatcher binary.

use tokio::sync::watch;
use tracing::{error, info, warn};

use vprompt_dispatcher::logging::init_tracing;
use vprompt_dispatcher::{metrics, Dispatcher, DispatcherConfig, ReclaimSweep};
use vprompt_storage::{BlobConfig, BlobStore};
use vprompt_store::{connect_shared_store, StoreConfig};
use vprompt_worker_client::{WorkerClient, WorkerClientConfig, WorkerRegistry};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting vprompt-dispatcher");

    let config = DispatcherConfig::from_env();
    info!("Dispatcher config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Metrics listener on port {}", port),
            Err(e) => warn!("Failed to start metrics listener: {}", e),
        }
    }

    let store_config = match StoreConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid store configuration: {}", e);
            std::process::exit(1);
        }
    };
    let store = match connect_shared_store(&store_config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open task store: {}", e);
            std::process::exit(1);
        }
    };

    let blobs = BlobStore::from_config(&BlobConfig::from_env());

    let worker_config = WorkerClientConfig::from_env();
    let registry = match WorkerRegistry::from_config(&worker_config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to load worker registry: {}", e);
            std::process::exit(1);
        }
    };
    let client = match WorkerClient::new(worker_config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create worker client: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reclaim_handle = match config.reclaim_after {
        Some(lease) => {
            let sweep = ReclaimSweep::new(store.clone(), lease, config.reclaim_interval);
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move { sweep.run(rx).await }))
        }
        None => {
            info!("Reclaim sweep is disabled");
            None
        }
    };

    // Setup signal handler
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    let dispatcher = Dispatcher::new(store, blobs, registry, client, config);
    if let Err(e) = dispatcher.run(shutdown_rx).await {
        error!("Dispatcher error: {}", e);
        std::process::exit(1);
    }

    if let Some(handle) = reclaim_handle {
        handle.await.ok();
    }

    info!("Dispatcher shutdown complete");
}
