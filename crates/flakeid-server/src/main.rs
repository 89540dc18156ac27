#![doc = include_str!("../README.md")]

mod server;

use std::sync::Arc;

use clap::Parser;
use flakeid::{
    FileCheckpointStore, IdService, SystemClock, ThreadRandom, WorkerIdAllocator,
};
use server::config::{CliArgs, ServerConfig, WorkerMode};
use server::http::router;
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;
    log_startup_info(&config);

    let listener = TcpListener::bind(&config.server_addr).await?;
    let allocator = build_allocator(&config).await?;
    let store = Arc::new(FileCheckpointStore::new(&config.checkpoint_path));

    let service = Arc::new(
        IdService::start(config.service, &allocator, store, SystemClock, ThreadRandom).await?,
    );
    tracing::info!(
        addr = %config.server_addr,
        worker_id = service.worker_id(),
        "serving ids"
    );

    let served = axum::serve(listener, router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // The router, and every clone of the service it held, is gone once
    // `serve` returns.
    match Arc::try_unwrap(service) {
        Ok(service) => service.shutdown().await?,
        Err(_) => tracing::error!("service still referenced at shutdown; skipping final checkpoint"),
    }

    served?;
    tracing::info!("Service shut down successfully");
    Ok(())
}

async fn build_allocator(config: &ServerConfig) -> anyhow::Result<WorkerIdAllocator> {
    match config.worker_mode {
        WorkerMode::Static => Ok(WorkerIdAllocator::fixed(config.worker_id)?),
        #[cfg(feature = "etcd")]
        WorkerMode::Etcd => {
            use flakeid::{CoordinatedAllocator, EtcdCoordinator};

            let coordinator =
                EtcdCoordinator::connect(&config.etcd_endpoints, config.etcd_lease_ttl, &config.retry)
                    .await?;
            let allocator = CoordinatedAllocator::new(
                Arc::new(coordinator),
                config.etcd_namespace.clone(),
                config.max_worker_id,
                config.retry,
            )?;
            Ok(WorkerIdAllocator::Coordinated(allocator))
        }
        #[cfg(not(feature = "etcd"))]
        WorkerMode::Etcd => anyhow::bail!("WORKER_MODE=etcd requires building with the `etcd` feature"),
    }
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting ID service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting ID service on {} in {:?} worker mode",
            config.server_addr,
            config.worker_mode
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
