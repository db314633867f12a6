use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contribution_reconciler::config::{ConfigError, ServiceConfig};
use contribution_reconciler::ingress::IngressListener;
use contribution_reconciler::queue::{QueueError, SpoolTaskQueue, TaskQueue};
use contribution_reconciler::server::{AppState, build_router};
use contribution_reconciler::store::{FileContributionStore, StoreError};

#[derive(Debug, Error)]
enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("task queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("contribution store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contribution_reconciler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match serve(ServiceConfig::from_env()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Service exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Result<ServiceConfig, ConfigError>) -> Result<(), ServiceError> {
    let config = config?;

    let queue = Arc::new(SpoolTaskQueue::open(&config.spool_dir)?);
    let recovered = queue.recover()?;
    let store = Arc::new(FileContributionStore::open(&config.store_path)?);
    info!(
        spool_dir = %config.spool_dir.display(),
        store_path = %config.store_path.display(),
        recovered,
        "Opened task spool and contribution store"
    );

    let listener = IngressListener::new(queue as Arc<dyn TaskQueue>);
    let app = build_router(AppState::new(listener, store, config.signal_secret));

    let tcp = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
