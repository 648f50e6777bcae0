use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gsctl::config::AppConfig;
use gsctl::driver::{BollardDriver, ContainerDriver};
use gsctl::http::{self, AppState};
use gsctl::scheduler::Scheduler;
use gsctl::service::GameserverService;
use gsctl::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(
        "starting gsctl, binding {} (public address: {})",
        config.bind_addr(),
        config.public_addr
    );

    let store = Arc::new(Store::open(&config.database_path).context("opening persistent store")?);

    let driver: Arc<dyn ContainerDriver> = Arc::new(
        BollardDriver::connect(
            config.container_socket.as_deref(),
            config.container_stop_timeout.as_secs() as i64,
        )
        .context("connecting to the container runtime")?,
    );

    let service = Arc::new(GameserverService::new(
        store.clone(),
        driver,
        config.container_namespace.clone(),
    ));

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(service.clone());
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    let state = AppState { service, store };
    let app = http::build_router(state, config.container_stop_timeout);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .context("binding HTTP listener")?;
    tracing::info!("listening on http://{}", config.bind_addr());

    let shutdown_timeout = config.shutdown_timeout;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("draining in-flight requests (up to {:?})", shutdown_timeout);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(result)) => result.context("HTTP server error")?,
        Ok(Err(join_err)) => tracing::error!("HTTP server task panicked: {join_err}"),
        Err(_) => tracing::warn!(
            "graceful shutdown exceeded {:?}, forcing exit",
            shutdown_timeout
        ),
    }

    cancel.cancel();
    let _ = scheduler_handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::warn!("received SIGTERM, shutting down"),
    }
}
