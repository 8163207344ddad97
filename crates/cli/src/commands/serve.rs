//! `threadsight serve`: wire the store, queue, pacer, breaker, client, and
//! worker together and run the Axum server until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use threadsight_core::Settings;
use threadsight_http::{AppState, create_router, metrics};
use threadsight_llm::{CircuitBreaker, GrokClient};
use threadsight_service::{PaceController, WorkQueue, Worker, WorkerConfig};
use threadsight_storage::{PgStorage, Store};

pub async fn run(host: &str, port: u16) -> Result<()> {
    let settings = Settings::from_env();
    metrics::init_metrics();

    let store = Arc::new(PgStorage::new(&settings.database_url).await?);
    let queue = Arc::new(WorkQueue::new(settings.max_queue_depth));
    let pacer = Arc::new(PaceController::new(
        settings.grok_rpm,
        settings.batch_min_size,
        settings.batch_max_size,
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        settings.grok_circuit_breaker_failures,
        settings.breaker_cooldown(),
    ));
    let llm = GrokClient::new(&settings, breaker)?;

    let worker = Worker::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&queue),
        pacer,
        llm,
        WorkerConfig::from_settings(&settings),
    );
    let worker_task = tokio::spawn(async move { worker.run().await });
    tracing::info!("analysis worker started");

    let state = Arc::new(AppState::new(store as Arc<dyn Store>, queue, settings));
    let router = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "threadsight API listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The worker parks on the queue between items; aborting there never
    // interrupts a store write. In-flight Grok calls are abandoned.
    worker_task.abort();
    let _ = worker_task.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
