pub mod adapters;
pub mod app;
pub mod base64url;
pub mod config;
pub mod ports;
pub mod push;
pub mod state;
pub mod types;

use adapters::memory_queue::InMemoryDelayQueue;
use adapters::memory_store::InMemoryScheduleStore;
use adapters::{PushError, TokioTimeProvider, WebPushSender};
use push::{PushServices, QueueConsumer};
use types::push::VapidConfig;

pub use push::generate_vapid_credentials;

/// The process-local wiring: in-memory store and queue, HTTPS push transport,
/// tokio clock.
pub type LocalRuntime =
    PushServices<InMemoryScheduleStore, InMemoryDelayQueue, WebPushSender, TokioTimeProvider>;

pub fn local_runtime(
    config: &config::AppConfig,
    vapid: VapidConfig,
) -> Result<LocalRuntime, PushError> {
    Ok(PushServices::new(
        InMemoryScheduleStore::new(),
        InMemoryDelayQueue::new(config.retry_backoff),
        WebPushSender::new(vapid)?,
        TokioTimeProvider,
        config.utc_offset,
    ))
}

/// Starts the queue consumer and serves the dispatcher until the listener
/// fails.
pub async fn serve(config: config::AppConfig, vapid: VapidConfig) -> std::io::Result<()> {
    let runtime = local_runtime(&config, vapid).map_err(std::io::Error::other)?;
    let consumer = QueueConsumer::new(runtime.clone(), config.batch_size).spawn();

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    let result = axum::serve(listener, app::app(config, runtime)).await;
    consumer.abort();
    result
}
