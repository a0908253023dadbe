pub mod consumer;
pub mod ece;
pub mod schedule;
pub mod vapid;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use time::UtcOffset;

use crate::ports::{self, DelayQueue, ScheduleStore, TimeProvider};
use crate::types::push::{DeliveryMessage, ScheduleToken, SubscriptionId};

pub use consumer::{Disposition, QueueConsumer};
pub use schedule::TokenMinter;
pub use vapid::{VapidConfigStatus, generate_vapid_credentials, load_vapid_config};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule store failed: {0}")]
    Store(String),
    #[error("delay queue failed: {0}")]
    Queue(String),
    #[error("no next delivery time could be computed")]
    NoNextTarget,
    #[error("delay of {}s exceeds the {}s limit", .0.as_secs(), schedule::MAX_DELAY.as_secs())]
    DelayTooLong(Duration),
}

impl ScheduleError {
    fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    fn queue(err: impl std::fmt::Display) -> Self {
        Self::Queue(err.to_string())
    }
}

/// Everything the dispatcher and the consumer share: the schedule store, the
/// delay queue, the push transport and a clock.
pub trait PushRuntime: Clone + Send + Sync + 'static {
    type Store: ports::ScheduleStore;
    type Queue: ports::DelayQueue;
    type Sender: ports::PushSender;
    type Time: ports::TimeProvider;

    fn store(&self) -> &Self::Store;
    fn queue(&self) -> &Self::Queue;
    fn sender(&self) -> &Self::Sender;
    fn time(&self) -> &Self::Time;
    fn tokens(&self) -> &TokenMinter;
    /// Offset in which `fixedTimes` wall-clock values are read.
    fn utc_offset(&self) -> UtcOffset;
}

#[derive(Debug, Clone)]
pub struct PushServices<St, Q, S, T> {
    store: St,
    queue: Q,
    sender: S,
    time: T,
    tokens: Arc<TokenMinter>,
    utc_offset: UtcOffset,
}

impl<St, Q, S, T> PushServices<St, Q, S, T> {
    pub fn new(store: St, queue: Q, sender: S, time: T, utc_offset: UtcOffset) -> Self {
        Self {
            store,
            queue,
            sender,
            time,
            tokens: Arc::new(TokenMinter::new()),
            utc_offset,
        }
    }
}

impl<St, Q, S, T> PushRuntime for PushServices<St, Q, S, T>
where
    St: ports::ScheduleStore,
    Q: ports::DelayQueue,
    S: ports::PushSender,
    T: ports::TimeProvider,
{
    type Store = St;
    type Queue = Q;
    type Sender = S;
    type Time = T;

    fn store(&self) -> &St {
        &self.store
    }

    fn queue(&self) -> &Q {
        &self.queue
    }

    fn sender(&self) -> &S {
        &self.sender
    }

    fn time(&self) -> &T {
        &self.time
    }

    fn tokens(&self) -> &TokenMinter {
        &self.tokens
    }

    fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }
}

/// Accepts a new schedule for the message's subscription: lifts any stop,
/// makes a fresh token authoritative and enqueues the delivery.
pub async fn schedule<R: PushRuntime>(
    runtime: &R,
    message: DeliveryMessage,
    delay: Duration,
) -> Result<ScheduleToken, ScheduleError> {
    check_delay(delay)?;
    let id = SubscriptionId::of(&message.subscription);
    runtime
        .store()
        .clear_stop(&id)
        .await
        .map_err(ScheduleError::store)?;
    let token = activate(runtime, &id, &message, delay).await?;
    tracing::info!(
        sub_id = %id,
        token = %token,
        delay_secs = delay.as_secs(),
        "schedule accepted"
    );
    Ok(token)
}

/// Suppresses deliveries for a subscription and forgets its active schedule.
pub async fn stop<R: PushRuntime>(runtime: &R, id: &SubscriptionId) -> Result<(), ScheduleError> {
    runtime
        .store()
        .set_stop(id, schedule::STOP_TTL)
        .await
        .map_err(ScheduleError::store)?;
    runtime
        .store()
        .clear_active(id)
        .await
        .map_err(ScheduleError::store)?;
    tracing::info!(sub_id = %id, "schedule stopped");
    Ok(())
}

/// Mints a token, records it as active and enqueues `message` carrying it.
/// Any message already in flight for `id` becomes stale. Delays past
/// [`schedule::MAX_DELAY`] are refused before anything is written.
pub(crate) async fn activate<R: PushRuntime>(
    runtime: &R,
    id: &SubscriptionId,
    message: &DeliveryMessage,
    delay: Duration,
) -> Result<ScheduleToken, ScheduleError> {
    check_delay(delay)?;
    let token = runtime.tokens().mint(runtime.time().now());
    runtime
        .store()
        .set_active(id, token, schedule::ACTIVE_TTL)
        .await
        .map_err(ScheduleError::store)?;
    runtime
        .queue()
        .send(message.with_token(token), delay)
        .await
        .map_err(ScheduleError::queue)?;
    Ok(token)
}

fn check_delay(delay: Duration) -> Result<(), ScheduleError> {
    if delay > schedule::MAX_DELAY {
        return Err(ScheduleError::DelayTooLong(delay));
    }
    Ok(())
}
