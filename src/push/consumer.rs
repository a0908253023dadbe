use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};

use crate::ports::{DelayQueue, DeliveryError, PushSender, Received, ScheduleStore, TimeProvider};
use crate::push::schedule::{self, MAX_ATTEMPTS};
use crate::push::{PushRuntime, ScheduleError, activate};
use crate::types::push::{DeliveryMessage, Renewal, SubscriptionId};

pub const DEFAULT_BATCH_SIZE: usize = 10;
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How a received message left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    DiscardedStopped,
    DiscardedStale,
    Delivered,
    FailedRetry,
    FailedDropped,
}

impl Disposition {
    fn after_failure(attempts: u32) -> Self {
        if attempts < MAX_ATTEMPTS {
            Disposition::FailedRetry
        } else {
            Disposition::FailedDropped
        }
    }
}

/// Drains the delay queue, deciding per message whether it is still wanted,
/// delivering it and scheduling the next occurrence of recurring deliveries.
#[derive(Debug, Clone)]
pub struct QueueConsumer<R> {
    runtime: R,
    batch_size: usize,
}

impl<R: PushRuntime> QueueConsumer<R> {
    pub fn new(runtime: R, batch_size: usize) -> Self {
        Self {
            runtime,
            batch_size: batch_size.max(1),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        loop {
            let batch = match self.runtime.queue().receive(self.batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::error!(error = %err, "failed to receive from delay queue");
                    self.runtime.time().sleep(RECEIVE_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let mut tasks = JoinSet::new();
            for received in batch {
                let consumer = self.clone();
                tasks.spawn(async move { consumer.process(received).await });
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "delivery task panicked");
                }
            }
        }
    }

    /// Runs one message through the state machine and settles it with the
    /// queue: retried on [`Disposition::FailedRetry`], acked otherwise.
    pub async fn process(&self, received: Received) -> Disposition {
        let Received {
            receipt,
            attempts,
            message,
        } = received;
        let id = SubscriptionId::of(&message.subscription);
        let disposition = self.decide(&id, attempts, &message).await;

        let queue = self.runtime.queue();
        let settled = match disposition {
            Disposition::FailedRetry => queue.retry(receipt).await,
            _ => queue.ack(receipt).await,
        };
        if let Err(err) = settled {
            tracing::error!(sub_id = %id, error = %err, "failed to settle queue message");
        }
        disposition
    }

    async fn decide(
        &self,
        id: &SubscriptionId,
        attempts: u32,
        message: &DeliveryMessage,
    ) -> Disposition {
        let status = match self.runtime.store().get_status(id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(
                    sub_id = %id,
                    attempt = attempts,
                    error = %err,
                    "failed to read schedule state"
                );
                return Disposition::after_failure(attempts);
            }
        };

        if status.stopped {
            tracing::info!(sub_id = %id, "discarding delivery for stopped subscription");
            return Disposition::DiscardedStopped;
        }
        if let Some(token) = message.schedule_token
            && status.active_token != Some(token)
        {
            tracing::info!(
                sub_id = %id,
                token = %token,
                active = ?status.active_token.map(|active| active.value()),
                "discarding stale delivery"
            );
            return Disposition::DiscardedStale;
        }

        let payload = message.payload.encode();
        let sent = self
            .runtime
            .sender()
            .send(&message.subscription, &payload)
            .await;
        if let Err(err) = sent {
            if err.is_permanent() {
                tracing::error!(
                    sub_id = %id,
                    attempt = attempts,
                    error = %err,
                    "dropping undeliverable message"
                );
                return Disposition::FailedDropped;
            }
            let disposition = Disposition::after_failure(attempts);
            if disposition == Disposition::FailedDropped {
                tracing::error!(
                    sub_id = %id,
                    attempt = attempts,
                    error = %err,
                    "giving up on delivery"
                );
            } else {
                tracing::warn!(
                    sub_id = %id,
                    attempt = attempts,
                    error = %err,
                    "delivery failed, will retry"
                );
            }
            return disposition;
        }
        tracing::info!(sub_id = %id, attempt = attempts, "delivered push message");

        if let Some(renewal) = message.renewal()
            && let Err(err) = self.renew(id, message, &renewal).await
        {
            tracing::error!(sub_id = %id, error = %err, "failed to schedule next delivery");
        }
        Disposition::Delivered
    }

    async fn renew(
        &self,
        id: &SubscriptionId,
        message: &DeliveryMessage,
        renewal: &Renewal<'_>,
    ) -> Result<(), ScheduleError> {
        let now = self.runtime.time().now();
        let target = schedule::next_target(
            now,
            renewal.fixed_times,
            renewal.cooldown_minutes,
            self.runtime.utc_offset(),
        )
        .ok_or(ScheduleError::NoNextTarget)?;
        let delay = schedule::renewal_delay(now, target, renewal.action_time_seconds);
        let token = activate(&self.runtime, id, message, delay).await?;
        tracing::info!(
            sub_id = %id,
            token = %token,
            next = %target,
            delay_secs = delay.as_secs(),
            "scheduled next delivery"
        );
        Ok(())
    }
}
