use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::ports::{self, Receipt, Received};
use crate::push::schedule::MAX_DELAY;
use crate::types::push::DeliveryMessage;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no in-flight message for receipt {0}")]
    UnknownReceipt(u64),
    #[error("delay of {0:?} is longer than the queue holds messages")]
    DelayTooLong(Duration),
}

#[derive(Debug)]
struct Slot {
    message: DeliveryMessage,
    attempts: u32,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    due: BinaryHeap<Reverse<(Instant, u64)>>,
    waiting: HashMap<u64, Slot>,
    in_flight: HashMap<u64, Slot>,
}

impl Inner {
    fn schedule(&mut self, id: u64, slot: Slot, at: Instant) {
        self.waiting.insert(id, slot);
        self.due.push(Reverse((at, id)));
    }

    fn take_due(&mut self, now: Instant, max: usize) -> Vec<Received> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.due.peek() {
                Some(Reverse((at, _))) if *at <= now => {}
                _ => break,
            }
            let Some(Reverse((_, id))) = self.due.pop() else {
                break;
            };
            let Some(mut slot) = self.waiting.remove(&id) else {
                continue;
            };
            slot.attempts += 1;
            batch.push(Received {
                receipt: Receipt::new(id),
                attempts: slot.attempts,
                message: slot.message.clone(),
            });
            self.in_flight.insert(id, slot);
        }
        batch
    }

    fn next_due(&self) -> Option<Instant> {
        self.due.peek().map(|Reverse((at, _))| *at)
    }
}

/// Process-local delay queue with at-least-once semantics.
///
/// Messages become visible once their delay has elapsed. A received message
/// stays in flight until it is acked (gone for good) or retried (redelivered
/// after an exponential backoff of `retry_backoff × 2^(attempts − 1)`).
/// Neither a delay nor a backoff may exceed [`MAX_DELAY`].
#[derive(Debug, Clone)]
pub struct InMemoryDelayQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    retry_backoff: Duration,
}

impl Default for InMemoryDelayQueue {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BACKOFF)
    }
}

impl InMemoryDelayQueue {
    pub fn new(retry_backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
            retry_backoff,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, message: DeliveryMessage, delay: Duration) -> Result<(), QueueError> {
        let at = Some(delay)
            .filter(|delay| *delay <= MAX_DELAY)
            .and_then(|delay| Instant::now().checked_add(delay))
            .ok_or(QueueError::DelayTooLong(delay))?;
        {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.schedule(
                id,
                Slot {
                    message,
                    attempts: 0,
                },
                at,
            );
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1 << exponent).min(MAX_DELAY)
    }

    /// Messages not yet acked, waiting or in flight.
    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.waiting.len() + inner.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn receive_batch(&self, max: usize) -> Vec<Received> {
        let max = max.max(1);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut inner = self.lock();
                let batch = inner.take_due(Instant::now(), max);
                if !batch.is_empty() {
                    return batch;
                }
                inner.next_due()
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

impl ports::DelayQueue for InMemoryDelayQueue {
    type Error = QueueError;
    type Fut<'a, T>
        = QueueFuture<'a, T>
    where
        Self: 'a,
        T: Send + 'a;

    fn send<'a>(&'a self, message: DeliveryMessage, delay: Duration) -> Self::Fut<'a, ()> {
        Box::pin(std::future::ready(self.enqueue(message, delay)))
    }

    fn receive<'a>(&'a self, max: usize) -> Self::Fut<'a, Vec<Received>> {
        Box::pin(async move { Ok(self.receive_batch(max).await) })
    }

    fn ack<'a>(&'a self, receipt: Receipt) -> Self::Fut<'a, ()> {
        let removed = self.lock().in_flight.remove(&receipt.id());
        Box::pin(std::future::ready(match removed {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownReceipt(receipt.id())),
        }))
    }

    fn retry<'a>(&'a self, receipt: Receipt) -> Self::Fut<'a, ()> {
        let result = {
            let mut inner = self.lock();
            match inner.in_flight.remove(&receipt.id()) {
                Some(slot) => {
                    let at = Instant::now() + self.backoff(slot.attempts);
                    inner.schedule(receipt.id(), slot, at);
                    Ok(())
                }
                None => Err(QueueError::UnknownReceipt(receipt.id())),
            }
        };
        if result.is_ok() {
            self.notify.notify_waiters();
        }
        Box::pin(std::future::ready(result))
    }
}
