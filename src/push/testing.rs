use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::adapters::memory_queue::InMemoryDelayQueue;
use crate::adapters::memory_store::InMemoryScheduleStore;
use crate::ports;
use crate::push::PushServices;
use crate::types::push::{
    DeliveryMessage, NotificationPayload, ScheduleStatus, ScheduleToken, Subscription,
    SubscriptionId, SubscriptionKeys,
};

pub(crate) type TestRuntime =
    PushServices<InMemoryScheduleStore, InMemoryDelayQueue, RecordingSender, FixedClock>;

pub(crate) const NOW: &str = "2024-01-01T10:00:00Z";

pub(crate) fn runtime() -> TestRuntime {
    runtime_with(RecordingSender::default())
}

pub(crate) fn runtime_with(sender: RecordingSender) -> TestRuntime {
    PushServices::new(
        InMemoryScheduleStore::new(),
        InMemoryDelayQueue::new(Duration::from_secs(30)),
        sender,
        FixedClock::at(NOW),
        UtcOffset::UTC,
    )
}

pub(crate) fn runtime_with_store(
    store: FaultyStore,
) -> PushServices<FaultyStore, InMemoryDelayQueue, RecordingSender, FixedClock> {
    PushServices::new(
        store,
        InMemoryDelayQueue::new(Duration::from_secs(30)),
        RecordingSender::default(),
        FixedClock::at(NOW),
        UtcOffset::UTC,
    )
}

pub(crate) fn subscription() -> Subscription {
    Subscription {
        endpoint: "https://push.example/123".to_string(),
        keys: SubscriptionKeys {
            p256dh: "p256".to_string(),
            auth: "auth".to_string(),
        },
    }
}

pub(crate) fn message(body: &str) -> DeliveryMessage {
    DeliveryMessage {
        subscription: subscription(),
        payload: NotificationPayload::Text(body.to_string()),
        auto_update: false,
        cooldown_minutes: None,
        action_time_seconds: None,
        fixed_times: None,
        schedule_token: None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FixedClock {
    now: OffsetDateTime,
}

impl FixedClock {
    pub(crate) fn at(raw: &str) -> Self {
        Self {
            now: OffsetDateTime::parse(raw, &Rfc3339).expect("parse time"),
        }
    }
}

impl ports::TimeProvider for FixedClock {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        self.now
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TestSendError {
    pub(crate) permanent: bool,
}

impl std::fmt::Display for TestSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.permanent {
            f.write_str("test send error (permanent)")
        } else {
            f.write_str("test send error")
        }
    }
}

impl ports::DeliveryError for TestSendError {
    fn is_permanent(&self) -> bool {
        self.permanent
    }
}

/// Records every transmission and replays scripted outcomes, succeeding once
/// the script runs out.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSender {
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    outcomes: Arc<Mutex<VecDeque<Result<(), TestSendError>>>>,
}

impl RecordingSender {
    pub(crate) fn failing(errors: &[TestSendError]) -> Self {
        let sender = Self::default();
        sender
            .outcomes
            .lock()
            .expect("outcomes lock")
            .extend(errors.iter().copied().map(Err));
        sender
    }

    pub(crate) fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl ports::PushSender for RecordingSender {
    type Error = TestSendError;
    type Fut<'a>
        = Ready<Result<(), Self::Error>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8]) -> Self::Fut<'a> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((subscription.endpoint.clone(), payload.to_vec()));
        let outcome = self
            .outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or(Ok(()));
        ready(outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoreUnavailable;

impl std::fmt::Display for StoreUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("test store unavailable")
    }
}

/// In-memory store whose reads or writes can be made to fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryScheduleStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FaultyStore {
    pub(crate) fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    fn outcome<T>(
        fail: bool,
        op: impl FnOnce() -> Ready<Result<T, Infallible>>,
    ) -> Ready<Result<T, StoreUnavailable>> {
        if fail {
            return ready(Err(StoreUnavailable));
        }
        ready(op().into_inner().map_err(|never| match never {}))
    }
}

impl ports::ScheduleStore for FaultyStore {
    type Error = StoreUnavailable;
    type Fut<'a, T>
        = Ready<Result<T, Self::Error>>
    where
        Self: 'a,
        T: Send + 'a;

    fn set_active<'a>(
        &'a self,
        id: &'a SubscriptionId,
        token: ScheduleToken,
        ttl: Duration,
    ) -> Self::Fut<'a, ()> {
        Self::outcome(self.fail_writes, || {
            ports::ScheduleStore::set_active(&self.inner, id, token, ttl)
        })
    }

    fn get_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, Option<ScheduleToken>> {
        Self::outcome(self.fail_reads, || {
            ports::ScheduleStore::get_active(&self.inner, id)
        })
    }

    fn clear_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()> {
        Self::outcome(self.fail_writes, || {
            ports::ScheduleStore::clear_active(&self.inner, id)
        })
    }

    fn set_stop<'a>(&'a self, id: &'a SubscriptionId, ttl: Duration) -> Self::Fut<'a, ()> {
        Self::outcome(self.fail_writes, || {
            ports::ScheduleStore::set_stop(&self.inner, id, ttl)
        })
    }

    fn clear_stop<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()> {
        Self::outcome(self.fail_writes, || {
            ports::ScheduleStore::clear_stop(&self.inner, id)
        })
    }

    fn is_stopped<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, bool> {
        Self::outcome(self.fail_reads, || {
            ports::ScheduleStore::is_stopped(&self.inner, id)
        })
    }

    fn get_status<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ScheduleStatus> {
        Self::outcome(self.fail_reads, || {
            ports::ScheduleStore::get_status(&self.inner, id)
        })
    }
}
