use std::collections::HashMap;
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::ports;
use crate::types::push::{ScheduleStatus, ScheduleToken, SubscriptionId};

const STOP_VALUE: &str = "true";

pub(crate) fn active_key(id: &SubscriptionId) -> String {
    format!("active_schedule_{id}")
}

pub(crate) fn stop_key(id: &SubscriptionId) -> String {
    format!("stop_{id}")
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local TTL key-value store laid out the same way as the hosted
/// KV namespace: `active_schedule_<id>` and `stop_<id>`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, key: String, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    fn active(&self, id: &SubscriptionId) -> Option<ScheduleToken> {
        let raw = self.get(&active_key(id))?;
        match raw.parse() {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(
                    sub_id = %id,
                    value = %raw,
                    error = %err,
                    "ignoring unreadable schedule token"
                );
                None
            }
        }
    }

    fn stopped(&self, id: &SubscriptionId) -> bool {
        self.get(&stop_key(id)).as_deref() == Some(STOP_VALUE)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}

impl ports::ScheduleStore for InMemoryScheduleStore {
    type Error = Infallible;
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
        self.put(active_key(id), &token.to_string(), ttl);
        ready(Ok(()))
    }

    fn get_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, Option<ScheduleToken>> {
        ready(Ok(self.active(id)))
    }

    fn clear_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()> {
        self.delete(&active_key(id));
        ready(Ok(()))
    }

    fn set_stop<'a>(&'a self, id: &'a SubscriptionId, ttl: Duration) -> Self::Fut<'a, ()> {
        self.put(stop_key(id), STOP_VALUE, ttl);
        ready(Ok(()))
    }

    fn clear_stop<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()> {
        self.delete(&stop_key(id));
        ready(Ok(()))
    }

    fn is_stopped<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, bool> {
        ready(Ok(self.stopped(id)))
    }

    fn get_status<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ScheduleStatus> {
        ready(Ok(ScheduleStatus {
            active_token: self.active(id),
            stopped: self.stopped(id),
        }))
    }
}
