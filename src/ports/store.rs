use std::time::Duration;

use crate::types::push::{ScheduleStatus, ScheduleToken, SubscriptionId};

/// TTL'd key-value view of per-subscription schedule state. Every operation
/// is a single independent read or write; nothing here is transactional.
pub trait ScheduleStore: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a, T>: Future<Output = Result<T, Self::Error>> + Send + 'a
    where
        Self: 'a,
        T: Send + 'a;

    fn set_active<'a>(
        &'a self,
        id: &'a SubscriptionId,
        token: ScheduleToken,
        ttl: Duration,
    ) -> Self::Fut<'a, ()>;
    fn get_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, Option<ScheduleToken>>;
    fn clear_active<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()>;
    fn set_stop<'a>(&'a self, id: &'a SubscriptionId, ttl: Duration) -> Self::Fut<'a, ()>;
    fn clear_stop<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ()>;
    fn is_stopped<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, bool>;
    fn get_status<'a>(&'a self, id: &'a SubscriptionId) -> Self::Fut<'a, ScheduleStatus>;
}
