use std::time::Duration;

use crate::types::push::DeliveryMessage;

/// Proof of receipt for one delivery. Not `Clone`: handing it to either
/// [`DelayQueue::ack`] or [`DelayQueue::retry`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Receipt(u64);

impl Receipt {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct Received {
    pub receipt: Receipt,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempts: u32,
    pub message: DeliveryMessage,
}

/// At-least-once delayed delivery. There is no way to withdraw a message once
/// sent; consumers must decide for themselves whether it is still wanted.
pub trait DelayQueue: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a, T>: Future<Output = Result<T, Self::Error>> + Send + 'a
    where
        Self: 'a,
        T: Send + 'a;

    fn send<'a>(&'a self, message: DeliveryMessage, delay: Duration) -> Self::Fut<'a, ()>;
    /// Waits until at least one message is due and returns up to `max` of them.
    fn receive<'a>(&'a self, max: usize) -> Self::Fut<'a, Vec<Received>>;
    fn ack<'a>(&'a self, receipt: Receipt) -> Self::Fut<'a, ()>;
    fn retry<'a>(&'a self, receipt: Receipt) -> Self::Fut<'a, ()>;
}
