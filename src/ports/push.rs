use crate::types::push::Subscription;

/// Failure classification for a transmission attempt.
pub trait DeliveryError: std::fmt::Display + Send + Sync + 'static {
    /// Permanent failures (bad key material, unusable endpoint) can never
    /// succeed on a later attempt.
    fn is_permanent(&self) -> bool;
}

pub trait PushSender: Clone + Send + Sync + 'static {
    type Error: DeliveryError;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8]) -> Self::Fut<'a>;
}
