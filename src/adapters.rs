pub mod memory_queue;
pub mod memory_store;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use time::OffsetDateTime;

use crate::ports;
use crate::push::ece::{self, EceError};
use crate::push::vapid::{self, VapidError, VapidSigner};
use crate::types::push::{Subscription, VapidConfig};

/// How long the push service should hold an undeliverable message, in seconds.
pub const MESSAGE_TTL: u32 = 86_400;
/// Upper bound on a whole push request, connecting included.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl ports::TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("failed to encrypt payload: {0}")]
    Encryption(#[from] EceError),
    #[error("failed to sign VAPID token: {0}")]
    Vapid(#[from] VapidError),
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push service responded {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

impl ports::DeliveryError for PushError {
    fn is_permanent(&self) -> bool {
        matches!(self, PushError::Encryption(_) | PushError::Vapid(_))
    }
}

/// Sends encrypted, VAPID-authenticated messages straight to the push
/// service named by each subscription's endpoint.
#[derive(Debug, Clone)]
pub struct WebPushSender {
    vapid: VapidConfig,
    signer: Arc<VapidSigner>,
    client: reqwest::Client,
}

impl WebPushSender {
    pub fn new(vapid: VapidConfig) -> Result<Self, PushError> {
        Self::with_timeout(vapid, PUSH_TIMEOUT)
    }

    pub fn with_timeout(vapid: VapidConfig, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(vapid, client))
    }

    pub fn with_client(vapid: VapidConfig, client: reqwest::Client) -> Self {
        Self {
            vapid,
            signer: Arc::new(VapidSigner::new()),
            client,
        }
    }

    fn authorization(&self, endpoint: &str) -> Result<String, VapidError> {
        let audience = vapid::audience(endpoint)?;
        let token = self.signer.sign(
            &audience,
            &self.vapid.subject,
            &self.vapid.private_key,
            &self.vapid.public_key,
            OffsetDateTime::now_utc(),
        )?;
        Ok(format!("vapid t={token}, k={}", self.vapid.public_key))
    }

    async fn deliver(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), PushError> {
        let body = ece::encrypt(subscription, payload)?;
        let authorization = self.authorization(&subscription.endpoint)?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_ENCODING, "aes128gcm")
            .header("TTL", MESSAGE_TTL.to_string())
            .header("Urgency", "high")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected { status, body })
    }
}

impl ports::PushSender for WebPushSender {
    type Error = PushError;
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8]) -> Self::Fut<'a> {
        Box::pin(self.deliver(subscription, payload))
    }
}
