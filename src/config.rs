use std::net::SocketAddr;
use std::time::Duration;

use time::UtcOffset;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    /// Shared secret for `/debug/status`; the route refuses every request
    /// when unset.
    pub debug_token: Option<String>,
    pub allowed_origin: String,
    pub utc_offset: UtcOffset,
    pub batch_size: usize,
    pub retry_backoff: Duration,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            debug_token: None,
            allowed_origin: "*".to_string(),
            utc_offset: UtcOffset::UTC,
            batch_size: 10,
            retry_backoff: Duration::from_secs(30),
        }
    }
}
