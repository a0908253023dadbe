use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::Time;

use crate::base64url;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

/// A browser push subscription in the shape of `PushSubscription.toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// `base64url(SHA-256(endpoint))`, the dedup key for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn of(subscription: &Subscription) -> Self {
        Self::from_endpoint(&subscription.endpoint)
    }

    pub fn from_endpoint(endpoint: &str) -> Self {
        let digest = Sha256::digest(endpoint.as_bytes());
        Self(base64url::encode(digest))
    }

    /// Wraps an id that was computed elsewhere, e.g. by a client.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generation marker for a subscription's schedule. Millisecond timestamps,
/// carried on the wire as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "TokenRepr")]
pub struct ScheduleToken(u64);

impl ScheduleToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScheduleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScheduleToken {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<ScheduleToken> for String {
    fn from(token: ScheduleToken) -> Self {
        token.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<TokenRepr> for ScheduleToken {
    type Error = std::num::ParseIntError;

    fn try_from(repr: TokenRepr) -> Result<Self, Self::Error> {
        match repr {
            TokenRepr::Number(value) => Ok(Self(value)),
            TokenRepr::Text(text) => text.parse(),
        }
    }
}

/// Wall-clock time of day written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TimeOfDay(Time);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day '{0}'; expected HH:MM")]
pub struct InvalidTimeOfDay(String);

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        Time::from_hms(hour, minute, 0).ok().map(Self)
    }

    pub fn time(self) -> Time {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// What the service worker receives. Structured payloads are JSON objects the
/// worker renders field by field; anything else is shown as plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    Structured(Map<String, Value>),
    Text(String),
}

impl NotificationPayload {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Structured(map),
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Structured(map) => Value::Object(map.clone()).to_string().into_bytes(),
            Self::Text(text) => text.clone().into_bytes(),
        }
    }

    /// Sets `key` on structured payloads that do not already carry it.
    pub fn with_default(mut self, key: &str, value: Value) -> Self {
        if let Self::Structured(map) = &mut self {
            map.entry(key.to_string()).or_insert(value);
        }
        self
    }
}

/// A delayed delivery as it travels through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMessage {
    pub subscription: Subscription,
    pub payload: NotificationPayload,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub cooldown_minutes: Option<u64>,
    #[serde(default)]
    pub action_time_seconds: Option<i64>,
    #[serde(default)]
    pub fixed_times: Option<Vec<TimeOfDay>>,
    #[serde(default, alias = "scheduleId")]
    pub schedule_token: Option<ScheduleToken>,
}

/// Inputs for computing the next occurrence of a recurring delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Renewal<'a> {
    pub cooldown_minutes: u64,
    pub action_time_seconds: i64,
    pub fixed_times: &'a [TimeOfDay],
}

impl DeliveryMessage {
    /// Returns the renewal inputs when this message asks to be rescheduled
    /// after a successful delivery.
    pub fn renewal(&self) -> Option<Renewal<'_>> {
        if !self.auto_update {
            return None;
        }
        let cooldown_minutes = self.cooldown_minutes.filter(|minutes| *minutes > 0)?;
        Some(Renewal {
            cooldown_minutes,
            action_time_seconds: self.action_time_seconds?,
            fixed_times: self.fixed_times.as_deref()?,
        })
    }

    pub fn with_token(&self, token: ScheduleToken) -> Self {
        Self {
            schedule_token: Some(token),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleStatus {
    pub active_token: Option<ScheduleToken>,
    pub stopped: bool,
}
