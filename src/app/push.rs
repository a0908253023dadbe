use crate::app::ApiError;
use crate::ports::PushSender;
use crate::push::schedule::MAX_DELAY;
use crate::push::{self as push_service, PushRuntime};
use crate::state;
use crate::types::push::{
    DeliveryMessage, NotificationPayload, Subscription, SubscriptionId, TimeOfDay,
};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::time::Duration;

const INVALID_BODY: &str = "Invalid request body";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleRequest {
    subscription: Option<Subscription>,
    payload: Option<Value>,
    delay_seconds: Option<Value>,
    #[serde(default)]
    auto_update: bool,
    cooldown_minutes: Option<u64>,
    action_time_seconds: Option<i64>,
    fixed_times: Option<Vec<TimeOfDay>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScheduleResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StopRequest {
    subscription: Subscription,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TestRequest {
    subscription: Subscription,
    payload: Option<Value>,
}

pub(crate) async fn schedule<R: PushRuntime>(
    State(state): State<state::AppState<R>>,
    body: Bytes,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let request: ScheduleRequest = parse_body(&body)?;
    let subscription = request
        .subscription
        .ok_or(ApiError::BadRequest(INVALID_BODY))?;
    let payload = request
        .payload
        .filter(is_present)
        .ok_or(ApiError::BadRequest(INVALID_BODY))?;
    let delay = request
        .delay_seconds
        .as_ref()
        .and_then(delay_from_json)
        .filter(|delay| *delay <= MAX_DELAY)
        .ok_or(ApiError::BadRequest(INVALID_BODY))?;
    if request
        .action_time_seconds
        .is_some_and(|seconds| seconds.unsigned_abs() > MAX_DELAY.as_secs())
    {
        return Err(ApiError::BadRequest(INVALID_BODY));
    }

    let message = DeliveryMessage {
        subscription,
        payload: NotificationPayload::from_json(payload),
        auto_update: request.auto_update,
        cooldown_minutes: request.cooldown_minutes,
        action_time_seconds: request.action_time_seconds,
        fixed_times: request.fixed_times,
        schedule_token: None,
    };
    push_service::schedule(&state.runtime, message, delay)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to accept schedule");
            ApiError::Internal(err.to_string())
        })?;

    Ok(Json(ScheduleResponse {
        success: true,
        message: "Scheduled successfully",
    }))
}

pub(crate) async fn stop<R: PushRuntime>(
    State(state): State<state::AppState<R>>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let request: StopRequest = parse_body(&body)?;
    let id = SubscriptionId::of(&request.subscription);
    push_service::stop(&state.runtime, &id).await.map_err(|err| {
        tracing::error!(sub_id = %id, error = %err, "failed to stop schedule");
        ApiError::Internal(err.to_string())
    })?;
    Ok("Stopped")
}

/// Sends one notification right away, bypassing the queue and the schedule
/// state entirely.
pub(crate) async fn test<R: PushRuntime>(
    State(state): State<state::AppState<R>>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let request: TestRequest = parse_body(&body)?;
    let payload = match request.payload {
        Some(payload) => NotificationPayload::from_json(payload),
        None => NotificationPayload::Structured(Map::new()),
    }
    .with_default("enableVibration", Value::Bool(true));

    let id = SubscriptionId::of(&request.subscription);
    state
        .runtime
        .sender()
        .send(&request.subscription, &payload.encode())
        .await
        .map_err(|err| {
            tracing::error!(sub_id = %id, error = %err, "test push failed");
            ApiError::Internal(err.to_string())
        })?;
    tracing::info!(sub_id = %id, "test push sent");
    Ok("Success")
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(error = %err, "rejecting request body");
        ApiError::BadRequest(INVALID_BODY)
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// Whole seconds from a JSON number; negative values clamp to zero and
/// fractions are dropped. Anything but a finite number is rejected.
fn delay_from_json(value: &Value) -> Option<Duration> {
    let seconds = value.as_f64().filter(|seconds| seconds.is_finite())?;
    if seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(seconds.trunc()).ok()
}
