use crate::config;
use crate::push::PushRuntime;
use crate::state;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

mod cors;
mod debug;
mod push;

pub fn app<R: PushRuntime>(config: config::AppConfig, runtime: R) -> Router {
    let state = state::AppState { config, runtime };
    Router::new()
        .route("/", get(index).fallback(not_found))
        .route("/schedule", post(push::schedule::<R>).fallback(not_found))
        .route("/stop", post(push::stop::<R>).fallback(not_found))
        .route("/test", post(push::test::<R>).fallback(not_found))
        .route("/debug/status", get(debug::status::<R>).fallback(not_found))
        .fallback(not_found)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, cors::cors_middleware::<R>))
}

pub(crate) async fn index() -> &'static str {
    "Push scheduler is running."
}

pub(crate) async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Handler failures, rendered as plain-text responses.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::{DelayQueue, ScheduleStore};
    use crate::push::testing::{self, RecordingSender, TestRuntime, TestSendError};
    use crate::types::push::{ScheduleToken, SubscriptionId};
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        CONTENT_TYPE,
    };
    use serde_json::{Value as JsonValue, json};
    use tower::ServiceExt;

    fn debug_config() -> config::AppConfig {
        config::AppConfig {
            debug_token: Some("secret".to_string()),
            ..Default::default()
        }
    }

    fn post_json(uri: &str, body: &JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn subscription_json() -> JsonValue {
        json!({
            "endpoint": "https://push.example/123",
            "expirationTime": null,
            "keys": { "p256dh": "p256", "auth": "auth" }
        })
    }

    fn sub_id() -> SubscriptionId {
        SubscriptionId::of(&testing::subscription())
    }

    async fn send(runtime: &TestRuntime, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app(debug_config(), runtime.clone())
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, body.to_vec())
    }

    async fn active_token(runtime: &TestRuntime) -> Option<ScheduleToken> {
        runtime.store().get_active(&sub_id()).await.expect("get")
    }

    #[tokio::test]
    async fn index__should_report_running() {
        // Given
        let runtime = testing::runtime();

        // When
        let (status, body) = send(&runtime, get("/")).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).expect("utf8").contains("running"));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule__should_record_token_and_enqueue_delivery() {
        // Given
        let runtime = testing::runtime();
        let body = json!({
            "subscription": subscription_json(),
            "payload": { "title": "Break", "body": "Time to stretch" },
            "delaySeconds": 12.9,
            "autoUpdate": true,
            "cooldownMinutes": 180,
            "actionTimeSeconds": 30,
            "fixedTimes": ["04:00", "16:00"]
        });

        // When
        let (status, response) = send(&runtime, post_json("/schedule", &body)).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        let response: JsonValue = serde_json::from_slice(&response).expect("json");
        assert_eq!(
            response,
            json!({ "success": true, "message": "Scheduled successfully" })
        );
        let token = active_token(&runtime).await.expect("active token");
        assert_eq!(runtime.queue().len(), 1);
        let started = tokio::time::Instant::now();
        let queued = runtime.queue().receive(1).await.expect("receive").remove(0);
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(12));
        assert_eq!(queued.message.schedule_token, Some(token));
        assert!(queued.message.auto_update);
        assert_eq!(queued.message.cooldown_minutes, Some(180));
    }

    #[tokio::test]
    async fn schedule__should_issue_increasing_tokens() {
        // Given
        let runtime = testing::runtime();
        let body = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 0
        });

        // When
        send(&runtime, post_json("/schedule", &body)).await;
        let first = active_token(&runtime).await.expect("first");
        send(&runtime, post_json("/schedule", &body)).await;
        let second = active_token(&runtime).await.expect("second");

        // Then
        assert!(second > first);
    }

    #[tokio::test]
    async fn schedule__should_reject_non_numeric_delay_without_side_effects() {
        // Given
        let runtime = testing::runtime();
        let body = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": "soon"
        });

        // When
        let (status, _) = send(&runtime, post_json("/schedule", &body)).await;

        // Then
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(active_token(&runtime).await, None);
        assert!(runtime.queue().is_empty());
    }

    #[tokio::test]
    async fn schedule__should_reject_out_of_range_delays_without_side_effects() {
        // Given
        let runtime = testing::runtime();
        let existing = ScheduleToken::new(42);
        runtime
            .store()
            .set_active(&sub_id(), existing, crate::push::schedule::ACTIVE_TTL)
            .await
            .expect("set");
        let huge_delay = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 1e20
        });
        let eight_days = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 8 * 24 * 60 * 60
        });
        let huge_action_time = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 10,
            "autoUpdate": true,
            "cooldownMinutes": 60,
            "actionTimeSeconds": i64::MAX,
            "fixedTimes": ["04:00"]
        });

        // Then
        for body in [huge_delay, eight_days, huge_action_time] {
            let (status, _) = send(&runtime, post_json("/schedule", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(active_token(&runtime).await, Some(existing));
        assert!(runtime.queue().is_empty());
    }

    #[tokio::test]
    async fn schedule__should_reject_missing_fields_and_malformed_json() {
        // Given
        let runtime = testing::runtime();
        let missing_payload = json!({ "subscription": subscription_json(), "delaySeconds": 1 });
        let missing_subscription = json!({ "payload": "hello", "delaySeconds": 1 });
        let bad_times = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 1,
            "fixedTimes": ["25:00"]
        });
        let malformed = Request::builder()
            .method("POST")
            .uri("/schedule")
            .body(Body::from("{not json"))
            .unwrap();

        // Then
        for request in [
            post_json("/schedule", &missing_payload),
            post_json("/schedule", &missing_subscription),
            post_json("/schedule", &bad_times),
            malformed,
        ] {
            let (status, _) = send(&runtime, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(runtime.queue().is_empty());
    }

    #[tokio::test]
    async fn stop__should_set_stop_and_clear_schedule_until_rescheduled() {
        // Given
        let runtime = testing::runtime();
        let schedule = json!({
            "subscription": subscription_json(),
            "payload": "hello",
            "delaySeconds": 60
        });
        send(&runtime, post_json("/schedule", &schedule)).await;

        // When
        let (status, body) = send(
            &runtime,
            post_json("/stop", &json!({ "subscription": subscription_json() })),
        )
        .await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Stopped".to_vec());
        let stopped = runtime.store().get_status(&sub_id()).await.expect("status");
        assert!(stopped.stopped);
        assert_eq!(stopped.active_token, None);

        send(&runtime, post_json("/schedule", &schedule)).await;
        let resumed = runtime.store().get_status(&sub_id()).await.expect("status");
        assert!(!resumed.stopped);
        assert!(resumed.active_token.is_some());
    }

    #[tokio::test]
    async fn stop__should_reject_body_without_subscription() {
        // Given
        let runtime = testing::runtime();

        // When
        let (status, _) = send(&runtime, post_json("/stop", &json!({}))).await;

        // Then
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!runtime.store().is_stopped(&sub_id()).await.expect("read"));
    }

    #[tokio::test]
    async fn test__should_send_immediately_with_vibration_default() {
        // Given
        let runtime = testing::runtime();
        let body = json!({
            "subscription": subscription_json(),
            "payload": { "title": "Test" }
        });

        // When
        let (status, response) = send(&runtime, post_json("/test", &body)).await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, b"Success".to_vec());
        let sent = runtime.sender().sent();
        assert_eq!(sent.len(), 1);
        let payload: JsonValue = serde_json::from_slice(&sent[0].1).expect("json payload");
        assert_eq!(payload, json!({ "title": "Test", "enableVibration": true }));
    }

    #[tokio::test]
    async fn test__should_keep_explicit_vibration_setting() {
        // Given
        let runtime = testing::runtime();
        let body = json!({
            "subscription": subscription_json(),
            "payload": { "title": "Quiet", "enableVibration": false }
        });

        // When
        send(&runtime, post_json("/test", &body)).await;

        // Then
        let sent = runtime.sender().sent();
        let payload: JsonValue = serde_json::from_slice(&sent[0].1).expect("json payload");
        assert_eq!(payload["enableVibration"], json!(false));
    }

    #[tokio::test]
    async fn test__should_return_error_detail_when_transmission_fails() {
        // Given
        let runtime =
            testing::runtime_with(RecordingSender::failing(&[TestSendError { permanent: false }]));
        let body = json!({ "subscription": subscription_json(), "payload": "ping" });

        // When
        let (status, response) = send(&runtime, post_json("/test", &body)).await;

        // Then
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response, b"test send error".to_vec());
    }

    #[tokio::test]
    async fn debug_status__should_require_configured_token() {
        // Given
        let runtime = testing::runtime();
        let uri = format!("/debug/status?subId={}", sub_id());

        // When
        let (missing, _) = send(&runtime, get(&uri)).await;
        let (wrong, _) = send(&runtime, get(&format!("{uri}&token=nope"))).await;
        let unconfigured = app(config::AppConfig::default(), runtime.clone())
            .oneshot(get(&format!("{uri}&token=secret")))
            .await
            .expect("request failed")
            .status();

        // Then
        assert_eq!(missing, StatusCode::FORBIDDEN);
        assert_eq!(wrong, StatusCode::FORBIDDEN);
        assert_eq!(unconfigured, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn debug_status__should_require_sub_id() {
        // Given
        let runtime = testing::runtime();

        // When
        let (status, _) = send(&runtime, get("/debug/status?token=secret")).await;

        // Then
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn debug_status__should_report_schedule_state() {
        // Given
        let runtime = testing::runtime();
        runtime
            .store()
            .set_active(
                &sub_id(),
                ScheduleToken::new(1_704_103_200_000),
                std::time::Duration::from_secs(60),
            )
            .await
            .expect("set");

        // When
        let (status, body) = send(
            &runtime,
            get(&format!("/debug/status?subId={}&token=secret", sub_id())),
        )
        .await;

        // Then
        assert_eq!(status, StatusCode::OK);
        let body: JsonValue = serde_json::from_slice(&body).expect("json");
        assert_eq!(
            body,
            json!({
                "subId": sub_id().to_string(),
                "activeScheduleId": "1704103200000",
                "isStopped": false
            })
        );
    }

    #[tokio::test]
    async fn cors__should_answer_preflight_and_decorate_responses() {
        // Given
        let runtime = testing::runtime();
        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/schedule")
            .body(Body::empty())
            .unwrap();

        // When
        let response = app(debug_config(), runtime.clone())
            .oneshot(preflight)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn cors__should_use_configured_origin() {
        // Given
        let config = config::AppConfig {
            allowed_origin: "https://app.example".to_string(),
            ..Default::default()
        };

        // When
        let response = app(config, testing::runtime())
            .oneshot(get("/"))
            .await
            .expect("request failed");

        // Then
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
    }

    #[tokio::test]
    async fn app__should_return_not_found_for_unknown_routes_and_methods() {
        // Given
        let runtime = testing::runtime();

        // When
        let (unknown, _) = send(&runtime, get("/nope")).await;
        let (wrong_method, body) = send(&runtime, get("/schedule")).await;

        // Then
        assert_eq!(unknown, StatusCode::NOT_FOUND);
        assert_eq!(wrong_method, StatusCode::NOT_FOUND);
        assert_eq!(body, b"Not Found".to_vec());
    }
}
