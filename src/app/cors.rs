use crate::push::PushRuntime;
use crate::state;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

/// Answers preflight requests directly and adds the CORS headers to every
/// response, including errors and 404s.
pub(crate) async fn cors_middleware<R: PushRuntime>(
    State(state): State<state::AppState<R>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };
    apply_cors_headers(response.headers_mut(), &state.config.allowed_origin);
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, allowed_origin: &str) {
    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(_) => {
            tracing::warn!(origin = allowed_origin, "allowed origin is not a valid header value");
        }
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
}
