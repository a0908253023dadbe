use crate::app::ApiError;
use crate::ports::ScheduleStore;
use crate::push::PushRuntime;
use crate::state;
use crate::types::push::{ScheduleToken, SubscriptionId};

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusQuery {
    sub_id: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusResponse {
    sub_id: String,
    active_schedule_id: Option<ScheduleToken>,
    is_stopped: bool,
}

pub(crate) async fn status<R: PushRuntime>(
    State(state): State<state::AppState<R>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let authorized = match (&state.config.debug_token, &query.token) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };
    if !authorized {
        return Err(ApiError::Forbidden);
    }

    let sub_id = match query.sub_id.filter(|sub_id| !sub_id.is_empty()) {
        Some(sub_id) => sub_id,
        None => return Err(ApiError::BadRequest("Missing subId")),
    };
    let id = SubscriptionId::from_raw(sub_id);
    let status = state.runtime.store().get_status(&id).await.map_err(|err| {
        tracing::error!(sub_id = %id, error = %err, "failed to read schedule status");
        ApiError::Internal(err.to_string())
    })?;

    Ok(Json(StatusResponse {
        sub_id: id.to_string(),
        active_schedule_id: status.active_token,
        is_stopped: status.stopped,
    }))
}
