//! API request handlers, including the upstream stream relay.

use std::convert::Infallible;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::upstream::{SendPromptRequest, UpstreamReply};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// CORS preflight. The CORS layer adds the permissive headers; this
/// handler only pins the 200-with-empty-body contract.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Fallback for any method other than POST/OPTIONS on the API routes.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// `POST /send-prompt`: validate, forward to the upstream API, and
/// either relay the live byte stream or return the buffered JSON body.
pub async fn send_prompt(
    State(state): State<AppState>,
    Json(request): Json<SendPromptRequest>,
) -> ApiResult<Response> {
    require_non_empty(
        &[
            &request.prompt,
            &request.user_id,
            &request.node_id,
            &request.run_id,
        ],
        "Missing required fields: prompt, user_id, node_id, run_id",
    )?;

    let upstream = state.upstream.as_ref().ok_or(ApiError::Configuration)?;

    match upstream.send_prompt(&request).await? {
        UpstreamReply::Stream(response) => relay_stream(response),
        UpstreamReply::Json(body) => Ok(Json(body).into_response()),
    }
}

/// Request body for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct GetHistoryRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub run_id: String,
}

/// `POST /get-history`: forward to the upstream history endpoint and
/// mirror its JSON body.
pub async fn get_history(
    State(state): State<AppState>,
    Json(request): Json<GetHistoryRequest>,
) -> ApiResult<Json<Value>> {
    require_non_empty(
        &[&request.user_id, &request.node_id, &request.run_id],
        "Missing required fields: user_id, node_id, run_id",
    )?;

    let upstream = state.upstream.as_ref().ok_or(ApiError::Configuration)?;

    let body = upstream
        .get_history(&request.user_id, &request.node_id, &request.run_id)
        .await?;

    Ok(Json(body))
}

fn require_non_empty(fields: &[&str], message: &str) -> ApiResult<()> {
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ApiError::bad_request(message));
    }
    Ok(())
}

/// Relay an upstream byte stream to the caller without buffering.
///
/// Headers are committed before the first chunk, so a mid-stream read
/// error cannot be reported as a status change; the outbound body simply
/// ends and the caller observes a premature close. The body stream is
/// pulled by the downstream connection, so a slow consumer throttles the
/// upstream read instead of growing a buffer.
fn relay_stream(response: reqwest::Response) -> ApiResult<Response> {
    let stream = response.bytes_stream().scan((), |_, item| {
        futures::future::ready(match item {
            Ok(bytes) => Some(Ok::<_, Infallible>(bytes)),
            Err(err) => {
                warn!("upstream stream ended early: {err}");
                None
            }
        })
    });

    debug!("relaying upstream stream to client");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        // Disable nginx buffering if present
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|err| ApiError::Internal(err.into()))
}
