//! Axum Handlers for the REST API
//!
//! Webhook intake, the per-call command surface and session inspection.
//! Each handler carries `utoipa` annotations for the OpenAPI document.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use voicenet_core::{Call, ErrorCode, Outcome, ToolResult, VoiceError};

use crate::{
    models::{
        CallView, CommandOutcome, ErrorResponse, HealthResponse, MediaAssetView, PlayPayload,
        SayPayload, SessionView, SignatureErrorResponse, ToolResultPayload, TransferPayload,
        WebhookEvent, WebhookResponse,
    },
    signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    state::AppState,
};

const INCOMING_CALL: &str = "incoming-call";

pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    /// A failed call operation, rendered as that call's error outcome.
    Call {
        call_id: String,
        error: VoiceError,
    },
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    pub fn call(call_id: &str, error: VoiceError) -> Self {
        Self::Call {
            call_id: call_id.to_string(),
            error,
        }
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::CommandFailed | ErrorCode::SessionCreateError => StatusCode::BAD_GATEWAY,
        ErrorCode::UnsupportedSource => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::SessionActive | ErrorCode::StreamFault => StatusCode::CONFLICT,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::InvalidConfig => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(SignatureErrorResponse {
                    error: "Invalid signature".to_string(),
                }),
            )
                .into_response(),
            ApiError::Call { call_id, error } => {
                let status = status_for(error.code());
                if status.is_server_error() {
                    error!(%call_id, error = %error, "Call operation failed");
                }
                let outcome = CommandOutcome::from(Outcome::<Value>::from_result(call_id, Err(error)));
                (status, Json(outcome)).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn success(call_id: &str, data: Value) -> Json<CommandOutcome> {
    Json(CommandOutcome::from(Outcome::Success {
        call_id: call_id.to_string(),
        data,
    }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive a VoiceNet webhook delivery.
///
/// An `incoming-call` event is acknowledged immediately; answering the call
/// and starting its agent session happen in the background.
#[utoipa::path(
    post,
    path = "/webhooks/voicenet",
    request_body(content = String, description = "Raw webhook JSON as signed by the backend", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted, ignored or already seen", body = WebhookResponse),
        (status = 400, description = "Malformed event", body = ErrorResponse),
        (status = 401, description = "Signature verification failed", body = SignatureErrorResponse)
    ),
    params(
        ("X-Voice-Signature" = Option<String>, Header, description = "Hex HMAC-SHA256 of `{timestamp}.{body}`"),
        ("X-Voice-Timestamp" = Option<String>, Header, description = "Unix timestamp of the delivery")
    )
)]
pub async fn voicenet_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.signing_secret {
        signature::verify(
            secret.expose_secret().as_bytes(),
            header(&headers, SIGNATURE_HEADER),
            header(&headers, TIMESTAMP_HEADER),
            &body,
            chrono::Utc::now().timestamp(),
            state.config.signature_tolerance,
        )
        .map_err(|e| {
            warn!(error = %e, "Rejected webhook delivery");
            ApiError::Unauthorized
        })?;
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid webhook payload: {e}")))?;

    if event.event_type != INCOMING_CALL {
        info!(event_type = %event.event_type, "Ignoring webhook event");
        return Ok(Json(WebhookResponse::message("Event ignored")));
    }

    // A rejected delivery must not mark its event id as seen.
    let incoming = event
        .call
        .filter(|c| !c.call_id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("incoming-call event without 'call.callId'".to_string()))?;

    if let Some(event_id) = event.event_id.as_deref() {
        if !state.seen_events.insert(event_id) {
            info!(%event_id, "Duplicate webhook event");
            return Ok(Json(WebhookResponse::message("Duplicate event")));
        }
    }

    let call = Call {
        call_id: incoming.call_id,
        from: incoming.from,
        to: incoming.to,
        timestamp: Some(chrono::Utc::now()),
    };
    info!(call_id = %call.call_id, from = %call.from, to = %call.to, "Incoming call");

    tokio::spawn(accept_call(state.clone(), call.call_id.clone()));

    Ok(Json(WebhookResponse {
        message: "Call accepted".to_string(),
        call: Some(CallView::from(call)),
    }))
}

/// Answers the call (when enabled) and hands it to the orchestrator.
#[instrument(skip(state))]
async fn accept_call(state: Arc<AppState>, call_id: String) {
    if state.config.auto_answer {
        if let Err(e) = state.commands.answer(&call_id).await {
            error!(error = %e, "Failed to answer call, not starting a session");
            state.orchestrator.report(&call_id, &e).await;
            return;
        }
    }
    if let Err(e) = state
        .orchestrator
        .start_session(&call_id, &state.config.prompt)
        .await
    {
        warn!(error = %e, code = %e.code(), "Session not started");
    }
}

/// Answer a call.
#[utoipa::path(
    post,
    path = "/calls/{id}/answer",
    responses(
        (status = 200, description = "Call answered", body = CommandOutcome),
        (status = 502, description = "Backend command failed", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn answer_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let data = state
        .commands
        .answer(&call_id)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(&call_id, data))
}

/// Play audio into a call.
#[utoipa::path(
    post,
    path = "/calls/{id}/play",
    request_body = PlayPayload,
    responses(
        (status = 200, description = "Playback started", body = CommandOutcome),
        (status = 400, description = "Missing source field", body = ErrorResponse),
        (status = 422, description = "Unsupported play source", body = CommandOutcome),
        (status = 502, description = "Backend command failed", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn play_audio(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(payload): Json<PlayPayload>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let source = payload.source().map_err(ApiError::BadRequest)?;
    let started = state
        .commands
        .play(&call_id, &source, payload.barge_in)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(&call_id, serde_json::to_value(started)?))
}

/// Speak text into a call.
#[utoipa::path(
    post,
    path = "/calls/{id}/say",
    request_body = SayPayload,
    responses(
        (status = 200, description = "Text queued", body = CommandOutcome),
        (status = 502, description = "Backend command failed", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn say_text(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(payload): Json<SayPayload>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let data = state
        .commands
        .say(&call_id, &payload.text)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(&call_id, data))
}

/// Transfer a call to another extension or number.
#[utoipa::path(
    post,
    path = "/calls/{id}/transfer",
    request_body = TransferPayload,
    responses(
        (status = 200, description = "Transfer requested", body = CommandOutcome),
        (status = 502, description = "Backend command failed", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn transfer_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(payload): Json<TransferPayload>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let data = state
        .commands
        .transfer(&call_id, &payload.target)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(&call_id, data))
}

/// Send a tool result to the call's agent session.
#[utoipa::path(
    post,
    path = "/calls/{id}/tool-result",
    request_body = ToolResultPayload,
    responses(
        (status = 200, description = "Result forwarded", body = CommandOutcome),
        (status = 404, description = "No active session for the call", body = CommandOutcome),
        (status = 409, description = "Session stream is not streaming", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn submit_tool_result(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(payload): Json<ToolResultPayload>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let tool_call_id = payload.tool_call_id.clone();
    let result = ToolResult {
        tool_call_id: payload.tool_call_id,
        name: payload.name,
        result: payload.result,
    };
    state
        .orchestrator
        .submit_tool_result(&call_id, result)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(
        &call_id,
        serde_json::json!({ "toolCallId": tool_call_id }),
    ))
}

/// Tear down a call's agent session.
#[utoipa::path(
    delete,
    path = "/calls/{id}/session",
    responses(
        (status = 200, description = "Session closed", body = CommandOutcome),
        (status = 404, description = "No active session for the call", body = CommandOutcome)
    ),
    params(("id" = String, Path, description = "Call ID"))
)]
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<CommandOutcome>, ApiError> {
    state
        .orchestrator
        .stop(&call_id)
        .await
        .map_err(|e| ApiError::call(&call_id, e))?;
    Ok(success(&call_id, Value::Null))
}

/// List calls with an agent session.
#[utoipa::path(
    get,
    path = "/sessions",
    responses((status = 200, description = "Active sessions", body = [SessionView]))
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionView>> {
    Json(
        state
            .orchestrator
            .registry()
            .active()
            .into_iter()
            .map(SessionView::from)
            .collect(),
    )
}

/// List the backend's media library.
#[utoipa::path(
    get,
    path = "/media/assets",
    responses(
        (status = 200, description = "Media assets", body = [MediaAssetView]),
        (status = 502, description = "Backend request failed", body = ErrorResponse)
    )
)]
pub async fn list_media_assets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MediaAssetView>>, ApiError> {
    let assets = state
        .commands
        .list_media_assets()
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;
    Ok(Json(assets.into_iter().map(MediaAssetView::from).collect()))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.orchestrator.registry().len(),
    })
}
