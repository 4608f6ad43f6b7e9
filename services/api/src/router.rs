//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the webhook, the call command surface and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CallView, CommandOutcome, ErrorResponse, HealthResponse, MediaAssetView, PlayPayload,
        SayPayload, SessionView, SignatureErrorResponse, SourceType, ToolResultPayload,
        TransferPayload, WebhookResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::voicenet_webhook,
        handlers::answer_call,
        handlers::play_audio,
        handlers::say_text,
        handlers::transfer_call,
        handlers::submit_tool_result,
        handlers::stop_session,
        handlers::list_sessions,
        handlers::list_media_assets,
        handlers::health,
    ),
    components(
        schemas(CallView, WebhookResponse, PlayPayload, SourceType, SayPayload, TransferPayload, ToolResultPayload, CommandOutcome, SessionView, MediaAssetView, HealthResponse, ErrorResponse, SignatureErrorResponse)
    ),
    tags(
        (name = "VoiceNet API", description = "Call control and agent sessions for VoiceNet calls")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/webhooks/voicenet", post(handlers::voicenet_webhook))
        .route("/calls/{id}/answer", post(handlers::answer_call))
        .route("/calls/{id}/play", post(handlers::play_audio))
        .route("/calls/{id}/say", post(handlers::say_text))
        .route("/calls/{id}/transfer", post(handlers::transfer_call))
        .route("/calls/{id}/tool-result", post(handlers::submit_tool_result))
        .route("/calls/{id}/session", delete(handlers::stop_session))
        .route("/sessions", get(handlers::list_sessions))
        .route("/media/assets", get(handlers::list_media_assets))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
