//! API Models
//!
//! Request and response bodies of the HTTP surface, annotated for `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use voicenet_core::{Call, MediaAsset, Outcome, PlaySource, SessionSummary};

/// Envelope of a backend webhook delivery.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub call: Option<WebhookCall>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCall {
    pub call_id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallView {
    #[schema(example = "call-123")]
    pub call_id: String,
    #[schema(example = "+391234567")]
    pub from: String,
    #[schema(example = "+390212345")]
    pub to: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<Call> for CallView {
    fn from(call: Call) -> Self {
        Self {
            call_id: call.call_id,
            from: call.from,
            to: call.to,
            timestamp: call.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    #[schema(example = "Call accepted")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallView>,
}

impl WebhookResponse {
    pub fn message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            call: None,
        }
    }
}

#[derive(Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "libraryAsset")]
    LibraryAsset,
    #[serde(rename = "fileBinary")]
    FileBinary,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlayPayload {
    #[schema(example = "url")]
    pub source_type: SourceType,
    #[schema(example = "https://cdn.example.com/welcome.wav")]
    pub audio_url: Option<String>,
    pub asset_id: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub barge_in: bool,
}

impl PlayPayload {
    /// Resolves the payload to a play source, naming the missing field on failure.
    pub fn source(&self) -> Result<PlaySource, String> {
        match self.source_type {
            SourceType::Url => self
                .audio_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .map(|url| PlaySource::Url { url })
                .ok_or_else(|| "'audioUrl' is required for sourceType 'url'".to_string()),
            SourceType::LibraryAsset => self
                .asset_id
                .clone()
                .filter(|a| !a.trim().is_empty())
                .map(|asset_id| PlaySource::LibraryAsset { asset_id })
                .ok_or_else(|| "'assetId' is required for sourceType 'libraryAsset'".to_string()),
            SourceType::FileBinary => Ok(PlaySource::BinaryUpload {
                data: Vec::new(),
                mime_type: self.mime_type.clone(),
            }),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct SayPayload {
    #[schema(example = "Please hold while I transfer you.")]
    pub text: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct TransferPayload {
    #[schema(example = "100")]
    pub target: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    #[schema(example = "tool-call-1")]
    pub tool_call_id: String,
    pub name: Option<String>,
    #[schema(value_type = Object)]
    pub result: Value,
}

/// Per-call result record returned by every call endpoint.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    #[schema(example = "success")]
    pub status: String,
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "COMMAND_FAILED")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Outcome<Value>> for CommandOutcome {
    fn from(outcome: Outcome<Value>) -> Self {
        match outcome {
            Outcome::Success { call_id, data } => Self {
                status: "success".to_string(),
                call_id,
                data: Some(data).filter(|d| !d.is_null()),
                code: None,
                message: None,
            },
            Outcome::Error(e) => Self {
                status: "error".to_string(),
                call_id: e.call_id,
                data: None,
                code: Some(e.code),
                message: Some(e.message),
            },
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub call_id: String,
    #[schema(example = "streaming")]
    pub state: String,
}

impl From<SessionSummary> for SessionView {
    fn from(summary: SessionSummary) -> Self {
        Self {
            call_id: summary.call_id,
            state: summary.state.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct MediaAssetView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl From<MediaAsset> for MediaAssetView {
    fn from(asset: MediaAsset) -> Self {
        Self {
            id: asset.id,
            name: asset.name,
            description: asset.description,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub active_sessions: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

/// Body of a rejected webhook delivery.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SignatureErrorResponse {
    #[schema(example = "Invalid signature")]
    pub error: String,
}
