//! Data shared between the command client, the orchestrator and callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use voicenet_realtime::ToolResult;

use crate::error::ErrorOutcome;

/// A telephony call as announced by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub call_id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Prompt settings sent with the session-creation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    pub prompt_base: String,
    pub user_instructions: String,
    pub locale: String,
    pub barge_in: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompt_base: "You are a helpful voice assistant. Be concise and friendly.".to_string(),
            user_instructions: String::new(),
            locale: "it-IT".to_string(),
            barge_in: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    #[default]
    Function,
}

/// A function the agent may invoke during the call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    #[serde(rename = "type", default)]
    pub tool_type: ToolType,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    /// Normalizes one offered item.
    ///
    /// Accepts a bare descriptor (`{"type":"function","name":...}`) or one
    /// wrapped as `{"tool": {...}}`. Anything else yields `None`.
    pub fn normalize(item: &Value) -> Option<Self> {
        let is_bare = item.get("type").and_then(Value::as_str) == Some("function")
            && item.get("name").and_then(Value::as_str).is_some();
        let candidate = if is_bare { item } else { item.get("tool")? };
        let descriptor: ToolDescriptor = serde_json::from_value(candidate.clone()).ok()?;
        if descriptor.name.trim().is_empty() {
            return None;
        }
        Some(descriptor)
    }
}

/// Body of `POST /session.create`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub call_id: String,
    pub tools: Vec<ToolDescriptor>,
    pub prompt_base: String,
    pub user_instr: String,
    pub locale: String,
    pub barge_in: bool,
}

impl CreateSessionRequest {
    pub fn new(call_id: &str, tools: Vec<ToolDescriptor>, prompt: &PromptConfig) -> Self {
        Self {
            call_id: call_id.to_string(),
            tools,
            prompt_base: prompt.prompt_base.clone(),
            user_instr: prompt.user_instructions.clone(),
            locale: prompt.locale.clone(),
            barge_in: prompt.barge_in,
        }
    }
}

/// Where the audio for a `play` command comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaySource {
    Url { url: String },
    LibraryAsset { asset_id: String },
    BinaryUpload {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlayStarted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_id: Option<String>,
}

/// An entry of the backend's media library.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DispatchRule {
    pub did: String,
}

/// Body of `POST /integrations/dispatch/register`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRegistration {
    pub workflow_id: String,
    pub node_id: String,
    pub callback_url: String,
    pub rule: DispatchRule,
    pub events: Vec<String>,
}

impl DispatchRegistration {
    /// Subscribes `callback_url` to incoming calls dialed to `did`.
    pub fn incoming_call(
        workflow_id: impl Into<String>,
        node_id: impl Into<String>,
        callback_url: impl Into<String>,
        did: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            callback_url: callback_url.into(),
            rule: DispatchRule { did: did.into() },
            events: vec!["incoming-call".to_string()],
        }
    }
}

/// One unit of work for the orchestrator.
///
/// An item carrying a tool result is routed to the call's open stream;
/// any other item starts a session for the call.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallItem {
    pub call_id: String,
    #[serde(default)]
    pub tool_result: Option<ToolResult>,
}

impl CallItem {
    pub fn incoming(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_result: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, result: ToolResult) -> Self {
        Self {
            call_id: call_id.into(),
            tool_result: Some(result),
        }
    }
}

/// A tool invocation forwarded to the Tool-Call sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallOutput {
    pub tool_call_id: String,
    pub name: String,
    pub args: Value,
    pub call_id: String,
}

/// Everything a session emits, one variant per output sink.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "output", rename_all = "camelCase")]
pub enum SessionOutput {
    ToolCall(ToolCallOutput),
    #[serde(rename_all = "camelCase")]
    CallTransferred { call_id: String, target: String },
    #[serde(rename_all = "camelCase")]
    CallEnded { call_id: String, reason: String },
    Error(ErrorOutcome),
}

impl SessionOutput {
    pub fn call_id(&self) -> &str {
        match self {
            SessionOutput::ToolCall(call) => &call.call_id,
            SessionOutput::CallTransferred { call_id, .. } => call_id,
            SessionOutput::CallEnded { call_id, .. } => call_id,
            SessionOutput::Error(e) => &e.call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_and_wrapped_shapes_match() {
        let params = json!({"type": "object", "properties": {"target": {"type": "string"}}});
        let bare = json!({
            "type": "function",
            "name": "transfer_call",
            "description": "Transfer the call",
            "parameters": params,
        });
        let wrapped = json!({"tool": {
            "type": "function",
            "name": "transfer_call",
            "description": "Transfer the call",
            "parameters": params,
        }});

        let a = ToolDescriptor::normalize(&bare).unwrap();
        let b = ToolDescriptor::normalize(&wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_normalize_rejects_other_shapes() {
        assert_eq!(ToolDescriptor::normalize(&json!({"name": "x"})), None);
        assert_eq!(
            ToolDescriptor::normalize(&json!({"type": "retrieval", "name": "x"})),
            None
        );
        assert_eq!(ToolDescriptor::normalize(&json!({"tool": "x"})), None);
        assert_eq!(
            ToolDescriptor::normalize(&json!({"tool": {"type": "function", "name": ""}})),
            None
        );
        assert_eq!(ToolDescriptor::normalize(&json!(null)), None);
    }

    #[test]
    fn test_create_session_request_shape() {
        let request = CreateSessionRequest::new("c1", vec![], &PromptConfig::default());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "callId": "c1",
                "tools": [],
                "promptBase": "You are a helpful voice assistant. Be concise and friendly.",
                "userInstr": "",
                "locale": "it-IT",
                "bargeIn": true
            })
        );
    }

    #[test]
    fn test_null_description_keeps_tool() {
        let descriptor = ToolDescriptor::normalize(&json!({
            "type": "function",
            "name": "lookup",
            "description": null,
        }))
        .unwrap();
        assert_eq!(descriptor.name, "lookup");
        assert_eq!(descriptor.description, "");
        assert_eq!(descriptor.parameters, empty_parameters());
    }

    #[test]
    fn test_session_output_shape() {
        let output = SessionOutput::CallEnded {
            call_id: "c1".to_string(),
            reason: "hangup".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"output": "callEnded", "callId": "c1", "reason": "hangup"})
        );
        assert_eq!(output.call_id(), "c1");
    }
}
