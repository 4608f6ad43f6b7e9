//! JSON frames exchanged with the VoiceNet realtime endpoint.
//!
//! Inbound frames are decoded into the closed [`StreamEvent`] set at this
//! boundary; nothing past this module sees a loosely-typed payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The answer to a [`ToolCall`], produced by a tool executor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub result: Value,
}

impl ToolResult {
    /// Wraps the result in the `tool.result` frame for the given call.
    pub fn into_frame(self, call_id: impl Into<String>) -> OutboundFrame {
        OutboundFrame::ToolResult {
            tool_call_id: self.tool_call_id,
            name: self.name,
            result: self.result,
            call_id: call_id.into(),
        }
    }
}

/// Frames sent from this client to the realtime endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "subscribe")]
    Subscribe {
        #[serde(rename = "callId")]
        call_id: String,
    },
    #[serde(rename = "tool.result")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        result: Value,
        #[serde(rename = "callId")]
        call_id: String,
    },
}

impl OutboundFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Raw inbound frame as it appears on the wire.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
enum InboundFrame {
    #[serde(rename = "tool.call")]
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    #[serde(rename = "call.transferred")]
    CallTransferred {
        #[serde(default)]
        target: String,
    },
    #[serde(rename = "call.ended")]
    CallEnded {
        #[serde(default)]
        reason: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: String,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Events the stream emits to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The agent wants a tool executed.
    ToolCall(ToolCall),
    /// The backend transferred the call.
    Transferred { target: String },
    /// The call is over; the stream closes itself after this event.
    Ended { reason: String },
    /// The backend reported an error for this call.
    Error { code: String, message: String },
    /// The transport failed. Emitted at most once, always last.
    Fault(String),
}

/// Decodes one text frame.
///
/// `Ok(None)` means the frame was well formed but of a type this client does
/// not handle.
pub fn decode(text: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    Ok(match frame {
        InboundFrame::ToolCall { tool_call } => Some(StreamEvent::ToolCall(tool_call)),
        InboundFrame::CallTransferred { target } => Some(StreamEvent::Transferred { target }),
        InboundFrame::CallEnded { reason } => Some(StreamEvent::Ended { reason }),
        InboundFrame::Error { code, message } => Some(StreamEvent::Error { code, message }),
        InboundFrame::Unknown => None,
    })
}
