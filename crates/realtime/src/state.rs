//! Transport-independent state machine for one call's event stream.

use crate::{
    StreamError,
    protocol::{self, OutboundFrame, StreamEvent},
};
use std::fmt;
use tracing::{debug, warn};

/// Connection state of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Subscribed,
    Streaming,
    Closing,
    Closed,
    Faulted,
}

impl StreamState {
    /// Whether the stream has stopped for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Faulted)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Connecting => "connecting",
            StreamState::Subscribed => "subscribed",
            StreamState::Streaming => "streaming",
            StreamState::Closing => "closing",
            StreamState::Closed => "closed",
            StreamState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Tracks the stream state and decodes frames for one call.
///
/// The socket driver feeds transport happenings in and writes out whatever
/// this returns, so every transition can be exercised without a network.
#[derive(Debug)]
pub struct StreamMachine {
    call_id: String,
    state: StreamState,
}

impl StreamMachine {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            state: StreamState::Connecting,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The transport is open: returns the subscribe frame to send first.
    pub fn on_open(&mut self) -> OutboundFrame {
        self.state = StreamState::Subscribed;
        OutboundFrame::Subscribe {
            call_id: self.call_id.clone(),
        }
    }

    /// Handles one inbound text frame.
    ///
    /// Malformed frames are logged and dropped without touching the state.
    pub fn on_text(&mut self, text: &str) -> Option<StreamEvent> {
        if self.state.is_terminal() || self.state == StreamState::Closing {
            debug!(call_id = %self.call_id, state = %self.state, "Dropping frame received after close");
            return None;
        }
        let event = match protocol::decode(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Dropping malformed frame");
                return None;
            }
        };
        if self.state == StreamState::Subscribed {
            self.state = StreamState::Streaming;
        }
        match &event {
            Some(StreamEvent::Ended { .. }) => self.state = StreamState::Closing,
            Some(_) => {}
            None => debug!(call_id = %self.call_id, "Ignoring frame of unhandled type"),
        }
        event
    }

    /// Serializes an outbound frame, refusing when the stream is not live.
    pub fn outbound(&self, frame: &OutboundFrame) -> Result<String, StreamError> {
        if self.state != StreamState::Streaming {
            return Err(StreamError::NotConnected(self.state));
        }
        Ok(frame.to_text()?)
    }

    /// Whether a keepalive probe should go out on this tick.
    pub fn wants_keepalive(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// Local teardown has begun.
    pub fn begin_close(&mut self) {
        if !self.state.is_terminal() {
            self.state = StreamState::Closing;
        }
    }

    /// The transport is gone without error.
    pub fn on_closed(&mut self) {
        if self.state != StreamState::Faulted {
            self.state = StreamState::Closed;
        }
    }

    /// The transport failed.
    pub fn on_fault(&mut self) {
        self.state = StreamState::Faulted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolResult;
    use serde_json::json;

    fn streaming_machine() -> StreamMachine {
        let mut machine = StreamMachine::new("c1");
        machine.on_open();
        machine.on_text(r#"{"type":"hello"}"#);
        machine
    }

    #[test]
    fn test_open_sends_subscribe() {
        let mut machine = StreamMachine::new("c1");
        assert_eq!(machine.state(), StreamState::Connecting);
        let frame = machine.on_open();
        assert_eq!(
            frame,
            OutboundFrame::Subscribe {
                call_id: "c1".to_string()
            }
        );
        assert_eq!(machine.state(), StreamState::Subscribed);
    }

    #[test]
    fn test_first_frame_moves_to_streaming() {
        let machine = streaming_machine();
        assert_eq!(machine.state(), StreamState::Streaming);
    }

    #[test]
    fn test_call_ended_closes() {
        let mut machine = streaming_machine();
        let event = machine.on_text(r#"{"type":"call.ended","reason":"hangup"}"#);
        assert_eq!(
            event,
            Some(StreamEvent::Ended {
                reason: "hangup".to_string()
            })
        );
        assert_eq!(machine.state(), StreamState::Closing);
        assert_eq!(machine.on_text(r#"{"type":"call.ended","reason":"again"}"#), None);
        machine.on_closed();
        assert_eq!(machine.state(), StreamState::Closed);
    }

    #[test]
    fn test_malformed_frame_keeps_state() {
        let mut machine = StreamMachine::new("c1");
        machine.on_open();
        assert_eq!(machine.on_text("{{{"), None);
        assert_eq!(machine.state(), StreamState::Subscribed);

        let mut machine = streaming_machine();
        assert_eq!(machine.on_text("garbage"), None);
        assert_eq!(machine.state(), StreamState::Streaming);
    }

    #[test]
    fn test_outbound_requires_streaming() {
        let frame = ToolResult {
            tool_call_id: "t1".to_string(),
            name: Some("transfer_call".to_string()),
            result: json!({"ok": true}),
        }
        .into_frame("c1");

        let mut machine = StreamMachine::new("c1");
        assert!(matches!(
            machine.outbound(&frame),
            Err(StreamError::NotConnected(StreamState::Connecting))
        ));
        machine.on_open();
        assert!(matches!(
            machine.outbound(&frame),
            Err(StreamError::NotConnected(StreamState::Subscribed))
        ));

        let machine = streaming_machine();
        let text = machine.outbound(&frame).unwrap();
        assert!(text.contains(r#""toolCallId":"t1""#));
    }

    #[test]
    fn test_keepalive_only_while_streaming() {
        let mut machine = StreamMachine::new("c1");
        assert!(!machine.wants_keepalive());
        machine.on_open();
        assert!(!machine.wants_keepalive());
        machine.on_text(r#"{"type":"error","code":"x","message":"y"}"#);
        assert!(machine.wants_keepalive());
        machine.begin_close();
        assert!(!machine.wants_keepalive());
    }

    #[test]
    fn test_fault_is_sticky() {
        let mut machine = streaming_machine();
        machine.on_fault();
        machine.on_closed();
        assert_eq!(machine.state(), StreamState::Faulted);
        machine.begin_close();
        assert_eq!(machine.state(), StreamState::Faulted);
    }
}
