//! Client for the VoiceNet realtime event stream.
//!
//! One [`EventStream`] is opened per call session. It performs the subscribe
//! handshake, keeps the socket alive, decodes inbound frames into
//! [`StreamEvent`]s and carries tool results back to the backend.

pub mod endpoint;
mod error;
pub mod protocol;
pub mod reconnect;
mod state;
pub mod stream;

pub use endpoint::derive_endpoint;
pub use error::StreamError;
pub use protocol::{OutboundFrame, StreamEvent, ToolCall, ToolResult};
pub use reconnect::{ExponentialBackoff, NoReconnect, ReconnectPolicy};
pub use state::{StreamMachine, StreamState};
pub use stream::{EventStream, StreamConfig, StreamHandle};
