//! Call-session orchestration for the VoiceNet backend.
//!
//! [`SessionOrchestrator`] owns live calls: it creates the backend session
//! through a [`CommandClient`], opens the call's realtime stream and turns
//! stream events into [`SessionOutput`]s. Tool results travel back over the
//! same stream.

pub mod command;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod tools;
pub mod transfer;

pub use command::{CommandClient, HttpCommandClient};
pub use error::{CommandKind, ErrorCode, ErrorOutcome, FailureKind, Outcome, VoiceError};
pub use model::{
    Call, CallItem, CreateSessionRequest, DispatchRegistration, MediaAsset, PlaySource,
    PlayStarted, PromptConfig, SessionOutput, ToolCallOutput, ToolDescriptor,
};
pub use orchestrator::{OrchestratorConfig, SessionOrchestrator};
pub use registry::{CallSessionRegistry, SessionState, SessionSummary};
pub use tools::{ToolExecutor, ToolProvider, ToolRegistry};
pub use transfer::TransferCallTool;
pub use voicenet_realtime::{ExponentialBackoff, NoReconnect, ReconnectPolicy, ToolResult};
