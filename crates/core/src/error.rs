use serde::Serialize;
use std::fmt;
use voicenet_realtime::StreamError;

/// Stable error codes carried in error outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    CommandFailed,
    UnsupportedSource,
    SessionCreateError,
    SessionNotFound,
    SessionActive,
    StreamFault,
    InvalidConfig,
    Unauthorized,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::CommandFailed => "COMMAND_FAILED",
            ErrorCode::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ErrorCode::SessionCreateError => "SESSION_CREATE_ERROR",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionActive => "SESSION_ACTIVE",
            ErrorCode::StreamFault => "STREAM_FAULT",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend command a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Answer,
    Play,
    Say,
    Transfer,
    CreateSession,
    ListMediaAssets,
    RegisterDispatch,
    UnregisterDispatch,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Answer => "answer",
            CommandKind::Play => "play",
            CommandKind::Say => "say",
            CommandKind::Transfer => "transfer",
            CommandKind::CreateSession => "session-create",
            CommandKind::ListMediaAssets => "media-assets",
            CommandKind::RegisterDispatch => "dispatch-register",
            CommandKind::UnregisterDispatch => "dispatch-unregister",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Timeout,
    Rejected { status: u16 },
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => f.write_str("transport"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Rejected { status } => write!(f, "rejected with status {status}"),
            FailureKind::Decode => f.write_str("decode"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("{command} command failed ({kind}): {message}")]
    CommandFailed {
        command: CommandKind,
        kind: FailureKind,
        message: String,
    },
    #[error("unsupported play source: {0}")]
    UnsupportedSource(String),
    #[error("session creation failed: {0}")]
    SessionCreate(String),
    #[error("no active session for call '{0}'")]
    SessionNotFound(String),
    #[error("a session is already active for call '{0}'")]
    SessionActive(String),
    #[error("stream fault: {0}")]
    Stream(#[from] StreamError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VoiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VoiceError::CommandFailed { .. } => ErrorCode::CommandFailed,
            VoiceError::UnsupportedSource(_) => ErrorCode::UnsupportedSource,
            VoiceError::SessionCreate(_) => ErrorCode::SessionCreateError,
            VoiceError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            VoiceError::SessionActive(_) => ErrorCode::SessionActive,
            VoiceError::Stream(_) => ErrorCode::StreamFault,
            VoiceError::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    /// Structured payload for this error, attributed to `call_id`.
    pub fn to_outcome(&self, call_id: impl Into<String>) -> ErrorOutcome {
        ErrorOutcome::new(self.code(), self.to_string(), call_id)
    }
}

/// Error half of an outcome record: `{code, message, callId}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutcome {
    pub code: String,
    pub message: String,
    pub call_id: String,
}

impl ErrorOutcome {
    pub fn new(code: ErrorCode, message: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            call_id: call_id.into(),
        }
    }
}

/// Per-item result of a command or event, always carrying the call id.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success {
        #[serde(rename = "callId")]
        call_id: String,
        data: T,
    },
    Error(ErrorOutcome),
}

impl<T> Outcome<T> {
    pub fn from_result(call_id: impl Into<String>, result: Result<T, VoiceError>) -> Self {
        let call_id = call_id.into();
        match result {
            Ok(data) => Outcome::Success { call_id, data },
            Err(e) => Outcome::Error(e.to_outcome(call_id)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn call_id(&self) -> &str {
        match self {
            Outcome::Success { call_id, .. } => call_id,
            Outcome::Error(e) => &e.call_id,
        }
    }
}
