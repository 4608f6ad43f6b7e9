use std::time::Duration;

/// Errors raised by the call event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("api key is not a valid header value")]
    InvalidApiKey,
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream is not connected (state: {0})")]
    NotConnected(crate::StreamState),
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("stream task has stopped")]
    Closed,
}

impl StreamError {
    /// Whether the error came from the underlying socket rather than from
    /// local misuse of the stream.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::Transport(_) | StreamError::ConnectTimeout { .. }
        )
    }
}
