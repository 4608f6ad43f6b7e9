//! Per-call session orchestration.
//!
//! A session goes `Idle -> CreatingSession -> Streaming -> Ending -> Ended`,
//! or to `Failed` when creation or the stream breaks. Each streaming session
//! runs in its own task, which owns the [`EventStream`] and forwards every
//! event to the output channel as a [`SessionOutput`].

use crate::{
    command::CommandClient,
    error::{ErrorCode, ErrorOutcome, VoiceError},
    model::{CallItem, CreateSessionRequest, PromptConfig, SessionOutput, ToolCallOutput},
    registry::{CallSessionRegistry, SessionState, SessionToken},
    tools::ToolRegistry,
};
use secrecy::SecretString;
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{Instrument, debug, error, info, instrument, warn};
use voicenet_realtime::{
    EventStream, NoReconnect, ReconnectPolicy, StreamConfig, StreamEvent, ToolResult,
    derive_endpoint,
    stream::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL},
};

/// Where and how sessions connect.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub base_url: String,
    /// Overrides the endpoint derived from `base_url`.
    pub runtime_url: Option<String>,
    pub api_key: SecretString,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl OrchestratorConfig {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            runtime_url: None,
            api_key,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn stream_config(&self) -> Result<StreamConfig, VoiceError> {
        let endpoint = match self.runtime_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => derive_endpoint(&self.base_url)?,
        };
        Ok(StreamConfig {
            endpoint,
            api_key: self.api_key.clone(),
            connect_timeout: self.connect_timeout,
            keepalive_interval: self.keepalive_interval,
        })
    }
}

pub struct SessionOrchestrator {
    commands: Arc<dyn CommandClient>,
    tools: Arc<ToolRegistry>,
    registry: CallSessionRegistry,
    config: OrchestratorConfig,
    reconnect: Arc<dyn ReconnectPolicy>,
    outputs: mpsc::Sender<SessionOutput>,
    tasks: Mutex<JoinSet<()>>,
    closing: AtomicBool,
    /// Number of `start_session` calls in flight.
    creating: watch::Sender<usize>,
}

/// Counts one in-flight session start for as long as it lives.
struct Creation<'a>(&'a watch::Sender<usize>);

impl<'a> Creation<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for Creation<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

impl SessionOrchestrator {
    pub fn new(
        commands: Arc<dyn CommandClient>,
        tools: Arc<ToolRegistry>,
        config: OrchestratorConfig,
        outputs: mpsc::Sender<SessionOutput>,
    ) -> Self {
        Self {
            commands,
            tools,
            registry: CallSessionRegistry::new(),
            config,
            reconnect: Arc::new(NoReconnect),
            outputs,
            tasks: Mutex::new(JoinSet::new()),
            closing: AtomicBool::new(false),
            creating: watch::Sender::new(0),
        }
    }

    /// Policy consulted when a stream connection attempt fails.
    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn registry(&self) -> &CallSessionRegistry {
        &self.registry
    }

    pub fn commands(&self) -> &Arc<dyn CommandClient> {
        &self.commands
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Handles one call item: a tool result is routed to the call's stream,
    /// anything else starts a session.
    pub async fn process(&self, item: CallItem, prompt: &PromptConfig) -> Result<(), VoiceError> {
        match item.tool_result {
            Some(result) => self.submit_tool_result(&item.call_id, result).await,
            None => self.start_session(&item.call_id, prompt).await,
        }
    }

    /// Creates the backend session, opens its stream and spawns the session task.
    ///
    /// A failure after the call was reserved is also emitted as a
    /// `SESSION_CREATE_ERROR` output for the call, as is a start refused
    /// because [`shutdown`](Self::shutdown) has begun.
    #[instrument(skip(self, prompt))]
    pub async fn start_session(&self, call_id: &str, prompt: &PromptConfig) -> Result<(), VoiceError> {
        let _creation = Creation::enter(&self.creating);
        if self.closing.load(Ordering::SeqCst) {
            warn!("Shutting down, not starting a session");
            return Err(self.refuse(call_id, "orchestrator is shutting down").await);
        }

        let token = self.registry.reserve(call_id)?;
        let request = CreateSessionRequest::new(call_id, self.tools.descriptors(), prompt);
        info!(tools = request.tools.len(), "Creating session");

        let stream = match self.open(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Session creation failed");
                self.registry.set_state(call_id, token, SessionState::Failed);
                self.registry.release(call_id, token);
                return Err(self.refuse(call_id, &e.to_string()).await);
            }
        };

        // Shutdown may have begun while the session was being created.
        if self.closing.load(Ordering::SeqCst) {
            info!("Shutdown began during creation, closing stream");
            stream.handle().close().await;
            stream.join().await;
            self.registry.set_state(call_id, token, SessionState::Failed);
            self.registry.release(call_id, token);
            return Err(self.refuse(call_id, "orchestrator shut down during session creation").await);
        }

        if !self.registry.attach(call_id, token, stream.handle()) {
            warn!("Session was released during creation, closing stream");
            stream.handle().close().await;
            stream.join().await;
            return Err(VoiceError::SessionNotFound(call_id.to_string()));
        }

        let span = tracing::info_span!("call_session", %call_id);
        let task = run_session(
            call_id.to_string(),
            token,
            stream,
            self.registry.clone(),
            self.outputs.clone(),
        )
        .instrument(span);

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        Ok(())
    }

    async fn open(&self, request: &CreateSessionRequest) -> Result<EventStream, VoiceError> {
        self.commands.create_session(request).await?;
        let config = self.config.stream_config()?;
        let stream =
            EventStream::connect_with_policy(&config, &request.call_id, self.reconnect.as_ref())
                .await?;
        Ok(stream)
    }

    /// Sends a tool result over the call's open stream.
    pub async fn submit_tool_result(&self, call_id: &str, result: ToolResult) -> Result<(), VoiceError> {
        let Some(stream) = self.registry.stream(call_id) else {
            warn!(%call_id, tool_call_id = %result.tool_call_id, "No session for tool result");
            return Err(VoiceError::SessionNotFound(call_id.to_string()));
        };
        debug!(%call_id, tool_call_id = %result.tool_call_id, "Forwarding tool result");
        stream.send(result.into_frame(call_id)).await?;
        Ok(())
    }

    /// Closes one call's stream and waits for it to finish.
    pub async fn stop(&self, call_id: &str) -> Result<(), VoiceError> {
        let Some(stream) = self.registry.stream(call_id) else {
            return Err(VoiceError::SessionNotFound(call_id.to_string()));
        };
        info!(%call_id, "Stopping session");
        stream.close().await;
        stream.closed().await;
        Ok(())
    }

    /// Emits `error` as an output for `call_id`.
    ///
    /// For failures that happen outside a session, such as a call that could
    /// not be answered.
    pub async fn report(&self, call_id: &str, error: &VoiceError) {
        self.emit(SessionOutput::Error(error.to_outcome(call_id))).await;
    }

    /// Refuses new sessions, waits for starts in flight, closes every open
    /// stream and waits for all session tasks.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let mut creating = self.creating.subscribe();
        let _ = creating.wait_for(|n| *n == 0).await;

        let sessions = self.registry.active();
        info!(sessions = sessions.len(), "Shutting down sessions");
        for session in sessions {
            if let Some(stream) = self.registry.stream(&session.call_id) {
                stream.close().await;
            }
        }
        self.join_sessions().await;
    }

    /// Waits for the session tasks spawned so far.
    pub async fn join_sessions(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = ?e, "Session task panicked");
            }
        }
    }

    async fn refuse(&self, call_id: &str, reason: &str) -> VoiceError {
        let err = VoiceError::SessionCreate(reason.to_string());
        self.report(call_id, &err).await;
        err
    }

    async fn emit(&self, output: SessionOutput) {
        if self.outputs.send(output).await.is_err() {
            warn!("Session output receiver dropped");
        }
    }
}

/// Drives one call: forwards events until the stream finishes, then
/// removes the call from the registry.
async fn run_session(
    call_id: String,
    token: SessionToken,
    mut stream: EventStream,
    registry: CallSessionRegistry,
    outputs: mpsc::Sender<SessionOutput>,
) {
    info!("Session streaming");
    let mut forwarding = true;

    while let Some(event) = stream.next_event().await {
        let output = match event {
            StreamEvent::ToolCall(call) => SessionOutput::ToolCall(ToolCallOutput {
                tool_call_id: call.id,
                name: call.name,
                args: call.args,
                call_id: call_id.clone(),
            }),
            StreamEvent::Transferred { target } => SessionOutput::CallTransferred {
                call_id: call_id.clone(),
                target,
            },
            StreamEvent::Ended { reason } => {
                info!(%reason, "Call ended");
                registry.set_state(&call_id, token, SessionState::Ending);
                registry.release(&call_id, token);
                SessionOutput::CallEnded {
                    call_id: call_id.clone(),
                    reason,
                }
            }
            StreamEvent::Error { code, message } => {
                warn!(%code, %message, "Backend reported an error");
                SessionOutput::Error(ErrorOutcome {
                    code,
                    message,
                    call_id: call_id.clone(),
                })
            }
            StreamEvent::Fault(message) => {
                registry.set_state(&call_id, token, SessionState::Failed);
                registry.release(&call_id, token);
                SessionOutput::Error(ErrorOutcome::new(
                    ErrorCode::StreamFault,
                    message,
                    call_id.clone(),
                ))
            }
        };

        if forwarding && outputs.send(output).await.is_err() {
            warn!("Session output receiver dropped, closing stream");
            forwarding = false;
            stream.handle().close().await;
        }
    }

    let state = stream.join().await;
    registry.release(&call_id, token);
    info!(final_state = %state, "Session finished");
}
