//! Socket driver for a call's event stream.
//!
//! Each stream runs in its own task. The owner reads [`StreamEvent`]s from the
//! [`EventStream`] and writes frames through cloneable [`StreamHandle`]s.

use crate::{
    StreamError, StreamMachine, StreamState,
    endpoint::connect_url,
    protocol::{OutboundFrame, StreamEvent},
    reconnect::{NoReconnect, ReconnectPolicy},
};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::Message,
    },
};
use tracing::{debug, error, info, warn};

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 32;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings shared by every stream the process opens.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `ws://` or `wss://` endpoint, without the call query.
    pub endpoint: String,
    pub api_key: SecretString,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

enum Command {
    Send {
        frame: OutboundFrame,
        reply: oneshot::Sender<Result<(), StreamError>>,
    },
    Close,
}

/// Cloneable write side of a stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    call_id: String,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<StreamState>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Send { frame, .. } => f.debug_tuple("Send").field(frame).finish(),
            Command::Close => f.write_str("Close"),
        }
    }
}

impl StreamHandle {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Writes a frame, resolving once it is on the socket.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), StreamError> {
        let state = self.state();
        if state != StreamState::Streaming {
            return Err(StreamError::NotConnected(state));
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send { frame, reply })
            .await
            .map_err(|_| StreamError::Closed)?;
        rx.await.map_err(|_| StreamError::Closed)?
    }

    /// Asks the stream to shut down. Does nothing if it already has.
    pub async fn close(&self) {
        if self.commands.send(Command::Close).await.is_err() {
            debug!(call_id = %self.call_id, "Close requested on a finished stream");
        }
    }

    /// Resolves once the stream is closed or faulted.
    pub async fn closed(&self) -> StreamState {
        let mut state = self.state.clone();
        let result = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        match result {
            Ok(s) => s,
            Err(_) => *state.borrow(),
        }
    }
}

/// The read side of a call's stream, plus the task that drives it.
#[derive(Debug)]
pub struct EventStream {
    handle: StreamHandle,
    events: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Opens the stream for `call_id` without retrying.
    pub async fn connect(config: &StreamConfig, call_id: &str) -> Result<Self, StreamError> {
        Self::connect_with_policy(config, call_id, &NoReconnect).await
    }

    /// Opens the stream, consulting `policy` after each failed attempt.
    pub async fn connect_with_policy(
        config: &StreamConfig,
        call_id: &str,
        policy: &dyn ReconnectPolicy,
    ) -> Result<Self, StreamError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::open(config, call_id).await {
                Ok(stream) => return Ok(stream),
                Err(e) => match policy.next_delay(attempt, &e) {
                    Some(delay) => {
                        warn!(%call_id, attempt, ?delay, error = %e, "Stream connection failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn open(config: &StreamConfig, call_id: &str) -> Result<Self, StreamError> {
        let url = connect_url(&config.endpoint, call_id)?;
        let mut request = url.into_client_request()?;
        let api_key = config.api_key.expose_secret();
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(api_key).map_err(|_| StreamError::InvalidApiKey)?;
            request.headers_mut().insert("X-API-Key", value);
        }

        let (mut socket, _) = tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| StreamError::ConnectTimeout {
                endpoint: config.endpoint.clone(),
                timeout: config.connect_timeout,
            })??;
        info!(%call_id, endpoint = %config.endpoint, "Connected to realtime stream.");

        let mut machine = StreamMachine::new(call_id);
        let subscribe = machine.on_open().to_text()?;
        socket.send(Message::Text(subscribe.into())).await?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(machine.state());

        let task = tokio::spawn(drive(
            socket,
            machine,
            commands_rx,
            events_tx,
            state_tx,
            config.keepalive_interval,
        ));

        Ok(Self {
            handle: StreamHandle {
                call_id: call_id.to_string(),
                commands: commands_tx,
                state: state_rx,
            },
            events: events_rx,
            task,
        })
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> StreamState {
        self.handle.state()
    }

    /// Next event in arrival order; `None` once the stream has finished.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Waits for the driver task to exit and returns the final state.
    pub async fn join(self) -> StreamState {
        if let Err(e) = self.task.await {
            error!(call_id = %self.handle.call_id, error = ?e, "Stream task panicked");
            return StreamState::Faulted;
        }
        self.handle.state()
    }
}

/// Main loop for one stream: inbound frames, outbound commands, keepalive.
async fn drive(
    socket: Socket,
    mut machine: StreamMachine,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<StreamEvent>,
    state_tx: watch::Sender<StreamState>,
    keepalive: Duration,
) {
    let (mut sink, mut source) = socket.split();
    let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let event = machine.on_text(text.as_str());
                    state_tx.send_replace(machine.state());
                    let Some(event) = event else { continue };
                    let ended = matches!(event, StreamEvent::Ended { .. });
                    if events.send(event).await.is_err() {
                        debug!(call_id = %machine.call_id(), "Event receiver dropped, closing stream");
                        machine.begin_close();
                        let _ = sink.close().await;
                        machine.on_closed();
                        break;
                    }
                    if ended {
                        info!(call_id = %machine.call_id(), "Call ended, closing stream.");
                        let _ = sink.close().await;
                        machine.on_closed();
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(call_id = %machine.call_id(), ?frame, "Stream closed by peer.");
                    machine.on_closed();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    fault(&mut machine, &events, e.to_string()).await;
                    break;
                }
                None => {
                    info!(call_id = %machine.call_id(), "Stream ended without close frame.");
                    machine.on_closed();
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send { frame, reply }) => match machine.outbound(&frame) {
                    Ok(text) => match sink.send(Message::Text(text.into())).await {
                        Ok(()) => {
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            let message = e.to_string();
                            let _ = reply.send(Err(StreamError::Transport(e)));
                            fault(&mut machine, &events, message).await;
                            break;
                        }
                    },
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                },
                Some(Command::Close) | None => {
                    info!(call_id = %machine.call_id(), "Closing stream on request.");
                    machine.begin_close();
                    state_tx.send_replace(machine.state());
                    let _ = sink.close().await;
                    machine.on_closed();
                    break;
                }
            },
            _ = ticker.tick() => {
                if machine.wants_keepalive() {
                    if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                        fault(&mut machine, &events, e.to_string()).await;
                        break;
                    }
                }
            }
        }
    }

    state_tx.send_replace(machine.state());
}

async fn fault(machine: &mut StreamMachine, events: &mpsc::Sender<StreamEvent>, message: String) {
    error!(call_id = %machine.call_id(), error = %message, "Stream transport failed.");
    machine.on_fault();
    let _ = events.send(StreamEvent::Fault(message)).await;
}
