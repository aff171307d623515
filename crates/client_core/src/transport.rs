//! Command socket with request/acknowledge correlation.
//!
//! At most one command is in flight: [`CommandTransport::send_command`] refuses
//! to send until the device echoes the pending command back verbatim, or the
//! caller clears the pending state. Failures are recorded rather than
//! returned so callers poll [`CommandTransport::has_error`] before acting.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use shared::protocol::DeviceFrame;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::{error::TransportError, ws::TransportConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Connecting,
    Open,
}

/// Snapshot of the transport as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    Closed,
    Connecting,
    Idle,
    Sending(String),
    Errored(String),
}

struct ChannelState {
    link: LinkState,
    // Bumped on every start/stop so callbacks from a replaced connection are ignored.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
    in_flight: Option<String>,
    error: Option<TransportError>,
}

#[derive(Clone)]
pub struct CommandTransport {
    config: Arc<TransportConfig>,
    state: Arc<Mutex<ChannelState>>,
}

impl CommandTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ChannelState {
                link: LinkState::Closed,
                generation: 0,
                outbound: None,
                task: None,
                in_flight: None,
                error: None,
            })),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Open the command socket in the background. Failures are logged and
    /// leave the transport closed.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.link != LinkState::Closed {
            debug!("command socket already started");
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            error!("cannot start command socket outside a tokio runtime");
            return;
        };
        let request = match self.config.client_request() {
            Ok(request) => request,
            Err(err) => {
                warn!("command socket not started: {err:#}");
                return;
            }
        };

        state.generation += 1;
        state.link = LinkState::Connecting;
        let generation = state.generation;
        let transport = self.clone();
        state.task = Some(runtime.spawn(async move {
            transport.run_connection(generation, request).await;
        }));
    }

    /// Close the socket if it is open or opening. Idempotent.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.link == LinkState::Closed && state.task.is_none() {
            return;
        }
        state.generation += 1;
        if state.link == LinkState::Connecting {
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
        // Dropping the sender lets the writer send a close frame and exit.
        state.outbound = None;
        state.task = None;
        state.link = LinkState::Closed;
        info!("command socket stopped");
    }

    /// Tear down and reopen the socket, discarding any pending or failed command.
    pub fn reset(&self) {
        self.stop();
        self.start();
        self.clear_error();
    }

    pub fn is_started(&self) -> bool {
        self.lock().link != LinkState::Closed
    }

    pub fn is_ready(&self) -> bool {
        self.lock().link == LinkState::Open
    }

    pub fn is_sending(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn get_sending(&self) -> Option<String> {
        self.lock().in_flight.clone()
    }

    pub fn has_error(&self) -> bool {
        self.lock().error.is_some()
    }

    pub fn get_error(&self) -> Option<String> {
        self.lock().error.as_ref().map(ToString::to_string)
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.lock().error.clone()
    }

    /// Forget both the pending command and any recorded error.
    pub fn clear_error(&self) {
        let mut state = self.lock();
        state.in_flight = None;
        state.error = None;
    }

    pub fn status(&self) -> TransportStatus {
        let state = self.lock();
        match (state.link, &state.error, &state.in_flight) {
            (LinkState::Closed, _, _) => TransportStatus::Closed,
            (LinkState::Connecting, _, _) => TransportStatus::Connecting,
            (LinkState::Open, Some(error), _) => TransportStatus::Errored(error.to_string()),
            (LinkState::Open, None, Some(command)) => TransportStatus::Sending(command.clone()),
            (LinkState::Open, None, None) => TransportStatus::Idle,
        }
    }

    /// Send `text` as the next command. Unless `force` is set the socket must
    /// be open with nothing in flight and no recorded error. Returns whether
    /// the command was handed to the socket.
    pub fn send_command(&self, text: &str, force: bool) -> bool {
        let mut state = self.lock();

        if !force
            && (state.link != LinkState::Open
                || state.in_flight.is_some()
                || state.error.is_some())
        {
            return false;
        }

        if text.is_empty() {
            state.error = Some(TransportError::EmptyCommand);
            return false;
        }

        debug!(command = text, "command socket send");
        state.in_flight = Some(text.to_string());
        let sent = match &state.outbound {
            Some(outbound) => outbound
                .send(Message::Text(text.to_string()))
                .map_err(|_| "command socket is closed".to_string()),
            None => Err("command socket is not open".to_string()),
        };

        match sent {
            Ok(()) => true,
            Err(cause) => {
                warn!(command = text, cause = %cause, "command socket send failed");
                state.error = Some(TransportError::TransmitFailure(cause));
                false
            }
        }
    }

    pub(crate) fn receive(&self, message: Message) {
        match message {
            Message::Text(text) => self.receive_text(&text),
            Message::Binary(bytes) => {
                warn!(len = bytes.len(), "command socket received unexpected binary frame");
            }
            _ => {}
        }
    }

    fn receive_text(&self, text: &str) {
        let mut state = self.lock();
        match DeviceFrame::classify(text) {
            DeviceFrame::Log(line) => info!(device_log = line, "command socket"),
            DeviceFrame::Command(echo) if state.in_flight.is_some() => {
                if state.in_flight.as_deref() == Some(echo) {
                    debug!(command = echo, "command acknowledged");
                    state.in_flight = None;
                } else {
                    // The pending command stays recorded; only clear_error/reset recover.
                    warn!(
                        sent = state.in_flight.as_deref().unwrap_or_default(),
                        received = echo,
                        "command not acknowledged"
                    );
                    state.error = Some(TransportError::AckMismatch(echo.to_string()));
                }
            }
            _ => warn!(frame = text, "command socket received unexpected text frame"),
        }
    }

    async fn run_connection(
        self,
        generation: u64,
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
    ) {
        let stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    "failed to connect command socket: {err}"
                );
                self.on_closed(generation);
                return;
            }
        };

        let (mut writer, mut reader) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        if !self.on_open(generation, outbound) {
            let _ = writer.close().await;
            return;
        }
        info!(host = %self.config.host, port = self.config.port, "command socket opened");

        loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(err) = writer.send(message).await {
                            warn!("command socket write failed: {err}");
                            break;
                        }
                    }
                    None => {
                        let _ = writer.close().await;
                        break;
                    }
                },
                incoming = reader.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(message)) => self.receive(message),
                    Some(Err(err)) => {
                        warn!("command socket receive failed: {err}");
                        break;
                    }
                },
            }
        }

        self.on_closed(generation);
        info!("command socket closed");
    }

    fn on_open(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.link = LinkState::Open;
        state.outbound = Some(outbound);
        true
    }

    fn on_closed(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.link = LinkState::Closed;
        state.outbound = None;
        state.task = None;
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark the link open over an in-memory channel instead of a socket.
    #[cfg(test)]
    pub(crate) fn open_in_memory(&self) -> mpsc::UnboundedReceiver<Message> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.generation += 1;
        state.link = LinkState::Open;
        state.outbound = Some(outbound);
        outbound_rx
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
