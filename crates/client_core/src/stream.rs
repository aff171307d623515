//! Camera video over the streaming socket. Each binary frame is a complete
//! JPEG image and replaces the previous one; nothing is decoded here.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use futures::StreamExt;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{error::StreamError, transport::LinkState, ws::TransportConfig};

/// Display target for received frames.
pub trait FrameSink: Send + Sync {
    fn show_frame(&self, frame: Vec<u8>);
}

/// Keeps only the most recent frame.
#[derive(Default)]
pub struct LatestFrame {
    frame: Mutex<Option<Vec<u8>>>,
    received: AtomicU64,
}

impl LatestFrame {
    pub fn latest(&self) -> Option<Vec<u8>> {
        self.frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }
}

impl FrameSink for LatestFrame {
    fn show_frame(&self, frame: Vec<u8>) {
        *self
            .frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
        self.received.fetch_add(1, Ordering::AcqRel);
    }
}

struct StreamState {
    link: LinkState,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct StreamingSocket {
    config: Arc<TransportConfig>,
    sink: Arc<dyn FrameSink>,
    state: Arc<Mutex<StreamState>>,
}

impl StreamingSocket {
    pub fn new(config: TransportConfig, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            state: Arc::new(Mutex::new(StreamState {
                link: LinkState::Closed,
                generation: 0,
                task: None,
            })),
        }
    }

    /// Begin streaming in the background. Only an unusable address is
    /// reported; connection failures are logged and leave the socket closed.
    pub fn start(&self) -> Result<(), StreamError> {
        let mut state = self.lock();
        if state.link != LinkState::Closed {
            return Ok(());
        }
        self.config.url()?;
        let request = self
            .config
            .client_request()
            .map_err(|err| StreamError::Connect(format!("{err:#}")))?;
        let runtime = Handle::try_current()
            .map_err(|_| StreamError::Connect("no tokio runtime".to_string()))?;

        state.generation += 1;
        state.link = LinkState::Connecting;
        let generation = state.generation;
        let socket = self.clone();
        state.task = Some(runtime.spawn(async move {
            socket.run(generation, request).await;
        }));
        Ok(())
    }

    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(task) = state.task.take() {
            task.abort();
            info!("stream socket stopped");
        }
        state.generation += 1;
        state.link = LinkState::Closed;
    }

    pub fn is_ready(&self) -> bool {
        self.lock().link == LinkState::Open
    }

    async fn run(
        self,
        generation: u64,
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
    ) {
        let mut stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    "failed to connect stream socket: {err}"
                );
                self.set_link(generation, LinkState::Closed);
                return;
            }
        };
        self.set_link(generation, LinkState::Open);
        info!(host = %self.config.host, port = self.config.port, "stream socket opened");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(frame)) => {
                    debug!(len = frame.len(), "stream frame");
                    self.sink.show_frame(frame);
                }
                Ok(Message::Text(text)) => {
                    warn!(frame = %text, "stream socket received unexpected text frame");
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!("stream socket receive failed: {err}");
                    break;
                }
            }
        }

        self.set_link(generation, LinkState::Closed);
        info!("stream socket closed");
    }

    fn set_link(&self, generation: u64, link: LinkState) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.link = link;
        if link == LinkState::Closed {
            state.task = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        response::IntoResponse,
        routing::get,
        Router,
    };
    use futures::SinkExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::ws::DEVICE_SUBPROTOCOL;

    async fn stream_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.protocols([DEVICE_SUBPROTOCOL])
            .on_upgrade(|socket: WebSocket| async move {
                let (mut sender, mut receiver) = socket.split();
                for frame in [vec![0xff, 0xd8, 1], vec![0xff, 0xd8, 2]] {
                    if sender.send(WsMessage::Binary(frame)).await.is_err() {
                        return;
                    }
                }
                let _ = sender.send(WsMessage::Text("not a frame".into())).await;
                while let Some(Ok(_)) = receiver.next().await {}
            })
    }

    async fn spawn_camera() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let app = Router::new().route("/stream", get(stream_handler));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        port
    }

    #[tokio::test]
    async fn latest_binary_frame_reaches_the_sink() {
        let port = spawn_camera().await;
        let frames = Arc::new(LatestFrame::default());
        let socket = StreamingSocket::new(TransportConfig::stream("127.0.0.1", port), frames.clone());

        socket.start().expect("start");
        for _ in 0..100 {
            if frames.received() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket.is_ready());
        assert_eq!(frames.received(), 2);
        assert_eq!(frames.latest(), Some(vec![0xff, 0xd8, 2]));

        socket.stop();
        assert!(!socket.is_ready());
    }

    #[tokio::test]
    async fn unreachable_camera_leaves_the_socket_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let socket = StreamingSocket::new(
            TransportConfig::stream("127.0.0.1", port),
            Arc::new(LatestFrame::default()),
        );
        socket.start().expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!socket.is_ready());
    }

    #[test]
    fn bad_address_is_reported() {
        let socket = StreamingSocket::new(
            TransportConfig::stream("not a host", 81),
            Arc::new(LatestFrame::default()),
        );
        assert!(matches!(socket.start(), Err(StreamError::InvalidUrl(_))));
    }
}
