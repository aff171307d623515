use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use shared::protocol::{log_frame, CommandEnvelope, DeviceFrame, DEVICE_SUBPROTOCOL};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulates the rover firmware: acknowledges commands on `/command` and
/// streams placeholder frames on `/stream`.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
    #[arg(long, default_value_t = 82)]
    command_port: u16,
    #[arg(long, default_value_t = 81)]
    stream_port: u16,
    /// Time between placeholder camera frames.
    #[arg(long, default_value_t = 100)]
    frame_interval_ms: u64,
}

#[derive(Clone, Copy)]
struct StreamSettings {
    frame_interval: Duration,
}

fn router(stream: StreamSettings) -> Router {
    Router::new()
        .route("/command", get(command_handler))
        .route("/stream", get(stream_handler))
        .with_state(stream)
}

async fn command_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.protocols([DEVICE_SUBPROTOCOL]).on_upgrade(command_connection)
}

async fn command_connection(socket: WebSocket) {
    info!("command client connected");
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => {
                warn!(len = bytes.len(), "ignoring binary frame on command socket");
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };
        for reply in respond(&text) {
            if sender.send(Message::Text(reply)).await.is_err() {
                return;
            }
        }
    }
    info!("command client disconnected");
}

/// Frames the device sends back for one received text frame. A valid
/// command gets a log line followed by its exact echo.
fn respond(text: &str) -> Vec<String> {
    if !matches!(DeviceFrame::classify(text), DeviceFrame::Command(_)) {
        warn!(frame = %text, "unexpected frame");
        return vec![log_frame(&format!("unknown frame {text}"))];
    }
    match text.parse::<CommandEnvelope>() {
        Ok(envelope) => {
            let tank = envelope.payload;
            debug!(sequence = envelope.sequence, command = %tank, "command received");
            vec![
                log_frame(&format!(
                    "left {} {}, right {} {}",
                    tank.left_magnitude,
                    direction(tank.left_forward),
                    tank.right_magnitude,
                    direction(tank.right_forward),
                )),
                text.to_string(),
            ]
        }
        Err(err) => {
            warn!(frame = %text, "malformed command: {err}");
            vec![log_frame(&format!("malformed command {text}"))]
        }
    }
}

fn direction(forward: bool) -> &'static str {
    if forward {
        "forward"
    } else {
        "reverse"
    }
}

async fn stream_handler(
    ws: WebSocketUpgrade,
    State(settings): State<StreamSettings>,
) -> impl IntoResponse {
    ws.protocols([DEVICE_SUBPROTOCOL])
        .on_upgrade(move |socket| stream_connection(socket, settings))
}

async fn stream_connection(socket: WebSocket, settings: StreamSettings) {
    info!("stream client connected");
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = tokio::time::interval(settings.frame_interval);
    let mut frame_number: u32 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if sender.send(Message::Binary(placeholder_frame(frame_number))).await.is_err() {
                    break;
                }
                frame_number = frame_number.wrapping_add(1);
            }
            message = receiver.next() => {
                if !matches!(message, Some(Ok(_))) {
                    break;
                }
            }
        }
    }
    info!(frames = frame_number, "stream client disconnected");
}

/// JPEG start and end markers around the frame number.
fn placeholder_frame(frame_number: u32) -> Vec<u8> {
    let mut frame = vec![0xff, 0xd8];
    frame.extend_from_slice(&frame_number.to_be_bytes());
    frame.extend_from_slice(&[0xff, 0xd9]);
    frame
}

async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "mock rover listening");
    axum::serve(listener, app)
        .await
        .with_context(|| format!("server on {addr} failed"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let app = router(StreamSettings {
        frame_interval: Duration::from_millis(cli.frame_interval_ms.max(1)),
    });
    let command_addr: SocketAddr = format!("{}:{}", cli.bind, cli.command_port)
        .parse()
        .context("invalid command address")?;
    let stream_addr: SocketAddr = format!("{}:{}", cli.bind, cli.stream_port)
        .parse()
        .context("invalid stream address")?;

    tokio::try_join!(serve(command_addr, app.clone()), serve(stream_addr, app))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};

    use super::*;

    #[test]
    fn valid_commands_are_logged_then_echoed() {
        let text = "cmd(3, tank(200, true, 0, false))";
        assert_eq!(
            respond(text),
            vec![
                "log(left 200 forward, right 0 reverse)".to_string(),
                text.to_string()
            ]
        );
    }

    #[test]
    fn malformed_and_unknown_frames_only_get_a_log_line() {
        assert_eq!(
            respond("cmd(1, tank(300, true, 0, true))"),
            vec!["log(malformed command cmd(1, tank(300, true, 0, true)))".to_string()]
        );
        assert_eq!(respond("hello"), vec!["log(unknown frame hello)".to_string()]);
    }

    #[test]
    fn placeholder_frames_look_like_jpeg() {
        let frame = placeholder_frame(7);
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
        assert_eq!(&frame[frame.len() - 2..], &[0xff, 0xd9]);
    }

    async fn spawn_rover() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let app = router(StreamSettings {
            frame_interval: Duration::from_millis(5),
        });
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        port
    }

    #[tokio::test]
    async fn command_socket_acknowledges_by_echo() {
        let port = spawn_rover().await;
        let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/command"))
            .await
            .expect("connect");

        let command = "cmd(0, tank(255, true, 255, true))";
        socket
            .send(ClientMessage::Text(command.to_string()))
            .await
            .expect("send");

        let log = socket.next().await.expect("log").expect("frame");
        assert!(matches!(log, ClientMessage::Text(text) if text.starts_with("log(")));
        let ack = socket.next().await.expect("ack").expect("frame");
        assert_eq!(ack, ClientMessage::Text(command.to_string()));
    }

    #[tokio::test]
    async fn handshake_selects_the_device_subprotocol() {
        use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue};

        let port = spawn_rover().await;
        let mut request = format!("ws://127.0.0.1:{port}/command")
            .into_client_request()
            .expect("request");
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(DEVICE_SUBPROTOCOL),
        );
        let (_socket, response) = connect_async(request).await.expect("connect");
        assert_eq!(
            response.headers().get("Sec-WebSocket-Protocol").unwrap(),
            DEVICE_SUBPROTOCOL
        );
    }

    #[tokio::test]
    async fn stream_socket_sends_binary_frames() {
        let port = spawn_rover().await;
        let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/stream"))
            .await
            .expect("connect");

        for expected in 0..2u32 {
            let frame = socket.next().await.expect("frame").expect("message");
            assert_eq!(frame, ClientMessage::Binary(placeholder_frame(expected)));
        }
    }
}
