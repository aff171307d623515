use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use client_core::{
    mixer::AxisTuning, ws::DEVICE_SUBPROTOCOL, CommandTransport, RoverCommand, TransportConfig,
};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::TurtleCommand,
    protocol::{log_frame, CommandEnvelope},
};
use tokio::net::TcpListener;

type Received = Arc<Mutex<Vec<String>>>;

async fn command_handler(ws: WebSocketUpgrade, State(received): State<Received>) -> impl IntoResponse {
    ws.protocols([DEVICE_SUBPROTOCOL])
        .on_upgrade(move |socket| echo_device(socket, received))
}

/// Logs each command, then echoes it back verbatim.
async fn echo_device(socket: WebSocket, received: Received) {
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        received.lock().unwrap().push(text.clone());
        let Ok(envelope) = text.parse::<CommandEnvelope>() else {
            let _ = sender.send(Message::Text(log_frame("bad command"))).await;
            continue;
        };
        let note = log_frame(&format!("running {}", envelope.payload));
        if sender.send(Message::Text(note)).await.is_err() {
            return;
        }
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
}

async fn spawn_device() -> (u16, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let received = Received::default();
    let app = Router::new()
        .route("/command", get(command_handler))
        .with_state(received.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (port, received)
}

async fn wait_until(mut ready: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if ready() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn rover_commands_are_acknowledged_by_echo() {
    let (port, received) = spawn_device().await;
    let transport = CommandTransport::new(TransportConfig::command("127.0.0.1", port));
    let rover = RoverCommand::new(transport.clone());

    transport.start();
    assert!(wait_until(|| rover.is_ready()).await, "socket never opened");

    assert!(rover.send_tank_command(1.0, -1.0, AxisTuning::default(), AxisTuning::default()));
    assert!(rover.is_sending());
    assert!(wait_until(|| !rover.is_sending()).await, "command never acknowledged");
    assert!(!rover.has_error());

    assert!(rover.send_turtle_command(TurtleCommand::Stop, 1.0));
    assert!(wait_until(|| !rover.is_sending()).await);

    assert_eq!(rover.sequence(), 2);
    assert_eq!(
        *received.lock().unwrap(),
        vec![
            "cmd(0, tank(255, true, 255, false))".to_string(),
            "cmd(1, tank(0, true, 0, true))".to_string(),
        ]
    );

    transport.stop();
    assert!(!transport.is_ready());
}

#[tokio::test]
async fn unstarted_rover_resets_its_socket_on_first_send() {
    let (port, received) = spawn_device().await;
    let rover = RoverCommand::new(CommandTransport::new(TransportConfig::command(
        "127.0.0.1",
        port,
    )));

    assert!(!rover.send_tank_command(0.5, 0.5, AxisTuning::default(), AxisTuning::default()));
    assert!(rover.transport().is_started());
    assert!(wait_until(|| rover.is_ready()).await);

    assert!(rover.send_tank_command(0.5, 0.5, AxisTuning::default(), AxisTuning::default()));
    assert!(wait_until(|| !rover.is_sending()).await);
    assert_eq!(received.lock().unwrap().len(), 1);

    assert!(rover.send_tank_command(0.5, 0.5, AxisTuning::default(), AxisTuning::default()));
    assert!(wait_until(|| !rover.is_sending()).await);
    assert_eq!(
        *received.lock().unwrap(),
        vec![
            "cmd(0, tank(127, true, 127, true))".to_string(),
            "cmd(1, tank(127, true, 127, true))".to_string(),
        ]
    );
    rover.transport().stop();
}
