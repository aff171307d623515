use super::*;

fn transport() -> CommandTransport {
    CommandTransport::new(TransportConfig::command("127.0.0.1", 1))
}

fn text(message: Message) -> String {
    match message {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[test]
fn refuses_to_send_before_the_socket_opens() {
    let transport = transport();
    assert!(!transport.is_ready());
    assert!(!transport.send_command("cmd(0, tank(0, true, 0, true))", false));
    assert!(!transport.has_error());
    assert_eq!(transport.status(), TransportStatus::Closed);
}

#[test]
fn forced_send_on_a_closed_socket_records_transmit_failure() {
    let transport = transport();
    assert!(!transport.send_command("cmd(0, x)", true));
    assert_eq!(
        transport.last_error(),
        Some(TransportError::TransmitFailure(
            "command socket is not open".to_string()
        ))
    );
}

#[test]
fn only_one_command_is_in_flight() {
    let transport = transport();
    let mut wire = transport.open_in_memory();

    assert!(transport.send_command("cmd(0, a)", false));
    assert!(!transport.send_command("cmd(1, b)", false));
    assert_eq!(transport.get_sending().as_deref(), Some("cmd(0, a)"));
    assert_eq!(text(wire.try_recv().unwrap()), "cmd(0, a)");
    assert!(wire.try_recv().is_err());

    assert!(transport.send_command("cmd(1, b)", true));
    assert_eq!(text(wire.try_recv().unwrap()), "cmd(1, b)");
}

#[test]
fn exact_echo_acknowledges_the_command() {
    let transport = transport();
    let _wire = transport.open_in_memory();

    assert!(transport.send_command("cmd(0, tank(10, true, 10, true))", false));
    assert_eq!(
        transport.status(),
        TransportStatus::Sending("cmd(0, tank(10, true, 10, true))".to_string())
    );
    transport.receive(Message::Text("cmd(0, tank(10, true, 10, true))".into()));

    assert!(!transport.is_sending());
    assert!(!transport.has_error());
    assert_eq!(transport.status(), TransportStatus::Idle);
    assert!(transport.send_command("cmd(1, tank(0, true, 0, true))", false));
}

#[test]
fn mismatched_echo_records_error_and_keeps_command_pending() {
    let transport = transport();
    let _wire = transport.open_in_memory();

    assert!(transport.send_command("cmd(3, tank(1, true, 1, true))", false));
    transport.receive(Message::Text("cmd(2, tank(1, true, 1, true))".into()));

    assert!(transport.has_error());
    assert_eq!(
        transport.get_error().as_deref(),
        Some("ERROR(cmd(2, tank(1, true, 1, true)))")
    );
    assert!(transport.is_sending());
    assert!(!transport.send_command("cmd(4, tank(0, true, 0, true))", false));

    transport.clear_error();
    assert!(!transport.is_sending());
    assert!(!transport.has_error());
    assert!(transport.send_command("cmd(4, tank(0, true, 0, true))", false));
}

#[test]
fn log_and_unsolicited_frames_do_not_change_state() {
    let transport = transport();
    let _wire = transport.open_in_memory();

    transport.receive(Message::Text("log(battery ok)".into()));
    transport.receive(Message::Text("cmd(9, tank(0, true, 0, true))".into()));
    transport.receive(Message::Text("hello".into()));
    transport.receive(Message::Binary(vec![1, 2, 3]));
    assert_eq!(transport.status(), TransportStatus::Idle);

    assert!(transport.send_command("cmd(0, a)", false));
    transport.receive(Message::Text("log(working)".into()));
    transport.receive(Message::Binary(vec![0xff]));
    assert_eq!(transport.get_sending().as_deref(), Some("cmd(0, a)"));
    assert!(!transport.has_error());
}

#[test]
fn empty_command_is_recorded_as_error() {
    let transport = transport();
    let _wire = transport.open_in_memory();

    assert!(!transport.send_command("", false));
    assert_eq!(transport.get_error().as_deref(), Some("ERROR(empty)"));
    assert_eq!(transport.last_error(), Some(TransportError::EmptyCommand));
    assert!(!transport.send_command("cmd(0, a)", false));
}

#[test]
fn send_after_the_writer_is_gone_is_a_transmit_failure() {
    let transport = transport();
    let wire = transport.open_in_memory();
    drop(wire);

    assert!(!transport.send_command("cmd(0, a)", false));
    assert_eq!(
        transport.get_error().as_deref(),
        Some("ERROR(command socket is closed)")
    );
    assert!(matches!(transport.status(), TransportStatus::Errored(_)));
}

#[test]
fn stop_is_idempotent_and_reset_clears_pending_state() {
    let transport = transport();
    let _wire = transport.open_in_memory();
    assert!(transport.send_command("cmd(0, a)", false));

    transport.stop();
    transport.stop();
    assert!(!transport.is_started());
    assert!(transport.is_sending());

    // No runtime here, so the reopen is skipped but the pending state is cleared.
    transport.reset();
    assert!(!transport.is_sending());
    assert!(!transport.has_error());
    assert!(!transport.is_started());
}
