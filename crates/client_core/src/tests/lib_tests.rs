use shared::domain::GamepadInfo;

use super::*;
use crate::{stream::LatestFrame, view::NullSink};

struct NoPads;

impl GamepadProvider for NoPads {
    fn connected_devices(&self) -> Vec<GamepadInfo> {
        Vec::new()
    }

    fn axis_value(&self, _device: usize, _axis: usize) -> f64 {
        0.0
    }
}

fn panel() -> RoverPanel {
    RoverPanel::new(
        &PanelConfig::default(),
        Arc::new(NoPads),
        &|_view| Arc::new(NullSink) as Arc<dyn RenderSink>,
        Arc::new(LatestFrame::default()),
    )
    .expect("panel")
}

#[test]
fn default_config_targets_the_rover_ports() {
    let config = PanelConfig::default();
    assert_eq!(config.command_port, 82);
    assert_eq!(config.stream_port, 81);
    assert_eq!(config.http_port, 80);
    assert_eq!(config.turtle_speed, 0.9);
    assert_eq!(config.arbiter.frame_delay, std::time::Duration::from_millis(30));
}

#[tokio::test]
async fn switching_modes_moves_the_inputs() {
    let panel = panel();
    panel.arbiter.start_listening();

    panel.activate_mode(DriveMode::Turtle).unwrap();
    assert_eq!(panel.arbiter.active_mode(), Some(DriveMode::Turtle));
    assert!(panel.turtle.is_listening());
    assert!(panel.keyboard.is_listening());

    panel.activate_mode(DriveMode::Tank).unwrap();
    assert_eq!(panel.arbiter.active_mode(), Some(DriveMode::Tank));
    assert!(!panel.turtle.is_listening());
    assert!(!panel.keyboard.is_listening());
    assert!(panel.tank.is_listening());
    assert!(!panel.joystick.is_listening());

    panel.activate_mode(DriveMode::Joystick).unwrap();
    assert!(!panel.tank.is_listening());
    assert!(panel.joystick.is_listening());

    panel.stop();
    assert_eq!(panel.arbiter.active_mode(), None);
    assert!(!panel.joystick.is_listening());
    assert!(!panel.arbiter.is_listening());
}

#[tokio::test]
async fn reactivating_the_current_mode_is_a_no_op() {
    let panel = panel();
    panel.arbiter.start_listening();
    panel.activate_mode(DriveMode::Tank).unwrap();
    panel.activate_mode(DriveMode::Tank).unwrap();
    assert!(panel.arbiter.is_mode_running(DriveMode::Tank));
    panel.arbiter.deactivate(DriveMode::Tank);
    assert!(!panel.tank.is_listening());
}
