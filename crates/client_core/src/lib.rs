use std::sync::Arc;

use shared::domain::DriveMode;
use tracing::info;

pub mod arbiter;
pub mod bus;
pub mod camera;
pub mod error;
pub mod gamepad;
pub mod mixer;
pub mod motor;
pub mod queue;
pub mod reconcilable_state;
pub mod rover;
pub mod scheduler;
pub mod stream;
pub mod transport;
pub mod turtle;
pub mod view;
pub mod ws;

pub use arbiter::{AnalogInput, ArbiterConfig, ModeArbiter, ModeInputs};
pub use bus::{MessageBus, Subscriber, SubscriberHandle};
pub use camera::CameraClient;
pub use error::{BusError, CameraError, StateError, StreamError, TransportError};
pub use gamepad::{GamepadController, GamepadListener, GamepadProvider};
pub use motor::MotorSettings;
pub use reconcilable_state::ReconcilableState;
pub use rover::{RoverCommand, StallSource};
pub use stream::{FrameSink, LatestFrame, StreamingSocket};
pub use transport::{CommandTransport, TransportStatus};
pub use turtle::{ArrowKey, TurtleController, TurtleKeyboard};
pub use view::{Listener, RenderSink};
pub use ws::TransportConfig;

use crate::{
    camera::DEFAULT_HTTP_PORT,
    turtle::DEFAULT_TURTLE_SPEED,
    ws::{DEFAULT_COMMAND_PORT, DEFAULT_STREAM_PORT},
};

/// Where the rover lives and how the panel drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    pub host: String,
    pub http_port: u16,
    pub stream_port: u16,
    pub command_port: u16,
    pub arbiter: ArbiterConfig,
    pub suppress_repeats: bool,
    pub turtle_speed: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            command_port: DEFAULT_COMMAND_PORT,
            arbiter: ArbiterConfig::default(),
            suppress_repeats: false,
            turtle_speed: DEFAULT_TURTLE_SPEED,
        }
    }
}

/// Every component of the control panel, wired to one bus and one command
/// socket.
pub struct RoverPanel {
    pub bus: Arc<MessageBus>,
    pub rover: Arc<RoverCommand>,
    pub motors: Arc<MotorSettings>,
    pub turtle: Arc<TurtleController>,
    pub keyboard: Arc<TurtleKeyboard>,
    pub tank: Arc<GamepadController>,
    pub joystick: Arc<GamepadController>,
    pub gamepads: GamepadListener,
    pub arbiter: Arc<ModeArbiter>,
    pub stream: StreamingSocket,
    pub camera: CameraClient,
}

impl RoverPanel {
    /// `sinks` supplies the render target for each named view.
    pub fn new(
        config: &PanelConfig,
        provider: Arc<dyn GamepadProvider>,
        sinks: &dyn Fn(&'static str) -> Arc<dyn RenderSink>,
        frames: Arc<dyn FrameSink>,
    ) -> Result<Self, CameraError> {
        let bus = MessageBus::new();
        let motors = Arc::new(MotorSettings::new(sinks("motor")));
        let transport =
            CommandTransport::new(TransportConfig::command(&config.host, config.command_port));
        let rover = Arc::new(
            RoverCommand::new(transport)
                .with_stall_source(motors.clone())
                .with_suppress_repeats(config.suppress_repeats),
        );

        let poll = config.arbiter.poll_interval;
        let turtle = TurtleController::new(
            rover.clone(),
            bus.clone(),
            sinks("turtle"),
            config.turtle_speed,
            poll,
        );
        let keyboard = Arc::new(TurtleKeyboard::new(bus.clone()));
        let tank = GamepadController::new("tank", provider.clone(), bus.clone(), sinks("tank"), poll);
        let joystick =
            GamepadController::new("joystick", provider, bus.clone(), sinks("joystick"), poll);

        let inputs = ModeInputs {
            turtle: vec![
                turtle.clone() as Arc<dyn Listener>,
                keyboard.clone() as Arc<dyn Listener>,
            ],
            tank: Some(AnalogInput::new(tank.clone())),
            joystick: Some(AnalogInput::new(joystick.clone())),
        };
        let arbiter = ModeArbiter::new(rover.clone(), bus.clone(), inputs, config.arbiter);

        Ok(Self {
            gamepads: GamepadListener::new(bus.clone()),
            stream: StreamingSocket::new(
                TransportConfig::stream(&config.host, config.stream_port),
                frames,
            ),
            camera: CameraClient::new(&config.host, config.http_port)?,
            bus,
            rover,
            motors,
            turtle,
            keyboard,
            tank,
            joystick,
            arbiter,
        })
    }

    /// Open both sockets and follow mode activation on the bus.
    pub fn start(&self) -> Result<(), StreamError> {
        self.arbiter.start_listening();
        self.rover.transport().start();
        self.stream.start()
    }

    /// Switch to `mode` the way a tab change does: deactivate the current
    /// mode, then announce the new one.
    pub fn activate_mode(&self, mode: DriveMode) -> Result<(), BusError> {
        if let Some(current) = self.arbiter.active_mode() {
            if current == mode {
                return Ok(());
            }
            self.bus.publish(&current.deactivated_topic(), None, None)?;
        }
        self.bus.publish(&mode.activated_topic(), None, None)
    }

    pub fn stop(&self) {
        if let Some(mode) = self.arbiter.active_mode() {
            self.arbiter.deactivate(mode);
        }
        self.arbiter.stop_listening();
        self.rover.halt();
        self.rover.transport().stop();
        self.stream.stop();
        info!("rover panel stopped");
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
