//! Drive commands for the rover on top of the shared command socket.
//!
//! [`RoverCommand`] owns the sequence counter and remembers the last tank
//! payload it sent. A recorded transport error is cleared on the next send
//! attempt, which is the only recovery from a dropped or garbled ack apart
//! from an explicit [`RoverCommand::reset`].

use std::sync::{Arc, Mutex, MutexGuard};

use shared::{domain::TurtleCommand, protocol::CommandEnvelope};
use tracing::{debug, info};

use crate::{
    mixer::{self, AxisTuning, MotorStall, WheelPower},
    queue::TurtleQueue,
    transport::{CommandTransport, TransportStatus},
};

/// Supplies the per-motor stall fractions used when formatting commands.
pub trait StallSource: Send + Sync {
    fn stall(&self) -> MotorStall;
}

#[derive(Default)]
struct RoverState {
    queue: TurtleQueue,
    sequence: u64,
    last_payload: Option<String>,
}

pub struct RoverCommand {
    transport: CommandTransport,
    stall: Option<Arc<dyn StallSource>>,
    suppress_repeats: bool,
    state: Mutex<RoverState>,
}

impl RoverCommand {
    pub fn new(transport: CommandTransport) -> Self {
        Self {
            transport,
            stall: None,
            suppress_repeats: false,
            state: Mutex::new(RoverState::default()),
        }
    }

    pub fn with_stall_source(mut self, stall: Arc<dyn StallSource>) -> Self {
        self.stall = Some(stall);
        self
    }

    /// When set, a tank payload equal to the last one sent is not sent again.
    /// Off by default so analog modes resend every frame.
    pub fn with_suppress_repeats(mut self, suppress_repeats: bool) -> Self {
        self.suppress_repeats = suppress_repeats;
        self
    }

    pub fn transport(&self) -> &CommandTransport {
        &self.transport
    }

    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Send a tank command for the given wheel values. Returns true only when
    /// a new command was handed to the socket.
    pub fn send_tank_command(
        &self,
        left: f64,
        right: f64,
        left_tuning: AxisTuning,
        right_tuning: AxisTuning,
    ) -> bool {
        let mut state = self.lock();

        if !self.transport.is_started() {
            info!("command socket not started, resetting");
            self.transport.reset();
            state.last_payload = None;
            return false;
        }
        if !self.transport.is_ready() {
            return false;
        }
        if self.transport.has_error() {
            debug!(error = ?self.transport.get_error(), "clearing command socket error");
            self.transport.clear_error();
            state.last_payload = None;
        }
        if self.transport.is_sending() {
            return false;
        }

        let stall = self
            .stall
            .as_ref()
            .map(|source| source.stall())
            .unwrap_or_default();
        let payload =
            mixer::format_tank_command(WheelPower::new(left, right), left_tuning, right_tuning, stall);
        let payload_text = payload.to_string();
        if self.suppress_repeats && state.last_payload.as_deref() == Some(payload_text.as_str()) {
            return false;
        }

        let envelope = CommandEnvelope::new(state.sequence, payload);
        if !self.transport.send_command(&envelope.to_string(), false) {
            return false;
        }
        debug!(sequence = state.sequence, command = %payload_text, "tank command sent");
        state.last_payload = Some(payload_text);
        state.sequence += 1;
        true
    }

    /// Mix throttle and steering into wheel values and send them. Tuning is
    /// applied by the mixer, so the tank command itself is sent untuned.
    pub fn send_joystick_command(
        &self,
        throttle: f64,
        steering: f64,
        throttle_tuning: AxisTuning,
        steering_tuning: AxisTuning,
    ) -> bool {
        let power = mixer::joystick_to_tank(throttle, steering, throttle_tuning, steering_tuning);
        self.send_tank_command(
            power.left,
            power.right,
            AxisTuning::default(),
            AxisTuning::default(),
        )
    }

    pub fn send_turtle_command(&self, command: TurtleCommand, speed: f64) -> bool {
        let power = mixer::turtle_to_tank(command, speed);
        self.send_tank_command(
            power.left,
            power.right,
            AxisTuning::default(),
            AxisTuning::default(),
        )
    }

    /// Queue a turtle command and immediately try to send the head of the
    /// queue.
    pub fn enqueue_turtle_command(&self, command: TurtleCommand, speed_percent: f64) {
        self.lock().queue.enqueue(command, speed_percent);
        self.process_turtle_command();
    }

    /// Pop the next queued turtle command and send it. The command is
    /// consumed even when the socket refuses it.
    pub fn process_turtle_command(&self) -> bool {
        let Some(next) = self.lock().queue.pop_next() else {
            return false;
        };
        self.send_turtle_command(next.command, next.speed)
    }

    pub fn queued_turtle_commands(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn halt(&self) -> bool {
        self.send_tank_command(0.0, 0.0, AxisTuning::default(), AxisTuning::default())
    }

    pub fn is_ready(&self) -> bool {
        self.transport.is_ready()
    }

    pub fn is_sending(&self) -> bool {
        self.transport.is_sending()
    }

    pub fn get_sending(&self) -> Option<String> {
        self.transport.get_sending()
    }

    pub fn has_error(&self) -> bool {
        self.transport.has_error()
    }

    pub fn get_error(&self) -> Option<String> {
        self.transport.get_error()
    }

    pub fn status(&self) -> TransportStatus {
        self.transport.status()
    }

    /// Drop the pending command and error so the next send can go out.
    pub fn clear(&self) {
        self.transport.clear_error();
    }

    pub fn reset(&self) {
        self.transport.reset();
    }

    fn lock(&self) -> MutexGuard<'_, RoverState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/rover_tests.rs"]
mod tests;
