//! Chooses which drive mode feeds the command socket.
//!
//! Exactly one mode loop runs at a time. Activating a mode replaces whatever
//! loop was running, even without a deactivation for the previous mode, and
//! every tick is gated by a minimum delay between sends so the device is not
//! flooded.

use std::{
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::{Duration, Instant},
};

use serde_json::Value;
use shared::domain::DriveMode;
use tracing::{debug, info, warn};

use crate::{
    bus::{MessageBus, Subscriber, SubscriberHandle},
    gamepad::AxisSource,
    rover::RoverCommand,
    scheduler::{FrameLoop, FrameTask, ListenerCount},
    view::Listener,
};

pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// Minimum time between two sends from the mode loop.
    pub frame_delay: Duration,
    /// How often the mode loop wakes up.
    pub poll_interval: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            frame_delay: DEFAULT_FRAME_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// An analog input that is switched on with its mode and sampled every tick.
#[derive(Clone)]
pub struct AnalogInput {
    pub listener: Arc<dyn Listener>,
    pub axes: Arc<dyn AxisSource>,
}

impl AnalogInput {
    pub fn new<T: Listener + AxisSource + 'static>(input: Arc<T>) -> Self {
        Self {
            listener: input.clone(),
            axes: input,
        }
    }
}

/// Inputs started and stopped with each mode.
#[derive(Default, Clone)]
pub struct ModeInputs {
    pub turtle: Vec<Arc<dyn Listener>>,
    pub tank: Option<AnalogInput>,
    pub joystick: Option<AnalogInput>,
}

impl ModeInputs {
    fn listeners(&self, mode: DriveMode) -> Vec<Arc<dyn Listener>> {
        let analog = |input: &Option<AnalogInput>| -> Vec<Arc<dyn Listener>> {
            input.iter().map(|input| input.listener.clone()).collect()
        };
        match mode {
            DriveMode::Turtle => self.turtle.clone(),
            DriveMode::Tank => analog(&self.tank),
            DriveMode::Joystick => analog(&self.joystick),
        }
    }
}

struct ArbiterState {
    active: Option<DriveMode>,
    frame_loop: FrameLoop,
    next_frame: Instant,
    listening: ListenerCount,
}

pub struct ModeArbiter {
    rover: Arc<RoverCommand>,
    bus: Arc<MessageBus>,
    inputs: ModeInputs,
    config: ArbiterConfig,
    state: Mutex<ArbiterState>,
    this: Weak<ModeArbiter>,
}

impl ModeArbiter {
    pub fn new(
        rover: Arc<RoverCommand>,
        bus: Arc<MessageBus>,
        inputs: ModeInputs,
        config: ArbiterConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            rover,
            bus,
            inputs,
            config,
            state: Mutex::new(ArbiterState {
                active: None,
                frame_loop: FrameLoop::new("mode", config.poll_interval),
                next_frame: Instant::now(),
                listening: ListenerCount::default(),
            }),
            this: this.clone(),
        })
    }

    pub fn active_mode(&self) -> Option<DriveMode> {
        self.lock().active
    }

    pub fn is_mode_running(&self, mode: DriveMode) -> bool {
        let state = self.lock();
        state.active == Some(mode) && state.frame_loop.is_running()
    }

    /// Start `mode`'s inputs and make its loop the only one running.
    pub fn activate(&self, mode: DriveMode) {
        let previous = self.lock().active;
        if let Some(previous) = previous.filter(|previous| *previous != mode) {
            self.stop_inputs(previous);
        }
        for input in self.inputs.listeners(mode) {
            if !input.is_listening() {
                input.start_listening();
            }
        }

        let task: Weak<dyn FrameTask> = self.this.clone();
        let mut state = self.lock();
        state.frame_loop.stop();
        state.active = Some(mode);
        state.frame_loop.start(task);
        info!(mode = %mode, "drive mode activated");
    }

    /// Stop `mode`'s inputs, and its loop if it is the active one.
    pub fn deactivate(&self, mode: DriveMode) {
        self.stop_inputs(mode);
        let mut state = self.lock();
        if state.active == Some(mode) {
            state.frame_loop.stop();
            state.active = None;
            info!(mode = %mode, "drive mode deactivated");
        }
    }

    fn stop_inputs(&self, mode: DriveMode) {
        for input in self.inputs.listeners(mode) {
            if input.is_listening() {
                input.stop_listening();
            }
        }
    }

    /// Claim the next frame for the active mode if the frame delay has passed.
    fn claim_frame(&self) -> Option<DriveMode> {
        let mut state = self.lock();
        let mode = state.active?;
        let now = Instant::now();
        if now < state.next_frame {
            return None;
        }
        state.next_frame = now + self.config.frame_delay;
        Some(mode)
    }

    fn drive(&self, mode: DriveMode) {
        match mode {
            DriveMode::Turtle => {
                self.rover.process_turtle_command();
            }
            DriveMode::Tank => {
                if let Some(tank) = &self.inputs.tank {
                    let axes = tank.axes.read_axes();
                    self.rover.send_tank_command(
                        axes.axis_one,
                        axes.axis_two,
                        axes.axis_one_tuning,
                        axes.axis_two_tuning,
                    );
                }
            }
            DriveMode::Joystick => {
                if let Some(joystick) = &self.inputs.joystick {
                    let axes = joystick.axes.read_axes();
                    self.rover.send_joystick_command(
                        axes.axis_one,
                        axes.axis_two,
                        axes.axis_one_tuning,
                        axes.axis_two_tuning,
                    );
                }
            }
        }
    }

    fn handle(&self) -> SubscriberHandle {
        self.this.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FrameTask for ModeArbiter {
    fn on_frame(&self) {
        if let Some(mode) = self.claim_frame() {
            self.drive(mode);
        }
    }
}

impl Subscriber for ModeArbiter {
    fn on_message(&self, topic: &str, _data: Option<&Value>) {
        for mode in DriveMode::ALL {
            if topic == mode.activated_topic() {
                self.activate(mode);
                return;
            }
            if topic == mode.deactivated_topic() {
                self.deactivate(mode);
                return;
            }
        }
        debug!(topic, "unhandled message in mode arbiter");
    }
}

impl Listener for ModeArbiter {
    fn start_listening(&self) {
        if !self.lock().listening.acquire() {
            return;
        }
        for mode in DriveMode::ALL {
            for topic in [mode.activated_topic(), mode.deactivated_topic()] {
                if let Err(err) = self.bus.subscribe(&topic, self.handle()) {
                    warn!(topic = %topic, "failed to subscribe: {err}");
                }
            }
        }
    }

    fn stop_listening(&self) {
        if !self.lock().listening.release() {
            return;
        }
        self.bus.unsubscribe_all(&self.handle());
    }

    fn is_listening(&self) -> bool {
        self.lock().listening.is_listening()
    }
}

#[cfg(test)]
#[path = "tests/arbiter_tests.rs"]
mod tests;
