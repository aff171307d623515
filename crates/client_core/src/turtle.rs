//! Turtle mode input: direction buttons, speed, and the arrow keys.

use std::{
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use serde_json::{json, Value};
use shared::domain::TurtleCommand;
use tracing::{debug, info, warn};

use crate::{
    bus::{MessageBus, Subscriber, SubscriberHandle},
    error::{BusError, StateError},
    rover::RoverCommand,
    scheduler::{FrameLoop, FrameTask, ListenerCount},
    view::{self, Listener, RenderSink, ViewState},
};

pub const TURTLE_KEY_DOWN: &str = "TURTLE_KEY_DOWN";
pub const TURTLE_KEY_UP: &str = "TURTLE_KEY_UP";

pub const SPEED_PERCENT: &str = "speedPercent";
pub const ACTIVE_BUTTON: &str = "activeButton";

pub const DEFAULT_TURTLE_SPEED: f64 = 0.9;

struct TurtleView {
    state: ViewState,
    listening: ListenerCount,
    frame_loop: FrameLoop,
}

/// Direction buttons. Pressing a button queues its command; pressing the
/// active button again queues a stop. Only one button is active at a time.
pub struct TurtleController {
    rover: Arc<RoverCommand>,
    bus: Arc<MessageBus>,
    sink: Arc<dyn RenderSink>,
    view: Mutex<TurtleView>,
    this: Weak<TurtleController>,
}

impl TurtleController {
    pub fn new(
        rover: Arc<RoverCommand>,
        bus: Arc<MessageBus>,
        sink: Arc<dyn RenderSink>,
        speed: f64,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            rover,
            bus,
            sink,
            view: Mutex::new(TurtleView {
                state: ViewState::new([
                    (SPEED_PERCENT, json!(speed.clamp(0.0, 1.0))),
                    (ACTIVE_BUTTON, json!("")),
                ]),
                listening: ListenerCount::default(),
                frame_loop: FrameLoop::new("turtle", refresh_interval),
            }),
            this: this.clone(),
        })
    }

    pub fn speed(&self) -> f64 {
        view::number(&self.lock().state, SPEED_PERCENT).unwrap_or(DEFAULT_TURTLE_SPEED)
    }

    pub fn active_command(&self) -> Option<TurtleCommand> {
        let guard = self.lock();
        let active = guard.state.get_value(ACTIVE_BUTTON).ok().flatten()?;
        active.as_str()?.parse().ok()
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), StateError> {
        let speed = speed.clamp(0.0, 1.0);
        info!(speed, "turtle speed changed");
        self.lock().state.set_value(SPEED_PERCENT, json!(speed))
    }

    /// Toggle `command`: start it, or stop if it is already the active one.
    pub fn click(&self, command: TurtleCommand) -> Result<(), StateError> {
        if self.active_command() == Some(command) {
            self.unselect()
        } else {
            self.select(command)
        }
    }

    pub fn select(&self, command: TurtleCommand) -> Result<(), StateError> {
        let speed_percent = {
            let mut guard = self.lock();
            guard.state.set_value(ACTIVE_BUTTON, json!(command.as_str()))?;
            (100.0 * view::number(&guard.state, SPEED_PERCENT)?).trunc()
        };
        self.rover.enqueue_turtle_command(command, speed_percent);
        Ok(())
    }

    pub fn unselect(&self) -> Result<(), StateError> {
        self.lock().state.set_value(ACTIVE_BUTTON, json!(""))?;
        self.rover.enqueue_turtle_command(TurtleCommand::Stop, 0.0);
        Ok(())
    }

    pub fn update_view(&self, force: bool) -> Result<(), StateError> {
        let mut guard = self.lock();
        view::enforce(&mut guard.state, self.sink.as_ref(), ACTIVE_BUTTON, force)?;
        view::enforce(&mut guard.state, self.sink.as_ref(), SPEED_PERCENT, force)?;
        Ok(())
    }

    fn handle(&self) -> SubscriberHandle {
        self.this.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TurtleView> {
        self.view
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Subscriber for TurtleController {
    fn on_message(&self, topic: &str, data: Option<&Value>) {
        let result = match topic {
            TURTLE_KEY_DOWN => {
                let Some(command) = data
                    .and_then(Value::as_str)
                    .and_then(|name| name.parse::<TurtleCommand>().ok())
                else {
                    warn!(topic, data = ?data, "ignoring turtle key without a command");
                    return;
                };
                self.select(command)
            }
            TURTLE_KEY_UP => self.unselect(),
            _ => {
                debug!(topic, "unhandled message in turtle controller");
                return;
            }
        };
        if let Err(err) = result {
            warn!(topic, "turtle input failed: {err}");
        }
    }
}

impl FrameTask for TurtleController {
    fn on_frame(&self) {
        if let Err(err) = self.update_view(false) {
            warn!("turtle view update failed: {err}");
        }
    }
}

impl Listener for TurtleController {
    fn start_listening(&self) {
        if !self.lock().listening.acquire() {
            return;
        }
        for topic in [TURTLE_KEY_DOWN, TURTLE_KEY_UP] {
            if let Err(err) = self.bus.subscribe(topic, self.handle()) {
                warn!(topic, "failed to subscribe: {err}");
            }
        }
        let task: Weak<dyn FrameTask> = self.this.clone();
        self.lock().frame_loop.start(task);
    }

    fn stop_listening(&self) {
        if !self.lock().listening.release() {
            return;
        }
        self.bus.unsubscribe_all(&self.handle());
        self.lock().frame_loop.stop();
    }

    fn is_listening(&self) -> bool {
        self.lock().listening.is_listening()
    }
}

/// Arrow keys that drive the rover in turtle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKey {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowKey {
    /// Map a DOM style key code (37 to 40) to an arrow key.
    pub fn from_key_code(code: u32) -> Option<Self> {
        match code {
            38 => Some(ArrowKey::Up),
            40 => Some(ArrowKey::Down),
            37 => Some(ArrowKey::Left),
            39 => Some(ArrowKey::Right),
            _ => None,
        }
    }

    pub fn command(self) -> TurtleCommand {
        match self {
            ArrowKey::Up => TurtleCommand::Forward,
            ArrowKey::Down => TurtleCommand::Reverse,
            ArrowKey::Left => TurtleCommand::Left,
            ArrowKey::Right => TurtleCommand::Right,
        }
    }
}

/// Turns arrow key presses into turtle key messages while listening.
pub struct TurtleKeyboard {
    bus: Arc<MessageBus>,
    listening: Mutex<ListenerCount>,
}

impl TurtleKeyboard {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            listening: Mutex::new(ListenerCount::default()),
        }
    }

    /// Returns whether the key was published.
    pub fn key_down(&self, key: ArrowKey) -> Result<bool, BusError> {
        self.publish(TURTLE_KEY_DOWN, key)
    }

    pub fn key_up(&self, key: ArrowKey) -> Result<bool, BusError> {
        self.publish(TURTLE_KEY_UP, key)
    }

    fn publish(&self, topic: &str, key: ArrowKey) -> Result<bool, BusError> {
        if !self.is_listening() {
            return Ok(false);
        }
        self.bus
            .publish(topic, Some(&json!(key.command().as_str())), None)?;
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, ListenerCount> {
        self.listening
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Listener for TurtleKeyboard {
    fn start_listening(&self) {
        self.lock().acquire();
    }

    fn stop_listening(&self) {
        self.lock().release();
    }

    fn is_listening(&self) -> bool {
        self.lock().is_listening()
    }
}

#[cfg(test)]
#[path = "tests/turtle_tests.rs"]
mod tests;
