//! Cooperative periodic loops standing in for animation-frame callbacks.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error};

/// Work performed on every frame of a [`FrameLoop`].
pub trait FrameTask: Send + Sync + 'static {
    fn on_frame(&self);
}

struct ActiveLoop {
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A periodic task with explicit start/stop. Stopping clears a liveness flag
/// that the loop checks before every frame; it never preempts a running frame.
pub struct FrameLoop {
    name: &'static str,
    period: Duration,
    active: Option<ActiveLoop>,
}

impl FrameLoop {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            active: None,
        }
    }

    /// Start driving `task`, replacing any loop already running. Returns false
    /// when called outside a tokio runtime.
    pub fn start(&mut self, task: Weak<dyn FrameTask>) -> bool {
        self.stop();

        let Ok(runtime) = Handle::try_current() else {
            error!(frame_loop = self.name, "cannot start frame loop outside a tokio runtime");
            return false;
        };

        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        let period = self.period;
        let name = self.name;
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                let Some(task) = task.upgrade() else {
                    break;
                };
                task.on_frame();
            }
            debug!(frame_loop = name, "frame loop finished");
        });

        debug!(frame_loop = self.name, period_ms = period.as_millis() as u64, "frame loop started");
        self.active = Some(ActiveLoop { alive, handle });
        true
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.alive.store(false, Ordering::Release);
            debug!(frame_loop = self.name, "frame loop stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.alive.load(Ordering::Acquire) && !active.handle.is_finished())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Balanced start/stop counter: only the first start and the matching last
/// stop report a transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerCount(usize);

impl ListenerCount {
    /// Returns true when this call moved the count from zero to one.
    pub fn acquire(&mut self) -> bool {
        self.0 += 1;
        self.0 == 1
    }

    /// Returns true when this call moved the count from one to zero.
    pub fn release(&mut self) -> bool {
        match self.0 {
            0 => false,
            n => {
                self.0 = n - 1;
                self.0 == 0
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        self.0 > 0
    }
}
