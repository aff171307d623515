//! Pending turtle commands waiting for the command socket.

use std::collections::VecDeque;

use shared::domain::TurtleCommand;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedTurtle {
    pub command: TurtleCommand,
    /// Fraction of full speed in [0, 1].
    pub speed: f64,
}

/// FIFO of turtle commands. A command equal to the one already at the tail
/// is not queued a second time.
#[derive(Debug, Default)]
pub struct TurtleQueue {
    entries: VecDeque<QueuedTurtle>,
}

impl TurtleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `command` at `speed_percent` (0 to 100). Returns false when it
    /// was dropped as a repeat of the tail.
    pub fn enqueue(&mut self, command: TurtleCommand, speed_percent: f64) -> bool {
        if self.entries.back().is_some_and(|tail| tail.command == command) {
            debug!(command = %command, "turtle command already queued");
            return false;
        }
        self.entries.push_back(QueuedTurtle {
            command,
            speed: speed_percent / 100.0,
        });
        true
    }

    pub fn pop_next(&mut self) -> Option<QueuedTurtle> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tail_command_is_queued_once() {
        let mut queue = TurtleQueue::new();
        assert!(queue.enqueue(TurtleCommand::Forward, 90.0));
        assert!(!queue.enqueue(TurtleCommand::Forward, 50.0));
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.pop_next(),
            Some(QueuedTurtle {
                command: TurtleCommand::Forward,
                speed: 0.9
            })
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn only_the_tail_is_compared() {
        let mut queue = TurtleQueue::new();
        queue.enqueue(TurtleCommand::Forward, 100.0);
        queue.enqueue(TurtleCommand::Stop, 0.0);
        queue.enqueue(TurtleCommand::Forward, 100.0);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|entry| entry.command)
            .collect();
        assert_eq!(
            order,
            vec![TurtleCommand::Forward, TurtleCommand::Stop, TurtleCommand::Forward]
        );
        assert_eq!(queue.pop_next(), None);
    }
}
