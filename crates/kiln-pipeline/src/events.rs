//! Build event system for observability.
//!
//! Emits [`BuildEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress UIs, etc.) can follow goal execution
//! without coupling to the scheduler internals.

use serde::{Deserialize, Serialize};

/// Events emitted while a build advances through its goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuildEvent {
    GoalStarted {
        goal: String,
    },
    GoalCompleted {
        goal: String,
        duration_ms: u64,
    },
    GoalSkipped {
        goal: String,
    },
    GoalFailed {
        goal: String,
        error: String,
    },
    StateSaved {
        path: String,
        entries: usize,
    },
    StateLoaded {
        path: String,
        entries: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<BuildEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: BuildEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
