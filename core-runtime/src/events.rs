//! # Event Bus System
//!
//! Broadcasts dispatcher activity to observers using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The dispatcher never waits on observers. Events are fire-and-forget: with
//! no subscriber attached, `emit` returns an error that the dispatcher ignores.
//! Observers (a status UI, tests, a metrics exporter) call [`EventBus::subscribe`]
//! and read at their own pace; a slow observer receives `RecvError::Lagged`
//! and continues with newer events.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DispatcherEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Dispatcher(DispatcherEvent::Started {
//!         namespace: "mpsync_home".to_string(),
//!         checkpoint: 0,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Dispatcher started");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Change dispatch events
    Dispatcher(DispatcherEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Dispatcher(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Dispatcher(DispatcherEvent::ChangeFailed { kind, .. }) => {
                match kind.as_str() {
                    "stale_local" => EventSeverity::Info,
                    "unmapped_id" | "database_locked" => EventSeverity::Warning,
                    _ => EventSeverity::Error,
                }
            }
            CoreEvent::Dispatcher(DispatcherEvent::CycleFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Dispatcher(DispatcherEvent::Started { .. })
            | CoreEvent::Dispatcher(DispatcherEvent::Stopped { .. }) => EventSeverity::Info,
            CoreEvent::Dispatcher(DispatcherEvent::ChangeApplied { .. }) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Dispatcher Events
// ============================================================================

/// Events emitted by the change dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DispatcherEvent {
    /// The poll loop started.
    Started {
        /// Namespace of the configuration being dispatched.
        namespace: String,
        /// Checkpoint the loop resumes from.
        checkpoint: i64,
    },
    /// A change was pushed to the remote service.
    ChangeApplied {
        change_id: i64,
        change_type: String,
        local_id: i64,
    },
    /// A change was processed without remote effect.
    ChangeFailed {
        change_id: i64,
        /// Ordinal slug, or the raw ordinal if it is unknown.
        change_type: String,
        local_id: i64,
        /// Failure classification (`remote_call_failure`, `stale_local`, ...).
        kind: String,
        message: String,
    },
    /// A poll cycle ended early; the checkpoint was not advanced past the failure.
    CycleFailed { message: String },
    /// The poll loop exited.
    Stopped {
        /// Last checkpoint known to be durable.
        checkpoint: Option<i64>,
    },
}

impl DispatcherEvent {
    fn description(&self) -> &str {
        match self {
            DispatcherEvent::Started { .. } => "Dispatcher started",
            DispatcherEvent::ChangeApplied { .. } => "Change pushed to remote",
            DispatcherEvent::ChangeFailed { .. } => "Change skipped",
            DispatcherEvent::CycleFailed { .. } => "Poll cycle failed",
            DispatcherEvent::Stopped { .. } => "Dispatcher stopped",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
