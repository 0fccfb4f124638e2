//! # Event Bus System
//!
//! Diagnostic event bus for the playback session core, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The session components publish coarse notifications here (connection
//! transitions, pending-command overflow, queue warnings, history outcomes)
//! so that hosts can surface or log them without reaching into component
//! internals. This bus is for observers only: the authoritative playback
//! state lives in the snapshot stream, and losing a diagnostic event never
//! affects playback.
//!
//! ```text
//! ┌────────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ CommandCoordinator ├────────>│           ├────────────>│ Host UI    │
//! ├────────────────────┤         │ EventBus  │             └────────────┘
//! │ QueueManager       ├────────>│ (broadcast│  subscribe  ┌────────────┐
//! ├────────────────────┤         │  channel) ├────────────>│ Diagnostics│
//! │ HistoryManager     ├────────>│           │             └────────────┘
//! └────────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, ConnectionEvent, EventBus};
//!
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connection(ConnectionEvent::Connected)).ok();
//! assert_eq!(
//!     rx.try_recv().unwrap(),
//!     CoreEvent::Connection(ConnectionEvent::Connected)
//! );
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep going.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! `emit` fails only when nobody is subscribed. Publishers ignore that with
//! `.ok()`.

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

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Engine connection lifecycle
    Connection(ConnectionEvent),
    /// Command submission and execution
    Command(CommandEvent),
    /// Queue management
    Queue(QueueEvent),
    /// Listening history
    History(HistoryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connection(e) => e.description(),
            CoreEvent::Command(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::History(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Connection(ConnectionEvent::AttemptFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::Lost { .. }) => EventSeverity::Warning,
            CoreEvent::Command(CommandEvent::Evicted { .. }) => EventSeverity::Warning,
            CoreEvent::Command(CommandEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Queue(QueueEvent::EmptyCollection { .. }) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::ItemsSkipped { .. }) => EventSeverity::Warning,
            CoreEvent::History(HistoryEvent::StorageFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::Connected) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::Loaded { .. }) => EventSeverity::Info,
            CoreEvent::History(HistoryEvent::TrackPersisted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

impl From<ConnectionEvent> for CoreEvent {
    fn from(event: ConnectionEvent) -> Self {
        CoreEvent::Connection(event)
    }
}

impl From<CommandEvent> for CoreEvent {
    fn from(event: CommandEvent) -> Self {
        CoreEvent::Command(event)
    }
}

impl From<QueueEvent> for CoreEvent {
    fn from(event: QueueEvent) -> Self {
        CoreEvent::Queue(event)
    }
}

impl From<HistoryEvent> for CoreEvent {
    fn from(event: HistoryEvent) -> Self {
        CoreEvent::History(event)
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
// Connection Events
// ============================================================================

/// Engine connection lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    /// A connection attempt started.
    Connecting {
        /// Zero-based attempt number since the last successful connection.
        attempt: u32,
    },
    /// Connection established.
    Connected,
    /// A connection attempt failed; another is scheduled.
    AttemptFailed {
        attempt: u32,
        message: String,
        retry_in_ms: u64,
    },
    /// An established connection was lost.
    Lost { reason: String },
    /// The coordinator was released.
    Released,
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::Connecting { .. } => "Connecting to playback engine",
            ConnectionEvent::Connected => "Connected to playback engine",
            ConnectionEvent::AttemptFailed { .. } => "Engine connection attempt failed",
            ConnectionEvent::Lost { .. } => "Engine connection lost",
            ConnectionEvent::Released => "Engine connection released",
        }
    }
}

// ============================================================================
// Command Events
// ============================================================================

/// Command submission and execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CommandEvent {
    /// Command buffered while the engine is not connected.
    Queued { command: String, pending: usize },
    /// Oldest pending command dropped because the buffer was full.
    Evicted { command: String, capacity: usize },
    /// Buffered commands replayed after (re)connecting.
    Replayed { count: usize },
    /// The engine rejected a command.
    Failed { command: String, message: String },
}

impl CommandEvent {
    fn description(&self) -> &str {
        match self {
            CommandEvent::Queued { .. } => "Command queued until connected",
            CommandEvent::Evicted { .. } => "Pending command evicted",
            CommandEvent::Replayed { .. } => "Pending commands replayed",
            CommandEvent::Failed { .. } => "Command failed",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Queue management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A new queue was handed to the engine.
    Loaded {
        recording_id: Option<String>,
        item_count: usize,
        start_index: usize,
    },
    /// Some items could not be resolved and were left out.
    ItemsSkipped { count: usize },
    /// Nothing in the collection could be resolved; the load was a no-op.
    EmptyCollection { recording_id: Option<String> },
    /// The current index moved.
    CurrentIndexChanged { index: usize },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Loaded { .. } => "Queue loaded",
            QueueEvent::ItemsSkipped { .. } => "Unresolvable queue items skipped",
            QueueEvent::EmptyCollection { .. } => "Collection has no playable items",
            QueueEvent::CurrentIndexChanged { .. } => "Current queue index changed",
        }
    }
}

// ============================================================================
// History Events
// ============================================================================

/// Listening history outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum HistoryEvent {
    SessionOpened { session_id: String },
    SessionClosed { session_id: String },
    /// A track play met the meaningful-listen policy and was written.
    TrackPersisted {
        track: String,
        played_ms: u64,
        completed: bool,
    },
    /// A track play was too short to keep.
    TrackDiscarded { track: String, played_ms: u64 },
    /// A history write failed; playback is unaffected.
    StorageFailed { operation: String, message: String },
}

impl HistoryEvent {
    fn description(&self) -> &str {
        match self {
            HistoryEvent::SessionOpened { .. } => "Listening session opened",
            HistoryEvent::SessionClosed { .. } => "Listening session closed",
            HistoryEvent::TrackPersisted { .. } => "Track play recorded",
            HistoryEvent::TrackDiscarded { .. } => "Track play discarded",
            HistoryEvent::StorageFailed { .. } => "History storage failure",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
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

    /// Returns the number of active subscribers.
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let bus = EventBus::new(16);
/// let warnings = EventStream::new(bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map(|f| f(event)).unwrap_or(true)
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
