//! Event fan-out to attached observers.
//!
//! A thin wrapper over `tokio::sync::broadcast`: the session emits every
//! event exactly once and the channel delivers it to all current
//! subscribers in generation order. There is no per-observer filtering
//! and no backlog replay: an observer attaching mid-session sees only
//! events generated after it subscribed. Dropping a receiver detaches the
//! observer; the sender skips closed receivers automatically, so handles
//! are never leaked.

use tokio::sync::broadcast;

use crate::events::SessionEvent;

/// Default broadcast channel capacity.
///
/// Determines how many events can be buffered before slow receivers
/// start missing events. Set high enough to handle bursts of output.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Fan-out hub for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl Broadcaster {
    /// Create a broadcaster with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to future events.
    ///
    /// The receiver sees every event emitted after this call, in order.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event. A send with
    /// no subscribers is valid (no observers attached yet) and returns 0.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.event_tx.send(event).unwrap_or(0)
    }

    /// Number of currently attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}
