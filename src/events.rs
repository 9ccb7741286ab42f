//! Client-level events.
//!
//! Lets any consumer of this core observe connection/metadata lifecycle
//! without polling, using `tokio::sync::broadcast` the way async Rust
//! networking crates commonly expose fire-and-forget lifecycle
//! notifications.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::Error;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Bootstrap connect succeeded and metadata was loaded.
    Ready,
    /// A background operation failed; the client keeps running.
    Error(Arc<Error>),
    /// Bootstrap connect is starting (including retries).
    Connect,
    /// A previously-closed connection was reopened.
    Reconnect,
    /// `close()` has finished draining and torn everything down.
    Close,
    /// A socket-level error outside of the initial connect attempt.
    SocketError(Arc<Error>),
    /// The set of known brokers changed.
    BrokersChanged,
}

/// A cheap multi-subscriber event bus. Sends are best-effort: if nobody is
/// listening the event is simply dropped, matching an `EventEmitter` with no
/// listeners attached.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(128);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
