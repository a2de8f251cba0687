use tokio::sync::broadcast;

use crate::store::ConnectionState;

const CHANNEL_CAPACITY: usize = 256;

/// What changed in the store. Receivers re-read the store for the new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Loading(bool),
    Fetched { count: usize },
    BookingAdded(String),
    BookingRemoved(String),
    BookingUpdated(String),
    Counts { pending: u64, urgent: u64 },
    Connection(ConnectionState),
    Error(Option<String>),
    Reset,
}

/// Broadcast hub for store change notifications.
pub struct NotifyHub {
    sender: broadcast::Sender<StoreChange>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, change: StoreChange) {
        let _ = self.sender.send(change);
    }
}
