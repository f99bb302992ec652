//! Change notifications published after each committed store mutation.

use tokio::sync::broadcast;

use crate::types::{KeyId, SequenceDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    EcdhKeys,
    SymmetricKeys,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Inserted {
        table: StoreTable,
        key_id: KeyId,
    },
    Deleted {
        table: StoreTable,
        count: usize,
    },
    SequenceAdvanced {
        key_id: KeyId,
        direction: SequenceDirection,
    },
    /// Expired session keys were swept.
    Purged {
        count: usize,
    },
    /// Both tables were emptied (account removal).
    Cleared,
}

/// Broadcast fan-out. Publishing never blocks and never fails: with no
/// subscribers the event is simply dropped.
pub(crate) struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}
