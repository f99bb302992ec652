//! Background task that serializes pool intents.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::intent::PoolIntent;
use super::manager::KeyPoolManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    Ensure(PoolIntent),
    Shutdown,
}

/// Cheap, clonable sender for pool intents.
#[derive(Debug, Clone)]
pub struct KeyPoolHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl KeyPoolHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue an intent. Returns false once the worker has stopped.
    pub fn submit(&self, intent: PoolIntent) -> bool {
        self.sender.send(WorkerMessage::Ensure(intent)).is_ok()
    }

    pub fn request_refresh(&self) -> bool {
        self.submit(PoolIntent::fresh())
    }

    pub fn shutdown(&self) -> bool {
        self.sender.send(WorkerMessage::Shutdown).is_ok()
    }

    /// A handle that does not keep the worker's channel open.
    pub fn downgrade(&self) -> WeakKeyPoolHandle {
        WeakKeyPoolHandle {
            sender: self.sender.downgrade(),
        }
    }

    /// Submit a fresh intent every `period`, starting immediately. The task
    /// ends when the worker stops accepting intents.
    pub fn spawn_periodic_refresh(&self, period: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !handle.request_refresh() {
                    break;
                }
            }
        })
    }
}

/// Non-owning counterpart of `KeyPoolHandle`, for components the worker
/// itself owns (the retry scheduler). Upgrading fails once every strong
/// handle is gone.
#[derive(Debug, Clone)]
pub struct WeakKeyPoolHandle {
    sender: mpsc::WeakUnboundedSender<WorkerMessage>,
}

impl WeakKeyPoolHandle {
    pub fn upgrade(&self) -> Option<KeyPoolHandle> {
        self.sender.upgrade().map(|sender| KeyPoolHandle { sender })
    }
}

pub struct KeyPoolWorker {
    manager: Arc<KeyPoolManager>,
    receiver: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl KeyPoolWorker {
    pub fn new(
        manager: Arc<KeyPoolManager>,
        receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Self {
        Self { manager, receiver }
    }

    /// Handle intents one at a time until shut down or every handle is gone.
    pub async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            let intent = match message {
                WorkerMessage::Ensure(intent) => intent,
                WorkerMessage::Shutdown => break,
            };
            match self.manager.ensure_pool(intent).await {
                Ok(outcome) => debug!(?intent, ?outcome, "pool intent handled"),
                Err(e) => warn!(?intent, error = %e, "pool intent failed"),
            }
        }
        self.receiver.close();
        debug!("key pool worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
