//! Wires the pool manager, upload coordinator, retry scheduler, and
//! worker together on the current tokio runtime.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use super::manager::KeyPoolManager;
use super::worker::{KeyPoolHandle, KeyPoolWorker};
use crate::config::KeypoolConfig;
use crate::crypto::KeyExchangeCrypto;
use crate::error::Result;
use crate::storage::KeyStore;
use crate::upload::{AccountProvider, DirectoryClient, TokioRetryScheduler, UploadCoordinator};

/// Owns the worker task. Dropping it without `shutdown` still cancels
/// pending retries and tells the worker to stop; it just does not wait.
pub struct KeyPoolRuntime {
    handle: KeyPoolHandle,
    manager: Arc<KeyPoolManager>,
    scheduler: Arc<TokioRetryScheduler>,
    task: Option<JoinHandle<()>>,
}

impl KeyPoolRuntime {
    /// Validate `config` and start the worker. Must be called from within
    /// a tokio runtime.
    pub fn spawn(
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn KeyExchangeCrypto>,
        accounts: Arc<dyn AccountProvider>,
        client: Arc<dyn DirectoryClient>,
        config: &KeypoolConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (handle, receiver) = KeyPoolHandle::channel();
        let scheduler = Arc::new(TokioRetryScheduler::new(&handle));
        let uploader = Arc::new(UploadCoordinator::new(
            client,
            scheduler.clone(),
            config.backoff.clone(),
        ));
        let manager = Arc::new(KeyPoolManager::new(
            store,
            crypto,
            accounts,
            uploader,
            config.pool.clone(),
        ));
        let task = KeyPoolWorker::new(manager.clone(), receiver).spawn();
        info!(minimum_keys = config.pool.minimum_keys, "key pool worker started");

        Ok(Self {
            handle,
            manager,
            scheduler,
            task: Some(task),
        })
    }

    pub fn handle(&self) -> KeyPoolHandle {
        self.handle.clone()
    }

    pub fn manager(&self) -> &Arc<KeyPoolManager> {
        &self.manager
    }

    /// Cancel pending retries, stop the worker, and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("key pool worker shut down");
    }

    fn stop(&self) {
        self.scheduler.shutdown();
        self.handle.shutdown();
    }
}

impl Drop for KeyPoolRuntime {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop();
        }
    }
}
