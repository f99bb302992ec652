//! Keeps the one-time key pool at its minimum size and in sync with the
//! directory.
//!
//! A pass sizes the pool, publishes every pair's public half, and on a 200
//! deletes the local pairs whose ids the directory no longer lists. If
//! that leaves the pool short, the pass repeats with the same intent up to
//! `max_reconcile_rounds` times.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::intent::PoolIntent;
use crate::config::PoolOptions;
use crate::crypto::KeyExchangeCrypto;
use crate::error::{KeypoolError, Result};
use crate::storage::KeyStore;
use crate::types::{generate_key_id, KeyId};
use crate::upload::{AccountProvider, PublishOutcome, PublishResponse, UploadCoordinator};

/// What one `ensure_pool` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    /// Upload not requested; only sizing ran.
    Generated { generated: usize, pool_size: usize },
    /// Pool was empty, so there was nothing to publish.
    NothingToUpload,
    /// No paired account; pairs are kept locally.
    NoAccount { pool_size: usize },
    /// Another publish was in flight; a retry was scheduled.
    Deferred { delay: Duration },
    /// Publish failed; a retry was scheduled.
    RetryScheduled { delay: Duration, attempt: u32 },
    /// Directory acknowledged and the pool is at or above the minimum.
    Synced {
        generated: usize,
        removed: usize,
        pool_size: usize,
    },
    /// Reconciliation kept draining the pool; gave up for this call.
    ReconcileLimitReached { removed: usize, pool_size: usize },
}

pub struct KeyPoolManager {
    store: Arc<dyn KeyStore>,
    crypto: Arc<dyn KeyExchangeCrypto>,
    accounts: Arc<dyn AccountProvider>,
    uploader: Arc<UploadCoordinator>,
    options: PoolOptions,
}

impl KeyPoolManager {
    pub fn new(
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn KeyExchangeCrypto>,
        accounts: Arc<dyn AccountProvider>,
        uploader: Arc<UploadCoordinator>,
        options: PoolOptions,
    ) -> Self {
        Self {
            store,
            crypto,
            accounts,
            uploader,
            options,
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn uploader(&self) -> &Arc<UploadCoordinator> {
        &self.uploader
    }

    /// Bring the pool to the minimum and, if `intent.upload`, publish it.
    ///
    /// Retry intents never generate keys. Network failures are not errors:
    /// they come back as `Deferred` or `RetryScheduled`. Storage and
    /// generation failures propagate.
    pub async fn ensure_pool(&self, intent: PoolIntent) -> Result<PoolOutcome> {
        let max_rounds = self.options.max_reconcile_rounds.max(1);
        let minimum = self.options.minimum_keys;
        let mut generated = 0;
        let mut removed = 0;

        for round in 1..=max_rounds {
            let count = self.store.count_ecdh_key_pairs()?;
            if count < minimum && !intent.is_retry() {
                generated += self.generate(minimum - count)?;
            }

            if !intent.upload {
                let pool_size = self.store.count_ecdh_key_pairs()?;
                return Ok(PoolOutcome::Generated {
                    generated,
                    pool_size,
                });
            }

            let pairs = self.store.list_ecdh_key_pairs()?;
            if pairs.is_empty() {
                debug!("key pool empty, nothing to publish");
                self.uploader.reset_backoff();
                return Ok(PoolOutcome::NothingToUpload);
            }

            let Some(account) = self.accounts.current_account() else {
                debug!(pool_size = pairs.len(), "no paired account, skipping publish");
                self.uploader.reset_backoff();
                return Ok(PoolOutcome::NoAccount {
                    pool_size: pairs.len(),
                });
            };

            let response = match self.uploader.publish(&account, &pairs, intent).await {
                PublishOutcome::Acknowledged(response) => response,
                PublishOutcome::Deferred { delay } => return Ok(PoolOutcome::Deferred { delay }),
                PublishOutcome::RetryScheduled { delay, attempt } => {
                    return Ok(PoolOutcome::RetryScheduled { delay, attempt })
                }
            };
            drop(pairs);

            removed += self.reconcile(&response)?;
            let pool_size = self.store.count_ecdh_key_pairs()?;
            if pool_size >= minimum {
                return Ok(PoolOutcome::Synced {
                    generated,
                    removed,
                    pool_size,
                });
            }
            debug!(round, pool_size, minimum, "pool short after reconciliation");
        }

        let pool_size = self.store.count_ecdh_key_pairs()?;
        warn!(
            rounds = max_rounds,
            pool_size, minimum, "reconciliation round limit reached"
        );
        Ok(PoolOutcome::ReconcileLimitReached { removed, pool_size })
    }

    /// Delete every local pair whose id is absent from the directory's
    /// acknowledged set. Returns the number deleted.
    pub fn reconcile(&self, response: &PublishResponse) -> Result<usize> {
        let acknowledged: HashSet<&str> = response.key_ids.iter().map(String::as_str).collect();
        let stale: HashSet<KeyId> = self
            .store
            .list_ecdh_key_pairs()?
            .iter()
            .filter(|pair| !acknowledged.contains(pair.key_id()))
            .map(|pair| pair.key_id().to_string())
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }
        for key_id in &stale {
            debug!(key_id = %key_id, "removing key the directory no longer holds");
        }
        let removed = self.store.delete_ecdh_key_pairs(&stale)?;
        info!(removed, "reconciled key pool with directory");
        Ok(removed)
    }

    /// Drop every pair and session key; called when the account is removed.
    pub fn forget_account(&self) -> Result<()> {
        self.store.delete_all()?;
        self.uploader.reset_backoff();
        info!("key pool cleared for removed account");
        Ok(())
    }

    /// Generate and persist `deficit` pairs one at a time, so a crash
    /// keeps the pairs stored so far.
    fn generate(&self, deficit: usize) -> Result<usize> {
        debug!(deficit, "generating key pairs");
        for _ in 0..deficit {
            self.generate_one()?;
        }
        info!(generated = deficit, "generated key pairs");
        Ok(deficit)
    }

    fn generate_one(&self) -> Result<()> {
        let attempts = self.options.key_id_attempts.max(1);
        let mut last_duplicate = None;
        for _ in 0..attempts {
            let pair = self.crypto.generate_key_pair(generate_key_id())?;
            match self.store.insert_ecdh_key_pair(&pair) {
                Ok(()) => return Ok(()),
                Err(KeypoolError::DuplicateKeyId(key_id)) => {
                    warn!(key_id = %key_id, "key id collision, minting a new id");
                    last_duplicate = Some(key_id);
                }
                Err(e) => return Err(e),
            }
        }
        Err(KeypoolError::DuplicateKeyId(
            last_duplicate.unwrap_or_default(),
        ))
    }
}
