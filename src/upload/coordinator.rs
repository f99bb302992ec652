//! Single-flight publishing of public halves with backoff on failure.
//!
//! At most one publish is in flight per coordinator. A caller that finds
//! one running does not wait: it schedules a retry of its own intent and
//! returns. Every failure path (non-200 status, connectivity, concurrent
//! caller) ends in a scheduled retry; only a 200 resets the backoff.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::backoff::{BackoffPolicy, BackoffState};
use super::types::{
    AccountContext, DirectoryClient, PublishRequest, PublishResponse, RetryScheduler,
    ScheduledRetry,
};
use crate::pool::PoolIntent;
use crate::types::EcdhKeyPair;

/// Result of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The directory answered 200; the response is authoritative.
    Acknowledged(PublishResponse),
    /// Another publish was in flight. A retry was scheduled.
    Deferred { delay: Duration },
    /// The publish failed. A retry was scheduled.
    RetryScheduled { delay: Duration, attempt: u32 },
}

#[derive(Debug, Default)]
struct UploadState {
    in_flight: bool,
    backoff: BackoffState,
}

pub struct UploadCoordinator {
    client: Arc<dyn DirectoryClient>,
    scheduler: Arc<dyn RetryScheduler>,
    policy: BackoffPolicy,
    state: Mutex<UploadState>,
}

/// Clears the in-flight flag on drop, including when the publish future is
/// cancelled mid-request.
struct InFlight<'a> {
    state: &'a Mutex<UploadState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight = false;
    }
}

impl UploadCoordinator {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        scheduler: Arc<dyn RetryScheduler>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            scheduler,
            policy,
            state: Mutex::new(UploadState::default()),
        }
    }

    /// Publish the public halves of `pairs` for `account`.
    pub async fn publish(
        &self,
        account: &AccountContext,
        pairs: &[EcdhKeyPair],
        intent: PoolIntent,
    ) -> PublishOutcome {
        let Some(flight) = self.try_begin() else {
            let (_, delay) = self.schedule(intent);
            debug!(delay_ms = millis(delay), "publish already in flight, deferring");
            return PublishOutcome::Deferred { delay };
        };

        let request = PublishRequest::new(account.clone(), pairs);
        debug!(
            account_id = %account.account_id,
            keys = request.public_keys.len(),
            "publishing public keys"
        );
        let result = self.client.publish_public_keys(&request).await;
        drop(flight);

        match result {
            Ok(response) if response.is_success() => {
                self.reset_backoff();
                info!(
                    acknowledged = response.key_ids.len(),
                    "directory acknowledged public keys"
                );
                PublishOutcome::Acknowledged(response)
            }
            Ok(response) => {
                let (attempt, delay) = self.schedule(intent);
                warn!(
                    status = response.status_code,
                    attempt,
                    delay_ms = millis(delay),
                    "directory rejected publish, retry scheduled"
                );
                PublishOutcome::RetryScheduled { delay, attempt }
            }
            Err(e) => {
                let (attempt, delay) = self.schedule(intent);
                warn!(
                    error = %e,
                    attempt,
                    delay_ms = millis(delay),
                    "publish failed, retry scheduled"
                );
                PublishOutcome::RetryScheduled { delay, attempt }
            }
        }
    }

    pub fn reset_backoff(&self) {
        self.state.lock().backoff.reset();
    }

    pub fn backoff_attempts(&self) -> u32 {
        self.state.lock().backoff.attempts()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        let mut state = self.state.lock();
        if state.in_flight {
            return None;
        }
        state.in_flight = true;
        Some(InFlight { state: &self.state })
    }

    fn schedule(&self, intent: PoolIntent) -> (u32, Duration) {
        let (attempt, delay) = self.state.lock().backoff.advance(&self.policy);
        self.scheduler.schedule_retry(ScheduledRetry {
            intent: intent.into_retry(),
            delay,
            attempt,
        });
        (attempt, delay)
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
