//! Upload seams: the directory service, the paired account, and retry
//! scheduling.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pool::PoolIntent;
use crate::types::{EcdhKeyPair, KeyId, PublicKeyHalf};

// ============================================================================
// Account
// ============================================================================

/// The paired account keys are published for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_id: String,
    pub device_id: String,
}

/// Looks up the paired account. `None` means the device is not paired and
/// there is nowhere to publish to.
pub trait AccountProvider: Send + Sync {
    fn current_account(&self) -> Option<AccountContext>;
}

/// Fixed account, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticAccount(pub Option<AccountContext>);

impl AccountProvider for StaticAccount {
    fn current_account(&self) -> Option<AccountContext> {
        self.0.clone()
    }
}

// ============================================================================
// DirectoryClient: user-provided network layer
// ============================================================================

/// Body sent to the directory: account plus the public halves only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub account: AccountContext,
    pub public_keys: Vec<PublicKeyHalf>,
}

impl PublishRequest {
    pub fn new(account: AccountContext, pairs: &[EcdhKeyPair]) -> Self {
        Self {
            account,
            public_keys: pairs.iter().map(EcdhKeyPair::public_half).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Directory reply. `key_ids` is the authoritative set of key ids the
/// server still holds for this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status_code: u16,
    #[serde(default)]
    pub key_ids: Vec<KeyId>,
}

impl PublishResponse {
    pub fn ok(key_ids: Vec<KeyId>) -> Self {
        Self {
            status_code: 200,
            key_ids,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Network-level failure. `status` is `None` for connectivity failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishError {
    pub status: Option<u16>,
    pub message: String,
}

impl PublishError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for PublishError {}

/// User-implemented transport to the key directory (HTTP, etc.).
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn publish_public_keys(
        &self,
        request: &PublishRequest,
    ) -> Result<PublishResponse, PublishError>;
}

// ============================================================================
// RetryScheduler
// ============================================================================

/// A retry the coordinator wants delivered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Always a `RetryAfterBackoff` intent.
    pub intent: PoolIntent,
    pub delay: Duration,
    /// Backoff attempt this delay was computed for (1-based).
    pub attempt: u32,
}

/// Arranges for `retry.intent` to be re-delivered after `retry.delay`.
pub trait RetryScheduler: Send + Sync {
    fn schedule_retry(&self, retry: ScheduledRetry);
}
