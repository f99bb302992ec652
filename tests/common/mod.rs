//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use ecdh_keypool::upload::{PublishRequest, ScheduledRetry};
use ecdh_keypool::{
    AccountContext, DirectoryClient, KeyId, PublishError, PublishResponse, RetryScheduler,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

pub fn account() -> AccountContext {
    AccountContext {
        account_id: "acct-1".to_string(),
        device_id: "device-1".to_string(),
    }
}

/// What the directory does with the next request.
#[derive(Debug, Clone)]
pub enum Reply {
    AckAll,
    /// Acknowledge only the first `n` ids of the request.
    AckFirst(usize),
    Status(u16),
    Offline,
}

/// Scripted directory. Falls back to `AckAll` once the script runs out.
#[derive(Default)]
pub struct FakeDirectory {
    script: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<PublishRequest>>,
    gate: Option<Arc<Gate>>,
}

/// Holds a request open until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl FakeDirectory {
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn publish_public_keys(
        &self,
        request: &PublishRequest,
    ) -> Result<PublishResponse, PublishError> {
        self.requests.lock().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let reply = self.script.lock().pop_front().unwrap_or(Reply::AckAll);
        let ids = request.public_keys.iter().map(|k| k.key_id.clone());
        match reply {
            Reply::AckAll => Ok(PublishResponse::ok(ids.collect())),
            Reply::AckFirst(n) => Ok(PublishResponse::ok(ids.take(n).collect::<Vec<KeyId>>())),
            Reply::Status(code) => Ok(PublishResponse {
                status_code: code,
                key_ids: vec![],
            }),
            Reply::Offline => Err(PublishError::connectivity("network unreachable")),
        }
    }
}

#[derive(Default)]
pub struct RecordingScheduler {
    pub retries: Mutex<Vec<ScheduledRetry>>,
}

impl RetryScheduler for RecordingScheduler {
    fn schedule_retry(&self, retry: ScheduledRetry) {
        self.retries.lock().push(retry);
    }
}
