//! Control commands carried by the channel and their routing to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::KeyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    BeginLocate,
    BeginWipe,
    KeyExchangeFailed,
    PasswordReset,
    PublicKeysExhausted,
    /// Opaque application payload.
    SecureMessage,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::BeginLocate => "begin_locate",
            Command::BeginWipe => "begin_wipe",
            Command::KeyExchangeFailed => "key_exchange_failed",
            Command::PasswordReset => "password_reset",
            Command::PublicKeysExhausted => "public_keys_exhausted",
            Command::SecureMessage => "secure_message",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler receives alongside the command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandContext {
    /// Session the command arrived on; `None` for plaintext commands.
    pub key_id: Option<KeyId>,
    pub payload: Vec<u8>,
}

/// External effect for a command (locate, wipe, password reset, ...).
pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: Command, context: &CommandContext);
}

/// Maps each command to at most one handler.
#[derive(Default)]
pub struct CommandRouter {
    handlers: RwLock<HashMap<Command, Arc<dyn CommandHandler>>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any previous one.
    pub fn register(&self, command: Command, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().insert(command, handler);
    }

    pub fn unregister(&self, command: Command) -> bool {
        self.handlers.write().remove(&command).is_some()
    }

    /// Returns false when nothing is registered for `command`.
    pub fn route(&self, command: Command, context: &CommandContext) -> bool {
        let handler = self.handlers.read().get(&command).cloned();
        match handler {
            Some(handler) => {
                handler.handle(command, context);
                true
            }
            None => {
                debug!(%command, "no handler registered");
                false
            }
        }
    }
}
