//! Sequence-numbered, authenticated command channel over session keys.
//!
//! Outbound: claim the next local sequence, seal the payload with AAD bound
//! to (key id, sequence, command), hand the message to the transport.
//! Inbound: open, then advance the remote sequence with a strict
//! compare-and-set; a message at or below the stored counter is dropped
//! with no side effect and no distinguishable error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::command::{Command, CommandContext, CommandRouter};
use super::message::{channel_aad, ChannelMessage, EncryptedMessage, PlaintextMessage};
use crate::crypto::KeyExchangeCrypto;
use crate::error::{KeypoolError, Result};
use crate::pool::{KeyPoolHandle, PoolIntent};
use crate::storage::KeyStore;

/// Carries channel messages to the peer (push service, socket, ...).
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn deliver(&self, message: &ChannelMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Accepted. `handled` is false when no handler was registered.
    Dispatched { command: Command, handled: bool },
    /// Discarded without side effects.
    Dropped,
}

pub struct SecureChannel {
    store: Arc<dyn KeyStore>,
    crypto: Arc<dyn KeyExchangeCrypto>,
    transport: Arc<dyn ChannelTransport>,
    router: Arc<CommandRouter>,
    pool: Option<KeyPoolHandle>,
}

impl SecureChannel {
    pub fn new(
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn KeyExchangeCrypto>,
        transport: Arc<dyn ChannelTransport>,
        router: Arc<CommandRouter>,
    ) -> Self {
        Self {
            store,
            crypto,
            transport,
            router,
            pool: None,
        }
    }

    /// Forward `public_keys_exhausted` to the pool worker.
    pub fn with_pool(mut self, pool: KeyPoolHandle) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    /// Seal `payload` under the session for `key_id` and deliver it.
    ///
    /// Without a live session key this fails with `NoActiveSession` after
    /// sending a plaintext `key_exchange_failed` to the peer.
    pub async fn send(
        &self,
        key_id: &str,
        command: Command,
        payload: &[u8],
    ) -> Result<EncryptedMessage> {
        let Some(key) = self.store.get_symmetric_key(key_id)? else {
            return Err(self.no_session(key_id).await);
        };
        // Expiry can land between the lookup and the claim.
        let Some(sequence) = self.store.claim_local_sequence(key_id)? else {
            return Err(self.no_session(key_id).await);
        };

        let aad = channel_aad(key_id, sequence, command);
        let sealed = self.crypto.seal(&key.key_material, payload, &aad)?;
        let message = EncryptedMessage {
            command,
            key_id: key_id.to_string(),
            sequence,
            ciphertext: keypool_crypto::encode_hex(&sealed),
        };

        self.transport
            .deliver(&ChannelMessage::Encrypted(message.clone()))
            .await?;
        debug!(key_id, sequence, %command, "sent encrypted message");
        Ok(message)
    }

    /// Deliver an unauthenticated control command.
    pub async fn send_plaintext(&self, command: Command) -> Result<()> {
        self.transport
            .deliver(&ChannelMessage::Plaintext(PlaintextMessage { command }))
            .await
    }

    /// Parse a JSON message and hand it to `receive`.
    pub async fn receive_json(&self, json: &str) -> Result<ReceiveOutcome> {
        let message = ChannelMessage::from_json(json)?;
        self.receive(message).await
    }

    pub async fn receive(&self, message: ChannelMessage) -> Result<ReceiveOutcome> {
        match message {
            ChannelMessage::Plaintext(PlaintextMessage { command }) => {
                Ok(self.dispatch(command, CommandContext::default()))
            }
            ChannelMessage::Encrypted(message) => self.receive_encrypted(message).await,
        }
    }

    async fn receive_encrypted(&self, message: EncryptedMessage) -> Result<ReceiveOutcome> {
        let key_id = message.key_id.as_str();
        let Some(key) = self.store.get_symmetric_key(key_id)? else {
            warn!(key_id, "message for unknown session");
            self.signal_key_exchange_failed().await;
            return Err(KeypoolError::UnknownSession(key_id.to_string()));
        };

        let sealed = keypool_crypto::decode_hex(&message.ciphertext)?;
        let aad = channel_aad(key_id, message.sequence, message.command);
        let payload = self.crypto.open(&key.key_material, &sealed, &aad)?;

        if !self
            .store
            .advance_remote_sequence(key_id, message.sequence)?
        {
            let replay = KeypoolError::ReplayDetected {
                key_id: key_id.to_string(),
                sequence: message.sequence,
                current: key.remote_sequence,
            };
            debug!(%replay, "dropping message");
            return Ok(ReceiveOutcome::Dropped);
        }

        Ok(self.dispatch(
            message.command,
            CommandContext {
                key_id: Some(message.key_id),
                payload,
            },
        ))
    }

    fn dispatch(&self, command: Command, context: CommandContext) -> ReceiveOutcome {
        if command == Command::PublicKeysExhausted {
            if let Some(pool) = &self.pool {
                if !pool.submit(PoolIntent::fresh()) {
                    warn!("pool worker stopped, exhaustion signal not forwarded");
                }
            }
        }
        let handled = self.router.route(command, &context);
        ReceiveOutcome::Dispatched { command, handled }
    }

    async fn no_session(&self, key_id: &str) -> KeypoolError {
        warn!(key_id, "no active session");
        self.signal_key_exchange_failed().await;
        KeypoolError::NoActiveSession(key_id.to_string())
    }

    async fn signal_key_exchange_failed(&self) {
        if let Err(e) = self.send_plaintext(Command::KeyExchangeFailed).await {
            warn!(error = %e, "could not signal key_exchange_failed");
        }
    }
}
