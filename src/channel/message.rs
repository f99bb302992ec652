//! JSON wire forms for channel messages.

use serde::{Deserialize, Serialize};

use super::command::Command;
use crate::error::{KeypoolError, Result};
use crate::types::KeyId;

/// Unauthenticated control message, e.g. `key_exchange_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextMessage {
    pub command: Command,
}

/// Sealed message bound to a session key and sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub command: Command,
    pub key_id: KeyId,
    pub sequence: i64,
    /// Hex of `[version][iv][ciphertext+tag]`.
    pub ciphertext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    // Encrypted first: a plaintext body would also match it otherwise.
    Encrypted(EncryptedMessage),
    Plaintext(PlaintextMessage),
}

impl ChannelMessage {
    pub fn command(&self) -> Command {
        match self {
            ChannelMessage::Encrypted(m) => m.command,
            ChannelMessage::Plaintext(m) => m.command,
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Encrypted(m) => Some(&m.key_id),
            ChannelMessage::Plaintext(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KeypoolError::InvalidMessage(e.to_string()))
    }
}

/// Associated data sealed with every payload:
/// `key_id || 0x00 || sequence (u64 BE) || command`.
pub fn channel_aad(key_id: &str, sequence: i64, command: Command) -> Vec<u8> {
    let command = command.as_str();
    let mut aad = Vec::with_capacity(key_id.len() + 1 + 8 + command.len());
    aad.extend_from_slice(key_id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(&(sequence as u64).to_be_bytes());
    aad.extend_from_slice(command.as_bytes());
    aad
}
