use super::codec::base64_bytes;
use super::Height;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decoded transaction together with its execution result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub height: Height,
    /// Upper-case hex SHA-256 of the raw transaction bytes.
    pub hash: String,
    pub messages: Vec<TxMessage>,
    pub memo: String,
    pub logs: Vec<MessageLog>,
    pub raw_log: String,
    pub code: u32,
    pub codespace: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// Bech32 account address of the first signer, empty when the transaction
    /// carries no public key.
    pub signer: String,
}

/// A protobuf `Any` message as it appears in the transaction body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMessage {
    pub type_url: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    #[serde(default)]
    pub msg_index: u32,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no log for message {msg_index} inside tx with hash {tx_hash}")]
    MissingLog { msg_index: usize, tx_hash: String },
    #[error("no event found: {kind} inside tx with hash {tx_hash}")]
    EventNotFound { kind: String, tx_hash: String },
    #[error("no event with attribute: {key} found inside tx with hash {tx_hash}")]
    AttributeNotFound { key: String, tx_hash: String },
}

impl Transaction {
    pub fn successful(&self) -> bool {
        self.code == 0
    }

    /// Returns the event of type `kind` emitted by the message at `msg_index`.
    pub fn find_event_by_type(&self, msg_index: usize, kind: &str) -> Result<&Event, LookupError> {
        let log = self.logs.get(msg_index).ok_or_else(|| LookupError::MissingLog {
            msg_index,
            tx_hash: self.hash.clone(),
        })?;

        log.events
            .iter()
            .find(|event| event.kind == kind)
            .ok_or_else(|| LookupError::EventNotFound {
                kind: kind.to_string(),
                tx_hash: self.hash.clone(),
            })
    }

    pub fn find_attribute<'a>(&self, event: &'a Event, key: &str) -> Result<&'a str, LookupError> {
        event
            .attributes
            .iter()
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value.as_str())
            .ok_or_else(|| LookupError::AttributeNotFound {
                key: key.to_string(),
                tx_hash: self.hash.clone(),
            })
    }
}

impl fmt::Display for TxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.type_url, self.value.len())
    }
}
