use super::codec::i64_from_str_or_num;
use super::Height;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

/// One numbered slice of the base64-encoded genesis document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisChunk {
    pub index: usize,
    pub total: usize,
    /// Base64 payload exactly as served by the node.
    pub data: String,
}

#[derive(Deserialize)]
struct GenesisDocument {
    genesis_time: DateTime<Utc>,
    #[serde(default)]
    chain_id: String,
    #[serde(default = "default_initial_height", deserialize_with = "i64_from_str_or_num")]
    initial_height: Height,
    #[serde(default)]
    app_state: Option<Box<RawValue>>,
}

fn default_initial_height() -> Height {
    1
}

/// Parsed genesis document with per-module application state left opaque.
#[derive(Debug, Clone, Serialize)]
pub struct GenesisState {
    pub chain_id: String,
    pub genesis_time: DateTime<Utc>,
    pub initial_height: Height,
    pub app_state: BTreeMap<String, Box<RawValue>>,
}

impl GenesisState {
    /// Parses the reassembled genesis document and splits `app_state` by module.
    pub fn from_document(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let document: GenesisDocument = serde_json::from_slice(bytes)?;
        let app_state = match document.app_state {
            Some(raw) if raw.get() != "null" => serde_json::from_str(raw.get())?,
            _ => BTreeMap::new(),
        };

        Ok(Self {
            chain_id: document.chain_id,
            genesis_time: document.genesis_time,
            initial_height: document.initial_height,
            app_state,
        })
    }

    pub fn module(&self, name: &str) -> Option<&RawValue> {
        self.app_state.get(name).map(Box::as_ref)
    }

    /// Decodes one module's state; `Ok(None)` when the module has no entry.
    pub fn decode_module<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        self.module(name)
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }
}
