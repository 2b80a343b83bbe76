//! CometBFT JSON-RPC response shapes and their conversion into the pipeline's
//! records. CometBFT encodes 64-bit integers as strings and byte blobs as
//! base64; both are normalized here.

use super::decode::{tx_hash, AddressCodec, DecodedTx};
use super::node::ChainError;
use crate::types::codec::{i64_from_str_or_num, u64_from_str_or_num};
use crate::types::{
    CommitSignature, GenesisChunk, Height, MessageLog, RawBlock, Transaction, TxMessage,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub(crate) const BLOCK_METHOD: &str = "block";
pub(crate) const TX_SEARCH_METHOD: &str = "tx_search";
pub(crate) const GENESIS_CHUNKED_METHOD: &str = "genesis_chunked";
pub(crate) const STATUS_METHOD: &str = "status";

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub struct SyncInfo {
    #[serde(deserialize_with = "i64_from_str_or_num")]
    pub latest_block_height: Height,
    #[serde(default)]
    pub catching_up: bool,
}

#[derive(Debug, Deserialize)]
pub struct BlockResponse {
    pub block_id: BlockId,
    pub block: BlockBody,
}

#[derive(Debug, Deserialize)]
pub struct BlockId {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
    pub header: Header,
    #[serde(default)]
    pub data: BlockData,
    #[serde(default)]
    pub evidence: EvidenceList,
    #[serde(default)]
    pub last_commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    #[serde(deserialize_with = "i64_from_str_or_num")]
    pub height: Height,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub proposer_address: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockData {
    #[serde(default)]
    pub txs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvidenceList {
    #[serde(default)]
    pub evidence: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub signatures: Vec<CommitSig>,
}

#[derive(Debug, Deserialize)]
pub struct CommitSig {
    pub block_id_flag: u64,
    #[serde(default)]
    pub validator_address: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl BlockResponse {
    pub(crate) fn into_raw_block(self, addresses: &AddressCodec) -> Result<RawBlock, ChainError> {
        let header = self.block.header;
        let proposer_address = addresses
            .consensus_address_from_hex(&header.proposer_address)
            .map_err(|err| ChainError::decode(BLOCK_METHOD, format!("{err:#}")))?;

        let mut tx_hashes = Vec::new();
        for encoded in self.block.data.txs.unwrap_or_default() {
            let raw = BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| ChainError::decode(BLOCK_METHOD, format!("invalid base64 tx: {err}")))?;
            tx_hashes.push(tx_hash(&raw));
        }

        let mut signatures = Vec::new();
        for sig in self.block.last_commit.map(|commit| commit.signatures).unwrap_or_default() {
            let validator_address = addresses
                .consensus_address_from_hex(&sig.validator_address)
                .map_err(|err| ChainError::decode(BLOCK_METHOD, format!("{err:#}")))?;
            signatures.push(CommitSignature {
                validator_address,
                block_id_flag: sig.block_id_flag,
                timestamp: sig.timestamp,
                signature: sig.signature,
            });
        }

        Ok(RawBlock {
            height: header.height,
            hash: self.block_id.hash,
            proposer_address,
            time: header.time,
            tx_hashes,
            evidence: self.block.evidence.evidence.unwrap_or_default(),
            signatures,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TxSearchResponse {
    #[serde(default)]
    pub txs: Vec<TxSearchEntry>,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct TxSearchEntry {
    pub hash: String,
    #[serde(deserialize_with = "i64_from_str_or_num")]
    pub height: Height,
    pub tx_result: TxResult,
    pub tx: String,
}

#[derive(Debug, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub log: String,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    pub gas_wanted: u64,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    pub gas_used: u64,
}

impl TxSearchEntry {
    pub(crate) fn into_transaction(self, addresses: &AddressCodec) -> Result<Transaction, ChainError> {
        let raw = BASE64
            .decode(self.tx.as_bytes())
            .map_err(|err| ChainError::decode(TX_SEARCH_METHOD, format!("invalid base64 tx: {err}")))?;

        let hash = tx_hash(&raw);
        if !hash.eq_ignore_ascii_case(&self.hash) {
            return Err(ChainError::decode(
                TX_SEARCH_METHOD,
                format!("tx hash mismatch: node reported {}, bytes hash to {hash}", self.hash),
            ));
        }

        let decoded = DecodedTx::decode(&raw).map_err(|err| {
            ChainError::decode(TX_SEARCH_METHOD, format!("failed to decode tx {hash}: {err}"))
        })?;
        let signer = addresses.signer_of(&decoded);

        // Pre-0.50 SDKs put per-message logs in `log` as JSON; failed txs and
        // newer SDKs leave a plain string there instead.
        let logs = serde_json::from_str::<Vec<MessageLog>>(&self.tx_result.log).unwrap_or_default();

        Ok(Transaction {
            height: self.height,
            hash,
            messages: decoded
                .body
                .messages
                .into_iter()
                .map(|any| TxMessage {
                    type_url: any.type_url,
                    value: any.value,
                })
                .collect(),
            memo: decoded.body.memo,
            logs,
            raw_log: self.tx_result.log,
            code: self.tx_result.code,
            codespace: self.tx_result.codespace,
            gas_wanted: self.tx_result.gas_wanted,
            gas_used: self.tx_result.gas_used,
            signer,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GenesisChunkResponse {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub chunk: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub total: u64,
    pub data: String,
}

impl GenesisChunkResponse {
    pub(crate) fn into_chunk(self) -> Result<GenesisChunk, ChainError> {
        let index = usize::try_from(self.chunk)
            .map_err(|_| ChainError::decode(GENESIS_CHUNKED_METHOD, "chunk index overflows usize"))?;
        let total = usize::try_from(self.total)
            .map_err(|_| ChainError::decode(GENESIS_CHUNKED_METHOD, "chunk total overflows usize"))?;
        Ok(GenesisChunk {
            index,
            total,
            data: self.data,
        })
    }
}
