use super::transaction::Transaction;
use super::Height;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Block header data as returned by the chain node, before gas aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub height: Height,
    pub hash: String,
    pub proposer_address: String,
    pub time: DateTime<Utc>,
    /// Upper-case hex SHA-256 of every raw transaction, in block order.
    pub tx_hashes: Vec<String>,
    pub evidence: Vec<serde_json::Value>,
    pub signatures: Vec<CommitSignature>,
}

/// One entry of the previous block's commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSignature {
    pub validator_address: String,
    pub block_id_flag: u64,
    pub timestamp: DateTime<Utc>,
    /// Base64 signature; `None` or empty when the validator did not sign.
    pub signature: Option<String>,
}

impl CommitSignature {
    fn is_signed(&self) -> bool {
        self.signature
            .as_deref()
            .is_some_and(|signature| !signature.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPreCommit {
    pub validator_address: String,
    pub block_id_flag: u64,
    pub timestamp: DateTime<Utc>,
}

/// Normalized block handed to block-capable modules.
///
/// Built once from the fetched header and the block's transactions; there is no
/// way to mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRecord {
    height: Height,
    hash: String,
    proposer_address: String,
    timestamp: DateTime<Utc>,
    tx_num: usize,
    total_gas: u64,
    evidence: Vec<serde_json::Value>,
    validator_precommits: Vec<ValidatorPreCommit>,
}

impl BlockRecord {
    /// Aggregates gas from `transactions` and drops unsigned commit entries.
    pub fn from_parts(raw: RawBlock, transactions: &[Transaction]) -> Self {
        let total_gas = transactions
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.gas_used));

        let validator_precommits = raw
            .signatures
            .into_iter()
            .filter(CommitSignature::is_signed)
            .map(|sig| ValidatorPreCommit {
                validator_address: sig.validator_address,
                block_id_flag: sig.block_id_flag,
                timestamp: sig.timestamp,
            })
            .collect();

        Self {
            height: raw.height,
            hash: raw.hash,
            proposer_address: raw.proposer_address,
            timestamp: raw.time,
            tx_num: raw.tx_hashes.len(),
            total_gas,
            evidence: raw.evidence,
            validator_precommits,
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn proposer_address(&self) -> &str {
        &self.proposer_address
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tx_num(&self) -> usize {
        self.tx_num
    }

    pub fn total_gas(&self) -> u64 {
        self.total_gas
    }

    pub fn evidence(&self) -> &[serde_json::Value] {
        &self.evidence
    }

    pub fn validator_precommits(&self) -> &[ValidatorPreCommit] {
        &self.validator_precommits
    }
}
