//! Cosmos SDK transaction decoding and bech32 address derivation.
//!
//! Only the protobuf fields the pipeline reads are declared; prost skips the
//! rest of the wire data.

use anyhow::{Context, Result};
use bech32::{Bech32, Hrp};
use prost::Message;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

const SECP256K1_PUBKEY: &str = "/cosmos.crypto.secp256k1.PubKey";
const ED25519_PUBKEY: &str = "/cosmos.crypto.ed25519.PubKey";
const ADDRESS_LEN: usize = 20;

#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

/// Body and auth info of a raw transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTx {
    pub body: TxBody,
    pub auth_info: AuthInfo,
}

impl DecodedTx {
    pub fn decode(raw: &[u8]) -> Result<Self, prost::DecodeError> {
        let envelope = TxRaw::decode(raw)?;
        let body = TxBody::decode(envelope.body_bytes.as_slice())?;
        let auth_info = AuthInfo::decode(envelope.auth_info_bytes.as_slice())?;
        Ok(Self { body, auth_info })
    }

    /// Public key of the first signer, if the transaction carries one.
    pub fn first_signer_key(&self) -> Option<&Any> {
        self.auth_info
            .signer_infos
            .first()
            .and_then(|info| info.public_key.as_ref())
    }
}

/// Upper-case hex SHA-256, the identifier CometBFT uses for transactions.
pub fn tx_hash(raw: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(raw))
}

/// Derives the 20-byte address for a supported public key type.
pub fn address_from_pubkey(public_key: &Any) -> Option<Vec<u8>> {
    let key = PubKey::decode(public_key.value.as_slice()).ok()?.key;
    match public_key.type_url.as_str() {
        SECP256K1_PUBKEY => Some(Ripemd160::digest(Sha256::digest(&key)).to_vec()),
        ED25519_PUBKEY => Some(Sha256::digest(&key)[..ADDRESS_LEN].to_vec()),
        _ => None,
    }
}

/// Bech32 encoder for account and consensus addresses of one chain.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    account: Hrp,
    consensus: Hrp,
}

impl AddressCodec {
    pub fn new(account_prefix: &str, consensus_prefix: &str) -> Result<Self> {
        let account = Hrp::parse(account_prefix)
            .with_context(|| format!("invalid bech32 account prefix {account_prefix:?}"))?;
        let consensus = Hrp::parse(consensus_prefix)
            .with_context(|| format!("invalid bech32 consensus prefix {consensus_prefix:?}"))?;
        Ok(Self { account, consensus })
    }

    pub fn account_address(&self, address: &[u8]) -> Option<String> {
        bech32::encode::<Bech32>(self.account, address).ok()
    }

    /// Encodes a hex consensus address as reported in block headers and commits.
    pub fn consensus_address_from_hex(&self, address_hex: &str) -> Result<String> {
        if address_hex.is_empty() {
            return Ok(String::new());
        }
        let bytes = hex::decode(address_hex)
            .with_context(|| format!("invalid hex validator address {address_hex:?}"))?;
        bech32::encode::<Bech32>(self.consensus, &bytes)
            .with_context(|| format!("failed to encode validator address {address_hex:?}"))
    }

    /// Signer address of a decoded transaction, empty when it cannot be derived.
    pub fn signer_of(&self, tx: &DecodedTx) -> String {
        tx.first_signer_key()
            .and_then(address_from_pubkey)
            .and_then(|address| self.account_address(&address))
            .unwrap_or_default()
    }
}
