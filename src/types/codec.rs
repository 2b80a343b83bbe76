//! Serde helpers for CometBFT payloads, which encode 64-bit integers as JSON
//! strings and byte blobs as base64.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Signed(i64),
}

pub(crate) fn i64_from_str_or_num<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(text) => text.trim().parse().map_err(de::Error::custom),
        StringOrNumber::Signed(value) => Ok(value),
    }
}

pub(crate) fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64_from_str_or_num(deserializer)?;
    u64::try_from(value).map_err(|_| de::Error::custom(format!("expected unsigned value, got {value}")))
}

pub(crate) mod base64_bytes {
    use super::*;

    pub(crate) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}
