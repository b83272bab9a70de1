// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared `serde` helpers for byte-string fields.
//!
//! Binary encodings (CBOR) carry raw bytes, human readable ones (JSON) carry
//! hex strings. Every byte-valued type in this crate routes through these two
//! helpers so both encodings stay consistent.
use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf, Bytes};

/// Serialize bytes as a hex string in human readable encodings, raw bytes
/// otherwise.
pub fn serialize_hex<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        Bytes::new(value).serialize(serializer)
    }
}

/// Deserialize bytes from a hex string in human readable encodings, from raw
/// bytes otherwise.
pub fn deserialize_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        Ok(ByteBuf::deserialize(deserializer)?.into_vec())
    }
}
