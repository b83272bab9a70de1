// SPDX-License-Identifier: MIT OR Apache-2.0

//! CBOR helpers for canonical byte encodings.
//!
//! Every byte sequence which gets hashed, signed or sent over the wire is
//! produced here, so hashing and signing stay reproducible across
//! implementations.
use std::io::Read;

use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serialize a value into CBOR bytes.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CborError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

/// Deserialize a value from CBOR bytes.
pub fn decode_cbor<T: for<'a> Deserialize<'a>, R: Read>(reader: R) -> Result<T, CborError> {
    Ok(ciborium::de::from_reader::<T, R>(reader)?)
}

/// An error occurred while encoding or decoding CBOR.
#[derive(Debug, Error)]
pub enum CborError {
    /// Reading or writing bytes failed.
    #[error("i/o error during cbor processing: {0}")]
    Io(std::io::Error),

    /// A value could not be represented in CBOR.
    #[error("unrepresentable value: {0}")]
    Value(String),

    /// Input bytes are not syntactically valid CBOR.
    #[error("syntax error in cbor input at position {0}")]
    Syntax(usize),

    /// Input decoded but did not match the expected shape.
    #[error("semantic error in cbor input at position {0:?}: {1}")]
    Semantic(Option<usize>, String),

    /// Input nests deeper than the decoder allows.
    #[error("recursion limit exceeded while decoding cbor")]
    RecursionLimitExceeded,
}

impl From<SerializeError<std::io::Error>> for CborError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => CborError::Io(err),
            SerializeError::Value(err) => CborError::Value(err),
        }
    }
}

impl From<DeserializeError<std::io::Error>> for CborError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) => CborError::Io(err),
            DeserializeError::Syntax(position) => CborError::Syntax(position),
            DeserializeError::Semantic(position, description) => {
                CborError::Semantic(position, description)
            }
            DeserializeError::RecursionLimitExceeded => CborError::RecursionLimitExceeded,
        }
    }
}
