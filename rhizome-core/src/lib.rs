// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for a decentralised, content-addressed event log.
//!
//! Events are signed by their author, named by the BLAKE3 digest of their
//! canonical CBOR encoding and linked into a DAG of causal parents. Hybrid
//! logical clocks and vector clocks make concurrent writes from different
//! replicas mergeable without a central authority.
pub mod block;
pub mod cbor;
pub mod cid;
pub mod did;
pub mod event;
pub mod hash;
pub mod hlc;
pub mod identity;
mod serde_utils;
pub mod vector_clock;

pub use block::{Block, BlockError, merkle_root};
pub use cbor::{CborError, decode_cbor, encode_cbor};
pub use cid::{ContentId, ContentIdError};
pub use did::{Did, DidError};
pub use event::{
    Action, AnchorPayload, ChainEvent, CirclePayload, ConversationPayload, DerivedUnitPayload,
    Domain, EventError, EventType, IdentityPayload, MemoryPayload, MessagePayload, Payload, Scope,
    SocialPayload, SyncPayload, validate_event,
};
pub use hash::{HASH_LEN, Hash, HashError};
pub use hlc::{Hlc, Timestamp, TimestampError, unix_now_ms};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use vector_clock::{CausalOrder, VectorClock};
