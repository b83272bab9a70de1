// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine's error taxonomy.
//!
//! Integrity and authorization failures are final for the affected event and
//! never retried. Causality failures are retried internally on a backoff and
//! only surface once the retry budget is spent. Discovery failures never
//! appear here at all; lookups degrade to empty results instead.
use thiserror::Error;

use rhizome_auth::{CapabilityError, Right};
use rhizome_core::{CborError, ContentId, EventError};
use rhizome_store::StoreError;

/// Failure modes of the submit pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content address or signature mismatch. The event is corrupt or forged
    /// and is dropped without retry.
    #[error("integrity failure: {0}")]
    Integrity(#[from] EventError),

    /// The capability gate denied the event. Includes grants revoked between
    /// issuance and use.
    #[error("authorization failure, '{right}' on '{resource}' denied: {source}")]
    Authorization {
        right: Right,
        resource: String,
        source: CapabilityError,
    },

    /// Causal delivery gave up on the event.
    #[error(transparent)]
    Causality(#[from] CausalityError),

    /// An event's clock fails to dominate the merge of its parents' clocks.
    #[error("event {0} carries a clock behind its causal parents")]
    ClockRegression(ContentId),

    /// An update references an entity this replica has never seen.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// The storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Wire bytes could not be decoded.
    #[error(transparent)]
    Codec(#[from] CborError),

    /// The offloaded verification task died.
    #[error("verification task failed: {0}")]
    Runtime(String),
}

/// Failure modes of causal delivery.
#[derive(Debug, Error)]
pub enum CausalityError {
    /// The retry budget for a buffered event is spent and its parents never
    /// arrived.
    #[error("event {id} unresolvable after {attempts} attempts, missing parents {missing:?}")]
    Unresolvable {
        id: ContentId,
        attempts: u32,
        missing: Vec<ContentId>,
    },
}
