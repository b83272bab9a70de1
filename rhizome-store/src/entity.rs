// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materialized entity projections.
//!
//! An `EntityState` is the fold of an entity's event log in causal order.
//! Concurrent writes are retained side by side as heads; picking a winner is
//! left to layers above, which can use the `Concurrent` signal plus an HLC
//! tie-break if they really want last-writer-wins semantics.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rhizome_core::{CausalOrder, ChainEvent, ContentId, Payload, Timestamp, VectorClock};

/// How an applied event related to the state it was folded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The event causally extended the entity.
    Advanced,

    /// The event was concurrent to existing heads and is retained alongside
    /// them.
    Concurrent,

    /// The event was causally behind the entity and only recorded in the
    /// log.
    Stale,
}

/// One retained head of the entity: a write no other applied write dominates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub vector_clock: VectorClock,
    pub payload: Payload,
    pub timestamp: Timestamp,
}

/// Mutable projection of one entity, built by folding its events.
///
/// Entities are never deleted; a dedicated tombstone event marks them dead
/// while their history stays intact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub vector_clock: VectorClock,
    pub version: u64,
    pub event_log: Vec<ContentId>,
    pub tombstoned: bool,
    heads: BTreeMap<ContentId, Head>,
}

impl EntityState {
    /// Fresh projection for an entity seen for the first time.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            vector_clock: VectorClock::new(),
            version: 0,
            event_log: Vec::new(),
            tombstoned: false,
            heads: BTreeMap::new(),
        }
    }

    /// Fold one causally-ready event into the projection.
    ///
    /// The caller guarantees causal delivery; under that guarantee the head
    /// set converges to the same membership regardless of the order in which
    /// concurrent events arrive.
    pub fn apply(&mut self, event: &ChainEvent) -> Result<Applied, EntityError> {
        if self.event_log.contains(&event.id) {
            return Err(EntityError::DuplicateEvent(event.id));
        }

        let relation = event.vector_clock.compare(&self.vector_clock);

        // Drop heads the new write supersedes, then check whether any
        // remaining head supersedes the new write.
        self.heads
            .retain(|_, head| !head.vector_clock.happens_before(&event.vector_clock));

        let dominated = self.heads.values().any(|head| {
            head.vector_clock == event.vector_clock
                || event.vector_clock.happens_before(&head.vector_clock)
        });

        if !dominated {
            self.heads.insert(
                event.id,
                Head {
                    vector_clock: event.vector_clock.clone(),
                    payload: event.payload.clone(),
                    timestamp: event.timestamp.clone(),
                },
            );
        }

        self.vector_clock.merge(&event.vector_clock);
        self.version = self.version.max(event.version);
        self.event_log.push(event.id);

        if event.is_tombstone() {
            self.tombstoned = true;
        }

        Ok(match relation {
            CausalOrder::After | CausalOrder::Equal => Applied::Advanced,
            CausalOrder::Concurrent => Applied::Concurrent,
            CausalOrder::Before => Applied::Stale,
        })
    }

    /// The retained concurrent heads, keyed by event id.
    pub fn heads(&self) -> &BTreeMap<ContentId, Head> {
        &self.heads
    }

    /// Ids of the retained heads.
    pub fn head_ids(&self) -> Vec<ContentId> {
        self.heads.keys().copied().collect()
    }

    /// Number of events folded into this projection.
    pub fn applied_events(&self) -> usize {
        self.event_log.len()
    }
}

/// Error types for entity folds.
#[derive(Debug, Error)]
pub enum EntityError {
    /// The event was already folded into this projection.
    #[error("event {0} was already applied to this entity")]
    DuplicateEvent(ContentId),
}
