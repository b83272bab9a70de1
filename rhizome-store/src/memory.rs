// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage backend.
use std::collections::{BTreeSet, HashMap};

use rhizome_core::{ChainEvent, ContentId, Timestamp};

use crate::entity::EntityState;
use crate::traits::{EntityStore, EventStore, StoreError};

type LogMeta = (Timestamp, ContentId);

/// Volatile store holding events and entity projections of one replica.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: HashMap<ContentId, ChainEvent>,
    by_entity: HashMap<String, BTreeSet<LogMeta>>,
    entities: HashMap<String, EntityState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl EventStore for MemoryStore {
    fn insert_event(&mut self, event: ChainEvent) -> Result<bool, StoreError> {
        if self.events.contains_key(&event.id) {
            return Ok(false);
        }

        if let Some(entity_id) = &event.entity_id {
            self.by_entity
                .entry(entity_id.clone())
                .or_default()
                .insert((event.timestamp.clone(), event.id));
        }
        self.events.insert(event.id, event);
        Ok(true)
    }

    fn get_event(&self, id: &ContentId) -> Result<Option<ChainEvent>, StoreError> {
        Ok(self.events.get(id).cloned())
    }

    fn has_event(&self, id: &ContentId) -> Result<bool, StoreError> {
        Ok(self.events.contains_key(id))
    }

    fn events_for_entity(&self, entity_id: &str) -> Result<Vec<ChainEvent>, StoreError> {
        let Some(log) = self.by_entity.get(entity_id) else {
            return Ok(Vec::new());
        };

        log.iter()
            .map(|(_, id)| {
                self.events
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::Backend(format!("dangling log entry for {id}")))
            })
            .collect()
    }
}

impl EntityStore for MemoryStore {
    fn get_entity(&self, entity_id: &str) -> Result<Option<EntityState>, StoreError> {
        Ok(self.entities.get(entity_id).cloned())
    }

    fn insert_entity(&mut self, state: EntityState) -> Result<(), StoreError> {
        self.entities.insert(state.entity_id.clone(), state);
        Ok(())
    }

    fn entity_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entities.keys().cloned().collect())
    }
}
