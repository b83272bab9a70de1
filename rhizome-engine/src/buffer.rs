// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded buffering of causally blocked events.
//!
//! An event whose parents have not arrived yet is held here, keyed by the
//! parents it waits on. Arrival of a parent releases its dependents; a sweep
//! on a doubling backoff rechecks stragglers and evicts them once the
//! attempt ceiling is reached. Unbounded buffering would trade a liveness
//! bug for the ordering guarantee, so eviction is not optional.
use std::collections::{HashMap, HashSet};

use tracing::debug;

use rhizome_core::{ChainEvent, ContentId};

/// One held event and its retry bookkeeping.
#[derive(Clone, Debug)]
pub struct PendingEvent {
    pub event: ChainEvent,
    pub missing: HashSet<ContentId>,
    pub attempts: u32,
    pub next_retry_ms: u64,
}

/// Events waiting for their causal parents.
#[derive(Debug, Default)]
pub struct CausalBuffer {
    pending: HashMap<ContentId, PendingEvent>,
    dependents: HashMap<ContentId, HashSet<ContentId>>,
}

impl CausalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold an event until the given parents arrive.
    pub fn insert(
        &mut self,
        event: ChainEvent,
        missing: HashSet<ContentId>,
        now_ms: u64,
        backoff_ms: u64,
    ) {
        debug_assert!(!missing.is_empty(), "buffered event must miss a parent");

        for parent in &missing {
            self.dependents.entry(*parent).or_default().insert(event.id);
        }

        debug!(id = %event.id, missing = missing.len(), "buffered causally blocked event");

        self.pending.insert(
            event.id,
            PendingEvent {
                event,
                missing,
                attempts: 0,
                next_retry_ms: now_ms + backoff_ms,
            },
        );
    }

    /// Record that an event id is now locally known and release any held
    /// events which waited on nothing else.
    pub fn mark_present(&mut self, arrived: &ContentId) -> Vec<ChainEvent> {
        let Some(waiting) = self.dependents.remove(arrived) else {
            return Vec::new();
        };

        let mut released = Vec::new();
        for id in waiting {
            let ready = match self.pending.get_mut(&id) {
                Some(entry) => {
                    entry.missing.remove(arrived);
                    entry.missing.is_empty()
                }
                None => false,
            };
            if ready && let Some(entry) = self.pending.remove(&id) {
                released.push(entry.event);
            }
        }
        released
    }

    /// Ids of held events whose next retry is due.
    pub fn due(&self, now_ms: u64) -> Vec<ContentId> {
        self.pending
            .values()
            .filter(|entry| entry.next_retry_ms <= now_ms)
            .map(|entry| entry.event.id)
            .collect()
    }

    /// Count a failed recheck and push the next retry out on a doubling
    /// backoff. Returns the updated attempt count.
    pub fn note_retry(&mut self, id: &ContentId, now_ms: u64, base_backoff_ms: u64) -> u32 {
        let Some(entry) = self.pending.get_mut(id) else {
            return 0;
        };
        entry.attempts += 1;
        entry.next_retry_ms = now_ms + base_backoff_ms.saturating_mul(1 << entry.attempts.min(16));
        entry.attempts
    }

    /// Give up on a held event.
    pub fn evict(&mut self, id: &ContentId) -> Option<PendingEvent> {
        let entry = self.pending.remove(id)?;
        for parent in &entry.missing {
            if let Some(waiting) = self.dependents.get_mut(parent) {
                waiting.remove(id);
                if waiting.is_empty() {
                    self.dependents.remove(parent);
                }
            }
        }
        Some(entry)
    }

    /// Missing parents of a held event.
    pub fn missing_parents(&self, id: &ContentId) -> Option<&HashSet<ContentId>> {
        self.pending.get(id).map(|entry| &entry.missing)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rhizome_core::{
        ChainEvent, ContentId, Did, Domain, EventType, Hlc, MemoryPayload, Payload, PrivateKey,
        Scope, VectorClock,
    };

    use super::CausalBuffer;

    fn event_with_parents(parents: Vec<ContentId>) -> ChainEvent {
        let key = PrivateKey::new();
        let did = Did::from_public_key(&key.public_key());
        let mut clock = VectorClock::new();
        clock.increment(&did);

        let mut event = ChainEvent {
            id: ContentId::new([]),
            event_type: EventType::create(Domain::Memory),
            author: did.clone(),
            timestamp: Hlc::new(did.as_str()).tick_at(100),
            payload: Payload::Memory(MemoryPayload::default()),
            version: 1,
            vector_clock: clock,
            parents,
            entity_id: None,
            prev_version: None,
            scope: Scope::Private,
            tags: vec![],
            signature: None,
        };
        event.sign(&key);
        event
    }

    #[test]
    fn releases_once_all_parents_arrived() {
        let parent_a = ContentId::new(b"parent a");
        let parent_b = ContentId::new(b"parent b");
        let event = event_with_parents(vec![parent_a, parent_b]);
        let id = event.id;

        let mut buffer = CausalBuffer::new();
        buffer.insert(event, HashSet::from([parent_a, parent_b]), 0, 100);
        assert!(buffer.contains(&id));

        assert!(buffer.mark_present(&parent_a).is_empty());
        assert!(buffer.contains(&id));

        let released = buffer.mark_present(&parent_b);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, id);
        assert!(buffer.is_empty());
    }

    #[test]
    fn unrelated_arrivals_release_nothing() {
        let parent = ContentId::new(b"parent");
        let event = event_with_parents(vec![parent]);

        let mut buffer = CausalBuffer::new();
        buffer.insert(event, HashSet::from([parent]), 0, 100);

        assert!(buffer.mark_present(&ContentId::new(b"stranger")).is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn retries_back_off_exponentially() {
        let parent = ContentId::new(b"parent");
        let event = event_with_parents(vec![parent]);
        let id = event.id;

        let mut buffer = CausalBuffer::new();
        buffer.insert(event, HashSet::from([parent]), 0, 100);

        // First retry due at 100ms, not before.
        assert!(buffer.due(99).is_empty());
        assert_eq!(buffer.due(100), vec![id]);

        assert_eq!(buffer.note_retry(&id, 100, 100), 1);
        assert!(buffer.due(250).is_empty());
        assert_eq!(buffer.due(300), vec![id]);

        assert_eq!(buffer.note_retry(&id, 300, 100), 2);
        assert_eq!(buffer.due(700), vec![id]);
    }

    #[test]
    fn eviction_cleans_the_dependency_index() {
        let parent = ContentId::new(b"parent");
        let event = event_with_parents(vec![parent]);
        let id = event.id;

        let mut buffer = CausalBuffer::new();
        buffer.insert(event, HashSet::from([parent]), 0, 100);

        let evicted = buffer.evict(&id).unwrap();
        assert_eq!(evicted.event.id, id);
        assert!(buffer.is_empty());

        // The parent arriving later releases nothing.
        assert!(buffer.mark_present(&parent).is_empty());
    }

    #[test]
    fn shared_parent_releases_all_dependents() {
        let parent = ContentId::new(b"parent");
        let first = event_with_parents(vec![parent]);
        let second = event_with_parents(vec![parent]);

        let mut buffer = CausalBuffer::new();
        buffer.insert(first, HashSet::from([parent]), 0, 100);
        buffer.insert(second, HashSet::from([parent]), 0, 100);

        let released = buffer.mark_present(&parent);
        assert_eq!(released.len(), 2);
        assert!(buffer.is_empty());
    }
}
