// SPDX-License-Identifier: MIT OR Apache-2.0

//! One replica's session state and its event pipeline.
//!
//! A `Node` owns everything session-scoped: keys, clocks, the event store,
//! capability indexes, the discovery cache, gossip access tables and the
//! causal buffer. Several nodes can live in one process; they share nothing.
//!
//! Acceptance of one event is the only transaction boundary. The pipeline
//! runs verify, gate, merge, index, announce in that order, and an event
//! which fails any step before indexing leaves no trace.
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::broadcast;
use tokio::task;
use tracing::{debug, warn};

use rhizome_auth::{
    Capability, CapabilityError, CapabilityManager, Constraints, Resource, ResourceKind, Right,
};
use rhizome_core::{
    Action, Block, ChainEvent, ContentId, Did, Domain, EventError, EventType, Hlc, Payload,
    PrivateKey, Scope, VectorClock, decode_cbor, encode_cbor, unix_now_ms, validate_event,
};
use rhizome_discovery::{ContentRef, ContentRegistry, DhtState};
use rhizome_net::{Gossip, Topic, Transport};
use rhizome_store::{EntityState, EntityStore, EventStore, MemoryStore, StoreError};

use crate::buffer::CausalBuffer;
use crate::config::NodeConfig;
use crate::error::{CausalityError, EngineError};
use crate::subscriptions::{NodeEvent, Subscriptions};

/// Outcome of submitting one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// The event passed the full pipeline and is indexed.
    Applied(ContentId),

    /// The event is verified and gated but waits for missing parents.
    Buffered(ContentId),
}

/// Parameters of a new local event.
#[derive(Clone, Debug)]
pub struct EventDraft {
    pub event_type: EventType,
    pub payload: Payload,
    pub parents: Vec<ContentId>,
    pub scope: Scope,
    pub tags: Vec<String>,
    pub entity_id: Option<String>,
}

impl EventDraft {
    pub fn new(event_type: EventType, payload: Payload) -> Self {
        Self {
            event_type,
            payload,
            parents: Vec::new(),
            scope: Scope::Private,
            tags: Vec::new(),
            entity_id: None,
        }
    }

    pub fn with_parents(mut self, parents: Vec<ContentId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn for_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// What a buffer sweep did.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Events whose parents turned up through side channels and which got
    /// applied during the sweep.
    pub applied: Vec<ContentId>,

    /// Events evicted as unresolvable.
    pub unresolvable: Vec<ContentId>,
}

/// A single replica of the event log and everything gating it.
#[derive(Debug)]
pub struct Node<S = MemoryStore> {
    private_key: PrivateKey,
    did: Did,
    hlc: Hlc,
    vector_clock: VectorClock,
    store: S,
    capabilities: CapabilityManager,
    registry: ContentRegistry,
    gossip: Gossip,
    buffer: CausalBuffer,
    subscriptions: Subscriptions,
    config: NodeConfig,
}

impl Node<MemoryStore> {
    /// Node over a fresh in-memory store.
    pub fn new(
        private_key: PrivateKey,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        dht: DhtState,
    ) -> Self {
        Self::with_store(private_key, config, transport, dht, MemoryStore::new())
    }
}

impl<S> Node<S>
where
    S: EventStore + EntityStore,
{
    /// Node over a caller-provided store.
    pub fn with_store(
        private_key: PrivateKey,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        dht: DhtState,
        store: S,
    ) -> Self {
        let did = Did::from_public_key(&private_key.public_key());
        let registry = ContentRegistry::new(config.discovery.clone(), dht);

        let mut gossip = Gossip::new(transport, did.clone());
        gossip.grant(&Topic::User(did.clone()), did.clone());

        let mut capabilities = CapabilityManager::new();
        // Bootstrap grant: full rights over the own user space. The rights
        // list is non-empty, issuance cannot fail.
        let _ = capabilities.issue(
            did.clone(),
            Resource::new(ResourceKind::User, did.as_str()),
            [Right::Read, Right::Write, Right::Admin],
            &private_key,
            None,
        );

        Self {
            hlc: Hlc::new(did.as_str()),
            did,
            private_key,
            vector_clock: VectorClock::new(),
            store,
            capabilities,
            registry,
            gossip,
            buffer: CausalBuffer::new(),
            subscriptions: Subscriptions::new(config.channel_capacity),
            config,
        }
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gossip(&self) -> &Gossip {
        &self.gossip
    }

    pub fn gossip_mut(&mut self) -> &mut Gossip {
        &mut self.gossip
    }

    /// Current projection of an entity.
    pub fn entity(&self, entity_id: &str) -> Result<Option<EntityState>, EngineError> {
        Ok(self.store.get_entity(entity_id)?)
    }

    /// Number of events currently held in the causal buffer.
    pub fn pending_events(&self) -> usize {
        self.buffer.len()
    }

    /// Providers for out-of-band content, possibly via the DHT.
    pub async fn find_providers(
        &mut self,
        content_id: &ContentId,
    ) -> std::collections::BTreeSet<Did> {
        self.registry.find_providers(content_id).await
    }

    /// Issue a grant signed with this node's key.
    pub fn issue_capability(
        &mut self,
        subject: Did,
        resource: Resource,
        rights: impl IntoIterator<Item = Right>,
        constraints: Option<Constraints>,
    ) -> Result<Capability, CapabilityError> {
        self.capabilities
            .issue(subject, resource, rights, &self.private_key, constraints)
    }

    /// Check a grant and consume one use.
    pub fn verify_capability(
        &mut self,
        id: &str,
        right: Right,
    ) -> Result<Capability, CapabilityError> {
        self.capabilities.verify(id, right)
    }

    /// Drop a grant immediately.
    pub fn revoke_capability(&mut self, id: &str) -> bool {
        self.capabilities.revoke(id)
    }

    /// Accept replicated events authored by the given peer.
    ///
    /// Grants the peer full rights over their own user space on this
    /// replica; rights over entities they create here follow at acceptance
    /// time.
    pub fn authorize_author(&mut self, author: &Did) -> Result<Capability, CapabilityError> {
        self.capabilities.issue(
            author.clone(),
            Resource::new(ResourceKind::User, author.as_str()),
            [Right::Read, Right::Write, Right::Admin],
            &self.private_key,
            None,
        )
    }

    /// Receiver for accepted events of one domain.
    pub fn subscribe(&mut self, domain: Domain) -> broadcast::Receiver<ChainEvent> {
        self.subscriptions.subscribe(domain)
    }

    /// Receiver for accepted events carrying the given tag.
    pub fn subscribe_tag(&mut self, tag: impl Into<String>) -> broadcast::Receiver<ChainEvent> {
        self.subscriptions.subscribe_tag(tag)
    }

    /// Receiver for everything the node reports, eviction notices included.
    pub fn subscribe_all(&self) -> broadcast::Receiver<NodeEvent> {
        self.subscriptions.subscribe_all()
    }

    /// Batch event ids into a signed anchor block.
    ///
    /// Blocks exist for audit and external anchoring, never for ordering.
    /// Consumers chain them by passing the previous block's id.
    pub fn seal_block(
        &mut self,
        event_ids: Vec<ContentId>,
        height: u64,
        previous: Option<ContentId>,
    ) -> Block {
        let mut block = Block::new(
            height,
            previous,
            event_ids,
            self.hlc.tick(),
            self.did.clone(),
        );
        block.sign(&self.private_key);
        block
    }

    /// Stamp, link and sign a new local event.
    ///
    /// Creates get a fresh entity id unless the draft names one; updates and
    /// tombstones version against the entity's current projection and
    /// default to its heads as causal parents.
    pub fn create_event(&mut self, draft: EventDraft) -> Result<ChainEvent, EngineError> {
        let payload_domain = draft.payload.domain();
        if payload_domain != draft.event_type.domain {
            return Err(EngineError::Integrity(EventError::PayloadMismatch {
                expected: draft.event_type.domain,
                found: payload_domain,
            }));
        }

        let (entity_id, version, prev_version, parents) = match draft.event_type.action {
            Action::Create => {
                let entity_id = draft
                    .entity_id
                    .unwrap_or_else(|| fresh_entity_id(draft.event_type.domain));
                (Some(entity_id), 1, None, draft.parents)
            }
            Action::Update | Action::Tombstone => {
                let entity_id = draft
                    .entity_id
                    .ok_or(EngineError::Integrity(EventError::MissingEntity))?;
                let state = self
                    .store
                    .get_entity(&entity_id)?
                    .ok_or_else(|| EngineError::UnknownEntity(entity_id.clone()))?;
                let parents = if draft.parents.is_empty() {
                    state.head_ids()
                } else {
                    draft.parents
                };
                (
                    Some(entity_id),
                    state.version + 1,
                    Some(state.version),
                    parents,
                )
            }
        };

        self.vector_clock.increment(&self.did);

        let mut event = ChainEvent {
            id: ContentId::new([]),
            event_type: draft.event_type,
            author: self.did.clone(),
            timestamp: self.hlc.tick(),
            payload: draft.payload,
            version,
            vector_clock: self.vector_clock.clone(),
            parents,
            entity_id,
            prev_version,
            scope: draft.scope,
            tags: draft.tags,
            signature: None,
        };
        event.sign(&self.private_key);
        Ok(event)
    }

    /// Run the full pipeline on one event, local or inbound.
    ///
    /// Verify, gate, check causal readiness, then merge, index and announce.
    /// Missing parents buffer the event instead of failing it; everything
    /// else in the taxonomy is final for this event.
    pub async fn submit_event(&mut self, event: ChainEvent) -> Result<Acceptance, EngineError> {
        // Indexed events are permanent, resubmission is a no-op.
        if self.store.has_event(&event.id)? {
            return Ok(Acceptance::Applied(event.id));
        }

        // Integrity. Digest and signature checks are CPU-bound, keep them
        // off the event loop.
        let checked = event.clone();
        task::spawn_blocking(move || checked.verify())
            .await
            .map_err(|err| EngineError::Runtime(err.to_string()))??;
        validate_event(&event)?;

        // Capability gate. Denied events are dropped and never forwarded.
        let (resource, right) = required_access(&event);
        if let Err(source) = self.capabilities.authorize(&event.author, &resource, right) {
            warn!(
                id = %event.id,
                author = %event.author,
                %right,
                resource = %resource,
                "event denied by capability gate: {source}"
            );
            return Err(EngineError::Authorization {
                right,
                resource: resource.to_string(),
                source,
            });
        }

        // Causal readiness: hold the event until all parents are indexed.
        let mut missing = HashSet::new();
        for parent in &event.parents {
            if !self.store.has_event(parent)? {
                missing.insert(*parent);
            }
        }
        if !missing.is_empty() {
            let id = event.id;
            self.buffer
                .insert(event, missing, unix_now_ms(), self.config.base_backoff_ms);
            return Ok(Acceptance::Buffered(id));
        }

        let id = event.id;
        self.apply_chain(event).await?;
        Ok(Acceptance::Applied(id))
    }

    /// Decode an event from its wire bytes and submit it.
    pub async fn receive_wire(&mut self, bytes: &[u8]) -> Result<Acceptance, EngineError> {
        let event: ChainEvent = decode_cbor(bytes)?;
        self.submit_event(event).await
    }

    /// Recheck held events and evict those past the retry ceiling.
    ///
    /// Intended to be driven periodically by the host; acceptance of new
    /// events releases dependents on its own, the sweep only covers parents
    /// which arrived through side channels and stragglers which never will.
    pub async fn sweep_pending(&mut self) -> Result<SweepOutcome, EngineError> {
        self.sweep_pending_at(unix_now_ms()).await
    }

    /// Sweep against an explicit wall-clock reading.
    pub async fn sweep_pending_at(&mut self, now_ms: u64) -> Result<SweepOutcome, EngineError> {
        let mut outcome = SweepOutcome::default();

        for id in self.buffer.due(now_ms) {
            let Some(missing) = self.buffer.missing_parents(&id) else {
                continue;
            };
            let missing: Vec<ContentId> = missing.iter().copied().collect();

            // Parents may have been indexed without passing through the
            // buffer, e.g. via a snapshot import.
            for parent in &missing {
                if self.store.has_event(parent)? {
                    for released in self.buffer.mark_present(parent) {
                        let released_id = released.id;
                        self.apply_chain(released).await?;
                        outcome.applied.push(released_id);
                    }
                }
            }

            if !self.buffer.contains(&id) {
                continue;
            }

            let attempts = self
                .buffer
                .note_retry(&id, now_ms, self.config.base_backoff_ms);
            if attempts >= self.config.max_buffer_attempts {
                if let Some(entry) = self.buffer.evict(&id) {
                    let missing: Vec<ContentId> = entry.missing.iter().copied().collect();
                    let causality = CausalityError::Unresolvable {
                        id,
                        attempts,
                        missing: missing.clone(),
                    };
                    warn!("{causality}");
                    self.subscriptions.notify_unresolvable(id, attempts, missing);
                    outcome.unresolvable.push(id);
                }
            }
        }

        Ok(outcome)
    }

    /// Apply one ready event and cascade into any dependents it releases.
    async fn apply_chain(&mut self, event: ChainEvent) -> Result<(), EngineError> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            self.apply_one(&event).await?;
            for released in self.buffer.mark_present(&event.id) {
                queue.push_back(released);
            }
        }
        Ok(())
    }

    /// Merge, index and announce one causally ready event.
    async fn apply_one(&mut self, event: &ChainEvent) -> Result<(), EngineError> {
        // A child's clock must dominate the merge of its parents' clocks.
        let mut parent_clocks = VectorClock::new();
        for parent in &event.parents {
            let parent_event = self
                .store
                .get_event(parent)?
                .ok_or(EngineError::ClockRegression(event.id))?;
            parent_clocks.merge(&parent_event.vector_clock);
        }
        if !event.vector_clock.dominates(&parent_clocks) {
            return Err(EngineError::ClockRegression(event.id));
        }

        // Fold into the entity projection.
        let newly_created_entity = if let Some(entity_id) = &event.entity_id {
            let existing = self.store.get_entity(entity_id)?;
            let created = existing.is_none();
            let mut state = existing.unwrap_or_else(|| EntityState::new(entity_id.clone()));
            state
                .apply(event)
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            self.store.insert_entity(state)?;
            created
        } else {
            false
        };

        // Index. From here on the event is permanent; only a tombstone event
        // can logically remove its effect.
        self.store.insert_event(event.clone())?;

        // Make the remote clocks observable locally.
        self.hlc.receive(&event.timestamp);
        self.vector_clock.merge(&event.vector_clock);

        // The first write to a fresh entity makes its author the owner.
        if newly_created_entity && let Some(entity_id) = &event.entity_id {
            let resource = Resource::new(
                ResourceKind::from(event.event_type.domain),
                entity_id.clone(),
            );
            let _ = self.capabilities.issue(
                event.author.clone(),
                resource,
                [Right::Read, Right::Write, Right::Admin],
                &self.private_key,
                None,
            );
        }

        // Announce into the scope's topic and register out-of-band content,
        // both best effort: the event is already part of the local log and
        // stays accepted even when the network is not cooperating.
        let topic = scope_topic(event);
        match encode_cbor(event) {
            Ok(bytes) => {
                if let Err(err) = self.gossip.publish(&topic, bytes).await {
                    warn!(id = %event.id, topic = %topic, "announce failed: {err}");
                }
            }
            Err(err) => warn!(id = %event.id, "wire encoding failed: {err}"),
        }

        if let Some(content_id) = event.payload_content() {
            let now_ms = unix_now_ms();
            let content_ref = ContentRef {
                owner: event.author.clone(),
                content_type: event.event_type.domain.as_str().to_string(),
                size: 0,
                mime: None,
                created_at: now_ms,
                updated_at: now_ms,
            };
            self.registry
                .publish(content_id, content_ref, self.did.clone())
                .await;
        }

        self.subscriptions.notify_accepted(event);
        debug!(id = %event.id, event_type = %event.event_type, "accepted event");
        Ok(())
    }
}

/// The `(resource, right)` pair an event is gated on.
///
/// Updates and tombstones target the entity they touch; creates and
/// entity-less events fall under the author's own user space. Circle
/// membership changes need admin rights, everything else writes.
fn required_access(event: &ChainEvent) -> (Resource, Right) {
    let right = match event.event_type.domain {
        Domain::Circle => Right::Admin,
        _ => Right::Write,
    };

    let resource = match (&event.entity_id, event.event_type.action) {
        (Some(entity_id), Action::Update | Action::Tombstone) => Resource::new(
            ResourceKind::from(event.event_type.domain),
            entity_id.clone(),
        ),
        _ => Resource::new(ResourceKind::User, event.author.as_str()),
    };

    (resource, right)
}

/// The topic an accepted event is announced into, derived from its scope.
fn scope_topic(event: &ChainEvent) -> Topic {
    match event.scope {
        Scope::Public => Topic::General,
        Scope::Circle => match &event.entity_id {
            Some(entity_id) => Topic::Circle(entity_id.clone()),
            None => Topic::User(event.author.clone()),
        },
        Scope::Friends | Scope::Private | Scope::SelfOnly => Topic::User(event.author.clone()),
    }
}

fn fresh_entity_id(domain: Domain) -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    format!("{}-{}", domain.as_str(), hex::encode(bytes))
}
