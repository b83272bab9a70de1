// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed fan-out of accepted events to local subscribers.
use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::trace;

use rhizome_core::{ChainEvent, ContentId, Domain};

/// What a node reports to its application.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// An event passed the full pipeline and is now part of the local log.
    Accepted(ChainEvent),

    /// A buffered event was dropped because its parents never arrived.
    Unresolvable {
        id: ContentId,
        attempts: u32,
        missing: Vec<ContentId>,
    },
}

/// Broadcast channels per event domain plus one firehose.
///
/// Receivers that fall behind miss messages rather than blocking the
/// pipeline; delivery to attentive subscribers is at-least-once.
#[derive(Debug)]
pub struct Subscriptions {
    firehose: broadcast::Sender<NodeEvent>,
    by_domain: HashMap<Domain, broadcast::Sender<ChainEvent>>,
    by_tag: HashMap<String, broadcast::Sender<ChainEvent>>,
    capacity: usize,
}

impl Subscriptions {
    pub fn new(capacity: usize) -> Self {
        Self {
            firehose: broadcast::channel(capacity).0,
            by_domain: HashMap::new(),
            by_tag: HashMap::new(),
            capacity,
        }
    }

    /// Receiver for every node event, acceptances and eviction notices alike.
    pub fn subscribe_all(&self) -> broadcast::Receiver<NodeEvent> {
        self.firehose.subscribe()
    }

    /// Receiver for accepted events of one domain.
    pub fn subscribe(&mut self, domain: Domain) -> broadcast::Receiver<ChainEvent> {
        self.by_domain
            .entry(domain)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Receiver for accepted events carrying the given tag.
    pub fn subscribe_tag(&mut self, tag: impl Into<String>) -> broadcast::Receiver<ChainEvent> {
        self.by_tag
            .entry(tag.into())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub(crate) fn notify_accepted(&self, event: &ChainEvent) {
        // Send errors just mean nobody is listening right now.
        let _ = self.firehose.send(NodeEvent::Accepted(event.clone()));
        if let Some(sender) = self.by_domain.get(&event.event_type.domain) {
            if sender.send(event.clone()).is_err() {
                trace!(domain = %event.event_type.domain, "no domain subscribers");
            }
        }
        for tag in &event.tags {
            if let Some(sender) = self.by_tag.get(tag) {
                let _ = sender.send(event.clone());
            }
        }
    }

    pub(crate) fn notify_unresolvable(
        &self,
        id: ContentId,
        attempts: u32,
        missing: Vec<ContentId>,
    ) {
        let _ = self.firehose.send(NodeEvent::Unresolvable {
            id,
            attempts,
            missing,
        });
    }
}
