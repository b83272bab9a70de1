// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector clocks for detecting causal precedence between replicas.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::did::Did;

/// Causal relation between two clock snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CausalOrder {
    Before,
    After,
    Equal,
    Concurrent,
}

/// Map of per-node event counters.
///
/// Backed by a `BTreeMap` so the canonical encoding carries entries in a
/// deterministic order.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<Did, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Counter for the given node, zero when the node has no entry yet.
    pub fn get(&self, node: &Did) -> u64 {
        self.0.get(node).copied().unwrap_or_default()
    }

    /// Bump the counter of the given node by one.
    pub fn increment(&mut self, node: &Did) -> u64 {
        let counter = self.0.entry(node.clone()).or_default();
        *counter += 1;
        *counter
    }

    /// Fold another clock into this one by taking the pointwise maximum.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, counter) in &other.0 {
            let entry = self.0.entry(node.clone()).or_default();
            *entry = (*entry).max(*counter);
        }
    }

    /// Entrywise greater-or-equal over the union of both key sets.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other.0.iter().all(|(node, counter)| self.get(node) >= *counter)
    }

    /// Strict dominance: entrywise greater-or-equal with at least one entry
    /// strictly greater.
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        other.dominates(self) && self != other
    }

    /// Causal relation of this clock to another.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        if self == other {
            return CausalOrder::Equal;
        }
        match (other.dominates(self), self.dominates(other)) {
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            // Equality was ruled out above; neither side dominating means the
            // snapshots are causally unrelated.
            _ => CausalOrder::Concurrent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Did, &u64)> {
        self.0.iter()
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl FromIterator<(Did, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (Did, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
