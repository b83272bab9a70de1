// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid logical clock.
//!
//! Timestamps combine wall-clock milliseconds with a logical counter so that
//! causality stays observable between nodes whose physical clocks drift. A
//! node folds every remote timestamp it sees into its own clock, which
//! guarantees the next local tick sorts after everything already observed.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wall-clock milliseconds since the unix epoch.
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

/// A single hybrid logical clock reading.
///
/// The string form is `physicalMs:logicalCounter:nodeId`. Ordering is total:
/// numeric over the `(physical, counter)` pair with the node id only as a
/// tie-break between distinct nodes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub physical_ms: u64,
    pub counter: u64,
    pub node_id: String,
}

impl Timestamp {
    pub fn new(physical_ms: u64, counter: u64, node_id: impl Into<String>) -> Self {
        Self {
            physical_ms,
            counter,
            node_id: node_id.into(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.counter.cmp(&other.counter))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.physical_ms, self.counter, self.node_id)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(3, ':');

        let physical_ms = parts
            .next()
            .ok_or_else(|| TimestampError::Malformed(value.to_string()))?
            .parse()
            .map_err(|_| TimestampError::Malformed(value.to_string()))?;
        let counter = parts
            .next()
            .ok_or_else(|| TimestampError::Malformed(value.to_string()))?
            .parse()
            .map_err(|_| TimestampError::Malformed(value.to_string()))?;
        let node_id = parts
            .next()
            .filter(|node_id| !node_id.is_empty())
            .ok_or_else(|| TimestampError::Malformed(value.to_string()))?;

        Ok(Self::new(physical_ms, counter, node_id))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|err: TimestampError| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for timestamp strings.
#[derive(Error, Debug)]
pub enum TimestampError {
    /// String is not of the form `physicalMs:logicalCounter:nodeId`.
    #[error("malformed hlc timestamp '{0}'")]
    Malformed(String),
}

/// Total order over two timestamp strings.
///
/// Numeric over the `(physical, counter)` pair, never lexicographic.
pub fn compare(a: &str, b: &str) -> Result<Ordering, TimestampError> {
    let a: Timestamp = a.parse()?;
    let b: Timestamp = b.parse()?;
    Ok(a.cmp(&b))
}

/// Per-node hybrid logical clock state.
#[derive(Clone, Debug)]
pub struct Hlc {
    node_id: String,
    last_physical_ms: u64,
    counter: u64,
}

impl Hlc {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            last_physical_ms: 0,
            counter: 0,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Issue a new timestamp from the system clock.
    ///
    /// Never returns a reading older than one already issued, even when the
    /// wall clock jumps backwards.
    pub fn tick(&mut self) -> Timestamp {
        self.tick_at(unix_now_ms())
    }

    /// Issue a new timestamp against an explicit wall-clock reading.
    pub fn tick_at(&mut self, now_ms: u64) -> Timestamp {
        if now_ms > self.last_physical_ms {
            self.last_physical_ms = now_ms;
            self.counter = 0;
        } else {
            self.counter += 1;
        }

        Timestamp::new(self.last_physical_ms, self.counter, self.node_id.clone())
    }

    /// Fold a remote timestamp into local state so the next local tick sorts
    /// after it.
    pub fn receive(&mut self, remote: &Timestamp) {
        self.receive_at(remote, unix_now_ms());
    }

    /// Fold a remote timestamp against an explicit wall-clock reading.
    pub fn receive_at(&mut self, remote: &Timestamp, now_ms: u64) {
        if now_ms > self.last_physical_ms && now_ms > remote.physical_ms {
            self.last_physical_ms = now_ms;
            self.counter = 0;
        } else if self.last_physical_ms == remote.physical_ms {
            self.counter = self.counter.max(remote.counter);
        } else if remote.physical_ms > self.last_physical_ms {
            self.last_physical_ms = remote.physical_ms;
            self.counter = remote.counter;
        }
        // Otherwise our local state already sorts after the remote reading.
    }
}
