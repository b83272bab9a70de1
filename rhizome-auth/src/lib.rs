// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability-based authorization for replicated resources.
//!
//! A capability is an unforgeable, revocable grant of explicit rights over
//! one resource, bounded by expiry and usage constraints. The manager owns
//! all local indexes; nothing in this crate is a global.
pub mod access;
pub mod capability;
pub mod manager;

pub use access::{Resource, ResourceKind, Right};
pub use capability::{Capability, Constraints, DEFAULT_TTL_MS};
pub use manager::{CapabilityError, CapabilityManager};
