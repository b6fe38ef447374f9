//! Identifier newtypes used throughout the combat core.
//!
//! All cross-references between simulation objects are identity keys resolved
//! through the [`World`](crate::world::World) registry at use time, never
//! owning pointers:
//! - [`UnitId`]: Unique identifier for combat units
//! - [`SpellId`]: Identifier for static spell definitions
//! - [`HolderHandle`]: Per-unit handle naming one aura holder
//!
//! # Ordering
//!
//! All identifiers order by their numeric value, which is what keeps
//! registry iteration deterministic across platforms.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a combat unit.
///
/// `UnitId` is a newtype wrapper around `u64`. Unit IDs are immutable once
/// assigned and must be unique within a world; the world allocates them
/// monotonically and never reuses them, so a stale id resolves to `None`
/// rather than to a different unit.
///
/// # Example
///
/// ```
/// use bladefall_core::ids::UnitId;
///
/// let id1 = UnitId::new(1);
/// let id2 = UnitId::new(2);
///
/// assert!(id1 < id2);
/// assert_eq!(id1.as_u64(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    /// Creates a new `UnitId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UnitId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<UnitId> for u64 {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

/// Identifier for a static spell definition.
///
/// Resolved against a [`SpellStore`](crate::spell::SpellStore); an id the
/// store does not know is rejected at the operation boundary.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpellId(u32);

impl SpellId {
    /// Creates a new `SpellId` from a raw `u32` value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` value of this identifier.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpellId({})", self.0)
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SpellId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Handle naming one aura holder on one unit.
///
/// Handles are allocated monotonically per unit and never reused for the
/// unit's lifetime, so a handle held across a deferred-removal sweep cannot
/// accidentally name a newer holder.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HolderHandle(u32);

impl HolderHandle {
    /// Creates a new `HolderHandle` from a raw `u32` value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` value of this handle.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the handle that follows this one in allocation order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for HolderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HolderHandle({})", self.0)
    }
}

impl fmt::Display for HolderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
