//! Recoverable boundary errors.
//!
//! Invalid requests (unknown spells, dead casters, busy cast slots) are
//! rejected here as typed errors and leave simulation state untouched. They
//! are never faults: the world logs them at debug level and carries on.

use thiserror::Error;

use crate::ids::{SpellId, UnitId};
use crate::school::SchoolMask;

/// Why a cast request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CastError {
    /// The spell id is not present in the spell store
    #[error("unknown spell: {0}")]
    UnknownSpell(SpellId),
    /// The caster id does not resolve to a live registry entry
    #[error("no such unit: {0}")]
    NoSuchUnit(UnitId),
    /// The caster is dead or despawning
    #[error("caster {0} is not alive")]
    CasterDead(UnitId),
    /// The target is dead and the spell cannot affect corpses
    #[error("target {0} is not alive")]
    TargetDead(UnitId),
    /// The slot the spell would occupy already holds a cast
    #[error("cast slot busy for spell {0}")]
    SlotBusy(SpellId),
    /// A silence effect locks out the spell's school
    #[error("school locked out: {0:?}")]
    Silenced(SchoolMask),
    /// A stun, fear or similar control effect prevents acting
    #[error("caster {0} cannot act")]
    Incapacitated(UnitId),
    /// The caster cannot pay the spell's power cost
    #[error("not enough power: need {need}, have {have}")]
    OutOfPower {
        /// Cost of the cast
        need: u32,
        /// Power currently available
        have: u32,
    },
    /// The target is immune to the spell's school or mechanic
    #[error("target {0} is immune")]
    Immune(UnitId),
}

/// Why an aura application was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuraError {
    /// The target id does not resolve to a live registry entry
    #[error("no such unit: {0}")]
    NoSuchUnit(UnitId),
    /// The target is dead and the spell does not persist through death
    #[error("target {0} is dead")]
    DeadTarget(UnitId),
    /// The target is immune to the spell's school
    #[error("target immune to school {0:?}")]
    SchoolImmune(SchoolMask),
    /// The target is immune to the spell's mechanic
    #[error("target immune to mechanic")]
    MechanicImmune,
    /// A non-stackable equal or higher rank from another caster is active
    #[error("stronger or equal rank of spell {0} already active")]
    StrongerPresent(SpellId),
    /// Every visible slot is taken and the effect is not essential
    #[error("visible aura slots exhausted")]
    SlotsFull,
    /// Diminishing returns reduced the duration to zero
    #[error("fully diminished")]
    FullyDiminished,
    /// The spell id is not present in the spell store
    #[error("unknown spell: {0}")]
    UnknownSpell(SpellId),
}
