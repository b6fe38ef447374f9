//! The outbound event channel.
//!
//! Every observable state change the world makes is recorded as a
//! [`CombatEvent`] on an in-memory log the embedding layer drains each tick.
//! Events are facts, not proposals: by the time one is logged the change has
//! already been applied. Threat is the one push-style notification and goes
//! through the [`ThreatSink`] trait instead, so an embedding AI layer can
//! react without polling the log.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aura::holder::RemoveMode;
use crate::cast::CastKind;
use crate::combat::DamageResult;
use crate::ids::{SpellId, UnitId};
use crate::school::SchoolMask;
use crate::spell::InterruptFlags;
use crate::unit::PowerKind;

// =============================================================================
// Interruption causes
// =============================================================================

/// Why an in-progress cast was broken.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptCause {
    /// The caster moved
    Movement,
    /// The caster took damage
    Damage,
    /// A counterspell-style effect
    Counter,
    /// The caster died
    Death,
}

impl InterruptCause {
    /// The interrupt-flag filter this cause applies, or `None` when the
    /// break is unconditional.
    #[must_use]
    pub const fn filter(self) -> Option<InterruptFlags> {
        match self {
            Self::Movement => Some(InterruptFlags::MOVEMENT),
            Self::Damage => Some(InterruptFlags::DAMAGE),
            Self::Counter => Some(InterruptFlags::INTERRUPT),
            Self::Death => None,
        }
    }
}

impl fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movement => write!(f, "movement"),
            Self::Damage => write!(f, "damage"),
            Self::Counter => write!(f, "counter"),
            Self::Death => write!(f, "death"),
        }
    }
}

// =============================================================================
// Event log entries
// =============================================================================

/// Coarse category of a [`CombatEvent`], for consumer routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Damage landed or was fully avoided
    Damage,
    /// Healing landed
    Heal,
    /// A power pool gained points
    Power,
    /// An aura holder changed
    Aura,
    /// A cast started, finished or broke
    Cast,
    /// A unit died, revived, or changed combat state
    Lifecycle,
    /// A proc fired
    Proc,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Damage => write!(f, "damage"),
            Self::Heal => write!(f, "heal"),
            Self::Power => write!(f, "power"),
            Self::Aura => write!(f, "aura"),
            Self::Cast => write!(f, "cast"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Proc => write!(f, "proc"),
        }
    }
}

/// One applied state change, in world order.
///
/// The log preserves emission order, so a consumer replaying it sees
/// cause before effect: the damage event that killed a unit precedes its
/// `Death` event, which precedes the aura removals death triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// An attack resolved against a victim, landed or not.
    Damage {
        /// Attacking unit
        attacker: UnitId,
        /// Defending unit
        victim: UnitId,
        /// Spell behind the hit, `None` for auto swings
        spell: Option<SpellId>,
        /// Full resolution record
        result: DamageResult,
    },
    /// Healing was applied.
    Heal {
        /// Healing unit
        healer: UnitId,
        /// Healed unit
        target: UnitId,
        /// Spell behind the heal
        spell: Option<SpellId>,
        /// Health actually restored
        amount: u32,
        /// Portion lost to the health cap
        overheal: u32,
    },
    /// A power pool gained points.
    PowerGain {
        /// Owning unit
        unit: UnitId,
        /// Pool that grew
        power: PowerKind,
        /// Points actually gained, after the cap
        amount: u32,
    },
    /// An aura holder was created or refreshed.
    AuraApplied {
        /// Unit carrying the aura
        target: UnitId,
        /// Unit that applied it
        caster: UnitId,
        /// Spell the holder carries
        spell: SpellId,
        /// Stack count after application
        stacks: u32,
        /// `true` when an existing holder was refreshed in place
        refreshed: bool,
    },
    /// An aura holder was detached.
    AuraRemoved {
        /// Unit that carried the aura
        target: UnitId,
        /// Unit that applied it
        caster: UnitId,
        /// Spell the holder carried
        spell: SpellId,
        /// Why it went away
        mode: RemoveMode,
    },
    /// A cast entered a slot.
    CastStarted {
        /// Casting unit
        caster: UnitId,
        /// Spell being cast
        spell: SpellId,
        /// Cast target
        target: UnitId,
        /// Slot the cast occupies
        kind: CastKind,
        /// Full cast time
        cast_ms: u32,
    },
    /// A cast finished and its effects were executed.
    CastCompleted {
        /// Casting unit
        caster: UnitId,
        /// Spell that completed
        spell: SpellId,
        /// Cast target
        target: UnitId,
    },
    /// A cast broke before completion.
    CastInterrupted {
        /// Casting unit
        caster: UnitId,
        /// Spell that broke
        spell: SpellId,
        /// Slot the cast occupied
        kind: CastKind,
        /// What broke it
        cause: InterruptCause,
    },
    /// A unit died.
    Death {
        /// The dead unit
        victim: UnitId,
        /// Killing unit, when damage caused the death
        killer: Option<UnitId>,
    },
    /// A dead unit came back.
    Revive {
        /// The revived unit
        unit: UnitId,
    },
    /// A unit entered combat.
    EnteredCombat {
        /// The unit
        unit: UnitId,
    },
    /// A unit dropped out of combat.
    LeftCombat {
        /// The unit
        unit: UnitId,
    },
    /// A proc consumed its trigger and fired.
    ProcFired {
        /// Unit whose aura procced
        unit: UnitId,
        /// Spell owning the proc aura
        source: SpellId,
        /// Spell the proc triggered
        triggered: SpellId,
    },
}

impl CombatEvent {
    /// Coarse category for consumer routing.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Damage { .. } => EventKind::Damage,
            Self::Heal { .. } => EventKind::Heal,
            Self::PowerGain { .. } => EventKind::Power,
            Self::AuraApplied { .. } | Self::AuraRemoved { .. } => EventKind::Aura,
            Self::CastStarted { .. }
            | Self::CastCompleted { .. }
            | Self::CastInterrupted { .. } => EventKind::Cast,
            Self::Death { .. }
            | Self::Revive { .. }
            | Self::EnteredCombat { .. }
            | Self::LeftCombat { .. } => EventKind::Lifecycle,
            Self::ProcFired { .. } => EventKind::Proc,
        }
    }

    /// The unit whose state the event describes.
    #[must_use]
    pub const fn subject(&self) -> UnitId {
        match self {
            Self::Damage { victim, .. } | Self::Death { victim, .. } => *victim,
            Self::Heal { target, .. }
            | Self::AuraApplied { target, .. }
            | Self::AuraRemoved { target, .. } => *target,
            Self::PowerGain { unit, .. }
            | Self::Revive { unit }
            | Self::EnteredCombat { unit }
            | Self::LeftCombat { unit }
            | Self::ProcFired { unit, .. } => *unit,
            Self::CastStarted { caster, .. }
            | Self::CastCompleted { caster, .. }
            | Self::CastInterrupted { caster, .. } => *caster,
        }
    }

    /// The damage record if this is a damage event.
    #[must_use]
    pub const fn as_damage(&self) -> Option<&DamageResult> {
        match self {
            Self::Damage { result, .. } => Some(result),
            _ => None,
        }
    }
}

// =============================================================================
// Threat notification
// =============================================================================

/// Receiver for threat-generating actions.
///
/// Called once per landed damage or heal, after the change is applied and
/// logged. Implementations must not call back into the world; the world is
/// mid-update when the notification arrives.
pub trait ThreatSink: fmt::Debug {
    /// One threat-generating action. `amount` is the post-mitigation size;
    /// `schools` the school mask of the action.
    fn notify(&mut self, attacker: UnitId, victim: UnitId, amount: u32, schools: SchoolMask);
}

/// A sink that drops every notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullThreat;

impl ThreatSink for NullThreat {
    fn notify(&mut self, _: UnitId, _: UnitId, _: u32, _: SchoolMask) {}
}
