//! The proc engine.
//!
//! Combat events carry two [`ProcFlags`] masks, one per side: `DONE_*` bits
//! describe the event to the attacker, `TAKEN_*` bits to the victim. Each
//! side walks a snapshot of its aura holders; every aura whose trigger mask
//! intersects the event rolls its own chance. A successful roll fires the
//! payload and consumes a charge on charge-limited holders, a failed roll
//! preserves the charge, and auras with no proc payload are skipped without
//! a roll or a charge. One aura's failure never blocks another aura's
//! trigger on the same event.
//!
//! Triggered payloads are not executed in place. They come back as
//! [`ProcAction`] values the world runs after both sides finished walking,
//! so a proc that removes its own holder cannot invalidate the pass.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::aura::AuraEffect;
use crate::combat::{DamageResult, HitFlags};
use crate::ids::{SpellId, UnitId};
use crate::rng::clamp_chance;
use crate::school::SpellSchool;
use crate::spell::ProcChance;

/// Milliseconds per minute, the normalization base for per-minute procs.
const MINUTE_MS: f32 = 60_000.0;

bitflags! {
    /// Event bits that can trigger procs.
    ///
    /// `DONE_*` bits qualify auras on the unit that caused the event,
    /// `TAKEN_*` bits auras on the unit that suffered it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ProcFlags: u32 {
        /// Landed a melee swing.
        const DONE_MELEE_HIT = 1 << 0;
        /// Was struck by a melee swing.
        const TAKEN_MELEE_HIT = 1 << 1;
        /// Landed a melee critical strike.
        const DONE_MELEE_CRIT = 1 << 2;
        /// Was struck by a melee critical strike.
        const TAKEN_MELEE_CRIT = 1 << 3;
        /// Landed a damaging spell.
        const DONE_SPELL_HIT = 1 << 4;
        /// Was struck by a damaging spell.
        const TAKEN_SPELL_HIT = 1 << 5;
        /// Landed a spell critical strike.
        const DONE_SPELL_CRIT = 1 << 6;
        /// Was struck by a spell critical strike.
        const TAKEN_SPELL_CRIT = 1 << 7;
        /// A periodic effect of this unit ticked on someone.
        const DONE_PERIODIC = 1 << 8;
        /// A periodic effect ticked on this unit.
        const TAKEN_PERIODIC = 1 << 9;
        /// Completed a heal.
        const DONE_HEAL = 1 << 10;
        /// Received a heal.
        const TAKEN_HEAL = 1 << 11;
        /// Killed a unit.
        const KILL = 1 << 12;
        /// Died.
        const DIED = 1 << 13;
    }
}

// =============================================================================
// Events and outcomes
// =============================================================================

/// One combat event described from both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcEvent {
    /// Unit that caused the event, if any.
    pub attacker: Option<UnitId>,
    /// Unit that suffered the event.
    pub victim: UnitId,
    /// Bits qualifying the attacker's auras.
    pub done: ProcFlags,
    /// Bits qualifying the victim's auras.
    pub taken: ProcFlags,
    /// School of the triggering damage.
    pub school: SpellSchool,
    /// Final damage of the triggering hit.
    pub damage: u32,
}

impl ProcEvent {
    /// Describes a resolved melee swing.
    #[must_use]
    pub fn melee(attacker: UnitId, victim: UnitId, result: &DamageResult) -> Self {
        let mut done = ProcFlags::empty();
        let mut taken = ProcFlags::empty();
        if result.outcome.lands() {
            done |= ProcFlags::DONE_MELEE_HIT;
            taken |= ProcFlags::TAKEN_MELEE_HIT;
            if result.flags.contains(HitFlags::CRITICAL) {
                done |= ProcFlags::DONE_MELEE_CRIT;
                taken |= ProcFlags::TAKEN_MELEE_CRIT;
            }
        }
        Self {
            attacker: Some(attacker),
            victim,
            done,
            taken,
            school: result.school,
            damage: result.damage,
        }
    }

    /// Describes a resolved damaging spell.
    #[must_use]
    pub fn spell(attacker: UnitId, victim: UnitId, result: &DamageResult) -> Self {
        let mut done = ProcFlags::empty();
        let mut taken = ProcFlags::empty();
        if result.outcome.lands() {
            done |= ProcFlags::DONE_SPELL_HIT;
            taken |= ProcFlags::TAKEN_SPELL_HIT;
            if result.flags.contains(HitFlags::CRITICAL) {
                done |= ProcFlags::DONE_SPELL_CRIT;
                taken |= ProcFlags::TAKEN_SPELL_CRIT;
            }
        }
        Self {
            attacker: Some(attacker),
            victim,
            done,
            taken,
            school: result.school,
            damage: result.damage,
        }
    }

    /// Describes one periodic tick.
    #[must_use]
    pub fn periodic(
        caster: Option<UnitId>,
        victim: UnitId,
        school: SpellSchool,
        damage: u32,
    ) -> Self {
        Self {
            attacker: caster,
            victim,
            done: ProcFlags::DONE_PERIODIC,
            taken: ProcFlags::TAKEN_PERIODIC,
            school,
            damage,
        }
    }
}

/// A payload a triggered proc asks the world to execute after the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcAction {
    /// Cast a linked spell at the event counterpart.
    CastSpell {
        /// Unit whose aura triggered.
        caster: UnitId,
        /// Target of the linked spell.
        target: UnitId,
        /// Spell to execute.
        spell: SpellId,
    },
    /// Reflect flat damage at a melee striker.
    Reflect {
        /// Unit whose damage shield triggered.
        from: UnitId,
        /// The striker taking the reflected damage.
        to: UnitId,
        /// School of the reflected damage.
        school: SpellSchool,
        /// Reflected amount.
        amount: u32,
    },
}

// =============================================================================
// Dispatch
// =============================================================================

/// Effective trigger chance in hundredths of a percent.
///
/// Per-minute rates normalize against the owner's main-hand speed so faster
/// weapons proc per swing less often but per minute equally.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn trigger_chance(chance: ProcChance, weapon_speed_ms: u32) -> i32 {
    match chance {
        ProcChance::Fixed(permyriad) => clamp_chance(permyriad),
        ProcChance::PerMinute(rate) => {
            #[allow(clippy::cast_precision_loss)]
            let per_swing = rate * weapon_speed_ms as f32 / MINUTE_MS;
            clamp_chance((per_swing * 10_000.0).round() as i32)
        }
    }
}

/// The payload a given aura contributes when it triggers, or `None` when
/// the aura type cannot proc from the event at all.
///
/// Stat modifiers, controls, shields and periodics are permanently active
/// rather than proc payloads, so they map to `None` and never cost a roll
/// or a charge.
#[must_use]
pub fn action_for(
    effect: &AuraEffect,
    owner: UnitId,
    counterpart: Option<UnitId>,
    flags: ProcFlags,
    stacks: u32,
) -> Option<ProcAction> {
    match *effect {
        AuraEffect::TriggerSpell { spell } => Some(ProcAction::CastSpell {
            caster: owner,
            target: counterpart.unwrap_or(owner),
            spell,
        }),
        AuraEffect::DamageShield { school, amount } => {
            // Damage shields answer melee strikes only, and need a striker
            // to reflect at.
            if !flags.intersects(ProcFlags::TAKEN_MELEE_HIT) {
                return None;
            }
            counterpart.map(|to| ProcAction::Reflect {
                from: owner,
                to,
                school,
                amount: amount * stacks.max(1),
            })
        }
        _ => None,
    }
}
