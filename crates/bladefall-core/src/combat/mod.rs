//! Combat resolution.
//!
//! The resolver turns one attack into a [`DamageResult`]: the attack table
//! ([`table`]) picks an outcome band from a single fixed-point draw, the
//! damage pipeline ([`damage`]) sizes and mitigates the hit, and the proc
//! engine ([`proc`]) reacts to the result on both sides. Resolution never
//! writes health; the world applies the result in a separate step so every
//! consumer sees the same numbers the combat log reports.

pub mod damage;
pub mod proc;
pub mod table;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::school::SpellSchool;
use crate::stats::UnitAttr;

// =============================================================================
// Hands
// =============================================================================

/// Which weapon delivered a melee swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponHand {
    /// Main-hand weapon.
    Main,
    /// Off-hand weapon.
    Off,
}

impl WeaponHand {
    /// The stat row carrying this hand's weapon damage.
    #[must_use]
    pub const fn damage_attr(self) -> UnitAttr {
        match self {
            Self::Main => UnitAttr::DamageMainhand,
            Self::Off => UnitAttr::DamageOffhand,
        }
    }

    /// Extra result flags implied by the hand.
    #[must_use]
    pub const fn hit_flags(self) -> HitFlags {
        match self {
            Self::Main => HitFlags::empty(),
            Self::Off => HitFlags::OFFHAND,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// The band one attack landed in.
///
/// Variants are declared in table order. Everything up to and including
/// [`AttackOutcome::Parry`] avoids the hit entirely; the rest connect with
/// different damage quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackOutcome {
    /// The target is evading; no table roll happened.
    Evade,
    /// The target is immune to the school; no table roll happened.
    Immune,
    /// The swing or spell missed.
    Miss,
    /// Dodged by the target.
    Dodge,
    /// Parried by the target.
    Parry,
    /// A binary spell resisted in full.
    Resist,
    /// Blocked; a flat amount is shaved off the hit.
    Block,
    /// Connected at reduced damage.
    Glancing,
    /// Connected at double damage.
    Crit,
    /// Connected at one-and-a-half damage.
    Crushing,
    /// An ordinary hit.
    Normal,
}

impl AttackOutcome {
    /// `true` when the attack connected and damage can flow.
    #[must_use]
    pub const fn lands(self) -> bool {
        matches!(
            self,
            Self::Block | Self::Glancing | Self::Crit | Self::Crushing | Self::Normal
        )
    }

    /// `true` when the target avoided the attack outright.
    #[must_use]
    pub const fn avoided(self) -> bool {
        !self.lands()
    }
}

bitflags! {
    /// Flag bits accompanying a [`DamageResult`] across the notification
    /// boundary.
    ///
    /// The bits restate the interesting parts of the outcome and the
    /// mitigation so downstream consumers never re-derive them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct HitFlags: u32 {
        /// Delivered by the off-hand weapon.
        const OFFHAND = 1 << 0;
        /// The attack missed.
        const MISS = 1 << 1;
        /// Part of the damage was soaked by absorption shields.
        const ABSORB = 1 << 2;
        /// Part of the damage was resisted.
        const RESIST = 1 << 3;
        /// The hit was a critical strike.
        const CRITICAL = 1 << 4;
        /// The hit was blocked.
        const BLOCK = 1 << 5;
        /// The hit was a glancing blow.
        const GLANCING = 1 << 6;
        /// The hit was a crushing blow.
        const CRUSHING = 1 << 7;
        /// The damage came from a periodic tick.
        const PERIODIC = 1 << 8;
    }
}

// =============================================================================
// Results
// =============================================================================

/// Everything one resolved attack produced.
///
/// `damage` is what the apply step subtracts from health; the mitigation
/// fields record what never arrived. The resolver fills this in and stops:
/// health, threat and events are the world's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageResult {
    /// Band the attack landed in.
    pub outcome: AttackOutcome,
    /// Damage school.
    pub school: SpellSchool,
    /// Final damage to apply to health.
    pub damage: u32,
    /// Damage soaked by absorption shields.
    pub absorbed: u32,
    /// Damage lost to partial or full resistance.
    pub resisted: u32,
    /// Damage shaved off by a block.
    pub blocked: u32,
    /// Supplementary flag bits.
    pub flags: HitFlags,
}

impl DamageResult {
    /// An avoided attack: nothing arrived, nothing was mitigated.
    #[must_use]
    pub fn avoided(outcome: AttackOutcome, school: SpellSchool) -> Self {
        let flags = match outcome {
            AttackOutcome::Miss => HitFlags::MISS,
            AttackOutcome::Resist => HitFlags::RESIST,
            _ => HitFlags::empty(),
        };
        Self {
            outcome,
            school,
            damage: 0,
            absorbed: 0,
            resisted: 0,
            blocked: 0,
            flags,
        }
    }

    /// Damage the attack would have done without mitigation.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.damage + self.absorbed + self.resisted + self.blocked
    }
}
