//! Damage schools, crowd-control mechanics, and dispel kinds.
//!
//! [`SchoolMask`] crosses the notification boundary (threat reports, hit
//! logs), so it stays a named-bit mask. [`Mechanic`] and [`DispelKind`] are
//! plain enums consumed internally by immunity checks and predicate removal.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// One of the seven damage schools.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpellSchool {
    /// Weapon and armor-mitigated damage
    Physical,
    /// Holy damage (never resisted by armor or resistance)
    Holy,
    /// Fire damage
    Fire,
    /// Nature damage
    Nature,
    /// Frost damage
    Frost,
    /// Shadow damage
    Shadow,
    /// Arcane damage
    Arcane,
}

impl SpellSchool {
    /// All schools in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Physical,
        Self::Holy,
        Self::Fire,
        Self::Nature,
        Self::Frost,
        Self::Shadow,
        Self::Arcane,
    ];

    /// Index of this school in per-school tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the single-bit mask for this school.
    #[must_use]
    pub const fn mask(self) -> SchoolMask {
        match self {
            Self::Physical => SchoolMask::PHYSICAL,
            Self::Holy => SchoolMask::HOLY,
            Self::Fire => SchoolMask::FIRE,
            Self::Nature => SchoolMask::NATURE,
            Self::Frost => SchoolMask::FROST,
            Self::Shadow => SchoolMask::SHADOW,
            Self::Arcane => SchoolMask::ARCANE,
        }
    }

    /// Returns `true` for the non-physical schools.
    #[must_use]
    pub const fn is_magic(self) -> bool {
        !matches!(self, Self::Physical)
    }
}

bitflags! {
    /// Bitmask of damage schools.
    ///
    /// Multi-school spells set several bits; immunity checks intersect the
    /// spell's mask with the unit's immunity mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SchoolMask: u32 {
        /// Physical
        const PHYSICAL = 1 << 0;
        /// Holy
        const HOLY = 1 << 1;
        /// Fire
        const FIRE = 1 << 2;
        /// Nature
        const NATURE = 1 << 3;
        /// Frost
        const FROST = 1 << 4;
        /// Shadow
        const SHADOW = 1 << 5;
        /// Arcane
        const ARCANE = 1 << 6;

        /// Every magic school.
        const MAGIC = Self::HOLY.bits()
            | Self::FIRE.bits()
            | Self::NATURE.bits()
            | Self::FROST.bits()
            | Self::SHADOW.bits()
            | Self::ARCANE.bits();
        /// Every school.
        const ALL = Self::PHYSICAL.bits() | Self::MAGIC.bits();
    }
}

/// Crowd-control or delivery mechanic carried by a spell.
///
/// Immunity to a mechanic blocks application of any aura carrying it, and
/// predicate removal can strip every holder of one mechanic in one pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mechanic {
    /// No mechanic
    None,
    /// Loss of control to the caster
    Charm,
    /// Confused wandering
    Disorient,
    /// Weapon knocked away
    Disarm,
    /// Running in terror
    Fear,
    /// Held in place, actions allowed
    Root,
    /// Spellcasting locked out
    Silence,
    /// Asleep until damaged
    Sleep,
    /// Movement slowed
    Snare,
    /// Fully incapacitated
    Stun,
    /// Physical damage over time
    Bleed,
    /// Banished from the world
    Banish,
    /// Horrified, as fear but unbreakable
    Horror,
}

/// Dispel class of a spell, consumed by dispel-style predicate removal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DispelKind {
    /// Cannot be dispelled
    None,
    /// Magic effect
    Magic,
    /// Curse
    Curse,
    /// Disease
    Disease,
    /// Poison
    Poison,
}
