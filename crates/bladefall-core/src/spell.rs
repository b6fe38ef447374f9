//! Static spell definitions and the lookup seam.
//!
//! The core never owns spell data; it consults a [`SpellStore`] by id at the
//! operation boundary and rejects ids the store does not know. The bundled
//! [`StaticSpellStore`] is a plain map, enough for tests and for embedders
//! that load their data up front.

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::aura::AuraEffect;
use crate::cast::CastKind;
use crate::combat::proc::ProcFlags;
use crate::dr::DiminishGroup;
use crate::ids::SpellId;
use crate::school::{DispelKind, Mechanic, SpellSchool};
use crate::unit::PowerKind;

bitflags! {
    /// Static attribute bits of a spell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SpellAttributes: u32 {
        /// Always-on self effect; never occupies a visible slot
        const PASSIVE = 1 << 0;
        /// Aura survives the death of its target
        const PERSISTS_THROUGH_DEATH = 1 << 1;
        /// The player cannot cancel the aura by hand
        const CANNOT_CANCEL = 1 << 2;
        /// Resists fully or not at all; no partial bands
        const BINARY = 1 << 3;
    }
}

bitflags! {
    /// Conditions that break an in-progress cast of this spell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InterruptFlags: u32 {
        /// Caster moved
        const MOVEMENT = 1 << 0;
        /// Caster took damage
        const DAMAGE = 1 << 1;
        /// Direct interrupt effect (counter, kick)
        const INTERRUPT = 1 << 2;
    }
}

bitflags! {
    /// Conditions that break the applied aura itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BreakFlags: u32 {
        /// Target took direct damage
        const DAMAGE = 1 << 0;
        /// Target moved
        const MOVE = 1 << 1;
        /// Target cast a spell
        const CAST = 1 << 2;
    }
}

/// How concurrent applications of one spell coexist on a unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackRule {
    /// One holder per spell on the unit; a second caster replaces a lower
    /// rank or is rejected against an equal/higher one
    Unique,
    /// One holder per (spell, caster); different casters coexist
    PerCaster,
}

/// Per-aura proc behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcSpec {
    /// Event mask that can trigger this spell's auras.
    pub on: ProcFlags,
    /// Roll evaluated per qualifying event.
    pub chance: ProcChance,
    /// Charges consumed on trigger; 0 means unlimited.
    pub charges: u32,
}

/// Trigger probability of a proc.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProcChance {
    /// Fixed chance in hundredths of a percent.
    Fixed(i32),
    /// Procs per minute, normalized against the triggering weapon speed.
    PerMinute(f32),
}

/// One effect a completed cast executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpellEffect {
    /// Direct school damage in `[min, max]`, scaled by the caster's spell
    /// power via `coefficient`.
    SchoolDamage {
        /// Minimum base damage
        min: u32,
        /// Maximum base damage
        max: u32,
        /// Attack/spell power scaling factor
        coefficient: f32,
    },
    /// Direct heal in `[min, max]`.
    Heal {
        /// Minimum base heal
        min: u32,
        /// Maximum base heal
        max: u32,
        /// Healing power scaling factor
        coefficient: f32,
    },
    /// Restores resource to the target.
    Energize {
        /// Resource restored
        power: PowerKind,
        /// Amount restored
        amount: u32,
    },
    /// Weapon strike dealing a percentage of a normal swing.
    WeaponDamagePct {
        /// Percent of normal swing damage (100 = a normal swing)
        pct: u32,
    },
    /// Applies one aura effect carried by a holder of this spell.
    ApplyAura(AuraEffect),
}

/// Static definition of one spell.
///
/// Everything the core needs to validate, cast, apply, and proc a spell.
/// Instances come from a [`SpellStore`]; the core treats them as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellSpec {
    /// Identifier, unique within the store.
    pub id: SpellId,
    /// Display name used in diagnostics.
    pub name: String,
    /// Damage school.
    pub school: SpellSchool,
    /// Delivery mechanic, `Mechanic::None` for plain spells.
    pub mechanic: Mechanic,
    /// Dispel class.
    pub dispel: DispelKind,
    /// Attribute bits.
    pub attributes: SpellAttributes,
    /// Stacking rule across casters.
    pub stack_rule: StackRule,
    /// Maximum stack count, at least 1.
    pub max_stacks: u32,
    /// Replacement family; 0 is standalone.
    pub family: u32,
    /// Rank within the family.
    pub rank: u8,
    /// Aura duration; 0 means until removed.
    pub base_duration_ms: u32,
    /// Diminishing group of the carried control effect.
    pub dr_group: DiminishGroup,
    /// Diminished-duration cap; 0 means uncapped.
    pub dr_cap_ms: u32,
    /// Cast time; 0 casts instantly.
    pub cast_time_ms: u32,
    /// Cast slot a timed cast occupies.
    pub cast_slot: CastKind,
    /// Resource the cast draws from.
    pub power: PowerKind,
    /// Cost withdrawn on completion.
    pub power_cost: u32,
    /// What breaks the cast while in progress.
    pub interrupt_flags: InterruptFlags,
    /// What breaks the applied aura.
    pub break_flags: BreakFlags,
    /// Proc behavior of the applied auras, if any.
    pub proc: Option<ProcSpec>,
    /// Effects executed on completion, in order.
    pub effects: Vec<SpellEffect>,
}

impl SpellSpec {
    /// Creates a minimal spell: instant, no cost, no effects, one stack.
    #[must_use]
    pub fn new(id: SpellId, name: &str, school: SpellSchool) -> Self {
        Self {
            id,
            name: name.to_owned(),
            school,
            mechanic: Mechanic::None,
            dispel: DispelKind::None,
            attributes: SpellAttributes::empty(),
            stack_rule: StackRule::Unique,
            max_stacks: 1,
            family: 0,
            rank: 0,
            base_duration_ms: 0,
            dr_group: DiminishGroup::None,
            dr_cap_ms: 0,
            cast_time_ms: 0,
            cast_slot: CastKind::Generic,
            power: PowerKind::Mana,
            power_cost: 0,
            interrupt_flags: InterruptFlags::empty(),
            break_flags: BreakFlags::empty(),
            proc: None,
            effects: Vec::new(),
        }
    }

    /// `true` when the spell applies at least one aura effect.
    #[must_use]
    pub fn has_aura_effects(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, SpellEffect::ApplyAura(_)))
    }

    /// Aura effects carried by this spell, in effect order.
    pub fn aura_effects(&self) -> impl Iterator<Item = &AuraEffect> {
        self.effects.iter().filter_map(|e| match e {
            SpellEffect::ApplyAura(aura) => Some(aura),
            _ => None,
        })
    }

    /// `true` when the spell is a passive self effect.
    #[must_use]
    pub fn is_passive(&self) -> bool {
        self.attributes.contains(SpellAttributes::PASSIVE)
    }
}

/// Lookup seam for static spell data.
pub trait SpellStore {
    /// Resolves a spell id, `None` when unknown.
    fn spell(&self, id: SpellId) -> Option<&SpellSpec>;
}

/// In-memory spell store backed by a `BTreeMap`.
///
/// # Example
///
/// ```
/// use bladefall_core::ids::SpellId;
/// use bladefall_core::school::SpellSchool;
/// use bladefall_core::spell::{SpellSpec, SpellStore, StaticSpellStore};
///
/// let mut store = StaticSpellStore::new();
/// store.insert(SpellSpec::new(SpellId::new(133), "Fireball", SpellSchool::Fire));
///
/// assert!(store.spell(SpellId::new(133)).is_some());
/// assert!(store.spell(SpellId::new(134)).is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSpellStore {
    spells: BTreeMap<SpellId, SpellSpec>,
}

impl StaticSpellStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a definition.
    pub fn insert(&mut self, spec: SpellSpec) {
        self.spells.insert(spec.id, spec);
    }

    /// Number of definitions in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spells.len()
    }

    /// `true` when the store holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }
}

impl SpellStore for StaticSpellStore {
    fn spell(&self, id: SpellId) -> Option<&SpellSpec> {
        self.spells.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_spell_defaults() {
        let spec = SpellSpec::new(SpellId::new(1), "Test", SpellSchool::Frost);
        assert_eq!(spec.max_stacks, 1);
        assert_eq!(spec.cast_time_ms, 0);
        assert!(spec.effects.is_empty());
        assert!(!spec.has_aura_effects());
        assert!(!spec.is_passive());
    }

    #[test]
    fn aura_effects_filters_non_aura_entries() {
        let mut spec = SpellSpec::new(SpellId::new(2), "Mixed", SpellSchool::Shadow);
        spec.effects = vec![
            SpellEffect::SchoolDamage {
                min: 10,
                max: 20,
                coefficient: 0.0,
            },
            SpellEffect::ApplyAura(AuraEffect::Stun),
        ];
        assert!(spec.has_aura_effects());
        assert_eq!(spec.aura_effects().count(), 1);
    }

    #[test]
    fn store_resolves_known_ids_only() {
        let mut store = StaticSpellStore::new();
        assert!(store.is_empty());
        store.insert(SpellSpec::new(SpellId::new(10), "A", SpellSchool::Holy));
        store.insert(SpellSpec::new(SpellId::new(11), "B", SpellSchool::Fire));

        assert_eq!(store.len(), 2);
        assert!(store.spell(SpellId::new(10)).is_some());
        assert!(store.spell(SpellId::new(99)).is_none());
    }

    #[test]
    fn spec_serialization_roundtrip() {
        let mut spec = SpellSpec::new(SpellId::new(3), "Shield", SpellSchool::Holy);
        spec.effects = vec![SpellEffect::ApplyAura(AuraEffect::SchoolAbsorb {
            schools: crate::school::SchoolMask::ALL,
            amount: 500,
        })];
        spec.proc = Some(ProcSpec {
            on: ProcFlags::TAKEN_MELEE_HIT,
            chance: ProcChance::Fixed(10_000),
            charges: 3,
        });

        let json = serde_json::to_string(&spec).unwrap();
        let back: SpellSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
