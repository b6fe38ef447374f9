//! Aura effects and the state they drive on a unit.
//!
//! An [`AuraEffect`] is the static payload of one spell effect slot; an
//! [`Aura`] is one live instance of it, owned exclusively by a holder
//! ([`holder::AuraHolder`]). Applying an aura registers its modifier in the
//! [`StatGrid`](crate::stats::StatGrid), the rating table, or a counter in
//! [`ControlState`]; removing is the exact inverse. Effects with no
//! apply-time mutation (periodic ticks, absorb pools, proc payloads) are
//! consumed by the update loop and the proc engine instead.
//!
//! Dispatch is a tagged-variant match, so adding an effect category is a
//! compile-time-checked change, not a table registration.

pub mod holder;
pub mod set;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{HolderHandle, SpellId, UnitId};
use crate::school::{Mechanic, SchoolMask, SpellSchool};
use crate::stats::{ModifierKind, Rating, RatingTable, StatGrid, UnitAttr};

// =============================================================================
// Effect payloads
// =============================================================================

/// One aura effect category.
///
/// The variants with numeric payloads scale with the holder's stack count
/// where that makes sense (stat and damage modifiers, periodic amounts);
/// control and immunity effects are binary and count instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AuraEffect {
    /// Modifier registered in the stat grid.
    StatMod {
        /// Grid row written
        attr: UnitAttr,
        /// Accumulator written
        kind: ModifierKind,
        /// Amount per stack
        amount: f32,
    },
    /// Flat points added to a combat rating.
    RatingMod {
        /// Rating written
        rating: Rating,
        /// Points per stack
        amount: f32,
    },
    /// Damage dealt every tick interval.
    PeriodicDamage {
        /// Damage school
        school: SpellSchool,
        /// Damage per tick per stack
        amount: u32,
        /// Tick interval
        interval_ms: u32,
    },
    /// Healing dealt every tick interval.
    PeriodicHeal {
        /// Healing per tick per stack
        amount: u32,
        /// Tick interval
        interval_ms: u32,
    },
    /// Fully incapacitated.
    Stun,
    /// Held in place.
    Root,
    /// Running in terror.
    Fear,
    /// Spellcasting locked out.
    Silence,
    /// Weapon knocked away; melee swings stop.
    Disarm,
    /// Immunity to whole schools.
    SchoolImmunity {
        /// Schools blocked
        schools: SchoolMask,
    },
    /// Immunity to one mechanic.
    MechanicImmunity {
        /// Mechanic blocked
        mechanic: Mechanic,
    },
    /// Absorption shield with a depleting pool.
    SchoolAbsorb {
        /// Schools the shield soaks
        schools: SchoolMask,
        /// Pool size at application
        amount: u32,
    },
    /// Reflects flat damage at melee strikers.
    DamageShield {
        /// School of the reflected damage
        school: SpellSchool,
        /// Damage per strike per stack
        amount: u32,
    },
    /// Casts a linked spell when the holder procs.
    TriggerSpell {
        /// Spell cast at the proc counterpart
        spell: SpellId,
    },
    /// Flat bonus to damage dealt in the given schools.
    ModDamageDoneFlat {
        /// Schools affected
        schools: SchoolMask,
        /// Bonus per stack
        amount: f32,
    },
    /// Percent bonus to damage dealt in the given schools.
    ModDamageDonePct {
        /// Schools affected
        schools: SchoolMask,
        /// Percent points per stack
        pct: f32,
    },
    /// Percent change to damage taken in the given schools.
    ModDamageTakenPct {
        /// Schools affected
        schools: SchoolMask,
        /// Percent points per stack
        pct: f32,
    },
}

impl AuraEffect {
    /// `true` when re-applying at a new stack count changes the registered
    /// modifier and the apply step must re-run on refresh.
    #[must_use]
    pub const fn is_stack_sensitive(&self) -> bool {
        matches!(
            self,
            Self::StatMod { .. }
                | Self::RatingMod { .. }
                | Self::ModDamageDoneFlat { .. }
                | Self::ModDamageDonePct { .. }
                | Self::ModDamageTakenPct { .. }
        )
    }

    /// `true` for loss-of-control effects.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Stun | Self::Root | Self::Fear | Self::Silence | Self::Disarm
        )
    }

    /// `true` when the effect must apply even with every visible slot busy.
    #[must_use]
    pub const fn is_essential(&self) -> bool {
        self.is_control()
            || matches!(
                self,
                Self::SchoolImmunity { .. } | Self::MechanicImmunity { .. }
            )
    }

    /// Registers the effect on the target at the given stack count.
    pub fn apply(&self, target: &mut EffectTarget<'_>, stacks: u32) {
        self.toggle(target, stacks, true);
    }

    /// Reverts exactly what [`AuraEffect::apply`] registered at the same
    /// stack count.
    pub fn unapply(&self, target: &mut EffectTarget<'_>, stacks: u32) {
        self.toggle(target, stacks, false);
    }

    #[allow(clippy::cast_precision_loss)]
    fn toggle(&self, target: &mut EffectTarget<'_>, stacks: u32, apply: bool) {
        let stacks = stacks.max(1) as f32;
        match *self {
            Self::StatMod { attr, kind, amount } => {
                let scaled = amount * stacks;
                if apply {
                    target.stats.add_modifier(attr, kind, scaled);
                } else {
                    target.stats.remove_modifier(attr, kind, scaled);
                }
            }
            Self::RatingMod { rating, amount } => {
                let scaled = amount * stacks;
                target.ratings.apply(rating, if apply { scaled } else { -scaled });
            }
            Self::Stun => target.control.toggle_stun(apply),
            Self::Root => target.control.toggle_root(apply),
            Self::Fear => target.control.toggle_fear(apply),
            Self::Silence => target.control.toggle_silence(apply),
            Self::Disarm => target.control.toggle_disarm(apply),
            Self::SchoolImmunity { schools } => target.control.toggle_school_immunity(schools, apply),
            Self::MechanicImmunity { mechanic } => {
                target.control.toggle_mechanic_immunity(mechanic, apply);
            }
            Self::ModDamageDoneFlat { schools, amount } => {
                target.damage_mods.toggle_done_flat(schools, amount * stacks, apply);
            }
            Self::ModDamageDonePct { schools, pct } => {
                target.damage_mods.toggle_done_pct(schools, pct * stacks, apply);
            }
            Self::ModDamageTakenPct { schools, pct } => {
                target.damage_mods.toggle_taken_pct(schools, pct * stacks, apply);
            }
            // Timer, pool, and proc payloads mutate nothing at apply time.
            Self::PeriodicDamage { .. }
            | Self::PeriodicHeal { .. }
            | Self::SchoolAbsorb { .. }
            | Self::DamageShield { .. }
            | Self::TriggerSpell { .. } => {}
        }
    }
}

// =============================================================================
// Live aura instances
// =============================================================================

/// Tick timer of a periodic effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicTimer {
    interval_ms: u32,
    next_in_ms: u32,
}

impl PeriodicTimer {
    /// Creates a timer that first fires after one full interval.
    #[must_use]
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            next_in_ms: interval_ms,
        }
    }

    /// The configured tick interval.
    #[must_use]
    pub const fn interval(&self) -> u32 {
        self.interval_ms
    }

    /// Advances the timer, returning how many times it fired.
    ///
    /// The caller clamps `delta_ms` to the holder's remaining duration, so a
    /// tick that lines up exactly with expiry still fires.
    pub fn advance(&mut self, mut delta_ms: u32) -> u32 {
        if self.interval_ms == 0 {
            return 0;
        }
        let mut fired = 0;
        while delta_ms >= self.next_in_ms {
            delta_ms -= self.next_in_ms;
            self.next_in_ms = self.interval_ms;
            fired += 1;
        }
        self.next_in_ms -= delta_ms;
        fired
    }
}

/// One live effect instance owned by a holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aura {
    /// Static payload from the spell effect slot.
    pub effect: AuraEffect,
    /// Effect slot index within the spell.
    pub effect_index: u8,
    /// Tick timer for periodic effects.
    pub periodic: Option<PeriodicTimer>,
    /// Remaining absorption pool for shield effects.
    pub absorb_left: u32,
}

impl Aura {
    /// Creates the live instance for one effect slot.
    #[must_use]
    pub fn new(effect: AuraEffect, effect_index: u8) -> Self {
        let periodic = match effect {
            AuraEffect::PeriodicDamage { interval_ms, .. }
            | AuraEffect::PeriodicHeal { interval_ms, .. } => Some(PeriodicTimer::new(interval_ms)),
            _ => None,
        };
        let absorb_left = match effect {
            AuraEffect::SchoolAbsorb { amount, .. } => amount,
            _ => 0,
        };
        Self {
            effect,
            effect_index,
            periodic,
            absorb_left,
        }
    }
}

/// One periodic effect firing, reported by the registry to the world for
/// damage/heal resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicFire {
    /// Holder the tick came from.
    pub holder: HolderHandle,
    /// Original caster.
    pub caster: UnitId,
    /// Spell that applied the holder.
    pub spell: SpellId,
    /// The periodic payload.
    pub effect: AuraEffect,
    /// Stack count at fire time.
    pub stacks: u32,
    /// Times the timer fired during this advance.
    pub ticks: u32,
}

// =============================================================================
// Aura-driven unit state
// =============================================================================

/// Counters for control and immunity effects.
///
/// Counters rather than booleans: two stuns overlap, and removing one must
/// leave the unit stunned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    stun: u32,
    root: u32,
    fear: u32,
    silence: u32,
    disarm: u32,
    school_immunity: Vec<u32>,
    mechanic_immunity: BTreeMap<Mechanic, u32>,
}

impl ControlState {
    /// Creates a clear state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            school_immunity: vec![0; SpellSchool::ALL.len()],
            ..Self::default()
        }
    }

    /// `true` when no control effect suppresses actions.
    #[must_use]
    pub fn can_act(&self) -> bool {
        self.stun == 0 && self.fear == 0
    }

    /// `true` when melee swings are possible.
    #[must_use]
    pub fn can_attack(&self) -> bool {
        self.can_act() && self.disarm == 0
    }

    /// `true` when casting is possible.
    #[must_use]
    pub fn can_cast(&self) -> bool {
        self.can_act() && self.silence == 0
    }

    /// `true` while at least one stun is active.
    #[must_use]
    pub fn is_stunned(&self) -> bool {
        self.stun > 0
    }

    /// `true` while at least one root is active.
    #[must_use]
    pub fn is_rooted(&self) -> bool {
        self.root > 0
    }

    /// `true` while at least one fear is active.
    #[must_use]
    pub fn is_feared(&self) -> bool {
        self.fear > 0
    }

    /// Mask of schools the unit is currently immune to.
    #[must_use]
    pub fn school_immunity_mask(&self) -> SchoolMask {
        let mut mask = SchoolMask::empty();
        for school in SpellSchool::ALL {
            if self.school_immunity.get(school.index()).copied().unwrap_or(0) > 0 {
                mask |= school.mask();
            }
        }
        mask
    }

    /// `true` when the unit is immune to any school in `schools`.
    #[must_use]
    pub fn is_immune_to_school(&self, schools: SchoolMask) -> bool {
        self.school_immunity_mask().intersects(schools)
    }

    /// `true` when the unit is immune to the mechanic.
    #[must_use]
    pub fn is_immune_to_mechanic(&self, mechanic: Mechanic) -> bool {
        if matches!(mechanic, Mechanic::None) {
            return false;
        }
        self.mechanic_immunity.get(&mechanic).copied().unwrap_or(0) > 0
    }

    fn toggle_stun(&mut self, apply: bool) {
        toggle_count(&mut self.stun, apply);
    }

    fn toggle_root(&mut self, apply: bool) {
        toggle_count(&mut self.root, apply);
    }

    fn toggle_fear(&mut self, apply: bool) {
        toggle_count(&mut self.fear, apply);
    }

    fn toggle_silence(&mut self, apply: bool) {
        toggle_count(&mut self.silence, apply);
    }

    fn toggle_disarm(&mut self, apply: bool) {
        toggle_count(&mut self.disarm, apply);
    }

    fn toggle_school_immunity(&mut self, schools: SchoolMask, apply: bool) {
        if self.school_immunity.len() != SpellSchool::ALL.len() {
            self.school_immunity = vec![0; SpellSchool::ALL.len()];
        }
        for school in SpellSchool::ALL {
            if schools.contains(school.mask()) {
                toggle_count(&mut self.school_immunity[school.index()], apply);
            }
        }
    }

    fn toggle_mechanic_immunity(&mut self, mechanic: Mechanic, apply: bool) {
        let count = self.mechanic_immunity.entry(mechanic).or_insert(0);
        toggle_count(count, apply);
        if *count == 0 {
            self.mechanic_immunity.remove(&mechanic);
        }
    }
}

fn toggle_count(count: &mut u32, apply: bool) {
    if apply {
        *count += 1;
    } else {
        *count = count.saturating_sub(1);
    }
}

/// Aura-sourced damage modifiers outside the stat grid.
///
/// Stored as individual contributions so removal restores the prior value
/// exactly, the same discipline as the grid accumulators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageMods {
    done_flat: Vec<(SchoolMask, f32)>,
    done_pct: Vec<(SchoolMask, f32)>,
    taken_pct: Vec<(SchoolMask, f32)>,
}

impl DamageMods {
    /// Creates an empty modifier set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flat bonus to damage dealt in any school of `mask`.
    #[must_use]
    pub fn done_flat(&self, mask: SchoolMask) -> f32 {
        self.done_flat
            .iter()
            .filter(|(m, _)| m.intersects(mask))
            .map(|(_, v)| v)
            .sum()
    }

    /// Multiplier on damage dealt in any school of `mask`.
    #[must_use]
    pub fn done_factor(&self, mask: SchoolMask) -> f32 {
        factor_of(&self.done_pct, mask)
    }

    /// Multiplier on damage taken in any school of `mask`.
    #[must_use]
    pub fn taken_factor(&self, mask: SchoolMask) -> f32 {
        factor_of(&self.taken_pct, mask)
    }

    fn toggle_done_flat(&mut self, schools: SchoolMask, amount: f32, apply: bool) {
        toggle_entry(&mut self.done_flat, schools, amount, apply);
    }

    fn toggle_done_pct(&mut self, schools: SchoolMask, pct: f32, apply: bool) {
        toggle_entry(&mut self.done_pct, schools, pct, apply);
    }

    fn toggle_taken_pct(&mut self, schools: SchoolMask, pct: f32, apply: bool) {
        toggle_entry(&mut self.taken_pct, schools, pct, apply);
    }
}

fn factor_of(entries: &[(SchoolMask, f32)], mask: SchoolMask) -> f32 {
    let mut factor = 1.0;
    for (m, pct) in entries {
        if m.intersects(mask) {
            factor *= ((100.0 + pct) / 100.0).max(0.0);
        }
    }
    factor
}

fn toggle_entry(entries: &mut Vec<(SchoolMask, f32)>, schools: SchoolMask, value: f32, apply: bool) {
    if apply {
        entries.push((schools, value));
    } else if let Some(pos) = entries
        .iter()
        .position(|(m, v)| *m == schools && v.to_bits() == value.to_bits())
    {
        entries.remove(pos);
    }
}

/// Mutable view of the unit state auras write to.
///
/// Built by the unit from disjoint field borrows, so the aura registry can
/// mutate stats while the registry itself is borrowed.
pub struct EffectTarget<'a> {
    /// The modifier grid.
    pub stats: &'a mut StatGrid,
    /// The rating table.
    pub ratings: &'a mut RatingTable,
    /// Control and immunity counters.
    pub control: &'a mut ControlState,
    /// Damage done/taken modifiers.
    pub damage_mods: &'a mut DamageMods,
}
