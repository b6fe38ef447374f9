//! Test helper functions for building worlds, units and spells.
//!
//! Factory functions and setup utilities shared by the determinism and
//! integration suites.

use glam::Vec3;

use crate::aura::AuraEffect;
use crate::combat::proc::ProcFlags;
use crate::ids::{SpellId, UnitId};
use crate::school::SpellSchool;
use crate::spell::{ProcChance, ProcSpec, SpellEffect, SpellSpec};
use crate::stats::{Rating, UnitAttr};
use crate::unit::{Controller, PowerKind};
use crate::world::World;

// =============================================================================
// Scenario Setup
// =============================================================================

/// Sets up the standard duel: a rage-powered knight at the origin and a
/// mana-powered mage two meters east.
///
/// The mage spawns facing east, away from the knight, which keeps parry and
/// block out of the knight's attack table.
///
/// # Returns
///
/// A tuple of (knight, mage).
pub fn setup_duel(world: &mut World) -> (UnitId, UnitId) {
    let knight = spawn_fighter(world, PowerKind::Rage, Vec3::ZERO);
    let mage = spawn_fighter(world, PowerKind::Mana, Vec3::new(2.0, 0.0, 0.0));
    (knight, mage)
}

/// Spawns a level-60 player with standard pools at a position.
///
/// Health 1000, mana 500, energy 100. Rage units start at zero rage.
pub fn spawn_fighter(world: &mut World, power: PowerKind, position: Vec3) -> UnitId {
    let id = world.spawn(60, Controller::Player, power);
    let unit = world.unit_mut(id).expect("freshly spawned unit");
    unit.stats.set_create(UnitAttr::Health, 1_000.0);
    unit.stats.set_create(UnitAttr::Mana, 500.0);
    unit.stats.set_create(UnitAttr::Rage, 1_000.0);
    unit.stats.set_create(UnitAttr::Energy, 100.0);
    unit.reset_pools();
    unit.set_position(position);
    id
}

/// Grants enough rating that every attack and spell lands.
///
/// 5 points cancel the 5% base melee miss and dodge at equal level; 4
/// points cancel the 4% base spell miss.
pub fn make_reliable(world: &mut World, id: UnitId) {
    let unit = world.unit_mut(id).expect("unit exists");
    unit.ratings.set(Rating::HitMelee, 5.0);
    unit.ratings.set(Rating::Expertise, 5.0);
    unit.ratings.set(Rating::HitSpell, 4.0);
}

// =============================================================================
// Spell Factories
// =============================================================================

/// An instant direct-damage spell with no cost.
pub fn instant_bolt(id: u32, school: SpellSchool, min: u32, max: u32) -> SpellSpec {
    let mut spec = SpellSpec::new(SpellId::new(id), "Test Bolt", school);
    spec.effects.push(SpellEffect::SchoolDamage {
        min,
        max,
        coefficient: 0.0,
    });
    spec
}

/// A stun that diminishes in the Stun group.
pub fn stun_spell(id: u32, duration_ms: u32) -> SpellSpec {
    let mut spec = SpellSpec::new(SpellId::new(id), "Test Stun", SpellSchool::Physical);
    spec.mechanic = crate::school::Mechanic::Stun;
    spec.dr_group = crate::dr::DiminishGroup::Stun;
    spec.base_duration_ms = duration_ms;
    spec.effects.push(SpellEffect::ApplyAura(AuraEffect::Stun));
    spec
}

/// A damage-over-time aura ticking on a fixed interval.
pub fn dot_spell(
    id: u32,
    school: SpellSchool,
    amount: u32,
    interval_ms: u32,
    duration_ms: u32,
) -> SpellSpec {
    let mut spec = SpellSpec::new(SpellId::new(id), "Test Rot", school);
    spec.base_duration_ms = duration_ms;
    spec.effects
        .push(SpellEffect::ApplyAura(AuraEffect::PeriodicDamage {
            school,
            amount,
            interval_ms,
        }));
    spec
}

/// An absorption shield soaking the given schools.
pub fn absorb_spell(id: u32, school: SpellSchool, amount: u32, duration_ms: u32) -> SpellSpec {
    let mut spec = SpellSpec::new(SpellId::new(id), "Test Ward", SpellSchool::Holy);
    spec.base_duration_ms = duration_ms;
    spec.effects
        .push(SpellEffect::ApplyAura(AuraEffect::SchoolAbsorb {
            schools: school.mask(),
            amount,
        }));
    spec
}

/// A passive that casts `triggered` at the counterpart whenever the given
/// proc flags fire. Zero charges means unlimited.
pub fn trigger_spell(id: u32, on: ProcFlags, triggered: u32, charges: u32) -> SpellSpec {
    let mut spec = SpellSpec::new(SpellId::new(id), "Test Echo", SpellSchool::Arcane);
    spec.proc = Some(ProcSpec {
        on,
        chance: ProcChance::Fixed(10_000),
        charges,
    });
    spec.effects
        .push(SpellEffect::ApplyAura(AuraEffect::TriggerSpell {
            spell: SpellId::new(triggered),
        }));
    spec
}

// =============================================================================
// Tests for helpers
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::WeaponHand;

    #[test]
    fn spawn_fighter_is_alive_with_full_pools() {
        let mut world = World::with_seed(1);
        let id = spawn_fighter(&mut world, PowerKind::Mana, Vec3::ZERO);

        assert!(world.is_alive(id));
        assert_eq!(world.health(id), Some(1_000));
        assert_eq!(world.unit(id).unwrap().power(), 500);
    }

    #[test]
    fn rage_fighters_start_empty() {
        let mut world = World::with_seed(1);
        let id = spawn_fighter(&mut world, PowerKind::Rage, Vec3::ZERO);
        assert_eq!(world.unit(id).unwrap().power(), 0);
    }

    #[test]
    fn duel_facing_keeps_the_mage_turned_away() {
        let mut world = World::with_seed(1);
        let (knight, mage) = setup_duel(&mut world);

        let knight_pos = world.unit(knight).unwrap().position();
        let mage_pos = world.unit(mage).unwrap().position();
        assert!(world.unit(knight).unwrap().is_facing(mage_pos));
        assert!(!world.unit(mage).unwrap().is_facing(knight_pos));
    }

    #[test]
    fn reliable_fighters_never_whiff() {
        let mut world = World::with_seed(17);
        let (knight, mage) = setup_duel(&mut world);
        make_reliable(&mut world, knight);

        for _ in 0..20 {
            let result = world.deal_damage(knight, mage, WeaponHand::Main).unwrap();
            assert!(result.outcome.lands(), "unexpected {:?}", result.outcome);
        }
    }
}
