//! Determinism verification tests.
//!
//! Same seed and same operation sequence must reproduce the same event log
//! and the same serialized state, every run, every platform. This backs:
//! - replay and spectator systems
//! - server-side reconciliation
//! - bug reproduction from a seed and a command log
//!
//! Snapshots restore the random stream to its seed, so two worlds restored
//! from the same snapshot stay in lockstep with each other; whole-run
//! replays from tick zero match the original exactly.

use crate::ids::{SpellId, UnitId};
use crate::school::SpellSchool;
use crate::unit::{Controller, PowerKind, Weapon};
use crate::world::World;

use super::helpers::{dot_spell, instant_bolt, setup_duel, stun_spell};

/// Runs the standard scripted fight: an auto-attacking knight against a
/// mage who opens with a bolt and a dot before being stunned.
///
/// Eight 650 ms updates leave the world at 5200 ms with swings, periodic
/// ticks and control expiries all exercised.
fn scripted_fight(seed: u64) -> (World, UnitId, UnitId) {
    let mut world = World::with_seed(seed);
    let (knight, mage) = setup_duel(&mut world);
    world.add_spell(instant_bolt(1, SpellSchool::Fire, 40, 60));
    world.add_spell(dot_spell(2, SpellSchool::Shadow, 8, 1_000, 4_000));
    world.add_spell(stun_spell(3, 2_000));
    world.unit_mut(knight).expect("knight").set_mainhand(Weapon {
        damage_min: 5.0,
        damage_max: 9.0,
        speed_ms: 1_300,
    });

    world.start_attack(knight, mage);
    world.cast_spell(mage, knight, SpellId::new(1)).expect("bolt");
    world.apply_aura(mage, knight, SpellId::new(2)).expect("dot");
    world.cast_spell(knight, mage, SpellId::new(3)).expect("stun");
    for _ in 0..8 {
        world.update(650);
    }
    (world, knight, mage)
}

/// Verify that the same seed reproduces the event log and the state.
#[test]
fn same_seed_reproduces_the_event_log() {
    let (mut first, _, _) = scripted_fight(42);
    let (mut second, _, _) = scripted_fight(42);

    assert_eq!(first.drain_events(), second.drain_events());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

/// Verify that different seeds actually change the rolls.
#[test]
fn different_seeds_tell_different_stories() {
    let (mut first, _, _) = scripted_fight(1);
    let (mut second, _, _) = scripted_fight(2);

    assert_ne!(first.seed(), second.seed());
    assert_ne!(first.drain_events(), second.drain_events());
}

/// Verify that units spawned in the same order get the same ids.
#[test]
fn unit_ids_assign_deterministically() {
    let mut first = World::with_seed(42);
    let mut second = World::with_seed(42);

    let ids1: Vec<UnitId> = (0..5)
        .map(|_| first.spawn(60, Controller::Player, PowerKind::Mana))
        .collect();
    let ids2: Vec<UnitId> = (0..5)
        .map(|_| second.spawn(60, Controller::Player, PowerKind::Mana))
        .collect();

    assert_eq!(ids1, ids2);
}

/// Verify that two worlds restored from one snapshot stay in lockstep when
/// fed the same remaining operations.
#[test]
fn snapshot_copies_stay_in_lockstep() {
    let mut world = World::with_seed(31);
    let (knight, mage) = setup_duel(&mut world);
    world.add_spell(instant_bolt(1, SpellSchool::Fire, 40, 60));
    world.add_spell(stun_spell(3, 2_000));
    world.unit_mut(knight).expect("knight").set_mainhand(Weapon {
        damage_min: 5.0,
        damage_max: 9.0,
        speed_ms: 1_300,
    });
    world.start_attack(knight, mage);
    world.cast_spell(knight, mage, SpellId::new(3)).expect("stun");
    for _ in 0..3 {
        world.update(500);
    }

    let snapshot = serde_json::to_string(&world).unwrap();
    let mut first: World = serde_json::from_str(&snapshot).unwrap();
    let mut second: World = serde_json::from_str(&snapshot).unwrap();

    let run_tail = |world: &mut World| {
        // The mage is still stunned here; the rejection is part of the tale.
        let _ = world.cast_spell(mage, knight, SpellId::new(1));
        for _ in 0..4 {
            world.update(500);
        }
    };
    run_tail(&mut first);
    run_tail(&mut second);

    assert_eq!(first.drain_events(), second.drain_events());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

proptest::proptest! {
    /// The standard script must hold its invariants under any seed: pools
    /// stay clamped, time adds up and the log is never empty.
    #[test]
    fn any_seed_survives_the_standard_script(seed in proptest::prelude::any::<u64>()) {
        let (mut world, knight, mage) = scripted_fight(seed);
        proptest::prop_assert!(!world.events().is_empty());
        proptest::prop_assert_eq!(world.time_ms(), 5_200);
        for id in [knight, mage] {
            let unit = world.unit(id).expect("units persist");
            proptest::prop_assert!(unit.health() <= unit.max_health());
            proptest::prop_assert!(unit.power() <= unit.max_power());
        }
        let _ = world.drain_events();
    }
}
