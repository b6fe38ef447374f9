//! # Bladefall Core
//!
//! Combat unit simulation core for Bladefall.
//!
//! This crate is the deterministic heart of the server: stat aggregation,
//! the aura lifecycle with diminishing returns, melee and spell resolution
//! over a single attack-table roll, proc triggers, cast slot management and
//! the death/combat state machine, all sequenced by one [`World`] driver.
//!
//! ## Architecture
//!
//! - **Units**: [`unit::CombatUnit`] bundles pools, the stat grid, auras,
//!   cast slots and swing timers behind one serializable struct
//! - **Spells**: [`spell::SpellSpec`] is immutable static data; casts, auras
//!   and procs reference it by [`SpellId`]
//! - **Resolution**: [`combat`] rolls the attack table and applies the
//!   mitigation chain (armor, resistance, absorb shields, damage floor)
//! - **Driver**: [`world::World`] owns the unit registry, the seeded random
//!   stream and the outbound event log, and advances everything in id order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bladefall_core::{SpellEffect, SpellId, SpellSchool, SpellSpec, World};
//! use bladefall_core::unit::{Controller, PowerKind};
//!
//! let mut world = World::with_seed(0xBAD_C0FFE);
//! let knight = world.spawn(60, Controller::Player, PowerKind::Rage);
//! let raider = world.spawn(60, Controller::Npc, PowerKind::Mana);
//!
//! let mut bolt = SpellSpec::new(SpellId::new(133), "Firebolt", SpellSchool::Fire);
//! bolt.effects.push(SpellEffect::SchoolDamage { min: 14, max: 22, coefficient: 0.6 });
//! world.add_spell(bolt);
//!
//! world.cast_spell(raider, knight, SpellId::new(133))?;
//! world.update(100);
//!
//! for event in world.drain_events() {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Determinism
//!
//! Same seed, same operation sequence, same event log: every roll comes
//! from one ChaCha8 stream, unit storage is ordered, and no wall-clock or
//! platform-dependent value enters the simulation. Worlds round-trip
//! through serde and keep simulating identically after a reload.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aura;
pub mod cast;
pub mod combat;
pub mod dr;
pub mod error;
pub mod events;
pub mod ids;
pub mod lifecycle;
pub mod registry;
pub mod rng;
pub mod school;
pub mod spell;
pub mod stats;
pub mod unit;
pub mod world;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use combat::{AttackOutcome, DamageResult, WeaponHand};
pub use error::{AuraError, CastError};
pub use events::CombatEvent;
pub use ids::{HolderHandle, SpellId, UnitId};
pub use school::{SchoolMask, SpellSchool};
pub use spell::{SpellEffect, SpellSpec};
pub use unit::{CombatUnit, Controller, PowerKind};
pub use world::{World, WorldConfig};
