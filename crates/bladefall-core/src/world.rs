//! The world driver.
//!
//! [`World`] owns the unit registry, the spell store, the seeded random
//! stream and the outbound event log, and sequences every simulation step.
//! One [`World::update`] call advances each unit in id order through a fixed
//! phase list:
//!
//! 1. lifecycle transients (`JustDied → Corpse`, `JustAlived → Alive`)
//! 2. aura timers: periodic fires, then expiries
//! 3. cast slots: completed casts execute their effect lists
//! 4. swing timers: auto-attack strikes resolve and apply
//! 5. regeneration and combat-linger upkeep
//! 6. the deferred-removal sweep
//!
//! # Determinism
//!
//! All randomness flows through the one [`CombatRng`] seeded at
//! construction. Units live in a `BTreeMap` and advance in id order, so the
//! same seed plus the same operation sequence reproduces the same event log
//! and the same serialized state on every platform.
//!
//! # Example
//!
//! ```
//! use bladefall_core::unit::{Controller, PowerKind};
//! use bladefall_core::world::{World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig { seed: 7 });
//! let id = world.spawn(10, Controller::Player, PowerKind::Mana);
//!
//! world.update(1_000);
//! assert!(world.is_alive(id));
//! assert_eq!(world.time_ms(), 1_000);
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::aura::holder::{AuraHolder, RemoveMode};
use crate::aura::set::RemovedHolder;
use crate::aura::{AuraEffect, PeriodicFire};
use crate::cast::{CastKind, PendingCast};
use crate::combat::damage::{self, ResolvedAttack};
use crate::combat::proc::{self, ProcAction, ProcEvent, ProcFlags};
use crate::combat::{AttackOutcome, DamageResult, HitFlags, WeaponHand};
use crate::dr::scaled_duration;
use crate::error::{AuraError, CastError};
use crate::events::{CombatEvent, InterruptCause, NullThreat, ThreatSink};
use crate::ids::{HolderHandle, SpellId, UnitId};
use crate::registry::UnitRegistry;
use crate::rng::CombatRng;
use crate::school::SpellSchool;
use crate::spell::{BreakFlags, SpellAttributes, SpellEffect, SpellSpec, SpellStore, StaticSpellStore};
use crate::stats::UnitAttr;
use crate::unit::{CombatUnit, Controller, PowerKind, BASE_SWING_MS};

// =============================================================================
// Configuration
// =============================================================================

/// World-level construction knobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Seed for the combat random stream.
    pub seed: u64,
}

/// Where a damage application originated, steering rage, attacker
/// registration and proc dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DamageOrigin {
    Melee,
    Spell,
    Periodic,
    Reflect,
}

fn null_sink() -> Box<dyn ThreatSink> {
    Box::new(NullThreat)
}

fn aura_removed(target: UnitId, gone: RemovedHolder) -> CombatEvent {
    CombatEvent::AuraRemoved {
        target,
        caster: gone.caster,
        spell: gone.spell,
        mode: gone.mode,
    }
}

// =============================================================================
// World
// =============================================================================

/// The complete simulation state plus its driver.
///
/// Cross-unit references are [`UnitId`] keys resolved through the registry
/// at use time; stale ids resolve to `None` and the operation becomes a
/// no-op. The threat sink is an embedding-layer hook and is skipped in
/// serialization, as is the random stream itself (the seed survives and the
/// stream is rebuilt from it on load).
#[derive(Debug, Serialize, Deserialize)]
pub struct World {
    config: WorldConfig,
    time_ms: u64,
    units: UnitRegistry,
    spells: StaticSpellStore,
    rng: CombatRng,
    events: Vec<CombatEvent>,
    #[serde(skip, default = "null_sink")]
    threat: Box<dyn ThreatSink>,
    #[serde(skip)]
    proc_depth: u8,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            time_ms: 0,
            units: UnitRegistry::new(),
            spells: StaticSpellStore::new(),
            rng: CombatRng::new(config.seed),
            events: Vec::new(),
            threat: null_sink(),
            proc_depth: 0,
        }
    }

    /// Creates an empty world from a bare seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(WorldConfig { seed })
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Elapsed simulation time in milliseconds.
    #[must_use]
    pub const fn time_ms(&self) -> u64 {
        self.time_ms
    }

    /// Seed the combat stream was created from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Construction configuration.
    #[must_use]
    pub const fn config(&self) -> WorldConfig {
        self.config
    }

    /// The unit registry.
    #[must_use]
    pub const fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// The unit registry, mutably. Intended for setup between updates.
    #[must_use]
    pub fn units_mut(&mut self) -> &mut UnitRegistry {
        &mut self.units
    }

    /// Resolves a unit id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&CombatUnit> {
        self.units.get(id)
    }

    /// Resolves a unit id, mutably.
    #[must_use]
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut CombatUnit> {
        self.units.get_mut(id)
    }

    /// The static spell definitions.
    #[must_use]
    pub const fn spells(&self) -> &StaticSpellStore {
        &self.spells
    }

    /// Inserts or replaces a spell definition.
    pub fn add_spell(&mut self, spec: SpellSpec) {
        self.spells.insert(spec);
    }

    /// Replaces the threat notification sink.
    pub fn set_threat_sink(&mut self, sink: Box<dyn ThreatSink>) {
        self.threat = sink;
    }

    /// Events accumulated since the last drain.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Takes every accumulated event, leaving the log empty.
    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Population
    // -------------------------------------------------------------------------

    /// Spawns a unit. Callers seed its stat grid and reset its pools.
    pub fn spawn(&mut self, level: u32, controller: Controller, power: PowerKind) -> UnitId {
        self.units.spawn(level, controller, power)
    }

    /// Removes a unit. Ids referring to it resolve to `None` afterwards.
    pub fn despawn(&mut self, id: UnitId) -> Option<CombatUnit> {
        self.units.despawn(id)
    }

    // -------------------------------------------------------------------------
    // State queries
    // -------------------------------------------------------------------------

    /// `true` while the unit exists and acts in the world.
    #[must_use]
    pub fn is_alive(&self, unit: UnitId) -> bool {
        self.units.get(unit).is_some_and(CombatUnit::is_alive)
    }

    /// `true` while the unit exists and its combat flag is armed.
    #[must_use]
    pub fn is_in_combat(&self, unit: UnitId) -> bool {
        self.units.get(unit).is_some_and(CombatUnit::is_in_combat)
    }

    /// Current health of a unit.
    #[must_use]
    pub fn health(&self, unit: UnitId) -> Option<u32> {
        self.units.get(unit).map(CombatUnit::health)
    }

    /// Effective value of one stat row.
    #[must_use]
    pub fn stat(&mut self, unit: UnitId, attr: UnitAttr) -> Option<f32> {
        self.units.get_mut(unit).map(|u| u.stat(attr))
    }

    // -------------------------------------------------------------------------
    // Movement and auto-attack
    // -------------------------------------------------------------------------

    /// Moves a unit, breaking movement-sensitive casts and auras.
    ///
    /// Rooted, stunned and dead units cannot move; the call is then a no-op
    /// returning `false`.
    pub fn move_unit(&mut self, unit: UnitId, position: Vec3) -> bool {
        let Some(u) = self.units.get_mut(unit) else {
            return false;
        };
        if !u.is_alive() || !u.control.can_act() || u.control.is_rooted() {
            return false;
        }
        u.set_position(position);
        self.remove_auras_if(
            unit,
            |h| h.spec().break_flags.contains(BreakFlags::MOVE),
            RemoveMode::Default,
        );
        self.interrupt(unit, InterruptCause::Movement);
        true
    }

    /// Aims the unit's auto-attack at `target`, arming the swing timers.
    pub fn start_attack(&mut self, attacker: UnitId, target: UnitId) -> bool {
        if attacker == target || self.units.get(target).is_none() {
            return false;
        }
        let Some(unit) = self.units.get_mut(attacker) else {
            return false;
        };
        if !unit.is_alive() {
            return false;
        }
        unit.start_attack(target);
        true
    }

    /// Stops the unit's auto-attack.
    pub fn stop_attack(&mut self, attacker: UnitId) {
        if let Some(unit) = self.units.get_mut(attacker) {
            unit.stop_attack();
        }
    }

    // -------------------------------------------------------------------------
    // Damage and healing
    // -------------------------------------------------------------------------

    /// Resolves one weapon strike and applies it.
    ///
    /// Returns `None` when either unit is missing or dead, when the attacker
    /// cannot attack (stun, disarm, evade) or on a self-strike. The returned
    /// record is also pushed to the event log.
    pub fn deal_damage(
        &mut self,
        attacker: UnitId,
        victim: UnitId,
        hand: WeaponHand,
    ) -> Option<DamageResult> {
        self.melee_strike(attacker, victim, hand, 1.0, None)
    }

    /// Restores health on a living target.
    ///
    /// Returns the amount actually restored; overhealing is recorded on the
    /// event. Dead targets are not healable, only revivable.
    pub fn deal_heal(&mut self, healer: UnitId, target: UnitId, amount: u32) -> Option<u32> {
        self.heal_internal(healer, target, None, amount)
    }

    // -------------------------------------------------------------------------
    // Auras
    // -------------------------------------------------------------------------

    /// Applies a spell's aura effects to `target`, honoring diminishing
    /// returns, immunities, stacking and slot rules.
    ///
    /// Returns the handle of the holder that carries the application.
    pub fn apply_aura(
        &mut self,
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
    ) -> Result<HolderHandle, AuraError> {
        let result = self.try_apply_aura(caster, target, spell);
        if let Err(err) = &result {
            debug!(%caster, %target, %spell, %err, "aura application rejected");
        }
        result
    }

    /// Removes holders of `spell` from `target`.
    ///
    /// With a caster given only that caster's holder goes; without one,
    /// every holder of the spell. Returns the number removed.
    pub fn remove_aura(
        &mut self,
        target: UnitId,
        spell: SpellId,
        caster: Option<UnitId>,
        mode: RemoveMode,
    ) -> usize {
        let removed = {
            let Some(unit) = self.units.get_mut(target) else {
                return 0;
            };
            let (auras, mut apply_to) = unit.aura_parts();
            let removed: Vec<RemovedHolder> = match caster {
                Some(caster) => auras
                    .find(spell, caster)
                    .and_then(|handle| auras.remove(handle, mode, &mut apply_to))
                    .into_iter()
                    .collect(),
                None => auras.remove_if(|holder| holder.spell() == spell, mode, &mut apply_to),
            };
            unit.clamp_pools();
            removed
        };
        let count = removed.len();
        for gone in removed {
            self.events.push(aura_removed(target, gone));
        }
        count
    }

    /// Removes every holder on `target` matching `predicate`.
    pub fn remove_auras_if<F>(&mut self, target: UnitId, predicate: F, mode: RemoveMode) -> usize
    where
        F: FnMut(&AuraHolder) -> bool,
    {
        let removed = {
            let Some(unit) = self.units.get_mut(target) else {
                return 0;
            };
            let (auras, mut apply_to) = unit.aura_parts();
            let removed = auras.remove_if(predicate, mode, &mut apply_to);
            unit.clamp_pools();
            removed
        };
        let count = removed.len();
        for gone in removed {
            self.events.push(aura_removed(target, gone));
        }
        count
    }

    fn try_apply_aura(
        &mut self,
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
    ) -> Result<HolderHandle, AuraError> {
        let spec = self
            .spells
            .spell(spell)
            .cloned()
            .ok_or(AuraError::UnknownSpell(spell))?;
        let now = self.time_ms;
        let outcome = {
            let unit = self
                .units
                .get_mut(target)
                .ok_or(AuraError::NoSuchUnit(target))?;
            if !unit.is_alive()
                && !spec
                    .attributes
                    .contains(SpellAttributes::PERSISTS_THROUGH_DEATH)
            {
                return Err(AuraError::DeadTarget(target));
            }

            // Crowd-control durations decay with repetition on the same
            // target; a fully diminished application never lands.
            let group = spec.dr_group;
            let applies = group.applies_to(unit.controller());
            let duration = if spec.base_duration_ms == 0 {
                None
            } else {
                let level = unit.diminish.level(group, now);
                let scaled =
                    scaled_duration(level, spec.base_duration_ms, spec.dr_cap_ms, applies, false);
                if scaled == 0 {
                    return Err(AuraError::FullyDiminished);
                }
                Some(scaled)
            };

            let outcome = {
                let (auras, mut apply_to) = unit.aura_parts();
                auras.add(spec, caster, duration, &mut apply_to)?
            };
            if applies {
                unit.diminish.bump(group, now);
            }
            unit.clamp_pools();
            outcome
        };

        trace!(%caster, %target, %spell, stacks = outcome.stacks, "aura applied");
        for gone in outcome.displaced {
            self.events.push(aura_removed(target, gone));
        }
        self.events.push(CombatEvent::AuraApplied {
            target,
            caster,
            spell,
            stacks: outcome.stacks,
            refreshed: outcome.refreshed,
        });
        Ok(outcome.handle)
    }

    // -------------------------------------------------------------------------
    // Casting
    // -------------------------------------------------------------------------

    /// Requests a cast.
    ///
    /// Validation happens entirely at this boundary; a rejected cast leaves
    /// every unit untouched. Instant spells execute before the call returns,
    /// timed casts occupy their slot until [`World::update`] completes them,
    /// and channeled spells apply their payload up front and hold the slot
    /// for the channel duration. Power is withdrawn at completion.
    pub fn cast_spell(
        &mut self,
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
    ) -> Result<(), CastError> {
        let result = self.try_cast_spell(caster, target, spell);
        if let Err(err) = &result {
            debug!(%caster, %target, %spell, %err, "cast rejected");
        }
        result
    }

    fn try_cast_spell(
        &mut self,
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
    ) -> Result<(), CastError> {
        let spec = self
            .spells
            .spell(spell)
            .cloned()
            .ok_or(CastError::UnknownSpell(spell))?;

        let unit = self
            .units
            .get(caster)
            .ok_or(CastError::NoSuchUnit(caster))?;
        if !unit.is_alive() {
            return Err(CastError::CasterDead(caster));
        }
        if !unit.control.can_act() {
            return Err(CastError::Incapacitated(caster));
        }
        if spec.school.is_magic() && !unit.control.can_cast() {
            return Err(CastError::Silenced(spec.school.mask()));
        }
        if spec.power_cost > 0 {
            if unit.power_kind() != spec.power {
                return Err(CastError::OutOfPower {
                    need: spec.power_cost,
                    have: 0,
                });
            }
            if unit.power() < spec.power_cost {
                return Err(CastError::OutOfPower {
                    need: spec.power_cost,
                    have: unit.power(),
                });
            }
        }
        let kind = spec.cast_slot;
        if unit.casts.is_busy(kind) {
            return Err(CastError::SlotBusy(spell));
        }

        let victim = self
            .units
            .get(target)
            .ok_or(CastError::NoSuchUnit(target))?;
        if !victim.is_alive()
            && !spec
                .attributes
                .contains(SpellAttributes::PERSISTS_THROUGH_DEATH)
        {
            return Err(CastError::TargetDead(target));
        }
        if victim.control.is_immune_to_school(spec.school.mask())
            || victim.control.is_immune_to_mechanic(spec.mechanic)
        {
            return Err(CastError::Immune(target));
        }

        // Acting sheds break-on-cast auras (stealth and kin).
        self.remove_auras_if(
            caster,
            |h| h.spec().break_flags.contains(BreakFlags::CAST),
            RemoveMode::Default,
        );

        if spec.cast_time_ms == 0 {
            self.pay_cost(caster, &spec);
            self.events.push(CombatEvent::CastCompleted {
                caster,
                spell,
                target,
            });
            self.execute_spell(caster, target, &spec);
            return Ok(());
        }

        let pending = PendingCast {
            spell,
            target,
            remaining_ms: spec.cast_time_ms,
            interrupt_flags: spec.interrupt_flags,
        };
        if let Some(unit) = self.units.get_mut(caster) {
            unit.casts.begin(kind, pending);
        }
        self.events.push(CombatEvent::CastStarted {
            caster,
            spell,
            target,
            kind,
            cast_ms: spec.cast_time_ms,
        });
        if kind == CastKind::Channeled {
            // Channels pay and deliver their payload up front; the slot
            // then tracks the channel window while the aura does the work.
            self.pay_cost(caster, &spec);
            self.execute_spell(caster, target, &spec);
        }
        Ok(())
    }

    /// Breaks casts on `unit` whose spells are sensitive to `cause`.
    ///
    /// Returns the number of casts broken. Interruption is synchronous; the
    /// slot is free when the call returns. The `Death` cause carries no
    /// filter bit and is driven by the death path instead.
    pub fn interrupt(&mut self, unit: UnitId, cause: InterruptCause) -> usize {
        let Some(filter) = cause.filter() else {
            return 0;
        };
        let Some(u) = self.units.get_mut(unit) else {
            return 0;
        };
        let broken = u.casts.interrupt(filter);
        let count = broken.len();
        self.report_broken_casts(unit, broken, cause);
        count
    }

    fn report_broken_casts(
        &mut self,
        caster: UnitId,
        broken: Vec<(CastKind, PendingCast)>,
        cause: InterruptCause,
    ) {
        for (kind, cast) in broken {
            self.events.push(CombatEvent::CastInterrupted {
                caster,
                spell: cast.spell,
                kind,
                cause,
            });
            if kind == CastKind::Channeled {
                // A broken channel takes its aura with it.
                self.remove_aura(cast.target, cast.spell, Some(caster), RemoveMode::Cancel);
            }
        }
    }

    fn pay_cost(&mut self, caster: UnitId, spec: &SpellSpec) {
        if spec.power_cost == 0 {
            return;
        }
        if let Some(unit) = self.units.get_mut(caster) {
            if unit.power_kind() == spec.power && !unit.spend_power(spec.power_cost) {
                // The pool shrank below the validated cost mid-cast.
                warn!(unit = %caster, need = spec.power_cost, have = unit.power(),
                      "power fell below cost during cast; draining pool");
                unit.set_power(0);
            }
        }
    }

    fn finish_cast(&mut self, caster: UnitId, kind: CastKind, cast: PendingCast) {
        if kind == CastKind::Channeled {
            // The payload went out at channel start; expiry is the natural
            // end of the window.
            self.events.push(CombatEvent::CastCompleted {
                caster,
                spell: cast.spell,
                target: cast.target,
            });
            return;
        }
        let Some(spec) = self.spells.spell(cast.spell).cloned() else {
            debug!(spell = %cast.spell, "completed cast names an unknown spell");
            return;
        };
        self.pay_cost(caster, &spec);
        self.events.push(CombatEvent::CastCompleted {
            caster,
            spell: cast.spell,
            target: cast.target,
        });
        self.execute_spell(caster, cast.target, &spec);
    }

    // -------------------------------------------------------------------------
    // Spell execution
    // -------------------------------------------------------------------------

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn execute_spell(&mut self, caster: UnitId, target: UnitId, spec: &SpellSpec) {
        for effect in &spec.effects {
            match *effect {
                SpellEffect::SchoolDamage {
                    min,
                    max,
                    coefficient,
                } => self.spell_strike(caster, target, spec, min, max, coefficient),
                SpellEffect::Heal {
                    min,
                    max,
                    coefficient,
                } => {
                    let bonus = self.units.get(caster).map_or(0.0, |unit| {
                        unit.damage_mods.done_flat(spec.school.mask()) * coefficient
                    });
                    let amount = self.rng.between(min, max) + bonus.max(0.0).round() as u32;
                    self.heal_internal(caster, target, Some(spec.id), amount);
                }
                SpellEffect::Energize { power, amount } => self.energize(target, power, amount),
                SpellEffect::WeaponDamagePct { pct } => {
                    let _ = self.melee_strike(
                        caster,
                        target,
                        WeaponHand::Main,
                        pct as f32 / 100.0,
                        Some(spec.id),
                    );
                }
                SpellEffect::ApplyAura(_) => {} // applied once, below
            }
        }
        if spec.has_aura_effects() {
            if let Err(err) = self.try_apply_aura(caster, target, spec.id) {
                debug!(spell = %spec.id, %err, "aura payload rejected");
            }
        }
    }

    fn spell_strike(
        &mut self,
        caster: UnitId,
        target: UnitId,
        spec: &SpellSpec,
        min: u32,
        max: u32,
        coefficient: f32,
    ) {
        let resolved = if caster == target {
            let Some(unit) = self.units.get_mut(target) else {
                return;
            };
            if !unit.is_alive() {
                return;
            }
            // Self-inflicted damage reads the unit as its own attacker.
            let snapshot = unit.clone();
            damage::resolve_spell(&snapshot, unit, spec, min, max, coefficient, &mut self.rng)
        } else {
            let Some((atk, vic)) = self.units.pair_mut(caster, target) else {
                return;
            };
            if !atk.is_alive() || !vic.is_alive() {
                return;
            }
            damage::resolve_spell(atk, vic, spec, min, max, coefficient, &mut self.rng)
        };
        self.apply_attack(caster, target, Some(spec.id), resolved, DamageOrigin::Spell);
    }

    fn melee_strike(
        &mut self,
        attacker: UnitId,
        victim: UnitId,
        hand: WeaponHand,
        scale: f32,
        spell: Option<SpellId>,
    ) -> Option<DamageResult> {
        let (atk, vic) = self.units.pair_mut(attacker, victim)?;
        if !atk.is_alive() || atk.is_evading() || !atk.control.can_attack() {
            return None;
        }
        if !vic.is_alive() {
            return None;
        }
        let resolved = damage::resolve_melee(atk, vic, hand, scale, &mut self.rng);
        Some(self.apply_attack(attacker, victim, spell, resolved, DamageOrigin::Melee))
    }

    fn heal_internal(
        &mut self,
        healer: UnitId,
        target: UnitId,
        spell: Option<SpellId>,
        amount: u32,
    ) -> Option<u32> {
        let unit = self.units.get_mut(target)?;
        if !unit.is_alive() {
            return None;
        }
        let restored = unit.restore_health(amount);
        self.events.push(CombatEvent::Heal {
            healer,
            target,
            spell,
            amount: restored,
            overheal: amount - restored,
        });
        self.dispatch_procs(ProcEvent {
            attacker: Some(healer),
            victim: target,
            done: ProcFlags::DONE_HEAL,
            taken: ProcFlags::TAKEN_HEAL,
            school: SpellSchool::Holy,
            damage: restored,
        });
        Some(restored)
    }

    fn energize(&mut self, target: UnitId, power: PowerKind, amount: u32) {
        let Some(unit) = self.units.get_mut(target) else {
            return;
        };
        if !unit.is_alive() || unit.power_kind() != power {
            return;
        }
        let gained = unit.gain_power(amount);
        if gained > 0 {
            self.events.push(CombatEvent::PowerGain {
                unit: target,
                power,
                amount: gained,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Damage application
    // -------------------------------------------------------------------------

    /// Applies one resolved attack: shield breaks, event, engagement, rage,
    /// health, threat, death transition, then proc dispatch.
    fn apply_attack(
        &mut self,
        attacker: UnitId,
        victim_id: UnitId,
        spell: Option<SpellId>,
        resolved: ResolvedAttack,
        origin: DamageOrigin,
    ) -> DamageResult {
        let ResolvedAttack {
            result,
            shields_broken,
        } = resolved;

        // Exhausted absorb shields detach before anything else reads the set.
        self.break_shields(victim_id, shields_broken);

        self.events.push(CombatEvent::Damage {
            attacker,
            victim: victim_id,
            spell,
            result,
        });

        if result.outcome == AttackOutcome::Evade {
            // Evading targets acknowledge nothing.
            return result;
        }

        if attacker != victim_id && self.units.get(attacker).is_some_and(CombatUnit::is_alive) {
            self.engage(attacker);
            self.engage(victim_id);
            if origin == DamageOrigin::Melee {
                if let Some(vic) = self.units.get_mut(victim_id) {
                    vic.add_attacker(attacker);
                }
            }
        }

        let mut died = false;
        if result.damage > 0 {
            self.break_on_damage(victim_id);
            if origin == DamageOrigin::Melee {
                if let Some(atk) = self.units.get_mut(attacker) {
                    atk.rage_from_damage_dealt(result.damage);
                }
            }
            if let Some(vic) = self.units.get_mut(victim_id) {
                vic.rage_from_damage_taken(result.damage);
                vic.reduce_health(result.damage);
                died = vic.is_alive() && vic.health() == 0;
            }
            self.threat
                .notify(attacker, victim_id, result.damage, result.school.mask());
        }

        if died {
            self.handle_death(victim_id, Some(attacker), result.school);
        }

        match origin {
            DamageOrigin::Melee => {
                self.dispatch_procs(ProcEvent::melee(attacker, victim_id, &result));
            }
            DamageOrigin::Spell => {
                self.dispatch_procs(ProcEvent::spell(attacker, victim_id, &result));
            }
            DamageOrigin::Periodic => {
                let caster = self.units.get(attacker).map(|_| attacker);
                self.dispatch_procs(ProcEvent::periodic(
                    caster,
                    victim_id,
                    result.school,
                    result.damage,
                ));
            }
            DamageOrigin::Reflect => {}
        }
        result
    }

    fn break_shields(&mut self, victim: UnitId, handles: Vec<HolderHandle>) {
        if handles.is_empty() {
            return;
        }
        let removed = {
            let Some(unit) = self.units.get_mut(victim) else {
                return;
            };
            let (auras, mut apply_to) = unit.aura_parts();
            let mut removed = Vec::new();
            for handle in handles {
                if let Some(gone) = auras.remove(handle, RemoveMode::ShieldBreak, &mut apply_to) {
                    removed.push(gone);
                }
            }
            unit.clamp_pools();
            removed
        };
        for gone in removed {
            self.events.push(aura_removed(victim, gone));
        }
    }

    fn break_on_damage(&mut self, victim: UnitId) {
        self.remove_auras_if(
            victim,
            |h| h.spec().break_flags.contains(BreakFlags::DAMAGE),
            RemoveMode::Default,
        );
        self.interrupt(victim, InterruptCause::Damage);
    }

    fn engage(&mut self, id: UnitId) {
        let fresh = {
            let Some(unit) = self.units.get_mut(id) else {
                return;
            };
            if !unit.is_alive() {
                return;
            }
            let fresh = !unit.is_in_combat();
            unit.enter_combat();
            fresh
        };
        if fresh {
            self.events.push(CombatEvent::EnteredCombat { unit: id });
        }
    }

    fn handle_death(&mut self, victim: UnitId, killer: Option<UnitId>, school: SpellSchool) {
        let (was_attacking, report, attackers) = {
            let Some(unit) = self.units.get_mut(victim) else {
                return;
            };
            let was_attacking = unit.auto_attack();
            let report = unit.die();
            let attackers = unit.take_attackers();
            (was_attacking, report, attackers)
        };
        debug!(unit = %victim, "unit died");
        self.events.push(CombatEvent::Death { victim, killer });
        self.report_broken_casts(victim, report.broken_casts, InterruptCause::Death);
        for gone in report.removed_auras {
            self.events.push(aura_removed(victim, gone));
        }

        // The attacker web dissolves both ways.
        for attacker in attackers {
            if let Some(unit) = self.units.get_mut(attacker) {
                if unit.auto_attack() == Some(victim) {
                    unit.stop_attack();
                }
                unit.remove_attacker(victim);
            }
        }
        if let Some(target) = was_attacking {
            if let Some(unit) = self.units.get_mut(target) {
                unit.remove_attacker(victim);
            }
        }

        self.dispatch_procs(ProcEvent {
            attacker: killer,
            victim,
            done: ProcFlags::KILL,
            taken: ProcFlags::DIED,
            school,
            damage: 0,
        });
    }

    /// Resurrects a dead unit with the given pools, clamped.
    pub fn revive(&mut self, unit: UnitId, health: u32, power: u32) -> bool {
        let Some(u) = self.units.get_mut(unit) else {
            return false;
        };
        if !u.revive(health, power) {
            return false;
        }
        self.events.push(CombatEvent::Revive { unit });
        true
    }

    // -------------------------------------------------------------------------
    // Procs
    // -------------------------------------------------------------------------

    fn dispatch_procs(&mut self, event: ProcEvent) {
        // Payloads of triggered procs never proc again.
        if self.proc_depth > 0 {
            return;
        }
        if event.done.is_empty() && event.taken.is_empty() {
            return;
        }
        let mut actions = Vec::new();
        if let Some(attacker) = event.attacker {
            self.collect_procs(attacker, event.done, Some(event.victim), &mut actions);
        }
        self.collect_procs(event.victim, event.taken, event.attacker, &mut actions);
        if actions.is_empty() {
            return;
        }
        self.proc_depth += 1;
        for action in actions {
            self.run_proc_action(action);
        }
        self.proc_depth -= 1;
    }

    /// Walks one unit's aura registry against an event-side flag mask.
    ///
    /// Iteration runs over a handle snapshot; charge exhaustion tombstones
    /// holders through the registry, so a proc removing its own trigger
    /// neither skips reverts nor invalidates the walk.
    fn collect_procs(
        &mut self,
        owner: UnitId,
        flags: ProcFlags,
        counterpart: Option<UnitId>,
        actions: &mut Vec<ProcAction>,
    ) {
        if flags.is_empty() {
            return;
        }

        struct Candidate {
            handle: HolderHandle,
            source: SpellId,
            chance: i32,
            stacks: u32,
            effects: Vec<AuraEffect>,
        }

        let candidates: Vec<Candidate> = {
            let Some(unit) = self.units.get(owner) else {
                return;
            };
            let speed = unit
                .weapon(WeaponHand::Main)
                .map_or(BASE_SWING_MS, |w| w.speed_ms);
            unit.auras
                .active_handles()
                .into_iter()
                .filter_map(|handle| {
                    let holder = unit.auras.get(handle)?;
                    let spec = holder.spec().proc?;
                    if !spec.on.intersects(flags) {
                        return None;
                    }
                    Some(Candidate {
                        handle,
                        source: holder.spell(),
                        chance: proc::trigger_chance(spec.chance, speed),
                        stacks: holder.stacks(),
                        effects: holder.auras().iter().map(|a| a.effect).collect(),
                    })
                })
                .collect()
        };

        let mut exhausted = Vec::new();
        for candidate in candidates {
            if !self.rng.chance(candidate.chance) {
                continue; // roll failed; the charge is preserved
            }
            let mut payloads = 0;
            for effect in &candidate.effects {
                let Some(action) = proc::action_for(effect, owner, counterpart, flags, candidate.stacks)
                else {
                    continue;
                };
                if let ProcAction::CastSpell { spell, .. } = action {
                    self.events.push(CombatEvent::ProcFired {
                        unit: owner,
                        source: candidate.source,
                        triggered: spell,
                    });
                }
                actions.push(action);
                payloads += 1;
            }
            if payloads == 0 {
                continue; // ineligible for this event; no charge touched
            }
            if let Some(unit) = self.units.get_mut(owner) {
                if let Some(holder) = unit.auras.get_mut(candidate.handle) {
                    if holder.is_active() && holder.consume_charge() {
                        exhausted.push(candidate.handle);
                    }
                }
            }
        }

        if exhausted.is_empty() {
            return;
        }
        let removed = {
            let Some(unit) = self.units.get_mut(owner) else {
                return;
            };
            let (auras, mut apply_to) = unit.aura_parts();
            let mut removed = Vec::new();
            for handle in exhausted {
                if let Some(gone) = auras.remove(handle, RemoveMode::Default, &mut apply_to) {
                    removed.push(gone);
                }
            }
            unit.clamp_pools();
            removed
        };
        for gone in removed {
            self.events.push(aura_removed(owner, gone));
        }
    }

    fn run_proc_action(&mut self, action: ProcAction) {
        match action {
            ProcAction::CastSpell {
                caster,
                target,
                spell,
            } => self.execute_triggered(caster, target, spell),
            ProcAction::Reflect {
                from,
                to,
                school,
                amount,
            } => self.execute_reflect(from, to, school, amount),
        }
    }

    fn execute_triggered(&mut self, caster: UnitId, target: UnitId, spell: SpellId) {
        let Some(spec) = self.spells.spell(spell).cloned() else {
            debug!(%spell, "proc trigger names an unknown spell");
            return;
        };
        if self.units.get(caster).is_none() {
            return;
        }
        trace!(%caster, %target, %spell, "executing triggered spell");
        self.execute_spell(caster, target, &spec);
    }

    fn execute_reflect(&mut self, from: UnitId, to: UnitId, school: SpellSchool, amount: u32) {
        if amount == 0 {
            return;
        }
        let resolved = {
            let Some(unit) = self.units.get_mut(to) else {
                return;
            };
            if !unit.is_alive() || unit.is_evading() {
                return;
            }
            if unit.control.is_immune_to_school(school.mask()) {
                ResolvedAttack {
                    result: DamageResult::avoided(AttackOutcome::Immune, school),
                    shields_broken: Vec::new(),
                }
            } else {
                let (absorbed, shields_broken) = unit.auras.absorb(school.mask(), amount);
                let mut flags = HitFlags::empty();
                if absorbed > 0 {
                    flags |= HitFlags::ABSORB;
                }
                ResolvedAttack {
                    result: DamageResult {
                        outcome: AttackOutcome::Normal,
                        school,
                        damage: amount - absorbed,
                        absorbed,
                        resisted: 0,
                        blocked: 0,
                        flags,
                    },
                    shields_broken,
                }
            }
        };
        self.apply_attack(from, to, None, resolved, DamageOrigin::Reflect);
    }

    // -------------------------------------------------------------------------
    // Update loop
    // -------------------------------------------------------------------------

    /// Advances the whole world by `delta_ms`.
    ///
    /// Units advance in id order; within one unit the phases run in the
    /// order documented at the module level. A unit killed mid-step skips
    /// its remaining phases for the tick.
    pub fn update(&mut self, delta_ms: u64) {
        self.time_ms += delta_ms;
        let ids: Vec<UnitId> = self.units.ids_sorted().collect();
        for id in ids {
            self.update_unit(id, delta_ms);
        }
    }

    fn update_unit(&mut self, id: UnitId, delta_ms: u64) {
        // Lifecycle transients settle first; dead units only sweep.
        let tick = {
            let Some(unit) = self.units.get_mut(id) else {
                return;
            };
            let _ = unit.advance_lifecycle(delta_ms);
            if !unit.is_alive() {
                unit.auras.sweep();
                return;
            }
            let tick = {
                let (auras, mut apply_to) = unit.aura_parts();
                auras.advance(delta_ms, &mut apply_to)
            };
            unit.clamp_pools();
            tick
        };
        // Final ticks at expiry fire before their removal is reported.
        for fire in tick.fires {
            self.run_periodic(id, fire);
        }
        for gone in tick.removed {
            self.events.push(aura_removed(id, gone));
        }

        // A periodic tick may have killed the unit.
        if !self.is_alive(id) {
            self.sweep(id);
            return;
        }
        let completed = match self.units.get_mut(id) {
            Some(unit) => unit.casts.advance(delta_ms),
            None => return,
        };
        for (kind, cast) in completed {
            self.finish_cast(id, kind, cast);
        }

        if !self.is_alive(id) {
            self.sweep(id);
            return;
        }
        let swings = match self.units.get_mut(id) {
            Some(unit) => unit.advance_swings(delta_ms),
            None => return,
        };
        for hand in swings {
            self.auto_swing(id, hand);
        }

        let left_combat = {
            let Some(unit) = self.units.get_mut(id) else {
                return;
            };
            unit.advance_regen(delta_ms);
            let left = unit.advance_engagement(delta_ms);
            unit.auras.sweep();
            left
        };
        if left_combat {
            self.events.push(CombatEvent::LeftCombat { unit: id });
        }
    }

    fn sweep(&mut self, id: UnitId) {
        if let Some(unit) = self.units.get_mut(id) {
            unit.auras.sweep();
        }
    }

    fn run_periodic(&mut self, victim_id: UnitId, fire: PeriodicFire) {
        match fire.effect {
            AuraEffect::PeriodicDamage {
                school,
                amount,
                interval_ms,
            } => {
                // Caster bonuses are snapshotted at tick time; a despawned
                // caster contributes nothing.
                let (bonus_flat, done_factor) =
                    self.units.get(fire.caster).map_or((0.0, 1.0), |caster| {
                        let mask = school.mask();
                        (
                            caster.damage_mods.done_flat(mask),
                            caster.damage_mods.done_factor(mask),
                        )
                    });
                let total_ticks = self
                    .units
                    .get(victim_id)
                    .and_then(|unit| unit.auras.get(fire.holder))
                    .map_or(1, |holder| {
                        if interval_ms == 0 {
                            1
                        } else {
                            (holder.spec().base_duration_ms / interval_ms).max(1)
                        }
                    });
                let per_tick = damage::periodic_tick_damage(
                    amount,
                    fire.stacks,
                    bonus_flat,
                    done_factor,
                    total_ticks,
                );
                for _ in 0..fire.ticks {
                    let Some(unit) = self.units.get_mut(victim_id) else {
                        break;
                    };
                    if !unit.is_alive() {
                        break;
                    }
                    let resolved = damage::mitigate_periodic(unit, school, per_tick);
                    self.apply_attack(
                        fire.caster,
                        victim_id,
                        Some(fire.spell),
                        resolved,
                        DamageOrigin::Periodic,
                    );
                }
            }
            AuraEffect::PeriodicHeal { amount, .. } => {
                let healed = amount * fire.stacks.max(1);
                for _ in 0..fire.ticks {
                    let Some(unit) = self.units.get_mut(victim_id) else {
                        break;
                    };
                    if !unit.is_alive() {
                        break;
                    }
                    let restored = unit.restore_health(healed);
                    self.events.push(CombatEvent::Heal {
                        healer: fire.caster,
                        target: victim_id,
                        spell: Some(fire.spell),
                        amount: restored,
                        overheal: healed - restored,
                    });
                }
            }
            _ => {}
        }
    }

    fn auto_swing(&mut self, attacker: UnitId, hand: WeaponHand) {
        let Some(target) = self.units.get(attacker).and_then(CombatUnit::auto_attack) else {
            return;
        };
        if self.units.get(target).map_or(true, |vic| !vic.is_alive()) {
            if let Some(unit) = self.units.get_mut(attacker) {
                unit.stop_attack();
            }
            return;
        }
        let _ = self.melee_strike(attacker, target, hand, 1.0, None);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifeState;
    use crate::spell::{InterruptFlags, ProcChance, ProcSpec};
    use crate::stats::Rating;

    fn spawn_unit(world: &mut World, power: PowerKind) -> UnitId {
        let id = world.spawn(60, Controller::Player, power);
        let unit = world.unit_mut(id).unwrap();
        unit.stats.set_create(UnitAttr::Health, 1_000.0);
        unit.stats.set_create(UnitAttr::Mana, 500.0);
        unit.stats.set_create(UnitAttr::Rage, 1_000.0);
        unit.stats.set_create(UnitAttr::Energy, 100.0);
        unit.reset_pools();
        id
    }

    /// Two units; the second stands east of the first and faces away, so
    /// parry and block never enter the melee table.
    fn hostile_pair(world: &mut World) -> (UnitId, UnitId) {
        let a = spawn_unit(world, PowerKind::Rage);
        let b = spawn_unit(world, PowerKind::Mana);
        world
            .unit_mut(b)
            .unwrap()
            .set_position(Vec3::new(1.0, 0.0, 0.0));
        (a, b)
    }

    /// Zeroes the attacker-side miss and dodge chances so every swing lands.
    fn guarantee_melee_hits(world: &mut World, attacker: UnitId) {
        let unit = world.unit_mut(attacker).unwrap();
        unit.ratings.set(Rating::HitMelee, 5.0);
        unit.ratings.set(Rating::Expertise, 5.0);
    }

    fn frost_bolt(id: u32, min: u32, max: u32) -> SpellSpec {
        let mut spec = SpellSpec::new(SpellId::new(id), "Test Bolt", SpellSchool::Frost);
        spec.effects.push(SpellEffect::SchoolDamage {
            min,
            max,
            coefficient: 0.0,
        });
        spec
    }

    fn timed_bolt(id: u32, cast_ms: u32, cost: u32) -> SpellSpec {
        let mut spec = frost_bolt(id, 50, 50);
        spec.cast_time_ms = cast_ms;
        spec.power_cost = cost;
        spec.interrupt_flags = InterruptFlags::MOVEMENT | InterruptFlags::DAMAGE;
        spec
    }

    fn stun_spell(id: u32, duration_ms: u32) -> SpellSpec {
        let mut spec = SpellSpec::new(SpellId::new(id), "Test Stun", SpellSchool::Physical);
        spec.mechanic = crate::school::Mechanic::Stun;
        spec.dr_group = crate::dr::DiminishGroup::Stun;
        spec.base_duration_ms = duration_ms;
        spec.effects.push(SpellEffect::ApplyAura(AuraEffect::Stun));
        spec
    }

    fn shadow_dot(id: u32) -> SpellSpec {
        let mut spec = SpellSpec::new(SpellId::new(id), "Test Rot", SpellSchool::Shadow);
        spec.base_duration_ms = 3_000;
        spec.effects
            .push(SpellEffect::ApplyAura(AuraEffect::PeriodicDamage {
                school: SpellSchool::Shadow,
                amount: 10,
                interval_ms: 1_000,
            }));
        spec
    }

    fn spell_hit_rating(world: &mut World, caster: UnitId) {
        // 4 rating points cancel the 4% base spell miss at equal level.
        world
            .unit_mut(caster)
            .unwrap()
            .ratings
            .set(Rating::HitSpell, 4.0);
    }

    fn damage_events(world: &World) -> Vec<&CombatEvent> {
        world
            .events()
            .iter()
            .filter(|e| matches!(e, CombatEvent::Damage { .. }))
            .collect()
    }

    mod cast_tests {
        use super::*;

        #[test]
        fn unknown_spell_rejected() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            let err = world.cast_spell(a, b, SpellId::new(999)).unwrap_err();
            assert_eq!(err, CastError::UnknownSpell(SpellId::new(999)));
            assert!(world.events().is_empty());
        }

        #[test]
        fn dead_caster_rejected() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 50, 50));
            world.unit_mut(a).unwrap().die();
            let err = world.cast_spell(a, b, SpellId::new(1)).unwrap_err();
            assert_eq!(err, CastError::CasterDead(a));
        }

        #[test]
        fn busy_slot_rejected() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(timed_bolt(1, 2_000, 0));
            world.add_spell(timed_bolt(2, 2_000, 0));
            world.cast_spell(a, b, SpellId::new(1)).unwrap();
            let err = world.cast_spell(a, b, SpellId::new(2)).unwrap_err();
            assert_eq!(err, CastError::SlotBusy(SpellId::new(2)));
        }

        #[test]
        fn out_of_power_rejected() {
            let mut world = World::with_seed(1);
            let a = spawn_unit(&mut world, PowerKind::Mana);
            let b = spawn_unit(&mut world, PowerKind::Mana);
            world.add_spell(timed_bolt(1, 1_000, 9_999));
            let err = world.cast_spell(a, b, SpellId::new(1)).unwrap_err();
            assert_eq!(
                err,
                CastError::OutOfPower {
                    need: 9_999,
                    have: 500
                }
            );
        }

        #[test]
        fn stunned_caster_rejected() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 50, 50));
            AuraEffect::Stun.apply(&mut world.unit_mut(a).unwrap().effect_target(), 1);
            let err = world.cast_spell(a, b, SpellId::new(1)).unwrap_err();
            assert_eq!(err, CastError::Incapacitated(a));
        }

        #[test]
        fn silence_blocks_magic_but_not_physical() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 50, 50));
            world.add_spell(stun_spell(2, 1_000));
            AuraEffect::Silence.apply(&mut world.unit_mut(a).unwrap().effect_target(), 1);

            let err = world.cast_spell(a, b, SpellId::new(1)).unwrap_err();
            assert_eq!(err, CastError::Silenced(SpellSchool::Frost.mask()));
            assert!(world.cast_spell(a, b, SpellId::new(2)).is_ok());
        }

        #[test]
        fn immune_target_rejected_at_boundary() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 50, 50));
            AuraEffect::SchoolImmunity {
                schools: SpellSchool::Frost.mask(),
            }
            .apply(&mut world.unit_mut(b).unwrap().effect_target(), 1);
            let err = world.cast_spell(a, b, SpellId::new(1)).unwrap_err();
            assert_eq!(err, CastError::Immune(b));
        }

        #[test]
        fn instant_cast_executes_immediately() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 50, 50));
            spell_hit_rating(&mut world, a);

            world.cast_spell(a, b, SpellId::new(1)).unwrap();
            assert_eq!(world.health(b), Some(950));
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::CastCompleted { .. })));
        }

        #[test]
        fn timed_cast_completes_on_update_and_pays_then() {
            let mut world = World::with_seed(1);
            let caster = spawn_unit(&mut world, PowerKind::Mana);
            let target = spawn_unit(&mut world, PowerKind::Mana);
            world
                .unit_mut(target)
                .unwrap()
                .set_position(Vec3::new(2.0, 0.0, 0.0));
            world.add_spell(timed_bolt(1, 1_500, 100));
            spell_hit_rating(&mut world, caster);

            world.cast_spell(caster, target, SpellId::new(1)).unwrap();
            assert_eq!(world.unit(caster).unwrap().power(), 500);

            world.update(1_000);
            assert_eq!(world.health(target), Some(1_000));

            world.update(500);
            assert_eq!(world.health(target), Some(950));
            assert_eq!(world.unit(caster).unwrap().power(), 400);
        }

        #[test]
        fn movement_interrupts_flagged_cast() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(timed_bolt(1, 2_000, 100));
            world.cast_spell(b, a, SpellId::new(1)).unwrap();

            assert!(world.move_unit(b, Vec3::new(5.0, 5.0, 0.0)));
            assert!(world.events().iter().any(|e| matches!(
                e,
                CombatEvent::CastInterrupted {
                    cause: InterruptCause::Movement,
                    ..
                }
            )));
            // No cost was paid; the slot is free again.
            assert_eq!(world.unit(b).unwrap().power(), 500);
            assert!(!world.unit(b).unwrap().casts.is_busy(CastKind::Generic));
        }

        #[test]
        fn interrupt_respects_flag_filter() {
            let mut world = World::with_seed(1);
            let (_, b) = hostile_pair(&mut world);
            let target = spawn_unit(&mut world, PowerKind::Mana);
            let mut spec = frost_bolt(1, 50, 50);
            spec.cast_time_ms = 2_000;
            spec.interrupt_flags = InterruptFlags::MOVEMENT;
            world.add_spell(spec);
            world.cast_spell(b, target, SpellId::new(1)).unwrap();

            assert_eq!(world.interrupt(b, InterruptCause::Damage), 0);
            assert!(world.unit(b).unwrap().casts.is_busy(CastKind::Generic));
            assert_eq!(world.interrupt(b, InterruptCause::Movement), 1);
            assert!(!world.unit(b).unwrap().casts.is_busy(CastKind::Generic));
        }

        #[test]
        fn channel_applies_aura_upfront_and_unlinks_on_break() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            let caster = b;
            let mut spec = shadow_dot(1);
            spec.cast_slot = CastKind::Channeled;
            spec.cast_time_ms = 3_000;
            spec.interrupt_flags = InterruptFlags::INTERRUPT;
            world.add_spell(spec);

            world.cast_spell(caster, a, SpellId::new(1)).unwrap();
            assert!(world.unit(a).unwrap().auras.has(SpellId::new(1)));

            assert_eq!(world.interrupt(caster, InterruptCause::Counter), 1);
            assert!(!world.unit(a).unwrap().auras.has(SpellId::new(1)));
        }
    }

    mod melee_tests {
        use super::*;

        #[test]
        fn deal_damage_lands_grants_rage_and_engages() {
            let mut world = World::with_seed(3);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);

            let result = world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert!(result.outcome.lands());
            assert!(result.damage >= 1);
            assert_eq!(world.health(b), Some(1_000 - result.damage));
            assert!(world.unit(a).unwrap().power() >= 1);
            assert!(world.is_in_combat(a));
            assert!(world.is_in_combat(b));
            assert!(world.unit(b).unwrap().attackers().contains(&a));
        }

        #[test]
        fn self_strike_is_rejected() {
            let mut world = World::with_seed(3);
            let (a, _) = hostile_pair(&mut world);
            assert!(world.deal_damage(a, a, WeaponHand::Main).is_none());
        }

        #[test]
        fn stunned_attacker_cannot_swing() {
            let mut world = World::with_seed(3);
            let (a, b) = hostile_pair(&mut world);
            AuraEffect::Stun.apply(&mut world.unit_mut(a).unwrap().effect_target(), 1);
            assert!(world.deal_damage(a, b, WeaponHand::Main).is_none());
        }

        #[test]
        fn swing_timer_drives_auto_attack() {
            let mut world = World::with_seed(3);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            assert!(world.start_attack(a, b));

            world.update(u64::from(BASE_SWING_MS) - 1);
            assert!(damage_events(&world).is_empty());

            world.update(1);
            let hits = damage_events(&world);
            assert_eq!(hits.len(), 1);
            assert!(matches!(
                hits[0],
                CombatEvent::Damage { spell: None, .. }
            ));
        }

        #[test]
        fn auto_attack_stops_when_target_dies() {
            let mut world = World::with_seed(3);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            world.start_attack(a, b);
            world.unit_mut(b).unwrap().die();

            world.update(u64::from(BASE_SWING_MS));
            assert!(damage_events(&world).is_empty());
            assert!(world.unit(a).unwrap().auto_attack().is_none());
        }
    }

    mod heal_tests {
        use super::*;

        #[test]
        fn heal_restores_and_reports_overheal() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.unit_mut(b).unwrap().reduce_health(100);

            assert_eq!(world.deal_heal(a, b, 150), Some(100));
            assert_eq!(world.health(b), Some(1_000));
            assert!(world.events().iter().any(|e| matches!(
                e,
                CombatEvent::Heal {
                    amount: 100,
                    overheal: 50,
                    ..
                }
            )));
        }

        #[test]
        fn dead_targets_cannot_be_healed() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.unit_mut(b).unwrap().die();
            assert_eq!(world.deal_heal(a, b, 50), None);
        }
    }

    mod aura_tests {
        use super::*;

        #[test]
        fn apply_emits_event_and_changes_state() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(stun_spell(1, 5_000));

            let handle = world.apply_aura(a, b, SpellId::new(1)).unwrap();
            assert!(world.unit(b).unwrap().control.is_stunned());
            assert_eq!(
                world.unit(b).unwrap().auras.get(handle).unwrap().remaining_ms(),
                Some(5_000)
            );
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::AuraApplied { refreshed: false, .. })));
        }

        #[test]
        fn stun_durations_diminish_then_immune() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(stun_spell(1, 10_000));
            let spell = SpellId::new(1);

            for expected in [10_000, 5_000, 2_500] {
                let handle = world.apply_aura(a, b, spell).unwrap();
                assert_eq!(
                    world.unit(b).unwrap().auras.get(handle).unwrap().remaining_ms(),
                    Some(expected)
                );
                world.remove_aura(b, spell, Some(a), RemoveMode::Cancel);
            }
            assert_eq!(
                world.apply_aura(a, b, spell).unwrap_err(),
                AuraError::FullyDiminished
            );
        }

        #[test]
        fn diminishing_record_ages_out() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(stun_spell(1, 10_000));
            let spell = SpellId::new(1);

            world.apply_aura(a, b, spell).unwrap();
            world.remove_aura(b, spell, Some(a), RemoveMode::Cancel);
            world.update(15_001);

            let handle = world.apply_aura(a, b, spell).unwrap();
            assert_eq!(
                world.unit(b).unwrap().auras.get(handle).unwrap().remaining_ms(),
                Some(10_000)
            );
        }

        #[test]
        fn npc_targets_only_diminish_stuns() {
            let mut world = World::with_seed(1);
            let a = spawn_unit(&mut world, PowerKind::Mana);
            let npc = world.spawn(60, Controller::Npc, PowerKind::Mana);
            world.unit_mut(npc).unwrap().stats.set_create(UnitAttr::Health, 1_000.0);
            world.unit_mut(npc).unwrap().reset_pools();

            let mut root = SpellSpec::new(SpellId::new(2), "Test Root", SpellSchool::Frost);
            root.dr_group = crate::dr::DiminishGroup::Root;
            root.base_duration_ms = 8_000;
            root.effects.push(SpellEffect::ApplyAura(AuraEffect::Root));
            world.add_spell(root);
            world.add_spell(stun_spell(1, 10_000));

            // Roots never diminish on NPCs.
            for _ in 0..3 {
                let handle = world.apply_aura(a, npc, SpellId::new(2)).unwrap();
                assert_eq!(
                    world.unit(npc).unwrap().auras.get(handle).unwrap().remaining_ms(),
                    Some(8_000)
                );
                world.remove_aura(npc, SpellId::new(2), Some(a), RemoveMode::Cancel);
            }

            // Stuns do.
            world.apply_aura(a, npc, SpellId::new(1)).unwrap();
            world.remove_aura(npc, SpellId::new(1), Some(a), RemoveMode::Cancel);
            let handle = world.apply_aura(a, npc, SpellId::new(1)).unwrap();
            assert_eq!(
                world.unit(npc).unwrap().auras.get(handle).unwrap().remaining_ms(),
                Some(5_000)
            );
        }

        #[test]
        fn remove_aura_reverts_control() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(stun_spell(1, 5_000));
            world.apply_aura(a, b, SpellId::new(1)).unwrap();
            assert!(world.unit(b).unwrap().control.is_stunned());

            assert_eq!(world.remove_aura(b, SpellId::new(1), Some(a), RemoveMode::Cancel), 1);
            assert!(!world.unit(b).unwrap().control.is_stunned());
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::AuraRemoved { mode: RemoveMode::Cancel, .. })));
        }
    }

    mod periodic_tests {
        use super::*;

        #[test]
        fn dot_ticks_and_expires_through_update() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(shadow_dot(1));
            world.apply_aura(a, b, SpellId::new(1)).unwrap();

            world.update(1_000);
            assert_eq!(world.health(b), Some(990));
            world.update(1_000);
            assert_eq!(world.health(b), Some(980));
            world.update(1_000);
            assert_eq!(world.health(b), Some(970));
            assert!(!world.unit(b).unwrap().auras.has(SpellId::new(1)));
            assert!(world.events().iter().any(|e| matches!(
                e,
                CombatEvent::AuraRemoved {
                    mode: RemoveMode::Expire,
                    ..
                }
            )));
        }

        #[test]
        fn long_delta_compresses_to_the_same_total() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(shadow_dot(1));
            world.apply_aura(a, b, SpellId::new(1)).unwrap();

            world.update(3_000);
            assert_eq!(world.health(b), Some(970));
            assert_eq!(damage_events(&world).len(), 3);
        }

        #[test]
        fn hot_ticks_heal() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            let mut spec = SpellSpec::new(SpellId::new(1), "Test Mend", SpellSchool::Nature);
            spec.base_duration_ms = 2_000;
            spec.effects
                .push(SpellEffect::ApplyAura(AuraEffect::PeriodicHeal {
                    amount: 15,
                    interval_ms: 1_000,
                }));
            world.add_spell(spec);
            world.unit_mut(b).unwrap().reduce_health(100);
            world.apply_aura(a, b, SpellId::new(1)).unwrap();

            world.update(2_000);
            assert_eq!(world.health(b), Some(930));
        }
    }

    mod death_tests {
        use super::*;

        #[test]
        fn lethal_damage_kills_within_the_call() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(frost_bolt(1, 5_000, 5_000));
            spell_hit_rating(&mut world, a);
            // mana for the cast is irrelevant; cost is zero
            world.cast_spell(a, b, SpellId::new(1)).unwrap();

            assert_eq!(world.unit(b).unwrap().life_state(), LifeState::JustDied);
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::Death { killer: Some(k), .. } if *k == a)));

            world.update(100);
            assert_eq!(world.unit(b).unwrap().life_state(), LifeState::Corpse);
        }

        #[test]
        fn death_strips_auras_after_the_death_event() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(shadow_dot(1));
            world.add_spell(frost_bolt(2, 5_000, 5_000));
            spell_hit_rating(&mut world, a);
            world.apply_aura(a, b, SpellId::new(1)).unwrap();
            world.cast_spell(a, b, SpellId::new(2)).unwrap();

            assert!(!world.unit(b).unwrap().auras.has(SpellId::new(1)));
            let events = world.events();
            let death = events
                .iter()
                .position(|e| matches!(e, CombatEvent::Death { .. }))
                .unwrap();
            let stripped = events
                .iter()
                .position(|e| {
                    matches!(
                        e,
                        CombatEvent::AuraRemoved { mode: RemoveMode::Death, spell, .. }
                            if *spell == SpellId::new(1)
                    )
                })
                .unwrap();
            assert!(death < stripped);
        }

        #[test]
        fn death_dissolves_the_attacker_web() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            world.start_attack(a, b);
            world.start_attack(b, a);
            world.deal_damage(a, b, WeaponHand::Main).unwrap();
            let _ = world.deal_damage(b, a, WeaponHand::Main);

            world.unit_mut(b).unwrap().set_health(1);
            // keep striking until the kill lands
            while world.is_alive(b) {
                let _ = world.deal_damage(a, b, WeaponHand::Main);
            }
            assert!(world.unit(a).unwrap().auto_attack().is_none());
            assert!(world.unit(a).unwrap().attackers().is_empty());
        }

        #[test]
        fn revive_restores_and_reports() {
            let mut world = World::with_seed(1);
            let (_, b) = hostile_pair(&mut world);
            world.unit_mut(b).unwrap().die();
            assert!(!world.revive(b, 500, 500)); // JustDied has not settled
            world.update(100);

            assert!(world.revive(b, 500, 400));
            assert!(world.is_alive(b));
            assert_eq!(world.health(b), Some(500));
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::Revive { unit } if *unit == b)));
        }
    }

    mod proc_tests {
        use super::*;

        fn trigger_aura(id: u32, triggered: u32, charges: u32) -> SpellSpec {
            let mut spec = SpellSpec::new(SpellId::new(id), "Test Trigger", SpellSchool::Arcane);
            spec.proc = Some(ProcSpec {
                on: ProcFlags::DONE_MELEE_HIT,
                chance: ProcChance::Fixed(10_000),
                charges,
            });
            spec.effects
                .push(SpellEffect::ApplyAura(AuraEffect::TriggerSpell {
                    spell: SpellId::new(triggered),
                }));
            spec
        }

        #[test]
        fn melee_hit_triggers_linked_spell() {
            let mut world = World::with_seed(5);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            spell_hit_rating(&mut world, a);
            world.add_spell(frost_bolt(10, 25, 25));
            world.add_spell(trigger_aura(20, 10, 0));
            world.apply_aura(a, a, SpellId::new(20)).unwrap();

            let result = world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert!(result.damage >= 1);
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::ProcFired { .. })));
            // melee hit plus the triggered bolt
            assert_eq!(damage_events(&world).len(), 2);
            assert_eq!(world.health(b), Some(1_000 - result.damage - 25));
        }

        #[test]
        fn charge_exhaustion_destroys_the_holder() {
            let mut world = World::with_seed(5);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            spell_hit_rating(&mut world, a);
            world.add_spell(frost_bolt(10, 25, 25));
            world.add_spell(trigger_aura(20, 10, 2));
            world.apply_aura(a, a, SpellId::new(20)).unwrap();

            world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert!(world.unit(a).unwrap().auras.has(SpellId::new(20)));

            world.deal_damage(a, b, WeaponHand::Main).unwrap();
            world.update(0); // sweep
            assert!(!world.unit(a).unwrap().auras.has(SpellId::new(20)));
            assert_eq!(
                world
                    .events()
                    .iter()
                    .filter(|e| matches!(e, CombatEvent::ProcFired { .. }))
                    .count(),
                2
            );
        }

        #[test]
        fn failed_roll_preserves_charges() {
            let mut world = World::with_seed(5);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            world.add_spell(frost_bolt(10, 25, 25));
            let mut spec = trigger_aura(20, 10, 1);
            spec.proc = Some(ProcSpec {
                on: ProcFlags::DONE_MELEE_HIT,
                chance: ProcChance::Fixed(0),
                charges: 1,
            });
            world.add_spell(spec);
            world.apply_aura(a, a, SpellId::new(20)).unwrap();

            world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert!(world.unit(a).unwrap().auras.has(SpellId::new(20)));
            let handle = world.unit(a).unwrap().auras.first_of_spell(SpellId::new(20)).unwrap();
            assert_eq!(world.unit(a).unwrap().auras.get(handle).unwrap().charges(), 1);
        }

        #[test]
        fn damage_shield_reflects_without_cascading() {
            let mut world = World::with_seed(5);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);

            let mut shield = SpellSpec::new(SpellId::new(30), "Test Thorns", SpellSchool::Nature);
            shield.proc = Some(ProcSpec {
                on: ProcFlags::TAKEN_MELEE_HIT,
                chance: ProcChance::Fixed(10_000),
                charges: 0,
            });
            shield
                .effects
                .push(SpellEffect::ApplyAura(AuraEffect::DamageShield {
                    school: SpellSchool::Nature,
                    amount: 25,
                }));
            world.add_spell(shield);
            world.apply_aura(b, b, SpellId::new(30)).unwrap();
            // the attacker carries one too; the reflect must not bounce back
            world.apply_aura(a, a, SpellId::new(30)).unwrap();

            let result = world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert_eq!(world.health(a), Some(1_000 - 25));
            assert_eq!(world.health(b), Some(1_000 - result.damage));
            // one melee hit, one reflect, nothing further
            assert_eq!(damage_events(&world).len(), 2);
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn queries_on_missing_units_are_benign() {
            let mut world = World::with_seed(1);
            let ghost = UnitId::new(99);
            assert!(!world.is_alive(ghost));
            assert!(!world.is_in_combat(ghost));
            assert_eq!(world.health(ghost), None);
            assert_eq!(world.stat(ghost, UnitAttr::Strength), None);
        }

        #[test]
        fn combat_lingers_then_clears() {
            let mut world = World::with_seed(1);
            let (a, b) = hostile_pair(&mut world);
            guarantee_melee_hits(&mut world, a);
            world.deal_damage(a, b, WeaponHand::Main).unwrap();
            assert!(world.is_in_combat(b));

            // The melee attacker stays registered; clear it first.
            world.unit_mut(b).unwrap().remove_attacker(a);
            world.update(6_000);
            assert!(!world.is_in_combat(b));
            assert!(world
                .events()
                .iter()
                .any(|e| matches!(e, CombatEvent::LeftCombat { .. })));
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn roundtrip_preserves_state_and_reseeds() {
            let mut world = World::with_seed(77);
            let (a, b) = hostile_pair(&mut world);
            world.add_spell(shadow_dot(1));
            world.apply_aura(a, b, SpellId::new(1)).unwrap();
            world.update(1_000);

            let json = serde_json::to_string(&world).unwrap();
            let mut restored: World = serde_json::from_str(&json).unwrap();

            assert_eq!(restored.seed(), 77);
            assert_eq!(restored.time_ms(), 1_000);
            assert_eq!(restored.units().unit_count(), 2);
            assert_eq!(restored.health(b), world.health(b));
            assert!(restored.unit(b).unwrap().auras.has(SpellId::new(1)));
            // the restored world keeps simulating
            restored.update(1_000);
            assert_eq!(restored.health(b), Some(980));
        }

        #[test]
        fn same_seed_same_story() {
            let run = || {
                let mut world = World::with_seed(123);
                let (a, b) = hostile_pair(&mut world);
                world.add_spell(shadow_dot(1));
                world.add_spell(frost_bolt(2, 40, 60));
                world.start_attack(a, b);
                world.apply_aura(a, b, SpellId::new(1)).unwrap();
                world.cast_spell(b, a, SpellId::new(2)).unwrap();
                for _ in 0..5 {
                    world.update(700);
                }
                (world.drain_events(), serde_json::to_string(&world).unwrap())
            };
            let (events_a, state_a) = run();
            let (events_b, state_b) = run();
            assert_eq!(events_a, events_b);
            assert_eq!(state_a, state_b);
        }
    }
}
