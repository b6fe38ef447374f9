//! The combat unit aggregate.
//!
//! [`CombatUnit`] is the root object of the simulation. It owns every
//! per-unit component as a plain field so callers can borrow them
//! independently:
//!
//! - [`StatGrid`] and [`RatingTable`]: attribute and rating state
//! - [`AuraSet`]: every timed effect on the unit
//! - [`ControlState`] / [`DamageMods`]: aura-driven flag state
//! - [`DiminishTracker`]: crowd-control decay
//! - [`CastSlots`]: the four concurrent cast slots
//! - [`Lifecycle`] / [`Engagement`]: death and combat state
//!
//! Cross-unit references are [`UnitId`] keys resolved through the world
//! registry at use time; a unit never owns another unit.

use std::collections::BTreeSet;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::aura::holder::RemoveMode;
use crate::aura::set::{AuraSet, RemovedHolder};
use crate::aura::{ControlState, DamageMods, EffectTarget};
use crate::cast::{CastKind, CastSlots, PendingCast};
use crate::combat::table::rating_permyriad;
use crate::combat::WeaponHand;
use crate::dr::DiminishTracker;
use crate::ids::UnitId;
use crate::lifecycle::{Engagement, LifeState, Lifecycle};
use crate::spell::SpellAttributes;
use crate::stats::{Rating, RatingTable, StatGrid, UnitAttr};

// =============================================================================
// Tunables
// =============================================================================

/// Baseline unhasted swing period for either hand.
pub const BASE_SWING_MS: u32 = 2_000;

/// Interval between resource regeneration pulses.
pub const REGEN_INTERVAL_MS: u32 = 2_000;

/// Mana restored per point of spirit each regeneration pulse.
const MANA_REGEN_PER_SPIRIT: f32 = 0.25;

/// Energy restored each regeneration pulse.
const ENERGY_REGEN_PER_PULSE: u32 = 20;

/// Focus restored each regeneration pulse.
const FOCUS_REGEN_PER_PULSE: u32 = 25;

/// Rage tenths drained each regeneration pulse while out of combat.
const RAGE_DECAY_PER_PULSE: u32 = 30;

/// Divisor per level in the damage-to-rage conversion.
const RAGE_CONVERSION_PER_LEVEL: f32 = 4.0;

/// Rage tenths per converted point of damage dealt.
const RAGE_DEALT_TENTHS: f32 = 75.0;

/// Rage tenths per converted point of damage taken.
const RAGE_TAKEN_TENTHS: f32 = 25.0;

// =============================================================================
// Classification
// =============================================================================

/// The resource pool a unit spends to act.
///
/// Selected once at spawn. Rage is stored in tenths of a point so decay
/// and damage conversion keep fractional precision in an integer pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerKind {
    /// Spell resource; regenerates from spirit, starts full.
    Mana,
    /// Builds from damage dealt and taken, decays out of combat, starts empty.
    Rage,
    /// Hunter-style resource; fixed regeneration, starts full.
    Focus,
    /// Rogue-style resource; fixed regeneration, starts full.
    Energy,
}

impl PowerKind {
    /// The stat row holding this pool's maximum.
    #[must_use]
    pub const fn attr(self) -> UnitAttr {
        match self {
            Self::Mana => UnitAttr::Mana,
            Self::Rage => UnitAttr::Rage,
            Self::Focus => UnitAttr::Focus,
            Self::Energy => UnitAttr::Energy,
        }
    }

    /// `true` when the pool starts empty instead of full.
    #[must_use]
    pub const fn starts_empty(self) -> bool {
        matches!(self, Self::Rage)
    }
}

impl fmt::Display for PowerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mana => write!(f, "Mana"),
            Self::Rage => write!(f, "Rage"),
            Self::Focus => write!(f, "Focus"),
            Self::Energy => write!(f, "Energy"),
        }
    }
}

/// Who drives the unit.
///
/// Diminishing-returns applicability keys off this: every group diminishes
/// on player-controlled targets, only stun-class groups on NPCs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Controller {
    /// Player-controlled unit.
    Player,
    /// Server-controlled unit.
    Npc,
}

impl Controller {
    /// `true` for player-controlled units.
    #[must_use]
    pub const fn is_player(self) -> bool {
        matches!(self, Self::Player)
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "Player"),
            Self::Npc => write!(f, "Npc"),
        }
    }
}

// =============================================================================
// Weapons
// =============================================================================

/// One equipped weapon: a base damage range and a swing period.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    /// Low end of the base damage roll.
    pub damage_min: f32,
    /// High end of the base damage roll.
    pub damage_max: f32,
    /// Unhasted time between swings.
    pub speed_ms: u32,
}

impl Weapon {
    /// Creates a weapon from a damage range and swing period.
    #[must_use]
    pub const fn new(damage_min: f32, damage_max: f32, speed_ms: u32) -> Self {
        Self {
            damage_min,
            damage_max,
            speed_ms,
        }
    }
}

impl Default for Weapon {
    fn default() -> Self {
        Self::new(1.0, 2.0, BASE_SWING_MS)
    }
}

// =============================================================================
// CombatUnit
// =============================================================================

/// What a death tore off the unit, for the caller to report.
#[derive(Debug, Default)]
pub struct DeathReport {
    /// Casts the death broke, paired with the slots they occupied.
    pub broken_casts: Vec<(CastKind, PendingCast)>,
    /// Holders detached in `Death` removal mode.
    pub removed_auras: Vec<RemovedHolder>,
}

/// A complete combat unit.
///
/// Health and power pools are private and only move through the clamped
/// mutators; the component fields are public so the registry layer can
/// borrow them disjointly (see [`CombatUnit::aura_parts`]).
///
/// # Invariants
///
/// - `health ∈ [0, max_health]`, `power ∈ [0, max_power]` after every
///   mutator returns.
/// - `health == 0` only in a dead lifecycle state once the damage apply
///   step has run.
/// - The attacker set holds ids, never references; stale ids are dropped
///   when the registry fails to resolve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatUnit {
    id: UnitId,
    level: u32,
    controller: Controller,
    power_kind: PowerKind,
    position: Vec3,
    facing: f32,
    health: u32,
    power: u32,
    evading: bool,
    mainhand: Weapon,
    offhand: Option<Weapon>,
    swing_main_ms: u32,
    swing_off_ms: u32,
    auto_attack: Option<UnitId>,
    regen_ms: u32,
    attackers: BTreeSet<UnitId>,
    lifecycle: Lifecycle,
    engagement: Engagement,
    /// Attribute modifier grid.
    pub stats: StatGrid,
    /// Combat rating table.
    pub ratings: RatingTable,
    /// Aura-driven control and immunity counters.
    pub control: ControlState,
    /// Aura-driven damage done/taken modifiers.
    pub damage_mods: DamageMods,
    /// Every timed effect on the unit.
    pub auras: AuraSet,
    /// Crowd-control diminishing state.
    pub diminish: DiminishTracker,
    /// The four concurrent cast slots.
    pub casts: CastSlots,
}

impl CombatUnit {
    /// Creates a unit with empty pools and default components.
    ///
    /// Callers seed the stat grid afterwards and then call
    /// [`CombatUnit::reset_pools`] to fill health and power.
    #[must_use]
    pub fn new(id: UnitId, level: u32, controller: Controller, power_kind: PowerKind) -> Self {
        Self {
            id,
            level,
            controller,
            power_kind,
            position: Vec3::ZERO,
            facing: 0.0,
            health: 0,
            power: 0,
            evading: false,
            mainhand: Weapon::default(),
            offhand: None,
            swing_main_ms: BASE_SWING_MS,
            swing_off_ms: BASE_SWING_MS,
            auto_attack: None,
            regen_ms: REGEN_INTERVAL_MS,
            attackers: BTreeSet::new(),
            lifecycle: Lifecycle::new(),
            engagement: Engagement::new(),
            stats: StatGrid::new(),
            ratings: RatingTable::new(),
            control: ControlState::new(),
            damage_mods: DamageMods::new(),
            auras: AuraSet::new(),
            diminish: DiminishTracker::new(),
            casts: CastSlots::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Unit identifier.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Unit level.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Who drives the unit.
    #[must_use]
    pub const fn controller(&self) -> Controller {
        self.controller
    }

    /// The unit's active resource kind.
    #[must_use]
    pub const fn power_kind(&self) -> PowerKind {
        self.power_kind
    }

    // -------------------------------------------------------------------------
    // Transform
    // -------------------------------------------------------------------------

    /// World position.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Moves the unit.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Facing angle in radians on the ground plane.
    #[must_use]
    pub const fn facing(&self) -> f32 {
        self.facing
    }

    /// Sets the facing angle.
    pub fn set_facing(&mut self, facing: f32) {
        self.facing = facing;
    }

    /// Turns the unit towards a point.
    pub fn face_towards(&mut self, point: Vec3) {
        let to = point - self.position;
        if to.x != 0.0 || to.y != 0.0 {
            self.facing = to.y.atan2(to.x);
        }
    }

    /// `true` when `point` lies in the unit's front arc.
    ///
    /// Parry and block only apply against attackers the defender faces.
    /// The arc is the front half-plane on the ground; a point at the
    /// unit's own position counts as faced.
    #[must_use]
    pub fn is_facing(&self, point: Vec3) -> bool {
        let to = point - self.position;
        if to.x == 0.0 && to.y == 0.0 {
            return true;
        }
        let dir = glam::Vec2::new(self.facing.cos(), self.facing.sin());
        dir.dot(glam::Vec2::new(to.x, to.y)) > 0.0
    }

    // -------------------------------------------------------------------------
    // Pools
    // -------------------------------------------------------------------------

    /// Current health.
    #[must_use]
    pub const fn health(&self) -> u32 {
        self.health
    }

    /// Maximum health from the stat grid.
    #[must_use]
    pub fn max_health(&self) -> u32 {
        self.stats.max_health()
    }

    /// Current power. Rage is reported in tenths of a point.
    #[must_use]
    pub const fn power(&self) -> u32 {
        self.power
    }

    /// Maximum power for the unit's resource kind.
    #[must_use]
    pub fn max_power(&self) -> u32 {
        match self.power_kind {
            PowerKind::Mana => self.stats.max_mana(),
            kind => self.stats.resource_max(kind.attr()),
        }
    }

    /// Sets health, clamped to `[0, max_health]`.
    pub fn set_health(&mut self, health: u32) {
        self.health = health.min(self.max_health());
    }

    /// Sets power, clamped to `[0, max_power]`.
    pub fn set_power(&mut self, power: u32) {
        self.power = power.min(self.max_power());
    }

    /// Fills the pools to their spawn values.
    ///
    /// Health and most resources start full; rage starts empty.
    pub fn reset_pools(&mut self) {
        self.health = self.max_health();
        self.power = if self.power_kind.starts_empty() {
            0
        } else {
            self.max_power()
        };
    }

    /// Re-clamps both pools after a maximum changed.
    pub fn clamp_pools(&mut self) {
        self.health = self.health.min(self.max_health());
        self.power = self.power.min(self.max_power());
    }

    /// Removes health, stopping at zero. Returns the amount removed.
    pub fn reduce_health(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.health);
        self.health -= removed;
        removed
    }

    /// Restores health, stopping at the maximum. Returns the amount restored.
    pub fn restore_health(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max_health().saturating_sub(self.health));
        self.health += restored;
        restored
    }

    /// Withdraws power if the pool covers the cost.
    pub fn spend_power(&mut self, cost: u32) -> bool {
        if self.power < cost {
            return false;
        }
        self.power -= cost;
        true
    }

    /// Adds power, stopping at the maximum. Returns the amount added.
    pub fn gain_power(&mut self, amount: u32) -> u32 {
        let gained = amount.min(self.max_power().saturating_sub(self.power));
        self.power += gained;
        gained
    }

    /// Grants rage in tenths for damage the unit dealt.
    ///
    /// No-op unless rage is the active resource.
    pub fn rage_from_damage_dealt(&mut self, damage: u32) {
        self.gain_rage(damage, RAGE_DEALT_TENTHS);
    }

    /// Grants rage in tenths for damage the unit took.
    pub fn rage_from_damage_taken(&mut self, damage: u32) {
        self.gain_rage(damage, RAGE_TAKEN_TENTHS);
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn gain_rage(&mut self, damage: u32, tenths_per_point: f32) {
        if self.power_kind != PowerKind::Rage || damage == 0 {
            return;
        }
        let conversion = (self.level as f32 * RAGE_CONVERSION_PER_LEVEL).max(1.0);
        let tenths = (damage as f32 * tenths_per_point / conversion).round().max(1.0);
        self.gain_power(tenths as u32);
    }

    // -------------------------------------------------------------------------
    // Regeneration
    // -------------------------------------------------------------------------

    /// Advances the regeneration clock, pulsing every [`REGEN_INTERVAL_MS`].
    pub fn advance_regen(&mut self, delta_ms: u64) {
        if !self.is_alive() {
            return;
        }
        let mut left = delta_ms;
        loop {
            let timer = u64::from(self.regen_ms.max(1));
            if left < timer {
                break;
            }
            left -= timer;
            self.regen_pulse();
            self.regen_ms = REGEN_INTERVAL_MS;
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            self.regen_ms = self.regen_ms.saturating_sub(left as u32);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn regen_pulse(&mut self) {
        match self.power_kind {
            PowerKind::Mana => {
                let spirit = self.stats.peek(UnitAttr::Spirit).max(0.0);
                let gain = (spirit * MANA_REGEN_PER_SPIRIT).round() as u32;
                self.gain_power(gain);
            }
            PowerKind::Rage => {
                if !self.engagement.in_combat() {
                    self.power = self.power.saturating_sub(RAGE_DECAY_PER_PULSE);
                }
            }
            PowerKind::Focus => {
                self.gain_power(FOCUS_REGEN_PER_PULSE);
            }
            PowerKind::Energy => {
                self.gain_power(ENERGY_REGEN_PER_PULSE);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Weapons and swings
    // -------------------------------------------------------------------------

    /// The weapon in a hand, `None` for an empty off-hand.
    #[must_use]
    pub const fn weapon(&self, hand: WeaponHand) -> Option<&Weapon> {
        match hand {
            WeaponHand::Main => Some(&self.mainhand),
            WeaponHand::Off => self.offhand.as_ref(),
        }
    }

    /// Equips the main-hand weapon.
    pub fn set_mainhand(&mut self, weapon: Weapon) {
        self.mainhand = weapon;
    }

    /// Equips or clears the off-hand weapon.
    pub fn set_offhand(&mut self, weapon: Option<Weapon>) {
        self.offhand = weapon;
    }

    /// Swing period of a hand after melee haste.
    ///
    /// Haste rating shortens the period; an empty hand reads as the base
    /// period. Never returns zero.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn swing_speed(&self, hand: WeaponHand) -> u32 {
        let base = self.weapon(hand).map_or(BASE_SWING_MS, |w| w.speed_ms);
        let haste = rating_permyriad(self.ratings.get(Rating::HasteMelee));
        let factor = (1.0 + haste as f32 / 10_000.0).max(0.1);
        ((base as f32 / factor).round() as u32).max(1)
    }

    /// Current melee target, if the unit is auto-attacking.
    #[must_use]
    pub const fn auto_attack(&self) -> Option<UnitId> {
        self.auto_attack
    }

    /// Starts auto-attacking `target`, resetting both swing timers.
    pub fn start_attack(&mut self, target: UnitId) {
        if self.auto_attack == Some(target) {
            return;
        }
        self.auto_attack = Some(target);
        self.swing_main_ms = self.swing_speed(WeaponHand::Main);
        self.swing_off_ms = self.swing_speed(WeaponHand::Off);
    }

    /// Stops auto-attacking.
    pub fn stop_attack(&mut self) {
        self.auto_attack = None;
    }

    /// Advances both swing timers, returning every hand that completed a
    /// swing in this window.
    ///
    /// Timers only run while an auto-attack target is set. The off-hand
    /// fires only when a weapon is equipped there. Completed timers reset
    /// to the hasted period immediately, so a long delta can yield several
    /// swings per hand.
    pub fn advance_swings(&mut self, delta_ms: u64) -> Vec<WeaponHand> {
        let mut fired = Vec::new();
        if self.auto_attack.is_none() {
            return fired;
        }
        let main_speed = self.swing_speed(WeaponHand::Main);
        Self::run_swing_timer(
            &mut self.swing_main_ms,
            main_speed,
            delta_ms,
            WeaponHand::Main,
            &mut fired,
        );
        if self.offhand.is_some() {
            let off_speed = self.swing_speed(WeaponHand::Off);
            Self::run_swing_timer(
                &mut self.swing_off_ms,
                off_speed,
                delta_ms,
                WeaponHand::Off,
                &mut fired,
            );
        }
        fired
    }

    #[allow(clippy::cast_possible_truncation)]
    fn run_swing_timer(
        timer: &mut u32,
        speed: u32,
        delta_ms: u64,
        hand: WeaponHand,
        fired: &mut Vec<WeaponHand>,
    ) {
        let mut left = delta_ms;
        while left >= u64::from((*timer).max(1)) {
            left -= u64::from((*timer).max(1));
            fired.push(hand);
            *timer = speed.max(1);
        }
        *timer -= left as u32;
    }

    // -------------------------------------------------------------------------
    // Lifecycle and combat state
    // -------------------------------------------------------------------------

    /// Current lifecycle state.
    #[must_use]
    pub const fn life_state(&self) -> LifeState {
        self.lifecycle.state()
    }

    /// `true` while the unit can act on the world.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    /// `true` while the combat flag is armed.
    #[must_use]
    pub const fn is_in_combat(&self) -> bool {
        self.engagement.in_combat()
    }

    /// Arms (or re-arms) the combat flag and its linger timer.
    pub fn enter_combat(&mut self) {
        self.engagement.engage();
    }

    /// NPC leashing state. Evading units take no damage and land no hits.
    #[must_use]
    pub const fn is_evading(&self) -> bool {
        self.evading
    }

    /// Sets the evade flag.
    pub fn set_evading(&mut self, evading: bool) {
        self.evading = evading;
    }

    /// Units currently attacking this one.
    #[must_use]
    pub const fn attackers(&self) -> &BTreeSet<UnitId> {
        &self.attackers
    }

    /// Registers an attacker.
    pub fn add_attacker(&mut self, attacker: UnitId) {
        self.attackers.insert(attacker);
    }

    /// Drops an attacker.
    pub fn remove_attacker(&mut self, attacker: UnitId) {
        self.attackers.remove(&attacker);
    }

    /// Empties the attacker set, returning the old contents.
    pub fn take_attackers(&mut self) -> BTreeSet<UnitId> {
        std::mem::take(&mut self.attackers)
    }

    /// Advances the one-tick lifecycle transients.
    pub fn advance_lifecycle(&mut self, delta_ms: u64) -> Option<LifeState> {
        self.lifecycle.advance(delta_ms)
    }

    /// Advances the combat linger timer.
    ///
    /// Returns `true` when combat ended this window; the flag clears only
    /// once the timer elapsed and no attackers remain.
    pub fn advance_engagement(&mut self, delta_ms: u64) -> bool {
        let attackers_empty = self.attackers.is_empty();
        self.engagement.advance(delta_ms, attackers_empty)
    }

    /// Kills the unit, running the local death side effects.
    ///
    /// Casts are cancelled, auras are removed in `Death` mode unless their
    /// spell persists through death, combat is left and rage is zeroed.
    /// Detached holders stay pending until the next sweep. The returned
    /// report lists everything the death broke so the caller can log it;
    /// both lists are empty when the unit was already dead.
    pub fn die(&mut self) -> DeathReport {
        if !self.lifecycle.kill() {
            return DeathReport::default();
        }
        let broken_casts = self.casts.cancel_all();
        let mut target = EffectTarget {
            stats: &mut self.stats,
            ratings: &mut self.ratings,
            control: &mut self.control,
            damage_mods: &mut self.damage_mods,
        };
        let removed_auras = self.auras.remove_if(
            |holder| {
                !holder
                    .spec()
                    .attributes
                    .contains(SpellAttributes::PERSISTS_THROUGH_DEATH)
            },
            RemoveMode::Death,
            &mut target,
        );
        self.engagement.disengage();
        self.auto_attack = None;
        self.evading = false;
        if self.power_kind == PowerKind::Rage {
            self.power = 0;
        }
        DeathReport {
            broken_casts,
            removed_auras,
        }
    }

    /// Resurrects the unit with the given restored pools, clamped.
    ///
    /// Health is restored to at least one point. Returns `false` when the
    /// unit was not in a resurrectable state.
    pub fn revive(&mut self, health: u32, power: u32) -> bool {
        if !self.lifecycle.revive() {
            return false;
        }
        self.health = health.clamp(1, self.max_health().max(1));
        self.power = power.min(self.max_power());
        true
    }

    // -------------------------------------------------------------------------
    // Component borrows
    // -------------------------------------------------------------------------

    /// Borrows the aura-effect application surface.
    #[must_use]
    pub fn effect_target(&mut self) -> EffectTarget<'_> {
        EffectTarget {
            stats: &mut self.stats,
            ratings: &mut self.ratings,
            control: &mut self.control,
            damage_mods: &mut self.damage_mods,
        }
    }

    /// Borrows the aura registry and the effect surface together.
    ///
    /// The two borrows are disjoint, which is what lets registry
    /// operations revert effects on the same unit they live on.
    #[must_use]
    pub fn aura_parts(&mut self) -> (&mut AuraSet, EffectTarget<'_>) {
        (
            &mut self.auras,
            EffectTarget {
                stats: &mut self.stats,
                ratings: &mut self.ratings,
                control: &mut self.control,
                damage_mods: &mut self.damage_mods,
            },
        )
    }

    /// Effective value of a stat row.
    #[must_use]
    pub fn stat(&mut self, attr: UnitAttr) -> f32 {
        self.stats.value(attr)
    }
}

// =============================================================================
// Tests
// =============================================================================
