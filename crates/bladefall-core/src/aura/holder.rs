//! One spell application and the aura instances it owns.
//!
//! A holder is created per (spell, caster) application, carries a clone of
//! the static spell definition so it never consults the store again, and
//! walks the state machine `Applying → Active → Removing → Destroyed`.
//! `Refreshing` is an operation on an `Active` holder, not a stored state.
//! The registry ([`super::set::AuraSet`]) drives every transition; a holder
//! never detaches itself.

use serde::{Deserialize, Serialize};

use crate::aura::Aura;
use crate::ids::{HolderHandle, SpellId, UnitId};
use crate::spell::SpellSpec;

/// Lifecycle state of a holder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolderState {
    /// Created, effects not yet registered
    Applying,
    /// Effects registered; the holder participates in updates and procs
    Active,
    /// Effects reverted; physical destruction pending the next sweep
    Removing,
    /// Swept; only ever observed by diagnostics
    Destroyed,
}

/// Why a holder was removed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveMode {
    /// Ordinary removal (cancel by code, charge exhaustion)
    Default,
    /// Displaced by a stacking/rank replacement
    Stack,
    /// Cancelled by the player
    Cancel,
    /// Stripped by a dispel
    Dispel,
    /// Target died
    Death,
    /// Absorption pool exhausted
    ShieldBreak,
    /// Duration ran out
    Expire,
}

/// Result of advancing one holder by one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolderAdvance {
    /// `(effect index, times fired)` for each periodic aura that ticked.
    pub fires: Vec<(u8, u32)>,
    /// The duration ran out during this advance.
    pub expired: bool,
}

/// One application of one spell by one caster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuraHolder {
    handle: HolderHandle,
    spec: SpellSpec,
    caster: UnitId,
    state: HolderState,
    /// Remaining duration; `None` never expires.
    remaining_ms: Option<u32>,
    stacks: u32,
    charges: u32,
    slot: Option<u8>,
    auras: Vec<Aura>,
}

impl AuraHolder {
    /// Creates a holder in `Applying` state with one stack.
    #[must_use]
    pub fn new(
        handle: HolderHandle,
        spec: SpellSpec,
        caster: UnitId,
        duration_ms: Option<u32>,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let auras = spec
            .aura_effects()
            .enumerate()
            .map(|(index, effect)| Aura::new(*effect, index as u8))
            .collect();
        let charges = spec.proc.map_or(0, |p| p.charges);
        Self {
            handle,
            spec,
            caster,
            state: HolderState::Applying,
            remaining_ms: duration_ms,
            stacks: 1,
            charges,
            slot: None,
            auras,
        }
    }

    /// The registry handle of this holder.
    #[must_use]
    pub const fn handle(&self) -> HolderHandle {
        self.handle
    }

    /// The applying spell's id.
    #[must_use]
    pub const fn spell(&self) -> SpellId {
        self.spec.id
    }

    /// The static definition this holder was built from.
    #[must_use]
    pub const fn spec(&self) -> &SpellSpec {
        &self.spec
    }

    /// Identity of the caster (resolved through the world registry).
    #[must_use]
    pub const fn caster(&self) -> UnitId {
        self.caster
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> HolderState {
        self.state
    }

    /// `true` while effects are registered.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, HolderState::Active)
    }

    /// Current stack count.
    #[must_use]
    pub const fn stacks(&self) -> u32 {
        self.stacks
    }

    /// Remaining proc charges (0 when unlimited).
    #[must_use]
    pub const fn charges(&self) -> u32 {
        self.charges
    }

    /// Remaining duration, `None` for a permanent holder.
    #[must_use]
    pub const fn remaining_ms(&self) -> Option<u32> {
        self.remaining_ms
    }

    /// Assigned visible slot, if any.
    #[must_use]
    pub const fn slot(&self) -> Option<u8> {
        self.slot
    }

    /// The live aura instances.
    #[must_use]
    pub fn auras(&self) -> &[Aura] {
        &self.auras
    }

    /// Mutable access to the live aura instances (absorb pools).
    pub fn auras_mut(&mut self) -> &mut [Aura] {
        &mut self.auras
    }

    /// `true` when this holder was applied by `caster` casting `spell`.
    #[must_use]
    pub fn matches(&self, spell: SpellId, caster: UnitId) -> bool {
        self.spec.id == spell && self.caster == caster
    }

    pub(super) fn set_slot(&mut self, slot: Option<u8>) {
        self.slot = slot;
    }

    pub(super) fn mark_active(&mut self) {
        self.state = HolderState::Active;
    }

    pub(super) fn mark_removing(&mut self) {
        self.state = HolderState::Removing;
    }

    pub(super) fn mark_destroyed(&mut self) {
        self.state = HolderState::Destroyed;
    }

    /// Advances duration and periodic timers.
    ///
    /// The periodic advance is clamped to the remaining duration, so a tick
    /// that lines up exactly with expiry fires before the holder expires.
    pub fn advance(&mut self, delta_ms: u64) -> HolderAdvance {
        let mut result = HolderAdvance::default();
        if !self.is_active() {
            return result;
        }

        #[allow(clippy::cast_possible_truncation)]
        let delta = delta_ms.min(u64::from(u32::MAX)) as u32;
        let effective = match self.remaining_ms {
            Some(remaining) => delta.min(remaining),
            None => delta,
        };

        for aura in &mut self.auras {
            let Some(timer) = aura.periodic.as_mut() else {
                continue;
            };
            let ticks = timer.advance(effective);
            if ticks > 0 {
                result.fires.push((aura.effect_index, ticks));
            }
        }

        if let Some(remaining) = self.remaining_ms.as_mut() {
            *remaining -= effective;
            result.expired = *remaining == 0;
        }
        result
    }

    /// Re-application by the same (spell, caster): one more stack up to the
    /// spell maximum, duration back to full, pools and timers reset.
    ///
    /// Returns the new stack count. The caller re-runs the apply step for
    /// stack-sensitive effects.
    pub fn refresh(&mut self, duration_ms: Option<u32>) -> u32 {
        self.stacks = (self.stacks + 1).min(self.spec.max_stacks.max(1));
        self.remaining_ms = duration_ms;
        self.charges = self.spec.proc.map_or(0, |p| p.charges);
        for aura in &mut self.auras {
            if let Some(timer) = aura.periodic.as_mut() {
                *timer = super::PeriodicTimer::new(timer.interval());
            }
            if let crate::aura::AuraEffect::SchoolAbsorb { amount, .. } = aura.effect {
                aura.absorb_left = amount;
            }
        }
        self.stacks
    }

    /// Consumes one proc charge.
    ///
    /// Returns `true` when the last charge was spent and the holder must be
    /// removed. Unlimited holders (zero configured charges) never exhaust.
    pub fn consume_charge(&mut self) -> bool {
        let limited = self.spec.proc.is_some_and(|p| p.charges > 0);
        if !limited {
            return false;
        }
        self.charges = self.charges.saturating_sub(1);
        self.charges == 0
    }
}
