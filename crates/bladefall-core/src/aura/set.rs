//! The per-unit aura holder registry.
//!
//! An [`AuraSet`] owns every [`AuraHolder`] attached to one unit, allocates
//! their handles, assigns visible slots and runs the two-phase removal
//! protocol. Removal first *detaches* a holder: its effects are reverted,
//! its slot is released and lookups stop returning it. Physical destruction
//! is deferred onto a pending list and only happens in [`AuraSet::sweep`],
//! so handles collected in a snapshot stay resolvable for the rest of the
//! pass even when the holder they name was removed mid-iteration.
//!
//! The set never touches unit fields directly. Every operation that changes
//! effects takes an [`EffectTarget`] of disjoint borrows, which is what lets
//! a unit mutate its stats and its aura registry in the same call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::aura::holder::{AuraHolder, HolderAdvance, RemoveMode};
use crate::aura::{AuraEffect, EffectTarget, PeriodicFire};
use crate::error::AuraError;
use crate::ids::{HolderHandle, SpellId, UnitId};
use crate::school::SchoolMask;
use crate::spell::{SpellSpec, StackRule};

/// Number of visible aura slots per unit.
///
/// Passives never occupy a slot. Control and immunity effects apply slotless
/// when the table is full; anything else is rejected with
/// [`AuraError::SlotsFull`].
pub const VISIBLE_SLOTS: usize = 48;

// =============================================================================
// Operation reports
// =============================================================================

/// What came out of a successful [`AuraSet::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// Handle of the holder that now carries the application.
    pub handle: HolderHandle,
    /// Stack count after the application.
    pub stacks: u32,
    /// `true` when an existing holder was refreshed instead of created.
    pub refreshed: bool,
    /// Holders displaced by rank or uniqueness replacement.
    pub displaced: Vec<RemovedHolder>,
}

/// A removal the registry performed, reported so callers can emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedHolder {
    /// Handle of the detached holder. Stays resolvable until the next sweep.
    pub handle: HolderHandle,
    /// Spell that had applied the holder.
    pub spell: SpellId,
    /// Unit that had applied the holder.
    pub caster: UnitId,
    /// Why the holder went away.
    pub mode: RemoveMode,
}

/// Periodic fires and expiries produced by one [`AuraSet::advance`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuraTick {
    /// Periodic payloads that ticked, in handle order.
    pub fires: Vec<PeriodicFire>,
    /// Holders whose duration ran out.
    pub removed: Vec<RemovedHolder>,
}

// =============================================================================
// AuraSet
// =============================================================================

/// Registry of all aura holders attached to one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuraSet {
    next_handle: HolderHandle,
    holders: BTreeMap<HolderHandle, AuraHolder>,
    by_spell: BTreeMap<SpellId, Vec<HolderHandle>>,
    slots: Vec<Option<HolderHandle>>,
    pending: Vec<HolderHandle>,
}

impl AuraSet {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: HolderHandle::new(1),
            holders: BTreeMap::new(),
            by_spell: BTreeMap::new(),
            slots: vec![None; VISIBLE_SLOTS],
            pending: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Number of active holders.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.holders.values().filter(|h| h.is_active()).count()
    }

    /// Number of occupied visible slots.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// `true` when no holder is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Holders awaiting physical destruction.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The holder behind `handle`, in any state short of destroyed.
    #[must_use]
    pub fn get(&self, handle: HolderHandle) -> Option<&AuraHolder> {
        self.holders.get(&handle)
    }

    /// Mutable access to the holder behind `handle`.
    pub fn get_mut(&mut self, handle: HolderHandle) -> Option<&mut AuraHolder> {
        self.holders.get_mut(&handle)
    }

    /// Snapshot of the active handles in allocation order.
    ///
    /// Iterate this instead of the live map: removals during the walk detach
    /// holders but leave every snapshotted handle resolvable until the sweep.
    #[must_use]
    pub fn active_handles(&self) -> Vec<HolderHandle> {
        self.holders
            .iter()
            .filter(|(_, h)| h.is_active())
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Active holder applied by `caster` with `spell`, if any.
    #[must_use]
    pub fn find(&self, spell: SpellId, caster: UnitId) -> Option<HolderHandle> {
        self.by_spell.get(&spell).and_then(|handles| {
            handles
                .iter()
                .find(|h| {
                    self.holders
                        .get(*h)
                        .is_some_and(|holder| holder.is_active() && holder.matches(spell, caster))
                })
                .copied()
        })
    }

    /// First active holder of `spell` regardless of caster.
    #[must_use]
    pub fn first_of_spell(&self, spell: SpellId) -> Option<HolderHandle> {
        self.by_spell.get(&spell).and_then(|handles| {
            handles
                .iter()
                .find(|h| self.holders.get(*h).is_some_and(AuraHolder::is_active))
                .copied()
        })
    }

    /// `true` when any active holder carries `spell`.
    #[must_use]
    pub fn has(&self, spell: SpellId) -> bool {
        self.first_of_spell(spell).is_some()
    }

    // -------------------------------------------------------------------------
    // Application
    // -------------------------------------------------------------------------

    /// Applies `spec` as a new holder, or refreshes the one `caster` already
    /// owns.
    ///
    /// The full gate sequence runs in order: school immunity, mechanic
    /// immunity, per-caster refresh, uniqueness and rank replacement, slot
    /// assignment. A refresh re-registers only stack-sensitive effects;
    /// control counters and immunity counts are left untouched so they never
    /// double-count.
    ///
    /// # Errors
    ///
    /// [`AuraError::SchoolImmune`], [`AuraError::MechanicImmune`],
    /// [`AuraError::StrongerPresent`] or [`AuraError::SlotsFull`] when the
    /// corresponding gate rejects the application. State is untouched on any
    /// error.
    pub fn add(
        &mut self,
        spec: SpellSpec,
        caster: UnitId,
        duration_ms: Option<u32>,
        target: &mut EffectTarget<'_>,
    ) -> Result<AddOutcome, AuraError> {
        if target.control.is_immune_to_school(spec.school.mask()) {
            return Err(AuraError::SchoolImmune(spec.school.mask()));
        }
        if target.control.is_immune_to_mechanic(spec.mechanic) {
            return Err(AuraError::MechanicImmune);
        }

        if let Some(handle) = self.find(spec.id, caster) {
            return Ok(self.refresh(handle, duration_ms, target));
        }

        // One holder per unique spell across casters, one per family rank.
        // Equal or higher ranks win; lower ranks are displaced.
        let mut losers = Vec::new();
        for (handle, holder) in &self.holders {
            if !holder.is_active() {
                continue;
            }
            let other = holder.spec();
            let same_unique =
                other.id == spec.id && matches!(spec.stack_rule, StackRule::Unique);
            let same_family =
                spec.family != 0 && other.family == spec.family && other.id != spec.id;
            if !same_unique && !same_family {
                continue;
            }
            if other.rank >= spec.rank {
                return Err(AuraError::StrongerPresent(other.id));
            }
            losers.push(*handle);
        }
        let mut displaced = Vec::new();
        for handle in losers {
            if let Some(removed) = self.remove(handle, RemoveMode::Stack, target) {
                displaced.push(removed);
            }
        }

        let slot = if spec.is_passive() {
            None
        } else {
            match self.free_slot() {
                Some(slot) => Some(slot),
                None if spec.aura_effects().any(AuraEffect::is_essential) => None,
                None => return Err(AuraError::SlotsFull),
            }
        };

        let handle = self.next_handle;
        self.next_handle = handle.next();
        let mut holder = AuraHolder::new(handle, spec, caster, duration_ms);
        holder.set_slot(slot);
        if let Some(slot) = slot {
            self.slots[slot as usize] = Some(handle);
        }
        for aura in holder.auras() {
            aura.effect.apply(target, 1);
        }
        holder.mark_active();
        trace!(
            handle = handle.as_u32(),
            spell = holder.spell().as_u32(),
            caster = caster.as_u64(),
            slot = ?slot,
            "aura holder applied"
        );
        self.by_spell.entry(holder.spell()).or_default().push(handle);
        self.holders.insert(handle, holder);
        Ok(AddOutcome {
            handle,
            stacks: 1,
            refreshed: false,
            displaced,
        })
    }

    fn refresh(
        &mut self,
        handle: HolderHandle,
        duration_ms: Option<u32>,
        target: &mut EffectTarget<'_>,
    ) -> AddOutcome {
        let mut stacks = 1;
        if let Some(holder) = self.holders.get_mut(&handle) {
            let before = holder.stacks();
            stacks = holder.refresh(duration_ms);
            if stacks != before {
                let effects: Vec<AuraEffect> =
                    holder.auras().iter().map(|a| a.effect).collect();
                for effect in &effects {
                    if effect.is_stack_sensitive() {
                        effect.unapply(target, before);
                        effect.apply(target, stacks);
                    }
                }
            }
            trace!(
                handle = handle.as_u32(),
                spell = holder.spell().as_u32(),
                stacks,
                "aura holder refreshed"
            );
        }
        AddOutcome {
            handle,
            stacks,
            refreshed: true,
            displaced: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Detaches the holder behind `handle`.
    ///
    /// Effects are reverted immediately, the slot is released and lookups
    /// stop returning the holder. The entry itself stays in the map as a
    /// tombstone until [`AuraSet::sweep`]. Returns `None` when the handle is
    /// unknown or already detached.
    pub fn remove(
        &mut self,
        handle: HolderHandle,
        mode: RemoveMode,
        target: &mut EffectTarget<'_>,
    ) -> Option<RemovedHolder> {
        let holder = self.holders.get_mut(&handle)?;
        if !holder.is_active() {
            return None;
        }
        holder.mark_removing();
        let spell = holder.spell();
        let caster = holder.caster();
        let stacks = holder.stacks();
        let slot = holder.slot();
        holder.set_slot(None);
        let effects: Vec<AuraEffect> = holder.auras().iter().map(|a| a.effect).collect();
        // Revert is unconditional: no removal path may skip it.
        for effect in &effects {
            effect.unapply(target, stacks);
        }
        if let Some(slot) = slot {
            self.slots[slot as usize] = None;
        }
        self.unindex(spell, handle);
        self.pending.push(handle);
        debug!(
            handle = handle.as_u32(),
            spell = spell.as_u32(),
            mode = ?mode,
            "aura holder removed"
        );
        Some(RemovedHolder {
            handle,
            spell,
            caster,
            mode,
        })
    }

    /// Detaches every active holder matching `predicate`.
    pub fn remove_if<F>(
        &mut self,
        mut predicate: F,
        mode: RemoveMode,
        target: &mut EffectTarget<'_>,
    ) -> Vec<RemovedHolder>
    where
        F: FnMut(&AuraHolder) -> bool,
    {
        let mut removed = Vec::new();
        for handle in self.active_handles() {
            let matches = self.holders.get(&handle).is_some_and(|h| predicate(h));
            if matches {
                if let Some(r) = self.remove(handle, mode, target) {
                    removed.push(r);
                }
            }
        }
        removed
    }

    /// Physically destroys every detached holder.
    ///
    /// Call between passes, never from inside one. Handles of destroyed
    /// holders resolve to `None` afterwards and are never reused.
    pub fn sweep(&mut self) {
        for handle in self.pending.drain(..) {
            if let Some(mut holder) = self.holders.remove(&handle) {
                holder.mark_destroyed();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Per-tick work
    // -------------------------------------------------------------------------

    /// Advances every active holder by `delta_ms`.
    ///
    /// Collects periodic fires in handle order and detaches holders whose
    /// duration ran out. A periodic aura whose final tick lands exactly on
    /// the expiry boundary fires before the holder is detached.
    pub fn advance(&mut self, delta_ms: u64, target: &mut EffectTarget<'_>) -> AuraTick {
        let mut tick = AuraTick::default();
        for handle in self.active_handles() {
            let mut expired = false;
            if let Some(holder) = self.holders.get_mut(&handle) {
                if !holder.is_active() {
                    continue;
                }
                let HolderAdvance { fires, expired: done } = holder.advance(delta_ms);
                expired = done;
                for (effect_index, ticks) in fires {
                    let aura = holder
                        .auras()
                        .iter()
                        .find(|a| a.effect_index == effect_index);
                    if let Some(aura) = aura {
                        tick.fires.push(PeriodicFire {
                            holder: handle,
                            caster: holder.caster(),
                            spell: holder.spell(),
                            effect: aura.effect,
                            stacks: holder.stacks(),
                            ticks,
                        });
                    }
                }
            }
            if expired {
                if let Some(r) = self.remove(handle, RemoveMode::Expire, target) {
                    tick.removed.push(r);
                }
            }
        }
        tick
    }

    /// Soaks `amount` incoming damage of `schools` into absorption shields.
    ///
    /// Pools drain in handle order, which is application order, so the
    /// oldest shield always empties first. Returns the soaked total and the
    /// handles of holders whose shields are now exhausted; the caller
    /// removes those with [`RemoveMode::ShieldBreak`].
    pub fn absorb(&mut self, schools: SchoolMask, amount: u32) -> (u32, Vec<HolderHandle>) {
        let mut left = amount;
        let mut soaked = 0u32;
        let mut exhausted = Vec::new();
        for (handle, holder) in &mut self.holders {
            if left == 0 {
                break;
            }
            if !holder.is_active() {
                continue;
            }
            let mut drained = false;
            for aura in holder.auras_mut() {
                let AuraEffect::SchoolAbsorb { schools: covered, .. } = aura.effect else {
                    continue;
                };
                if !covered.intersects(schools) || aura.absorb_left == 0 {
                    continue;
                }
                let take = aura.absorb_left.min(left);
                aura.absorb_left -= take;
                left -= take;
                soaked += take;
                if aura.absorb_left == 0 {
                    drained = true;
                }
                if left == 0 {
                    break;
                }
            }
            if drained && Self::shields_spent(holder) {
                exhausted.push(*handle);
            }
        }
        (soaked, exhausted)
    }

    /// `true` when the holder carries shields and every pool is empty.
    fn shields_spent(holder: &AuraHolder) -> bool {
        let mut any = false;
        for aura in holder.auras() {
            if matches!(aura.effect, AuraEffect::SchoolAbsorb { .. }) {
                any = true;
                if aura.absorb_left > 0 {
                    return false;
                }
            }
        }
        any
    }

    #[allow(clippy::cast_possible_truncation)]
    fn free_slot(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|slot| slot as u8)
    }

    fn unindex(&mut self, spell: SpellId, handle: HolderHandle) {
        if let Some(handles) = self.by_spell.get_mut(&spell) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                self.by_spell.remove(&spell);
            }
        }
    }
}

impl Default for AuraSet {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
