//! Concurrent cast slots.
//!
//! A unit progresses at most one cast per slot: the melee special, the
//! generic cast, the auto-repeat shot, and the channel. Slots advance inside
//! the unit's update; interruption is synchronous and filtered by the
//! interrupt flags the spell was started with.

use serde::{Deserialize, Serialize};

use crate::ids::{SpellId, UnitId};
use crate::spell::InterruptFlags;

/// The four concurrent cast slots.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    /// On-next-swing melee special
    Melee,
    /// Ordinary cast with a cast bar
    Generic,
    /// Auto-repeating ranged shot
    AutoRepeat,
    /// Channeled spell
    Channeled,
}

impl CastKind {
    /// Number of slots.
    pub const COUNT: usize = 4;

    /// All slots in canonical order.
    #[must_use]
    pub const fn all() -> [Self; Self::COUNT] {
        [Self::Melee, Self::Generic, Self::AutoRepeat, Self::Channeled]
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// One in-progress cast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCast {
    /// Spell being cast.
    pub spell: SpellId,
    /// Cast target.
    pub target: UnitId,
    /// Time left until completion.
    pub remaining_ms: u32,
    /// Conditions that break this cast, copied from the spell at start.
    pub interrupt_flags: InterruptFlags,
}

/// The slot table of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastSlots {
    slots: [Option<PendingCast>; CastKind::COUNT],
}

impl CastSlots {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cast occupying a slot, if any.
    #[must_use]
    pub fn get(&self, kind: CastKind) -> Option<&PendingCast> {
        self.slots[kind.index()].as_ref()
    }

    /// `true` when the slot holds a cast.
    #[must_use]
    pub fn is_busy(&self, kind: CastKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// `true` when any slot holds a cast.
    #[must_use]
    pub fn is_casting(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Starts a cast in a slot. Fails (returns `false`) if the slot is busy.
    pub fn begin(&mut self, kind: CastKind, cast: PendingCast) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(cast);
        true
    }

    /// Clears one slot, returning the cast it held.
    pub fn cancel(&mut self, kind: CastKind) -> Option<PendingCast> {
        self.slots[kind.index()].take()
    }

    /// Clears every slot (death, full interrupt). Returns the broken casts.
    pub fn cancel_all(&mut self) -> Vec<(CastKind, PendingCast)> {
        let mut broken = Vec::new();
        for kind in CastKind::all() {
            if let Some(cast) = self.slots[kind.index()].take() {
                broken.push((kind, cast));
            }
        }
        broken
    }

    /// Breaks every cast whose interrupt flags intersect `reason`.
    ///
    /// The break is immediate: the slots are free when this returns.
    pub fn interrupt(&mut self, reason: InterruptFlags) -> Vec<(CastKind, PendingCast)> {
        let mut broken = Vec::new();
        for kind in CastKind::all() {
            let slot = &mut self.slots[kind.index()];
            let hit = slot
                .as_ref()
                .is_some_and(|c| c.interrupt_flags.intersects(reason));
            if hit {
                if let Some(cast) = slot.take() {
                    broken.push((kind, cast));
                }
            }
        }
        broken
    }

    /// Advances every slot, returning the casts that completed this tick.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<(CastKind, PendingCast)> {
        let mut completed = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        let delta = delta_ms.min(u64::from(u32::MAX)) as u32;
        for kind in CastKind::all() {
            let slot = &mut self.slots[kind.index()];
            let Some(cast) = slot.as_mut() else {
                continue;
            };
            cast.remaining_ms = cast.remaining_ms.saturating_sub(delta);
            if cast.remaining_ms == 0 {
                if let Some(done) = slot.take() {
                    completed.push((kind, done));
                }
            }
        }
        completed
    }
}
