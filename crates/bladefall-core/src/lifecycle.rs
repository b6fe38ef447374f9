//! Death/alive state machine and combat engagement.
//!
//! `Alive → JustDied → Corpse → Dead`, with `Corpse/Dead → JustAlived →
//! Alive` on resurrection. The two transient states last exactly one tick,
//! giving observers one guaranteed window to react before the state settles.
//! Dying is driven only by the damage apply step; this module never inspects
//! health itself.

use serde::{Deserialize, Serialize};

/// How long a corpse lingers before settling to `Dead`.
pub const CORPSE_DECAY_MS: u64 = 60_000;

/// How long combat lingers after the last damaging exchange.
pub const COMBAT_LINGER_MS: u64 = 5_000;

/// Death/alive state of a unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeState {
    /// Normal living state
    Alive,
    /// Died this tick; settles to `Corpse` on the next update
    JustDied,
    /// Dead with a lingering corpse
    Corpse,
    /// Dead, corpse decayed
    Dead,
    /// Resurrected this tick; settles to `Alive` on the next update
    JustAlived,
}

/// The death state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    state: LifeState,
    corpse_ms: u64,
}

impl Lifecycle {
    /// Creates a living lifecycle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LifeState::Alive,
            corpse_ms: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifeState {
        self.state
    }

    /// `true` while the unit acts in the world.
    ///
    /// `JustAlived` already counts as alive: the resurrection happened, only
    /// the observer window is still open.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        matches!(self.state, LifeState::Alive | LifeState::JustAlived)
    }

    /// `true` from the moment of death until resurrection.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        !self.is_alive()
    }

    /// Transitions a living unit (`Alive` or `JustAlived`) to `JustDied`.
    /// Returns `false` from any dead state.
    pub fn kill(&mut self) -> bool {
        if matches!(self.state, LifeState::Alive | LifeState::JustAlived) {
            self.state = LifeState::JustDied;
            true
        } else {
            false
        }
    }

    /// Transitions `Corpse/Dead → JustAlived`. Returns `false` from any
    /// other state (a `JustDied` unit has not settled yet and cannot be
    /// revived inside the same tick).
    pub fn revive(&mut self) -> bool {
        if matches!(self.state, LifeState::Corpse | LifeState::Dead) {
            self.state = LifeState::JustAlived;
            true
        } else {
            false
        }
    }

    /// Settles transient states and decays the corpse.
    ///
    /// Called once at the start of each unit update. Returns the state
    /// entered this tick, if any.
    pub fn advance(&mut self, delta_ms: u64) -> Option<LifeState> {
        match self.state {
            LifeState::JustDied => {
                self.state = LifeState::Corpse;
                self.corpse_ms = CORPSE_DECAY_MS;
                Some(LifeState::Corpse)
            }
            LifeState::JustAlived => {
                self.state = LifeState::Alive;
                Some(LifeState::Alive)
            }
            LifeState::Corpse => {
                self.corpse_ms = self.corpse_ms.saturating_sub(delta_ms);
                if self.corpse_ms == 0 {
                    self.state = LifeState::Dead;
                    Some(LifeState::Dead)
                } else {
                    None
                }
            }
            LifeState::Alive | LifeState::Dead => None,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Combat engagement flag plus linger timer.
///
/// Entering combat arms the timer; every damaging exchange re-arms it. The
/// flag clears only once the timer has elapsed *and* the caller reports an
/// empty attacker set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    in_combat: bool,
    linger_ms: u64,
}

impl Engagement {
    /// Creates a disengaged state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_combat: false,
            linger_ms: 0,
        }
    }

    /// Whether the unit is currently engaged.
    #[must_use]
    pub const fn in_combat(&self) -> bool {
        self.in_combat
    }

    /// Enters combat (or re-arms the linger timer if already engaged).
    pub fn engage(&mut self) {
        self.in_combat = true;
        self.linger_ms = COMBAT_LINGER_MS;
    }

    /// Drops out of combat immediately (death, evade reset).
    pub fn disengage(&mut self) {
        self.in_combat = false;
        self.linger_ms = 0;
    }

    /// Advances the linger timer.
    ///
    /// Returns `true` if combat ended this tick. With attackers still
    /// registered the flag stays set even at zero remaining time.
    pub fn advance(&mut self, delta_ms: u64, attackers_empty: bool) -> bool {
        if !self.in_combat {
            return false;
        }
        self.linger_ms = self.linger_ms.saturating_sub(delta_ms);
        if self.linger_ms == 0 && attackers_empty {
            self.in_combat = false;
            true
        } else {
            false
        }
    }
}
