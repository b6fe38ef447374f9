//! Unit storage.
//!
//! [`UnitRegistry`] owns every live [`CombatUnit`] in a `BTreeMap`, so
//! iteration order is the id order and identical on every platform. Ids are
//! handed out monotonically and never reused, even after a despawn;
//! cross-unit references stored as [`UnitId`] stay unambiguous for the life
//! of the world.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::UnitId;
use crate::unit::{CombatUnit, Controller, PowerKind};

/// Container for all units of one world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRegistry {
    next_id: u64,
    units: BTreeMap<UnitId, CombatUnit>,
}

impl UnitRegistry {
    /// Creates an empty registry. The first spawned unit gets id 1; id 0 is
    /// reserved as a sentinel for "no unit".
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            units: BTreeMap::new(),
        }
    }

    /// Spawns a unit and returns its id.
    ///
    /// The unit starts with zeroed create-values; configure its grid and
    /// call [`CombatUnit::reset_pools`] before use.
    pub fn spawn(&mut self, level: u32, controller: Controller, power: PowerKind) -> UnitId {
        let id = UnitId::new(self.next_id);
        self.next_id += 1;
        self.units.insert(id, CombatUnit::new(id, level, controller, power));
        id
    }

    /// Removes a unit, returning it if it existed.
    pub fn despawn(&mut self, id: UnitId) -> Option<CombatUnit> {
        self.units.remove(&id)
    }

    /// The unit with this id, if present.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&CombatUnit> {
        self.units.get(&id)
    }

    /// Mutable access to the unit with this id.
    #[must_use]
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut CombatUnit> {
        self.units.get_mut(&id)
    }

    /// Disjoint mutable access to two different units.
    ///
    /// Returns `None` when the ids are equal or either unit is absent. The
    /// linear scan keeps the borrow checker satisfied without unsafe code.
    pub fn pair_mut(
        &mut self,
        a: UnitId,
        b: UnitId,
    ) -> Option<(&mut CombatUnit, &mut CombatUnit)> {
        if a == b {
            return None;
        }
        let mut first = None;
        let mut second = None;
        for (id, unit) in &mut self.units {
            if *id == a {
                first = Some(unit);
            } else if *id == b {
                second = Some(unit);
            }
            if first.is_some() && second.is_some() {
                break;
            }
        }
        Some((first?, second?))
    }

    /// Unit ids in ascending order.
    pub fn ids_sorted(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    /// Units in id order.
    pub fn units_sorted(&self) -> impl Iterator<Item = &CombatUnit> + '_ {
        self.units.values()
    }

    /// Mutable units in id order.
    pub fn units_sorted_mut(&mut self) -> impl Iterator<Item = &mut CombatUnit> + '_ {
        self.units.values_mut()
    }

    /// Number of live units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// `true` when no units exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}
