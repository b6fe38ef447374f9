//! Stat-aggregation grid and combat ratings.
//!
//! Every attribute a unit derives gameplay numbers from is a row in the
//! [`StatGrid`]: 5 primary stats, health, the 4 resource types, armor, 6
//! resistances, 2 attack-power channels, and 3 weapon-damage channels. Each
//! row holds 4 modifier accumulators (base-flat, base-percent, total-flat,
//! total-percent), mutated by aura application/removal and read through a
//! cached recompute:
//!
//! ```text
//! effective = (create + Σ base-flat) × Π (1 + base-pct / 100)
//! total     = (effective + Σ total-flat) × Π (1 + total-pct / 100)
//! ```
//!
//! Accumulators store the individual contributions rather than running
//! sums/products, so removing a modifier restores the previous value exactly
//! (float rounding cannot drift across an add/remove pair). Recompute walks
//! a handful of entries and is cached until the row is invalidated.
//!
//! [`RatingTable`] is the flat 26-entry table of combat ratings the resolver
//! formulas consume directly (no modifier stacking, auras write it in flat
//! points).

use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// Grid rows
// =============================================================================

/// One row of the modifier grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitAttr {
    /// Strength
    Strength,
    /// Agility
    Agility,
    /// Stamina
    Stamina,
    /// Intellect
    Intellect,
    /// Spirit
    Spirit,
    /// Maximum health before stamina conversion
    Health,
    /// Maximum mana before intellect conversion
    Mana,
    /// Maximum rage (stored in tenths)
    Rage,
    /// Maximum focus
    Focus,
    /// Maximum energy
    Energy,
    /// Armor before agility conversion
    Armor,
    /// Holy resistance
    ResistHoly,
    /// Fire resistance
    ResistFire,
    /// Nature resistance
    ResistNature,
    /// Frost resistance
    ResistFrost,
    /// Shadow resistance
    ResistShadow,
    /// Arcane resistance
    ResistArcane,
    /// Melee attack power before strength conversion
    AttackPower,
    /// Ranged attack power before agility conversion
    RangedAttackPower,
    /// Main-hand weapon damage
    DamageMainhand,
    /// Off-hand weapon damage
    DamageOffhand,
    /// Ranged weapon damage
    DamageRanged,
}

impl UnitAttr {
    /// Number of grid rows.
    pub const COUNT: usize = 22;

    /// All rows in canonical order.
    #[must_use]
    pub const fn all() -> [Self; Self::COUNT] {
        [
            Self::Strength,
            Self::Agility,
            Self::Stamina,
            Self::Intellect,
            Self::Spirit,
            Self::Health,
            Self::Mana,
            Self::Rage,
            Self::Focus,
            Self::Energy,
            Self::Armor,
            Self::ResistHoly,
            Self::ResistFire,
            Self::ResistNature,
            Self::ResistFrost,
            Self::ResistShadow,
            Self::ResistArcane,
            Self::AttackPower,
            Self::RangedAttackPower,
            Self::DamageMainhand,
            Self::DamageOffhand,
            Self::DamageRanged,
        ]
    }

    /// Index of this row in grid storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Rows whose derived values must be recomputed when this row changes.
    ///
    /// Stamina feeds health, intellect feeds mana, agility feeds armor.
    #[must_use]
    pub const fn dependents(self) -> &'static [Self] {
        match self {
            Self::Stamina => &[Self::Health],
            Self::Intellect => &[Self::Mana],
            Self::Agility => &[Self::Armor],
            _ => &[],
        }
    }
}

/// Which of the four accumulators of a row a modifier writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Flat amount added before base percents
    BaseFlat,
    /// Percent applied to the base value
    BasePct,
    /// Flat amount added after base percents
    TotalFlat,
    /// Percent applied to the running total
    TotalPct,
}

/// Modifier contributions for one grid row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ModifierRow {
    base_flat: Vec<f32>,
    base_pct: Vec<f32>,
    total_flat: Vec<f32>,
    total_pct: Vec<f32>,
}

impl ModifierRow {
    fn bucket_mut(&mut self, kind: ModifierKind) -> &mut Vec<f32> {
        match kind {
            ModifierKind::BaseFlat => &mut self.base_flat,
            ModifierKind::BasePct => &mut self.base_pct,
            ModifierKind::TotalFlat => &mut self.total_flat,
            ModifierKind::TotalPct => &mut self.total_pct,
        }
    }

    fn value(&self, create: f32) -> f32 {
        let flat: f32 = create + self.base_flat.iter().sum::<f32>();
        let mut effective = flat;
        for pct in &self.base_pct {
            effective *= pct_factor(*pct);
        }
        effective += self.total_flat.iter().sum::<f32>();
        for pct in &self.total_pct {
            effective *= pct_factor(*pct);
        }
        effective.max(0.0)
    }
}

/// Converts percent points into a multiplier, floored so -150% cannot flip
/// the sign of a value.
fn pct_factor(pct: f32) -> f32 {
    ((100.0 + pct) / 100.0).max(0.0)
}

// =============================================================================
// StatGrid
// =============================================================================

/// Per-unit table of modifier accumulators feeding derived attributes.
///
/// Rows are read through [`StatGrid::value`], which recomputes lazily and
/// caches until an accumulator of that row (or of a row it depends on)
/// changes. Immutable contexts can use [`StatGrid::peek`], which computes
/// without touching the cache.
///
/// # Example
///
/// ```
/// use bladefall_core::stats::{ModifierKind, StatGrid, UnitAttr};
///
/// let mut grid = StatGrid::new();
/// grid.set_create(UnitAttr::Strength, 50.0);
/// grid.add_modifier(UnitAttr::Strength, ModifierKind::BaseFlat, 10.0);
/// grid.add_modifier(UnitAttr::Strength, ModifierKind::TotalPct, 10.0);
///
/// assert!((grid.value(UnitAttr::Strength) - 66.0).abs() < 1e-4);
///
/// grid.remove_modifier(UnitAttr::Strength, ModifierKind::TotalPct, 10.0);
/// grid.remove_modifier(UnitAttr::Strength, ModifierKind::BaseFlat, 10.0);
/// assert_eq!(grid.value(UnitAttr::Strength), 50.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatGrid {
    /// Creation-time base value per row.
    create: Vec<f32>,
    rows: Vec<ModifierRow>,
    #[serde(skip)]
    cache: Vec<Option<f32>>,
}

impl StatGrid {
    /// Creates an empty grid (all create values zero).
    #[must_use]
    pub fn new() -> Self {
        Self {
            create: vec![0.0; UnitAttr::COUNT],
            rows: vec![ModifierRow::default(); UnitAttr::COUNT],
            cache: vec![None; UnitAttr::COUNT],
        }
    }

    /// Sets the creation-time base value of a row.
    pub fn set_create(&mut self, attr: UnitAttr, value: f32) {
        self.create[attr.index()] = value;
        self.invalidate(attr);
    }

    /// Returns the creation-time base value of a row.
    #[must_use]
    pub fn create_value(&self, attr: UnitAttr) -> f32 {
        self.create[attr.index()]
    }

    /// Registers one modifier contribution.
    pub fn add_modifier(&mut self, attr: UnitAttr, kind: ModifierKind, amount: f32) {
        self.rows[attr.index()].bucket_mut(kind).push(amount);
        self.invalidate(attr);
    }

    /// Removes one previously registered contribution.
    ///
    /// The matching entry is located by bit pattern, so the exact amount
    /// passed to [`StatGrid::add_modifier`] must be passed back. A missing
    /// entry is logged and ignored; the grid never goes negative from a
    /// stray revert.
    pub fn remove_modifier(&mut self, attr: UnitAttr, kind: ModifierKind, amount: f32) {
        let bucket = self.rows[attr.index()].bucket_mut(kind);
        if let Some(pos) = bucket.iter().position(|v| v.to_bits() == amount.to_bits()) {
            bucket.remove(pos);
            self.invalidate(attr);
        } else {
            warn!(?attr, ?kind, amount, "removing modifier that was never applied");
        }
    }

    /// Current effective value of a row, recomputing and caching if stale.
    pub fn value(&mut self, attr: UnitAttr) -> f32 {
        let idx = attr.index();
        match self.cache.get(idx).copied().flatten() {
            Some(v) => v,
            None => {
                let v = self.rows[idx].value(self.create[idx]);
                if let Some(slot) = self.cache.get_mut(idx) {
                    *slot = Some(v);
                }
                v
            }
        }
    }

    /// Current effective value of a row without touching the cache.
    #[must_use]
    pub fn peek(&self, attr: UnitAttr) -> f32 {
        let idx = attr.index();
        match self.cache.get(idx).copied().flatten() {
            Some(v) => v,
            None => self.rows[idx].value(self.create[idx]),
        }
    }

    fn invalidate(&mut self, attr: UnitAttr) {
        // Serde skips the cache, so a freshly deserialized grid may have a
        // short cache vector. Recreate it lazily.
        if self.cache.len() != UnitAttr::COUNT {
            self.cache = vec![None; UnitAttr::COUNT];
        }
        self.cache[attr.index()] = None;
        for dep in attr.dependents() {
            self.cache[dep.index()] = None;
        }
    }

    // -------------------------------------------------------------------------
    // Derived conversions
    // -------------------------------------------------------------------------

    /// Maximum health: the health row plus the stamina conversion.
    ///
    /// The first 20 points of stamina grant 1 health each, the rest 10 each.
    #[must_use]
    pub fn max_health(&self) -> u32 {
        let stamina = self.peek(UnitAttr::Stamina);
        let bonus = stamina.min(20.0) + (stamina - 20.0).max(0.0) * 10.0;
        to_amount(self.peek(UnitAttr::Health) + bonus)
    }

    /// Maximum mana: the mana row plus the intellect conversion.
    ///
    /// The first 20 points of intellect grant 1 mana each, the rest 15 each.
    #[must_use]
    pub fn max_mana(&self) -> u32 {
        let intellect = self.peek(UnitAttr::Intellect);
        let bonus = intellect.min(20.0) + (intellect - 20.0).max(0.0) * 15.0;
        to_amount(self.peek(UnitAttr::Mana) + bonus)
    }

    /// Maximum of a flat resource row (rage, focus or energy).
    ///
    /// Unlike health and mana these rows have no attribute conversion.
    #[must_use]
    pub fn resource_max(&self, attr: UnitAttr) -> u32 {
        to_amount(self.peek(attr))
    }

    /// Effective armor: the armor row plus 2 per point of agility.
    #[must_use]
    pub fn armor(&self) -> f32 {
        (self.peek(UnitAttr::Armor) + self.peek(UnitAttr::Agility) * 2.0).max(0.0)
    }

    /// Effective melee attack power: the row plus 2 per point of strength.
    #[must_use]
    pub fn attack_power(&self) -> f32 {
        (self.peek(UnitAttr::AttackPower) + self.peek(UnitAttr::Strength) * 2.0).max(0.0)
    }

    /// Effective ranged attack power: the row plus 2 per point of agility.
    #[must_use]
    pub fn ranged_attack_power(&self) -> f32 {
        (self.peek(UnitAttr::RangedAttackPower) + self.peek(UnitAttr::Agility) * 2.0).max(0.0)
    }

    /// Resistance row for a magic school, or armor for physical.
    #[must_use]
    pub fn resistance(&self, school: crate::school::SpellSchool) -> f32 {
        use crate::school::SpellSchool;
        let attr = match school {
            SpellSchool::Physical => return self.armor(),
            SpellSchool::Holy => UnitAttr::ResistHoly,
            SpellSchool::Fire => UnitAttr::ResistFire,
            SpellSchool::Nature => UnitAttr::ResistNature,
            SpellSchool::Frost => UnitAttr::ResistFrost,
            SpellSchool::Shadow => UnitAttr::ResistShadow,
            SpellSchool::Arcane => UnitAttr::ResistArcane,
        };
        self.peek(attr).max(0.0)
    }
}

impl Default for StatGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds a derived float down into a non-negative integer amount.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn to_amount(value: f32) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= u32::MAX as f32 {
        u32::MAX
    } else {
        value as u32
    }
}

// =============================================================================
// Combat ratings
// =============================================================================

/// One of the 26 combat ratings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)] // variant names are the documentation
pub enum Rating {
    WeaponSkill,
    Defense,
    Dodge,
    Parry,
    Block,
    HitMelee,
    HitRanged,
    HitSpell,
    CritMelee,
    CritRanged,
    CritSpell,
    HitTakenMelee,
    HitTakenRanged,
    HitTakenSpell,
    /// Melee resilience channel
    CritTakenMelee,
    CritTakenRanged,
    /// Spell resilience channel
    CritTakenSpell,
    HasteMelee,
    HasteRanged,
    HasteSpell,
    WeaponSkillMainhand,
    WeaponSkillOffhand,
    WeaponSkillRanged,
    Expertise,
    ArmorPenetration,
    Mastery,
}

impl Rating {
    /// Number of ratings.
    pub const COUNT: usize = 26;

    /// Index of this rating in table storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Flat table of the 26 combat ratings, in rating points.
///
/// Resolver formulas convert points into fixed-point chances; auras and
/// equipment write the table directly with [`RatingTable::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingTable {
    values: Vec<f32>,
}

impl RatingTable {
    /// Creates a zeroed table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: vec![0.0; Rating::COUNT],
        }
    }

    /// Returns one rating value.
    #[must_use]
    pub fn get(&self, rating: Rating) -> f32 {
        self.values[rating.index()]
    }

    /// Overwrites one rating value.
    pub fn set(&mut self, rating: Rating, value: f32) {
        self.values[rating.index()] = value;
    }

    /// Adds a delta to one rating (negative to revert).
    pub fn apply(&mut self, rating: Rating, delta: f32) {
        self.values[rating.index()] += delta;
    }
}

impl Default for RatingTable {
    fn default() -> Self {
        Self::new()
    }
}
