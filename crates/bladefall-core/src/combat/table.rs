//! The single-roll attack table.
//!
//! Every chance in the ladder is fixed-point: hundredths of a percent, so
//! `10_000` is certainty. The table stacks its bands in a significant order
//! (miss, dodge, parry, block, crit, crushing or glancing, normal) and one
//! uniform draw picks the first band whose cumulative upper bound exceeds
//! it. A draw that lands in the miss band is a miss even if the crit band
//! would also have covered it.

use serde::{Deserialize, Serialize};

use crate::combat::AttackOutcome;
use crate::rng::{clamp_chance, CHANCE_MAX};

// =============================================================================
// Tuning constants
// =============================================================================

/// Base chance to miss an equal-skill opponent.
pub const BASE_MISS: i32 = 500;
/// Ceiling on the miss band after every adjustment.
pub const MISS_CAP: i32 = 6_000;
/// Base chance for an equal-skill opponent to dodge.
pub const BASE_DODGE: i32 = 500;
/// Base chance for a facing equal-skill opponent to parry.
pub const BASE_PARRY: i32 = 500;
/// Base chance for a facing, shield-carrying opponent to block.
pub const BASE_BLOCK: i32 = 500;
/// Chance shift per point of weapon-skill or defense advantage.
pub const SKILL_STEP: i32 = 4;
/// Fixed-point chance granted by one rating point.
pub const RATING_STEP: i32 = 100;
/// Defender levels below the attacker before glancing blows appear.
pub const GLANCING_LEVEL_GAP: u32 = 3;
/// Glancing chance at exactly the qualifying gap.
pub const GLANCING_BASE: i32 = 1_000;
/// Extra glancing chance per level past the qualifying gap.
pub const GLANCING_LEVEL_STEP: i32 = 500;
/// Ceiling on the glancing band.
pub const GLANCING_CAP: i32 = 4_000;
/// Crushing chance per point of defender skill advantage.
pub const CRUSHING_SKILL_STEP: i32 = 200;
/// Flat deduction from the crushing chance.
pub const CRUSHING_OFFSET: i32 = 1_500;

// =============================================================================
// Chance derivation
// =============================================================================

/// Fixed-point chance contributed by a rating score.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn rating_permyriad(points: f32) -> i32 {
    (points * RATING_STEP as f32).round() as i32
}

/// Chance for the attacker to miss outright.
///
/// Starts at [`BASE_MISS`], worsens with the defender's skill advantage and
/// improves with hit rating. Clamped to `[0, MISS_CAP]`: misses can be
/// ruled out entirely but never exceed sixty percent.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn miss_chance(weapon_skill: f32, defense_skill: f32, hit_rating: f32) -> i32 {
    let skill_gap = ((defense_skill - weapon_skill) * SKILL_STEP as f32).round() as i32;
    (BASE_MISS + skill_gap - rating_permyriad(hit_rating)).clamp(0, MISS_CAP)
}

/// Chance for one avoidance band (dodge, parry or block).
///
/// All three share a shape: a base chance, plus rating, plus the defender's
/// skill advantage. Callers zero the result when the band does not apply
/// (parry and block require facing, block requires a shield).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn avoidance_chance(base: i32, rating: f32, weapon_skill: f32, defense_skill: f32) -> i32 {
    let skill_gap = ((defense_skill - weapon_skill) * SKILL_STEP as f32).round() as i32;
    clamp_chance(base + rating_permyriad(rating) + skill_gap)
}

/// Chance for a critical strike.
///
/// Crit rating raises it, the defender's skill advantage and crit-avoidance
/// rating lower it.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn crit_chance(
    crit_rating: f32,
    crit_taken_rating: f32,
    weapon_skill: f32,
    defense_skill: f32,
) -> i32 {
    let skill_gap = ((defense_skill - weapon_skill) * SKILL_STEP as f32).round() as i32;
    clamp_chance(rating_permyriad(crit_rating) - rating_permyriad(crit_taken_rating) - skill_gap)
}

/// Chance for a crushing blow.
///
/// Only a level-disadvantaged attacker can be crushed back: the band exists
/// when the defender out-levels the attacker, and grows with the defender's
/// skill advantage past a flat offset.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn crushing_chance(
    attacker_level: u32,
    defender_level: u32,
    weapon_skill: f32,
    defense_skill: f32,
) -> i32 {
    if defender_level <= attacker_level {
        return 0;
    }
    let skill_gap = (defense_skill - weapon_skill).max(0.0).round() as i32;
    clamp_chance(skill_gap * CRUSHING_SKILL_STEP - CRUSHING_OFFSET)
}

/// Chance for a glancing blow against a defender far below the attacker.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn glancing_chance(attacker_level: u32, defender_level: u32) -> i32 {
    if attacker_level < defender_level + GLANCING_LEVEL_GAP {
        return 0;
    }
    let past_gap = (attacker_level - defender_level - GLANCING_LEVEL_GAP) as i32;
    (GLANCING_BASE + past_gap * GLANCING_LEVEL_STEP).min(GLANCING_CAP)
}

// =============================================================================
// The table
// =============================================================================

/// Chances feeding one table build, all fixed-point.
///
/// The builder clamps each band to what remains of the ladder, so inputs
/// that sum past certainty squeeze out the later bands rather than
/// overflowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackTableInputs {
    /// Miss band, pre-clamped by [`miss_chance`].
    pub miss: i32,
    /// Dodge band.
    pub dodge: i32,
    /// Parry band; zero when the defender faces away.
    pub parry: i32,
    /// Block band; zero without a shield or facing.
    pub block: i32,
    /// Critical band.
    pub crit: i32,
    /// Crushing band; zero unless the defender out-levels the attacker.
    pub crushing: i32,
    /// Glancing band; zero unless the defender is far below the attacker.
    pub glancing: i32,
}

/// A built ladder of cumulative upper bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackTable {
    bands: Vec<(AttackOutcome, i32)>,
}

impl AttackTable {
    /// Stacks the bands in table order.
    ///
    /// Crushing wins over glancing when both inputs are nonzero; the two
    /// are mutually exclusive by construction upstream.
    #[must_use]
    pub fn build(inputs: &AttackTableInputs) -> Self {
        let mut bands = Vec::with_capacity(7);
        let mut cursor = 0i32;
        let mut push = |outcome: AttackOutcome, chance: i32, cursor: &mut i32| {
            let chance = chance.clamp(0, CHANCE_MAX - *cursor);
            if chance > 0 {
                *cursor += chance;
                bands.push((outcome, *cursor));
            }
        };
        push(AttackOutcome::Miss, inputs.miss.min(MISS_CAP), &mut cursor);
        push(AttackOutcome::Dodge, inputs.dodge, &mut cursor);
        push(AttackOutcome::Parry, inputs.parry, &mut cursor);
        push(AttackOutcome::Block, inputs.block, &mut cursor);
        push(AttackOutcome::Crit, inputs.crit, &mut cursor);
        if inputs.crushing > 0 {
            push(AttackOutcome::Crushing, inputs.crushing, &mut cursor);
        } else {
            push(AttackOutcome::Glancing, inputs.glancing, &mut cursor);
        }
        Self { bands }
    }

    /// Selects the band covering `draw`.
    ///
    /// `draw` comes from [`crate::rng::CombatRng::draw`] and lies in
    /// `[0, CHANCE_MAX)`. Anything past the last band is a normal hit.
    #[must_use]
    pub fn roll(&self, draw: i32) -> AttackOutcome {
        for (outcome, upper) in &self.bands {
            if draw < *upper {
                return *outcome;
            }
        }
        AttackOutcome::Normal
    }

    /// The stacked bands with their cumulative upper bounds.
    #[must_use]
    pub fn bands(&self) -> &[(AttackOutcome, i32)] {
        &self.bands
    }
}
