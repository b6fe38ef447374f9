//! Damage sizing and mitigation.
//!
//! Everything here computes; nothing applies. [`resolve_melee`] and
//! [`resolve_spell`] run the full pipeline for one attack — outcome roll,
//! base damage, done/taken modifiers, armor or partial resistance, block,
//! absorption — and return a [`ResolvedAttack`] for the world to apply.
//! Periodic ticks skip the outcome roll and go straight to mitigation
//! through [`mitigate_periodic`].
//!
//! Mitigation order is fixed: outcome multiplier, then armor or resistance,
//! then the one-point floor, then block, then absorption. A landing hit
//! reaches the absorb stage with at least one point; only a full block or a
//! full absorb may take it to zero.

use crate::combat::table::{
    self, AttackTable, AttackTableInputs, BASE_BLOCK, BASE_DODGE, BASE_PARRY,
};
use crate::combat::{AttackOutcome, DamageResult, HitFlags, WeaponHand};
use crate::ids::HolderHandle;
use crate::rng::{clamp_chance, CombatRng, CHANCE_MAX};
use crate::school::SpellSchool;
use crate::spell::{SpellAttributes, SpellSpec};
use crate::stats::{Rating, StatGrid, UnitAttr};
use crate::unit::CombatUnit;

// =============================================================================
// Tuning constants
// =============================================================================

/// Weapon-skill points granted per level before ratings.
pub const SKILL_PER_LEVEL: f32 = 5.0;
/// Attack power per point of weapon damage per second.
pub const AP_DAMAGE_DIVISOR: f32 = 14.0;
/// Off-hand swings land at half damage.
pub const OFFHAND_FACTOR: f32 = 0.5;
/// Critical strike damage multiplier before resilience.
pub const CRIT_MULTIPLIER: f32 = 2.0;
/// Crushing blow damage multiplier.
pub const CRUSHING_MULTIPLIER: f32 = 1.5;
/// Flat term of the armor mitigation curve.
pub const ARMOR_BASE: f32 = 400.0;
/// Level-scaled term of the armor mitigation curve.
pub const ARMOR_PER_LEVEL: f32 = 85.0;
/// Armor can never mitigate more than this fraction.
pub const ARMOR_REDUCTION_CAP: f32 = 0.75;
/// Highest mean fraction a resistance score can resist.
pub const RESIST_MEAN_CAP: f32 = 0.75;
/// Resistance needed per attacker level for the full mean.
pub const RESIST_PER_LEVEL: f32 = 5.0;
/// Base chance for a spell to miss an equal-level target.
pub const BASE_SPELL_MISS: i32 = 400;
/// Extra spell miss chance per level the target has over the caster.
pub const SPELL_MISS_PER_LEVEL: i32 = 200;
/// Glancing damage penalty at exactly the qualifying level gap.
pub const GLANCING_PENALTY_BASE: f32 = 0.15;
/// Extra glancing penalty per level past the gap.
pub const GLANCING_PENALTY_PER_LEVEL: f32 = 0.05;
/// Ceiling on the glancing penalty.
pub const GLANCING_PENALTY_CAP: f32 = 0.35;
/// Block value granted per point of strength.
pub const BLOCK_VALUE_PER_STRENGTH: f32 = 0.05;

/// The five partial-resist fractions, in band order.
pub const RESIST_BANDS: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

// =============================================================================
// Output
// =============================================================================

/// One resolved attack plus the shields it exhausted.
///
/// Exhausted shield holders are detached by the caller in `ShieldBreak`
/// mode; the resolver only drains their pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttack {
    /// The result record for the apply step and the combat log.
    pub result: DamageResult,
    /// Absorb holders whose pool hit zero soaking this attack.
    pub shields_broken: Vec<HolderHandle>,
}

impl ResolvedAttack {
    fn avoided(outcome: AttackOutcome, school: SpellSchool, extra: HitFlags) -> Self {
        let mut result = DamageResult::avoided(outcome, school);
        result.flags |= extra;
        Self {
            result,
            shields_broken: Vec::new(),
        }
    }
}

// =============================================================================
// Derivation helpers
// =============================================================================

/// Fraction of physical damage removed by `armor` against an attacker of
/// `attacker_level`.
///
/// Monotonically increasing in armor, strictly below one, capped at
/// [`ARMOR_REDUCTION_CAP`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn armor_reduction(attacker_level: u32, armor: f32) -> f32 {
    let armor = armor.max(0.0);
    if armor == 0.0 {
        return 0.0;
    }
    let scale = ARMOR_BASE + ARMOR_PER_LEVEL * attacker_level as f32;
    (armor / (armor + scale)).min(ARMOR_REDUCTION_CAP)
}

/// Mean fraction of spell damage resisted by `resistance` against an
/// attacker of `attacker_level`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn resist_mean(resistance: f32, attacker_level: u32) -> f32 {
    let cap = RESIST_PER_LEVEL * (attacker_level.max(1)) as f32;
    (RESIST_MEAN_CAP * (resistance.max(0.0) / cap)).min(RESIST_MEAN_CAP)
}

/// Integer weights over [`RESIST_BANDS`] for one partial-resist roll.
///
/// A triangular kernel over the two bands bracketing the mean, so the
/// expected resisted fraction equals the mean exactly. A zero mean always
/// selects the 0% band.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resist_band_weights(mean: f32) -> [u32; 5] {
    let mut weights = [0u32; 5];
    for (idx, band) in RESIST_BANDS.iter().enumerate() {
        let distance = (band - mean).abs();
        let weight = (0.25 - distance) * 10_000.0;
        weights[idx] = weight.max(0.0).round() as u32;
    }
    weights
}

/// Chance for a spell to miss, fixed-point.
///
/// Grows with the target's level advantage, shrinks with spell hit rating.
/// Unlike the melee band this is not capped below certainty's complement;
/// the usual [`clamp_chance`] window applies.
#[must_use]
pub fn spell_miss_chance(caster_level: u32, target_level: u32, hit_rating: f32) -> i32 {
    let level_gap = i64::from(target_level) - i64::from(caster_level);
    #[allow(clippy::cast_possible_truncation)]
    let gap_chance = (level_gap.max(0) as i32).saturating_mul(SPELL_MISS_PER_LEVEL);
    clamp_chance(BASE_SPELL_MISS + gap_chance - table::rating_permyriad(hit_rating))
}

/// Damage fraction kept by a glancing blow.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn glancing_factor(attacker_level: u32, defender_level: u32) -> f32 {
    let gap = attacker_level.saturating_sub(defender_level + table::GLANCING_LEVEL_GAP) as f32;
    let penalty =
        (GLANCING_PENALTY_BASE + gap * GLANCING_PENALTY_PER_LEVEL).min(GLANCING_PENALTY_CAP);
    1.0 - penalty
}

/// Critical damage multiplier after the victim's resilience.
///
/// Resilience shaves the bonus half of the crit, never the base hit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn crit_multiplier(resilience_rating: f32) -> f32 {
    let reduction = table::rating_permyriad(resilience_rating) as f32 / 10_000.0;
    let bonus = ((CRIT_MULTIPLIER - 1.0) * (1.0 - reduction)).max(0.0);
    1.0 + bonus
}

/// Flat damage a block removes, from the defender's strength.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn block_value(stats: &StatGrid) -> u32 {
    (stats.peek(UnitAttr::Strength).max(0.0) * BLOCK_VALUE_PER_STRENGTH).round() as u32
}

/// Base damage of one swing: the weapon roll, the damage row, and the
/// attack-power bonus over the swing period. Off-hand swings are halved.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn weapon_base_damage(attacker: &CombatUnit, hand: WeaponHand, rng: &mut CombatRng) -> f32 {
    let (roll, speed_ms) = match attacker.weapon(hand) {
        Some(weapon) => {
            let lo = weapon.damage_min.max(0.0).round() as u32;
            let hi = weapon.damage_max.max(0.0).round() as u32;
            (rng.between(lo, hi.max(lo)) as f32, weapon.speed_ms)
        }
        None => (1.0, crate::unit::BASE_SWING_MS),
    };
    let row = attacker.stats.peek(hand.damage_attr());
    let ap_bonus =
        attacker.stats.attack_power() / AP_DAMAGE_DIVISOR * (speed_ms as f32 / 1_000.0);
    let base = (roll + row + ap_bonus).max(0.0);
    match hand {
        WeaponHand::Main => base,
        WeaponHand::Off => base * OFFHAND_FACTOR,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_damage(value: f32) -> u32 {
    value.max(0.0).round() as u32
}

fn effective_weapon_skill(attacker: &CombatUnit, hand: WeaponHand) -> f32 {
    let hand_rating = match hand {
        WeaponHand::Main => Rating::WeaponSkillMainhand,
        WeaponHand::Off => Rating::WeaponSkillOffhand,
    };
    #[allow(clippy::cast_precision_loss)]
    let base = attacker.level() as f32 * SKILL_PER_LEVEL;
    base + attacker.ratings.get(Rating::WeaponSkill) + attacker.ratings.get(hand_rating)
}

fn effective_defense(victim: &CombatUnit) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let base = victim.level() as f32 * SKILL_PER_LEVEL;
    base + victim.ratings.get(Rating::Defense)
}

// =============================================================================
// Melee resolution
// =============================================================================

/// Resolves one melee swing against `victim`.
///
/// `damage_scale` is `1.0` for an auto swing; weapon-percent spell effects
/// pass their fraction. The victim's absorb pools are drained here; health
/// is not touched.
#[must_use]
pub fn resolve_melee(
    attacker: &CombatUnit,
    victim: &mut CombatUnit,
    hand: WeaponHand,
    damage_scale: f32,
    rng: &mut CombatRng,
) -> ResolvedAttack {
    let school = SpellSchool::Physical;
    let hand_flags = hand.hit_flags();

    if victim.is_evading() {
        return ResolvedAttack::avoided(AttackOutcome::Evade, school, hand_flags);
    }
    if victim.control.is_immune_to_school(school.mask()) {
        return ResolvedAttack::avoided(AttackOutcome::Immune, school, hand_flags);
    }

    let weapon_skill = effective_weapon_skill(attacker, hand);
    let defense = effective_defense(victim);
    let expertise = table::rating_permyriad(attacker.ratings.get(Rating::Expertise));

    // A defender who cannot act cannot dodge, parry or block; parry and
    // block additionally require facing the attacker, block a shield.
    let can_avoid = victim.control.can_act();
    let facing = victim.is_facing(attacker.position());
    let has_shield = victim.ratings.get(Rating::Block) > 0.0;

    let miss = (table::miss_chance(
        weapon_skill,
        defense,
        attacker.ratings.get(Rating::HitMelee),
    ) + table::rating_permyriad(victim.ratings.get(Rating::HitTakenMelee)))
    .clamp(0, table::MISS_CAP);

    let dodge = if can_avoid {
        (table::avoidance_chance(
            BASE_DODGE,
            victim.ratings.get(Rating::Dodge),
            weapon_skill,
            defense,
        ) - expertise)
            .max(0)
    } else {
        0
    };
    let parry = if can_avoid && facing {
        (table::avoidance_chance(
            BASE_PARRY,
            victim.ratings.get(Rating::Parry),
            weapon_skill,
            defense,
        ) - expertise)
            .max(0)
    } else {
        0
    };
    let block = if can_avoid && facing && has_shield {
        table::avoidance_chance(
            BASE_BLOCK,
            victim.ratings.get(Rating::Block),
            weapon_skill,
            defense,
        )
    } else {
        0
    };

    let inputs = AttackTableInputs {
        miss,
        dodge,
        parry,
        block,
        crit: table::crit_chance(
            attacker.ratings.get(Rating::CritMelee),
            victim.ratings.get(Rating::CritTakenMelee),
            weapon_skill,
            defense,
        ),
        crushing: table::crushing_chance(
            attacker.level(),
            victim.level(),
            weapon_skill,
            defense,
        ),
        glancing: table::glancing_chance(attacker.level(), victim.level()),
    };
    let outcome = AttackTable::build(&inputs).roll(rng.draw());

    if outcome.avoided() {
        return ResolvedAttack::avoided(outcome, school, hand_flags);
    }

    // Size the hit.
    let mask = school.mask();
    let mut damage = weapon_base_damage(attacker, hand, rng) * damage_scale.max(0.0);
    damage += attacker.damage_mods.done_flat(mask);
    damage *= attacker.damage_mods.done_factor(mask);
    damage *= victim.damage_mods.taken_factor(mask);

    let mut flags = hand_flags;
    match outcome {
        AttackOutcome::Crit => {
            damage *= crit_multiplier(victim.ratings.get(Rating::CritTakenMelee));
            flags |= HitFlags::CRITICAL;
        }
        AttackOutcome::Crushing => {
            damage *= CRUSHING_MULTIPLIER;
            flags |= HitFlags::CRUSHING;
        }
        AttackOutcome::Glancing => {
            damage *= glancing_factor(attacker.level(), victim.level());
            flags |= HitFlags::GLANCING;
        }
        _ => {}
    }

    let armor = (victim.stats.armor() - attacker.ratings.get(Rating::ArmorPenetration)).max(0.0);
    damage *= 1.0 - armor_reduction(attacker.level(), armor);

    // A landing hit carries at least one point into block and absorb.
    let mut damage = to_damage(damage).max(1);

    let mut blocked = 0;
    if outcome == AttackOutcome::Block {
        blocked = block_value(&victim.stats).min(damage);
        damage -= blocked;
        flags |= HitFlags::BLOCK;
    }

    let (absorbed, shields_broken) = victim.auras.absorb(mask, damage);
    damage -= absorbed;
    if absorbed > 0 {
        flags |= HitFlags::ABSORB;
    }

    ResolvedAttack {
        result: DamageResult {
            outcome,
            school,
            damage,
            absorbed,
            resisted: 0,
            blocked,
            flags,
        },
        shields_broken,
    }
}

// =============================================================================
// Spell resolution
// =============================================================================

/// Resolves one direct spell hit against `victim`.
///
/// Spells roll their own miss ladder before damage: miss, then a full
/// resist for binary spells, then crit. Non-binary spells take an
/// independent partial-resist roll banded over [`RESIST_BANDS`]. Physical
/// spells mitigate through armor instead of resistance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn resolve_spell(
    caster: &CombatUnit,
    victim: &mut CombatUnit,
    spec: &SpellSpec,
    min: u32,
    max: u32,
    coefficient: f32,
    rng: &mut CombatRng,
) -> ResolvedAttack {
    let school = spec.school;

    if victim.is_evading() {
        return ResolvedAttack::avoided(AttackOutcome::Evade, school, HitFlags::empty());
    }
    if victim.control.is_immune_to_school(school.mask())
        || victim.control.is_immune_to_mechanic(spec.mechanic)
    {
        return ResolvedAttack::avoided(AttackOutcome::Immune, school, HitFlags::empty());
    }

    let miss = (spell_miss_chance(
        caster.level(),
        victim.level(),
        caster.ratings.get(Rating::HitSpell),
    ) + table::rating_permyriad(victim.ratings.get(Rating::HitTakenSpell)))
    .clamp(0, CHANCE_MAX);
    if rng.chance(miss) {
        return ResolvedAttack::avoided(AttackOutcome::Miss, school, HitFlags::empty());
    }

    let mask = school.mask();
    let resistance = if school.is_magic() {
        victim.stats.resistance(school)
    } else {
        0.0
    };
    let mean = resist_mean(resistance, caster.level());

    // Binary spells resist fully or not at all.
    if spec.attributes.contains(SpellAttributes::BINARY) {
        #[allow(clippy::cast_possible_truncation)]
        let full_resist = (mean * CHANCE_MAX as f32).round() as i32;
        if rng.chance(full_resist) {
            return ResolvedAttack::avoided(AttackOutcome::Resist, school, HitFlags::empty());
        }
    }

    let mut damage =
        rng.between(min, max.max(min)) as f32 + caster.damage_mods.done_flat(mask) * coefficient;
    damage *= caster.damage_mods.done_factor(mask);
    damage *= victim.damage_mods.taken_factor(mask);

    let crit = table::crit_chance(
        caster.ratings.get(Rating::CritSpell),
        victim.ratings.get(Rating::CritTakenSpell),
        0.0,
        0.0,
    );
    let mut flags = HitFlags::empty();
    let mut outcome = AttackOutcome::Normal;
    if rng.chance(crit) {
        damage *= crit_multiplier(victim.ratings.get(Rating::CritTakenSpell));
        outcome = AttackOutcome::Crit;
        flags |= HitFlags::CRITICAL;
    }

    let mut resisted = 0;
    if school == SpellSchool::Physical {
        let armor = (victim.stats.armor() - caster.ratings.get(Rating::ArmorPenetration)).max(0.0);
        damage *= 1.0 - armor_reduction(caster.level(), armor);
    } else if !spec.attributes.contains(SpellAttributes::BINARY) && mean > 0.0 {
        let band = rng.weighted_index(&resist_band_weights(mean));
        let fraction = RESIST_BANDS[band];
        let total = damage;
        resisted = to_damage(total * fraction);
        damage = total - total * fraction;
        if resisted > 0 {
            flags |= HitFlags::RESIST;
        }
    }

    let mut damage = to_damage(damage).max(1);

    let (absorbed, shields_broken) = victim.auras.absorb(mask, damage);
    damage -= absorbed;
    if absorbed > 0 {
        flags |= HitFlags::ABSORB;
    }

    ResolvedAttack {
        result: DamageResult {
            outcome,
            school,
            damage,
            absorbed,
            resisted,
            blocked: 0,
            flags,
        },
        shields_broken,
    }
}

// =============================================================================
// Periodic mitigation
// =============================================================================

/// Mitigates one periodic tick that already passed its apply-time gates.
///
/// Ticks never miss and never crit; they respect immunity (gained after
/// application), the victim's taken modifiers and absorb shields. Armor
/// does not apply: physical periodics are bleeds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mitigate_periodic(
    victim: &mut CombatUnit,
    school: SpellSchool,
    damage: u32,
) -> ResolvedAttack {
    let mut flags = HitFlags::PERIODIC;
    if victim.is_evading() {
        return ResolvedAttack::avoided(AttackOutcome::Evade, school, flags);
    }
    let mask = school.mask();
    if victim.control.is_immune_to_school(mask) {
        return ResolvedAttack::avoided(AttackOutcome::Immune, school, flags);
    }

    let scaled = to_damage(damage as f32 * victim.damage_mods.taken_factor(mask));
    let mut damage = scaled.max(1);

    let (absorbed, shields_broken) = victim.auras.absorb(mask, damage);
    damage -= absorbed;
    if absorbed > 0 {
        flags |= HitFlags::ABSORB;
    }

    ResolvedAttack {
        result: DamageResult {
            outcome: AttackOutcome::Normal,
            school,
            damage,
            absorbed,
            resisted: 0,
            blocked: 0,
            flags,
        },
        shields_broken,
    }
}

/// Sizes one periodic tick before mitigation.
///
/// The flat aura bonus spreads over the full tick count of the effect, so
/// stretching a periodic over more ticks never increases its total.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn periodic_tick_damage(
    amount_per_stack: u32,
    stacks: u32,
    bonus_flat: f32,
    done_factor: f32,
    total_ticks: u32,
) -> u32 {
    let base = (amount_per_stack * stacks.max(1)) as f32;
    let spread = bonus_flat.max(0.0) / total_ticks.max(1) as f32;
    to_damage((base + spread) * done_factor)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aura::AuraEffect;
    use crate::ids::{SpellId, UnitId};
    use crate::rng::CombatRng;
    use crate::school::SchoolMask;
    use crate::unit::{Controller, PowerKind, Weapon};

    fn melee_pair() -> (CombatUnit, CombatUnit) {
        let mut attacker = CombatUnit::new(UnitId::new(1), 60, Controller::Player, PowerKind::Rage);
        attacker.stats.set_create(UnitAttr::Health, 1_000.0);
        attacker.set_mainhand(Weapon::new(10.0, 20.0, 2_000));
        attacker.reset_pools();

        let mut victim = CombatUnit::new(UnitId::new(2), 60, Controller::Player, PowerKind::Mana);
        victim.stats.set_create(UnitAttr::Health, 1_000.0);
        victim.reset_pools();
        // Face away so parry and block stay out of the ladder.
        victim.set_facing(0.0);
        victim.set_position(glam::Vec3::new(1.0, 0.0, 0.0));

        (attacker, victim)
    }

    mod armor_tests {
        use super::*;

        #[test]
        fn zero_armor_means_zero_reduction() {
            assert_eq!(armor_reduction(60, 0.0), 0.0);
            assert_eq!(armor_reduction(60, -50.0), 0.0);
        }

        #[test]
        fn reduction_is_monotonic_in_armor() {
            let mut last = 0.0;
            for armor in [100.0, 500.0, 2_000.0, 10_000.0, 100_000.0] {
                let r = armor_reduction(60, armor);
                assert!(r > last, "armor {armor} did not increase reduction");
                last = r;
            }
        }

        #[test]
        fn reduction_never_reaches_the_cap_asymptote() {
            assert!(armor_reduction(60, 1.0e9) <= ARMOR_REDUCTION_CAP);
            assert!(armor_reduction(1, 1.0e9) <= ARMOR_REDUCTION_CAP);
        }

        #[test]
        fn higher_attacker_level_weakens_armor() {
            let low = armor_reduction(10, 3_000.0);
            let high = armor_reduction(60, 3_000.0);
            assert!(high < low);
        }
    }

    mod resist_tests {
        use super::*;

        #[test]
        fn mean_caps_at_three_quarters() {
            assert_eq!(resist_mean(1.0e9, 60), RESIST_MEAN_CAP);
            assert_eq!(resist_mean(0.0, 60), 0.0);
        }

        #[test]
        fn zero_mean_always_picks_the_zero_band() {
            let weights = resist_band_weights(0.0);
            assert!(weights[0] > 0);
            assert_eq!(&weights[1..], &[0, 0, 0, 0]);
        }

        #[test]
        fn weights_bracket_the_mean() {
            let weights = resist_band_weights(0.1);
            assert!(weights[0] > 0 && weights[1] > 0);
            assert_eq!(&weights[2..], &[0, 0, 0]);
        }

        #[test]
        fn expected_fraction_matches_the_mean() {
            for mean in [0.05, 0.1, 0.25, 0.4, 0.6] {
                let weights = resist_band_weights(mean);
                let total: u32 = weights.iter().sum();
                let expected: f32 = weights
                    .iter()
                    .zip(RESIST_BANDS.iter())
                    .map(|(&w, &band)| w as f32 * band)
                    .sum::<f32>()
                    / total as f32;
                assert!(
                    (expected - mean).abs() < 0.01,
                    "mean {mean} produced expectation {expected}"
                );
            }
        }

        #[test]
        fn full_resist_band_stays_out_of_reach() {
            // The mean caps at 0.75, too far from the 100% band.
            let weights = resist_band_weights(RESIST_MEAN_CAP);
            assert_eq!(weights[4], 0);
        }
    }

    mod multiplier_tests {
        use super::*;

        #[test]
        fn glancing_penalty_grows_with_the_level_gap() {
            let at_gap = glancing_factor(60, 57);
            let past_gap = glancing_factor(60, 55);
            assert!((at_gap - (1.0 - GLANCING_PENALTY_BASE)).abs() < f32::EPSILON);
            assert!(past_gap < at_gap);
            assert!(glancing_factor(60, 1) >= 1.0 - GLANCING_PENALTY_CAP);
        }

        #[test]
        fn resilience_shaves_the_crit_bonus() {
            assert!((crit_multiplier(0.0) - CRIT_MULTIPLIER).abs() < f32::EPSILON);
            let reduced = crit_multiplier(50.0);
            assert!(reduced < CRIT_MULTIPLIER);
            assert!(reduced >= 1.0);
            // Absurd resilience never turns a crit into a discount.
            assert!((crit_multiplier(1.0e6) - 1.0).abs() < f32::EPSILON);
        }

        #[test]
        fn block_value_follows_strength() {
            let mut stats = StatGrid::new();
            stats.set_create(UnitAttr::Strength, 200.0);
            assert_eq!(block_value(&stats), 10);
        }
    }

    mod weapon_damage_tests {
        use super::*;

        #[test]
        fn roll_stays_in_the_weapon_range() {
            let (attacker, _) = melee_pair();
            let mut rng = CombatRng::new(7);
            for _ in 0..200 {
                let damage = weapon_base_damage(&attacker, WeaponHand::Main, &mut rng);
                assert!((10.0..=20.0).contains(&damage));
            }
        }

        #[test]
        fn attack_power_adds_damage_per_second() {
            let (mut attacker, _) = melee_pair();
            attacker.stats.set_create(UnitAttr::AttackPower, 140.0);
            let mut rng = CombatRng::new(7);
            let damage = weapon_base_damage(&attacker, WeaponHand::Main, &mut rng);
            // 140 AP / 14 * 2.0s = 20 extra damage.
            assert!((30.0..=40.0).contains(&damage));
        }

        #[test]
        fn offhand_swings_land_at_half() {
            let (mut attacker, _) = melee_pair();
            attacker.set_offhand(Some(Weapon::new(10.0, 10.0, 2_000)));
            let mut rng = CombatRng::new(7);
            let damage = weapon_base_damage(&attacker, WeaponHand::Off, &mut rng);
            assert!((damage - 5.0).abs() < f32::EPSILON);
        }
    }

    mod melee_resolution_tests {
        use super::*;

        #[test]
        fn evading_victims_return_evade_before_any_roll() {
            let (attacker, mut victim) = melee_pair();
            victim.set_evading(true);
            let mut rng = CombatRng::new(1);
            let resolved = resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
            assert_eq!(resolved.result.outcome, AttackOutcome::Evade);
            assert_eq!(resolved.result.damage, 0);
        }

        #[test]
        fn school_immunity_returns_immune() {
            let (attacker, mut victim) = melee_pair();
            AuraEffect::SchoolImmunity {
                schools: SchoolMask::PHYSICAL,
            }
            .apply(&mut victim.effect_target(), 1);
            let mut rng = CombatRng::new(1);
            let resolved = resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
            assert_eq!(resolved.result.outcome, AttackOutcome::Immune);
        }

        #[test]
        fn unarmored_hits_stay_in_the_weapon_range() {
            let (attacker, mut victim) = melee_pair();
            let mut rng = CombatRng::new(99);
            for _ in 0..300 {
                let resolved =
                    resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
                if resolved.result.outcome == AttackOutcome::Normal {
                    assert!(
                        (10..=20).contains(&resolved.result.damage),
                        "normal hit for {}",
                        resolved.result.damage
                    );
                }
            }
        }

        #[test]
        fn armor_reduces_but_never_zeroes() {
            let (attacker, mut victim) = melee_pair();
            victim.stats.set_create(UnitAttr::Armor, 1.0e8);
            let mut rng = CombatRng::new(3);
            for _ in 0..100 {
                let resolved =
                    resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
                if resolved.result.outcome.lands() {
                    assert!(resolved.result.damage >= 1);
                    assert!(resolved.result.damage < 10);
                }
            }
        }

        #[test]
        fn stunned_victims_cannot_avoid() {
            let (attacker, mut victim) = melee_pair();
            AuraEffect::Stun.apply(&mut victim.effect_target(), 1);
            victim.ratings.set(Rating::Dodge, 1_000.0);
            let mut rng = CombatRng::new(5);
            for _ in 0..200 {
                let resolved =
                    resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
                assert_ne!(resolved.result.outcome, AttackOutcome::Dodge);
                assert_ne!(resolved.result.outcome, AttackOutcome::Parry);
                assert_ne!(resolved.result.outcome, AttackOutcome::Block);
            }
        }

        #[test]
        fn absorb_soaks_before_health() {
            use crate::spell::{SpellEffect, SpellSpec};

            let (attacker, mut victim) = melee_pair();
            let mut shield =
                SpellSpec::new(SpellId::new(17), "Test Barrier", SpellSchool::Holy);
            shield.effects.push(SpellEffect::ApplyAura(AuraEffect::SchoolAbsorb {
                schools: SchoolMask::ALL,
                amount: 1_000,
            }));
            let (auras, mut target) = victim.aura_parts();
            auras
                .add(shield, UnitId::new(2), Some(30_000), &mut target)
                .unwrap();

            let mut rng = CombatRng::new(11);
            loop {
                let resolved =
                    resolve_melee(&attacker, &mut victim, WeaponHand::Main, 1.0, &mut rng);
                if resolved.result.outcome.lands() {
                    assert_eq!(resolved.result.damage, 0);
                    assert!(resolved.result.absorbed >= 1);
                    assert!(resolved.result.flags.contains(HitFlags::ABSORB));
                    break;
                }
            }
        }

        #[test]
        fn offhand_results_carry_the_offhand_flag() {
            let (mut attacker, mut victim) = melee_pair();
            attacker.set_offhand(Some(Weapon::new(5.0, 8.0, 1_500)));
            let mut rng = CombatRng::new(2);
            let resolved = resolve_melee(&attacker, &mut victim, WeaponHand::Off, 1.0, &mut rng);
            assert!(resolved.result.flags.contains(HitFlags::OFFHAND));
        }
    }

    mod spell_resolution_tests {
        use super::*;
        use crate::spell::SpellSpec;

        fn bolt() -> SpellSpec {
            SpellSpec::new(SpellId::new(30), "Test Bolt", SpellSchool::Frost)
        }

        #[test]
        fn zero_resistance_never_resists() {
            let (caster, mut victim) = melee_pair();
            let mut rng = CombatRng::new(21);
            for _ in 0..200 {
                let resolved =
                    resolve_spell(&caster, &mut victim, &bolt(), 50, 60, 0.0, &mut rng);
                if resolved.result.outcome.lands() {
                    assert_eq!(resolved.result.resisted, 0);
                }
            }
        }

        #[test]
        fn resistance_produces_partial_bands() {
            let (caster, mut victim) = melee_pair();
            victim.stats.set_create(UnitAttr::ResistFrost, 150.0);
            let mut rng = CombatRng::new(22);
            let mut saw_partial = false;
            for _ in 0..400 {
                let resolved =
                    resolve_spell(&caster, &mut victim, &bolt(), 100, 100, 0.0, &mut rng);
                if resolved.result.resisted > 0 {
                    saw_partial = true;
                    assert!(resolved.result.flags.contains(HitFlags::RESIST));
                    // 150 resist at level 60: mean 0.375, bands 25% and 50%.
                    assert!([25, 50].contains(&resolved.result.resisted));
                }
            }
            assert!(saw_partial);
        }

        #[test]
        fn binary_spells_resist_fully_or_not_at_all() {
            let (caster, mut victim) = melee_pair();
            victim.stats.set_create(UnitAttr::ResistFrost, 300.0);
            let mut spec = bolt();
            spec.attributes |= SpellAttributes::BINARY;
            let mut rng = CombatRng::new(23);
            let mut saw_resist = false;
            for _ in 0..400 {
                let resolved =
                    resolve_spell(&caster, &mut victim, &spec, 100, 100, 0.0, &mut rng);
                assert_eq!(resolved.result.resisted, 0);
                if resolved.result.outcome == AttackOutcome::Resist {
                    saw_resist = true;
                    assert_eq!(resolved.result.damage, 0);
                }
            }
            assert!(saw_resist);
        }

        #[test]
        fn mechanic_immunity_blocks_the_spell() {
            use crate::school::Mechanic;

            let (caster, mut victim) = melee_pair();
            let mut spec = bolt();
            spec.mechanic = Mechanic::Snare;
            AuraEffect::MechanicImmunity {
                mechanic: Mechanic::Snare,
            }
            .apply(&mut victim.effect_target(), 1);
            let mut rng = CombatRng::new(24);
            let resolved = resolve_spell(&caster, &mut victim, &spec, 50, 60, 0.0, &mut rng);
            assert_eq!(resolved.result.outcome, AttackOutcome::Immune);
        }

        #[test]
        fn flat_bonus_scales_through_the_coefficient() {
            let (mut caster, mut victim) = melee_pair();
            AuraEffect::ModDamageDoneFlat {
                schools: SchoolMask::FROST,
                amount: 100.0,
            }
            .apply(&mut caster.effect_target(), 1);
            let mut rng = CombatRng::new(25);
            for _ in 0..50 {
                let resolved =
                    resolve_spell(&caster, &mut victim, &bolt(), 100, 100, 0.5, &mut rng);
                if resolved.result.outcome == AttackOutcome::Normal
                    && resolved.result.resisted == 0
                {
                    assert_eq!(resolved.result.damage, 150);
                    return;
                }
            }
            panic!("no clean normal hit in 50 casts");
        }
    }

    mod periodic_tests {
        use super::*;

        #[test]
        fn tick_damage_spreads_the_flat_bonus() {
            // 10 per stack, 2 stacks, 60 flat over 6 ticks.
            assert_eq!(periodic_tick_damage(10, 2, 60.0, 1.0, 6), 30);
            // More ticks never raise the per-tick share.
            assert!(periodic_tick_damage(10, 2, 60.0, 1.0, 12) <= 30);
        }

        #[test]
        fn ticks_respect_taken_modifiers_and_floor() {
            let (_, mut victim) = melee_pair();
            AuraEffect::ModDamageTakenPct {
                schools: SchoolMask::SHADOW,
                pct: -50.0,
            }
            .apply(&mut victim.effect_target(), 1);
            let resolved = mitigate_periodic(&mut victim, SpellSchool::Shadow, 40);
            assert_eq!(resolved.result.damage, 20);
            assert!(resolved.result.flags.contains(HitFlags::PERIODIC));

            let tiny = mitigate_periodic(&mut victim, SpellSchool::Shadow, 1);
            assert_eq!(tiny.result.damage, 1);
        }

        #[test]
        fn immune_victims_take_no_ticks() {
            let (_, mut victim) = melee_pair();
            AuraEffect::SchoolImmunity {
                schools: SchoolMask::SHADOW,
            }
            .apply(&mut victim.effect_target(), 1);
            let resolved = mitigate_periodic(&mut victim, SpellSchool::Shadow, 40);
            assert_eq!(resolved.result.outcome, AttackOutcome::Immune);
            assert_eq!(resolved.result.damage, 0);
        }
    }
}
