//! Crowd-control diminishing returns.
//!
//! Repeated control effects from the same group land with shrinking
//! durations: full, half, quarter, then immune. Records age out passively:
//! a record is read as fresh once its last hit is more than
//! [`DIMINISH_AGEOUT_MS`] in the past, so no sweep ever runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::unit::Controller;

/// A record older than this reads as fresh.
pub const DIMINISH_AGEOUT_MS: u64 = 15_000;

/// Crowd-control group sharing one diminishing track.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiminishGroup {
    /// Not tracked; durations never diminish
    None,
    /// Stuns
    Stun,
    /// Roots
    Root,
    /// Fear effects
    Fear,
    /// Charms and mind control
    Charm,
    /// Sleep effects
    Sleep,
    /// Horror effects
    Horror,
    /// Silences
    Silence,
    /// Disarms
    Disarm,
    /// Banishes
    Banish,
}

impl DiminishGroup {
    /// Whether this group diminishes against the given kind of target.
    ///
    /// Player-controlled targets diminish every group; NPC targets only
    /// diminish stuns.
    #[must_use]
    pub const fn applies_to(self, target: Controller) -> bool {
        match self {
            Self::None => false,
            Self::Stun => true,
            _ => matches!(target, Controller::Player),
        }
    }
}

/// Diminishing level of one group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiminishLevel {
    /// Full duration
    Fresh,
    /// Half duration
    Half,
    /// Quarter duration
    Quarter,
    /// Zero duration; the effect must not be applied
    Immune,
}

impl DiminishLevel {
    /// Duration multiplier at this level.
    #[must_use]
    pub const fn scale(self) -> f32 {
        match self {
            Self::Fresh => 1.0,
            Self::Half => 0.5,
            Self::Quarter => 0.25,
            Self::Immune => 0.0,
        }
    }

    /// The level after one more qualifying hit.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Fresh => Self::Half,
            Self::Half => Self::Quarter,
            Self::Quarter | Self::Immune => Self::Immune,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct DiminishEntry {
    level: DiminishLevel,
    last_hit_ms: u64,
}

/// Per-unit map of crowd-control decay state.
///
/// Records are created lazily on the first qualifying hit, read with
/// age-out applied, and cleared wholesale on [`DiminishTracker::reset`]
/// (leaving combat).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiminishTracker {
    records: BTreeMap<DiminishGroup, DiminishEntry>,
}

impl DiminishTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of a group at `now_ms`, with age-out applied.
    #[must_use]
    pub fn level(&self, group: DiminishGroup, now_ms: u64) -> DiminishLevel {
        let Some(entry) = self.records.get(&group) else {
            return DiminishLevel::Fresh;
        };
        if now_ms.saturating_sub(entry.last_hit_ms) > DIMINISH_AGEOUT_MS {
            DiminishLevel::Fresh
        } else {
            entry.level
        }
    }

    /// Records one qualifying hit, advancing the group one level.
    ///
    /// The stored level becomes the successor of the *effective* level at
    /// `now_ms`, so an aged-out record restarts at half rather than
    /// continuing where it left off. Called once per qualifying spell
    /// application, never per tick.
    pub fn bump(&mut self, group: DiminishGroup, now_ms: u64) {
        if matches!(group, DiminishGroup::None) {
            return;
        }
        let next = self.level(group, now_ms).next();
        self.records.insert(
            group,
            DiminishEntry {
                level: next,
                last_hit_ms: now_ms,
            },
        );
    }

    /// Drops every record (leaving combat, leaving an instance).
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Scales a control duration by a diminishing level.
///
/// `applies` is the caster/target applicability decided by
/// [`DiminishGroup::applies_to`]; a reflected spell or a non-applicable
/// pairing leaves the duration unchanged. The result is capped at `cap_ms`
/// when `cap_ms > 0`. A zero result means the effect must not be applied.
#[must_use]
pub fn scaled_duration(
    level: DiminishLevel,
    duration_ms: u32,
    cap_ms: u32,
    applies: bool,
    reflected: bool,
) -> u32 {
    if reflected || !applies {
        return duration_ms;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    let scaled = (duration_ms as f32 * level.scale()) as u32;
    if cap_ms > 0 {
        scaled.min(cap_ms)
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_sequence_is_monotone_and_exact() {
        let levels = [
            DiminishLevel::Fresh,
            DiminishLevel::Half,
            DiminishLevel::Quarter,
            DiminishLevel::Immune,
        ];
        let scales: Vec<f32> = levels.iter().map(|l| l.scale()).collect();
        assert_eq!(scales, vec![1.0, 0.5, 0.25, 0.0]);
        for pair in scales.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn unknown_group_reads_fresh() {
        let tracker = DiminishTracker::new();
        assert_eq!(tracker.level(DiminishGroup::Stun, 0), DiminishLevel::Fresh);
    }

    #[test]
    fn three_hits_inside_window_reach_immunity() {
        let mut tracker = DiminishTracker::new();

        // 10 s stun applied three times within 15 s, then a fourth.
        let mut applied = Vec::new();
        for now in [0u64, 5_000, 10_000, 14_000] {
            let level = tracker.level(DiminishGroup::Stun, now);
            applied.push(scaled_duration(level, 10_000, 0, true, false));
            tracker.bump(DiminishGroup::Stun, now);
        }
        assert_eq!(applied, vec![10_000, 5_000, 2_500, 0]);
    }

    #[test]
    fn record_ages_out_after_15001_ms() {
        let mut tracker = DiminishTracker::new();
        tracker.bump(DiminishGroup::Fear, 1_000);
        tracker.bump(DiminishGroup::Fear, 2_000);
        assert_eq!(
            tracker.level(DiminishGroup::Fear, 3_000),
            DiminishLevel::Quarter
        );

        // Exactly 15000 ms later the record still counts.
        assert_eq!(
            tracker.level(DiminishGroup::Fear, 17_000),
            DiminishLevel::Quarter
        );
        // One millisecond more and it reads fresh.
        assert_eq!(
            tracker.level(DiminishGroup::Fear, 17_001),
            DiminishLevel::Fresh
        );
    }

    #[test]
    fn bump_after_ageout_restarts_at_half() {
        let mut tracker = DiminishTracker::new();
        tracker.bump(DiminishGroup::Root, 0);
        tracker.bump(DiminishGroup::Root, 1_000);
        tracker.bump(DiminishGroup::Root, 2_000);
        assert_eq!(
            tracker.level(DiminishGroup::Root, 2_500),
            DiminishLevel::Immune
        );

        let later = 2_000 + DIMINISH_AGEOUT_MS + 1;
        assert_eq!(tracker.level(DiminishGroup::Root, later), DiminishLevel::Fresh);
        tracker.bump(DiminishGroup::Root, later);
        assert_eq!(tracker.level(DiminishGroup::Root, later), DiminishLevel::Half);
    }

    #[test]
    fn reflected_and_exempt_pairs_keep_full_duration() {
        assert_eq!(
            scaled_duration(DiminishLevel::Quarter, 8_000, 0, true, true),
            8_000
        );
        assert_eq!(
            scaled_duration(DiminishLevel::Immune, 8_000, 0, false, false),
            8_000
        );
    }

    #[test]
    fn cap_limits_scaled_duration() {
        assert_eq!(
            scaled_duration(DiminishLevel::Fresh, 12_000, 10_000, true, false),
            10_000
        );
        assert_eq!(
            scaled_duration(DiminishLevel::Half, 12_000, 10_000, true, false),
            6_000
        );
    }

    #[test]
    fn npc_targets_only_diminish_stuns() {
        assert!(DiminishGroup::Stun.applies_to(Controller::Npc));
        assert!(!DiminishGroup::Fear.applies_to(Controller::Npc));
        assert!(DiminishGroup::Fear.applies_to(Controller::Player));
        assert!(!DiminishGroup::None.applies_to(Controller::Player));
    }

    #[test]
    fn reset_clears_all_records() {
        let mut tracker = DiminishTracker::new();
        tracker.bump(DiminishGroup::Stun, 100);
        tracker.bump(DiminishGroup::Fear, 100);
        assert!(!tracker.is_empty());

        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.level(DiminishGroup::Stun, 200), DiminishLevel::Fresh);
    }

    proptest::proptest! {
        #[test]
        fn scaling_never_increases_duration(
            duration in 0u32..600_000,
            cap in 0u32..600_000,
        ) {
            let mut last = duration;
            for level in [
                DiminishLevel::Fresh,
                DiminishLevel::Half,
                DiminishLevel::Quarter,
                DiminishLevel::Immune,
            ] {
                let scaled = scaled_duration(level, duration, cap, true, false);
                proptest::prop_assert!(scaled <= last || scaled <= duration);
                last = scaled;
            }
            proptest::prop_assert_eq!(
                scaled_duration(DiminishLevel::Immune, duration, cap, true, false),
                0
            );
        }
    }
}
