//! Point rules: score multiplier tiers, daily streaks and epoch days.

use serde::{Deserialize, Serialize};

use crate::error::TierError;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Coarse daily bucket used to gate one claim per wallet per day.
pub fn epoch_day(unix_secs: u64) -> u64 {
    unix_secs / SECONDS_PER_DAY
}

/// Current unix time in seconds (clamped at zero).
pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub threshold: u64,
    pub multiplier: u8,
}

/// Ascending `(threshold, multiplier)` table.
///
/// A score earns the multiplier of the highest threshold not exceeding it;
/// scores below the first threshold earn 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreTiers {
    tiers: Vec<ScoreTier>,
}

impl ScoreTiers {
    pub fn new(table: &[(u64, u8)]) -> Result<Self, TierError> {
        if table.is_empty() {
            return Err(TierError::Empty);
        }

        let mut tiers: Vec<ScoreTier> = Vec::with_capacity(table.len());
        for &(threshold, multiplier) in table {
            if multiplier == 0 {
                return Err(TierError::BadMultiplier(threshold));
            }
            if let Some(prev) = tiers.last() {
                if threshold <= prev.threshold {
                    return Err(TierError::NotAscending(threshold));
                }
                if multiplier < prev.multiplier {
                    return Err(TierError::BadMultiplier(threshold));
                }
            }
            tiers.push(ScoreTier {
                threshold,
                multiplier,
            });
        }

        Ok(Self { tiers })
    }

    pub fn multiplier_for(&self, score: u64) -> u8 {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.threshold <= score)
            .map(|tier| tier.multiplier)
            .unwrap_or(1)
    }

    pub fn tiers(&self) -> &[ScoreTier] {
        &self.tiers
    }
}

impl Default for ScoreTiers {
    fn default() -> Self {
        Self {
            tiers: vec![
                ScoreTier {
                    threshold: 0,
                    multiplier: 1,
                },
                ScoreTier {
                    threshold: 16_000,
                    multiplier: 3,
                },
            ],
        }
    }
}

/// Streak after a claim on `claim_day`.
///
/// Callers must have rejected `claim_day == prev_day` already.
pub fn next_streak(prev_day: Option<u64>, prev_streak: u64, claim_day: u64) -> u64 {
    match prev_day {
        None => prev_streak.saturating_add(1).max(1),
        Some(day) if day.checked_add(1) == Some(claim_day) => prev_streak.saturating_add(1),
        Some(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_point() {
        let tiers = ScoreTiers::default();
        assert_eq!(tiers.multiplier_for(16_000), 3);
        assert_eq!(tiers.multiplier_for(15_999), 1);
        assert_eq!(tiers.multiplier_for(0), 1);
        assert_eq!(tiers.multiplier_for(u64::MAX), 3);
    }

    #[test]
    fn test_below_first_threshold_defaults_to_one() {
        let tiers = ScoreTiers::new(&[(1_000, 2), (8_000, 4)]).unwrap();
        assert_eq!(tiers.multiplier_for(999), 1);
        assert_eq!(tiers.multiplier_for(1_000), 2);
        assert_eq!(tiers.multiplier_for(7_999), 2);
        assert_eq!(tiers.multiplier_for(8_000), 4);
    }

    #[test]
    fn test_multiplier_is_monotone() {
        let tiers = ScoreTiers::new(&[(0, 1), (2_048, 2), (16_000, 3), (65_536, 5)]).unwrap();
        let mut last = 0;
        for score in (0..100_000).step_by(97) {
            let m = tiers.multiplier_for(score);
            assert!(m >= last, "multiplier dropped at score {}", score);
            last = m;
        }
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert_eq!(ScoreTiers::new(&[]), Err(TierError::Empty));
        assert_eq!(
            ScoreTiers::new(&[(0, 1), (0, 2)]),
            Err(TierError::NotAscending(0))
        );
        assert_eq!(
            ScoreTiers::new(&[(0, 3), (100, 2)]),
            Err(TierError::BadMultiplier(100))
        );
        assert_eq!(ScoreTiers::new(&[(0, 0)]), Err(TierError::BadMultiplier(0)));
    }

    #[test]
    fn test_streak_consecutive_days() {
        let s1 = next_streak(None, 0, 100);
        let s2 = next_streak(Some(100), s1, 101);
        let s3 = next_streak(Some(101), s2, 102);
        assert_eq!((s1, s2, s3), (1, 2, 3));
    }

    #[test]
    fn test_streak_resets_after_gap() {
        assert_eq!(next_streak(Some(100), 7, 105), 1);
        assert_eq!(next_streak(Some(100), 7, 102), 1);
    }

    #[test]
    fn test_epoch_day() {
        assert_eq!(epoch_day(0), 0);
        assert_eq!(epoch_day(86_399), 0);
        assert_eq!(epoch_day(86_400), 1);
    }
}
