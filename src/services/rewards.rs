//! Points & progress rules
//!
//! Pure functions: no I/O, no cached state. The mirror calls these and then
//! applies the results to its collections.

use crate::config::{AssessmentTiers, RewardConfig};
use crate::models::Assessment;

/// Score as a percentage of the maximum. A non-positive maximum counts as 0%.
pub fn percentage(score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 || !score.is_finite() || !max_score.is_finite() {
        return 0.0;
    }
    score / max_score * 100.0
}

/// Points awarded for an assessment result.
pub fn assessment_points(score: f64, max_score: f64, tiers: &AssessmentTiers) -> u32 {
    let pct = percentage(score, max_score);
    if pct >= tiers.high_threshold {
        tiers.high_points
    } else if pct >= tiers.mid_threshold {
        tiers.mid_points
    } else if pct >= tiers.low_threshold {
        tiers.low_points
    } else {
        0
    }
}

/// Points granted when an assessment is regraded, and the new running total
/// paid for it.
///
/// Only the part of the new tier award above what was already paid is granted,
/// so repeated regrades never pay a tier twice.
pub fn regrade_award(
    previously_awarded: u32,
    score: f64,
    max_score: f64,
    tiers: &AssessmentTiers,
) -> (u32, u32) {
    let tier = assessment_points(score, max_score, tiers);
    (tier.saturating_sub(previously_awarded), previously_awarded.max(tier))
}

/// Outcome of completing one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReward {
    pub new_streak: u32,
    pub base_points: u32,
    pub streak_bonus: u32,
}

impl SessionReward {
    pub fn total(&self) -> u32 {
        self.base_points + self.streak_bonus
    }

    pub fn hit_milestone(&self) -> bool {
        self.streak_bonus > 0
    }
}

/// Streak increment plus base award; an exact milestone adds its bonus on top.
pub fn session_reward(current_streak: u32, rules: &RewardConfig) -> SessionReward {
    let new_streak = current_streak.saturating_add(1);
    let streak_bonus = rules
        .streak_milestones
        .iter()
        .filter(|m| m.days == new_streak)
        .map(|m| m.bonus)
        .sum();
    SessionReward {
        new_streak,
        base_points: rules.session_points,
        streak_bonus,
    }
}

/// Average percentage across all assessments, rounded to the nearest integer.
///
/// Returns `None` for an empty history so callers leave progress untouched.
pub fn recompute_progress<'a, I>(assessments: I) -> Option<u8>
where
    I: IntoIterator<Item = &'a Assessment>,
{
    let (sum, count) = assessments
        .into_iter()
        .fold((0.0_f64, 0usize), |(sum, count), a| {
            (sum + percentage(a.score, a.max_score), count + 1)
        });
    if count == 0 {
        return None;
    }
    let average = (sum / count as f64).round().clamp(0.0, 100.0);
    Some(average as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn assessment(score: f64, max_score: f64) -> Assessment {
        Assessment::new(
            "s1",
            "t1",
            "Maths",
            score,
            max_score,
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
        )
    }

    #[rstest]
    #[case(100.0, 100.0, 50)]
    #[case(95.0, 100.0, 50)]
    #[case(94.9, 100.0, 30)]
    #[case(92.0, 100.0, 30)]
    #[case(85.0, 100.0, 30)]
    #[case(84.99, 100.0, 15)]
    #[case(70.0, 100.0, 15)]
    #[case(69.9, 100.0, 0)]
    #[case(0.0, 100.0, 0)]
    #[case(19.0, 20.0, 50)]
    #[case(17.0, 20.0, 30)]
    #[case(5.0, 0.0, 0)]
    fn test_assessment_tiers(#[case] score: f64, #[case] max: f64, #[case] expected: u32) {
        assert_eq!(
            assessment_points(score, max, &AssessmentTiers::default()),
            expected
        );
    }

    #[rstest]
    #[case(15, 96.0, (35, 50))]
    #[case(50, 10.0, (0, 50))]
    #[case(50, 96.0, (0, 50))]
    #[case(30, 88.0, (0, 30))]
    #[case(0, 72.0, (15, 15))]
    fn test_regrade_award(#[case] paid: u32, #[case] score: f64, #[case] expected: (u32, u32)) {
        assert_eq!(
            regrade_award(paid, score, 100.0, &AssessmentTiers::default()),
            expected
        );
    }

    #[test]
    fn test_points_are_monotonic_in_percentage() {
        let tiers = AssessmentTiers::default();
        let mut previous = 0;
        for tenth in 0..=1000 {
            let points = assessment_points(tenth as f64 / 10.0, 100.0, &tiers);
            assert!(points >= previous, "points dropped at {}%", tenth as f64 / 10.0);
            previous = points;
        }
    }

    #[rstest]
    #[case(0, 1, 0)]
    #[case(5, 6, 0)]
    #[case(6, 7, 25)]
    #[case(7, 8, 0)]
    #[case(29, 30, 100)]
    #[case(30, 31, 0)]
    fn test_session_reward(#[case] current: u32, #[case] streak: u32, #[case] bonus: u32) {
        let reward = session_reward(current, &RewardConfig::default());
        assert_eq!(reward.new_streak, streak);
        assert_eq!(reward.base_points, 10);
        assert_eq!(reward.streak_bonus, bonus);
        assert_eq!(reward.total(), 10 + bonus);
    }

    #[test]
    fn test_progress_average_rounds() {
        let history = vec![
            assessment(80.0, 100.0),
            assessment(92.0, 100.0),
            assessment(7.0, 10.0),
        ];
        // (80 + 92 + 70) / 3 = 80.67
        assert_eq!(recompute_progress(&history), Some(81));
    }

    #[test]
    fn test_progress_single_assessment() {
        assert_eq!(recompute_progress(&[assessment(92.0, 100.0)]), Some(92));
    }

    #[test]
    fn test_progress_empty_is_none() {
        assert_eq!(recompute_progress(&Vec::<Assessment>::new()), None);
    }
}
