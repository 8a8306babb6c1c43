//! Canonical award, rank and badge rules for the eco point economy.
//!
//! Lifetime points (the sum of all positive deltas ever awarded) drive rank
//! and badge unlocks. Spendable points (lifetime minus redemptions) drive
//! coupon eligibility. All thresholds are inclusive lower bounds, so badge
//! and rank state are monotonic non-decreasing in lifetime points and are
//! never affected by redemptions.

use serde::{Deserialize, Serialize};

/// Points awarded for watching a lesson video to completion.
pub const VIDEO_POINTS: i32 = 25;

/// Points awarded for a verified real-world task.
pub const TASK_POINTS: i32 = 70;

/// Fraction of a lesson video that must be watched before the video award
/// fires. Crossings after the first are absorbed by ledger idempotency.
pub const VIDEO_COMPLETION_THRESHOLD: f64 = 0.9;

/// Rank ladder over lifetime points. The index doubles as the numeric tier
/// used for coupon gating.
const RANK_LADDER: &[(i32, &str)] = &[
    (0, "Seedling"),
    (100, "Sprout"),
    (250, "Sapling"),
    (500, "Young Tree"),
    (1000, "Forest Friend"),
    (2500, "Eco Warrior"),
    (5000, "Forest Guardian"),
];

/// Badge ladder over lifetime points, strictly ascending.
const BADGE_LADDER: &[(i32, &str)] = &[
    (100, "First Steps"),
    (700, "Eco Explorer"),
    (1200, "Green Guardian"),
    (1800, "Planet Protector"),
    (2400, "Climate Champion"),
    (3000, "Earth Hero"),
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Rank {
    pub index: usize,
    pub name: String,
    pub min_points: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub name: String,
    pub points_required: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BadgeProgress {
    pub badge: Badge,
    pub points_remaining: i32,
    pub percent_complete: f64,
}

/// Whether a playback position has crossed the video award threshold.
pub fn video_award_due(position_secs: f64, duration_secs: f64) -> bool {
    duration_secs > 0.0 && position_secs / duration_secs >= VIDEO_COMPLETION_THRESHOLD
}

/// Banded quiz award: >=90% -> 50, >=70% -> 40, >=50% -> 25, else 10.
/// Callers must validate `total_count > 0` first.
pub fn quiz_points(correct_count: i32, total_count: i32) -> i32 {
    let percentage = f64::from(correct_count) / f64::from(total_count) * 100.0;
    if percentage >= 90.0 {
        50
    } else if percentage >= 70.0 {
        40
    } else if percentage >= 50.0 {
        25
    } else {
        10
    }
}

/// Maps lifetime points onto the rank ladder.
pub fn rank_of(lifetime_points: i32) -> Rank {
    let index = RANK_LADDER
        .iter()
        .rposition(|&(min, _)| lifetime_points >= min)
        .unwrap_or(0);
    let (min_points, name) = RANK_LADDER[index];
    Rank {
        index,
        name: name.to_string(),
        min_points,
    }
}

/// The ordered prefix of the badge ladder unlocked at `lifetime_points`.
pub fn badges_unlocked(lifetime_points: i32) -> Vec<Badge> {
    BADGE_LADDER
        .iter()
        .take_while(|&&(required, _)| lifetime_points >= required)
        .map(|&(points_required, name)| Badge {
            name: name.to_string(),
            points_required,
        })
        .collect()
}

/// Badges newly crossed when lifetime points move from `before` to `after`.
pub fn badges_crossed(before: i32, after: i32) -> Vec<Badge> {
    BADGE_LADDER
        .iter()
        .filter(|&&(required, _)| before < required && after >= required)
        .map(|&(points_required, name)| Badge {
            name: name.to_string(),
            points_required,
        })
        .collect()
}

/// Progress towards the next locked badge, for UI progress bars. `None` once
/// the ladder is exhausted.
pub fn progress_to_next(lifetime_points: i32) -> Option<BadgeProgress> {
    let &(points_required, name) = BADGE_LADDER
        .iter()
        .find(|&&(required, _)| lifetime_points < required)?;
    let percent_complete =
        (f64::from(lifetime_points) / f64::from(points_required) * 100.0).clamp(0.0, 100.0);
    Some(BadgeProgress {
        badge: Badge {
            name: name.to_string(),
            points_required,
        },
        points_remaining: points_required - lifetime_points,
        percent_complete,
    })
}
