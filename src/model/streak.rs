use super::constants::{STREAK_BONUS_COINS_PER_WEEK, STREAK_BONUS_INTERVAL, STREAK_MILESTONES};

/// Advances the signed streak counter. A transition between active and inactive
/// resets to exactly +1 / -1 rather than stepping through zero.
pub fn next_streak(previous: i32, active: bool) -> i32 {
    if active {
        (previous + 1).max(1)
    } else {
        (previous - 1).min(-1)
    }
}

/// Coins owed for reaching `streak`, if it lands on a bonus interval.
pub fn streak_bonus(streak: i32) -> Option<i32> {
    if streak > 0 && streak % STREAK_BONUS_INTERVAL == 0 {
        return Some(streak * STREAK_BONUS_COINS_PER_WEEK);
    }

    None
}

pub fn is_milestone(streak: i32) -> bool {
    STREAK_MILESTONES.contains(&streak)
}
