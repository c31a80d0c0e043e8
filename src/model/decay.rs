use crate::model::{
    constants::{DECAY_FACTOR, DECAY_MAX_WEEKS, STAT_MIN},
    structures::six_stats::SixStats
};

/// # How this works
/// - This gets called once per weekly run for every user who rode nothing
///     during the trailing week.
/// - The number of weeks the user has already been inactive is read from the
///     sign of their streak *before* this run: a streak of -2 means two prior
///     inactive weeks, any positive streak means zero.
/// - While that count is below [`DECAY_MAX_WEEKS`], every stat is multiplied by
///     [`DECAY_FACTOR`], rounded to the nearest integer and floored at [`STAT_MIN`].
///
/// # Rules
/// - The first inactive week after an active streak decays (the prior streak is positive).
/// - After four applications the card is frozen until the user rides again.
///
/// Returns the decayed stats, or `None` if decay does not apply.
pub fn decay(stats: &SixStats, previous_streak: i32) -> Option<SixStats> {
    if decay_impossible(previous_streak) {
        return None;
    }

    Some(stats.map(decay_stat))
}

/// Weeks of inactivity before this run
pub fn weeks_inactive(previous_streak: i32) -> i32 {
    (-previous_streak).max(0)
}

fn decay_impossible(previous_streak: i32) -> bool {
    weeks_inactive(previous_streak) >= DECAY_MAX_WEEKS
}

fn decay_stat(value: i32) -> i32 {
    let decayed = (value as f64 * DECAY_FACTOR).round() as i32;

    decayed.max(STAT_MIN)
}
