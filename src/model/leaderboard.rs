use indexmap::IndexMap;

use crate::{database::db_structs::LeaderboardSnapshot, model::structures::period_type::PeriodType};

/// Folds this run's weekly deltas into the prior monthly or yearly snapshots.
///
/// A prior snapshot that already includes `week_label` is a re-run of the same
/// week: its totals are kept and only the rating is refreshed, so replaying a
/// week never double-counts distance.
pub fn fold_cumulative(
    weekly: &[LeaderboardSnapshot],
    prior: Vec<LeaderboardSnapshot>,
    period_type: PeriodType,
    period_label: &str,
    week_label: &str
) -> Vec<LeaderboardSnapshot> {
    let prior: IndexMap<i32, LeaderboardSnapshot> = prior
        .into_iter()
        .filter(|s| s.period_type == period_type && s.period_label == period_label)
        .map(|s| (s.user_id, s))
        .collect();

    weekly
        .iter()
        .map(|delta| match prior.get(&delta.user_id) {
            Some(existing) if existing.last_week_label == week_label => LeaderboardSnapshot {
                ovr: delta.ovr,
                ..existing.clone()
            },
            Some(existing) => LeaderboardSnapshot {
                km: existing.km + delta.km,
                elevation: existing.elevation + delta.elevation,
                rides: existing.rides + delta.rides,
                ovr: delta.ovr,
                last_week_label: week_label.to_string(),
                ..existing.clone()
            },
            None => LeaderboardSnapshot {
                user_id: delta.user_id,
                period_type,
                period_label: period_label.to_string(),
                km: delta.km,
                elevation: delta.elevation,
                rides: delta.rides,
                ovr: delta.ovr,
                last_week_label: week_label.to_string()
            }
        })
        .collect()
}
