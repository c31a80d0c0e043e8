use itertools::Itertools;
use std::collections::HashMap;

use crate::{
    database::db_structs::{BulkData, CachedActivity, PerformanceProfile, RaceResult, StatBoost},
    model::constants::{MAX_CACHED_ACTIVITIES, PODIUM_POSITION}
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeeklyTotals {
    pub km: f64,
    pub elevation: f64,
    pub rides: i32
}

/// Per-user lookup maps built from the bulk row sets. Each row set is scanned
/// exactly once; lookups afterwards are O(1).
#[derive(Debug, Default)]
pub struct AggregatedInputs {
    weekly: HashMap<i32, WeeklyTotals>,
    activities: HashMap<i32, Vec<CachedActivity>>,
    races: HashMap<i32, Vec<RaceResult>>,
    boosts: HashMap<i32, Vec<StatBoost>>,
    podiums: HashMap<i32, u32>
}

/// Borrowed view of everything the recompute step needs for one user.
#[derive(Debug, Clone, Copy)]
pub struct UserInputs<'a> {
    pub weekly: WeeklyTotals,
    pub activities: &'a [CachedActivity],
    pub races: &'a [RaceResult],
    pub boosts: &'a [StatBoost],
    pub podiums: u32
}

/// Splits the bulk data into the profiles to process and the aggregated inputs.
pub fn aggregate(data: BulkData) -> (Vec<PerformanceProfile>, AggregatedInputs) {
    let mut inputs = AggregatedInputs::default();

    for activity in &data.weekly_activities {
        let totals = inputs.weekly.entry(activity.user_id).or_default();
        totals.km += activity.distance / 1000.0;
        totals.elevation += activity.elevation_gain;
        totals.rides += 1;
    }

    // Rows arrive newest first per user; keep that order and drop the tail.
    for activity in data.cached_activities {
        let rides = inputs.activities.entry(activity.user_id).or_default();
        if rides.len() < MAX_CACHED_ACTIVITIES {
            rides.push(activity);
        }
    }

    inputs.races = data.race_results.into_iter().into_group_map_by(|r| r.user_id);
    inputs.boosts = data.boosts.into_iter().into_group_map_by(|b| b.user_id);
    inputs.podiums = data
        .podiums
        .iter()
        .filter(|p| p.position <= PODIUM_POSITION)
        .counts_by(|p| p.user_id)
        .into_iter()
        .map(|(user_id, count)| (user_id, count as u32))
        .collect();

    (data.profiles, inputs)
}

impl AggregatedInputs {
    pub fn for_user(&self, user_id: i32) -> UserInputs<'_> {
        UserInputs {
            weekly: self.weekly.get(&user_id).copied().unwrap_or_default(),
            activities: self.activities.get(&user_id).map(Vec::as_slice).unwrap_or(&[]),
            races: self.races.get(&user_id).map(Vec::as_slice).unwrap_or(&[]),
            boosts: self.boosts.get(&user_id).map(Vec::as_slice).unwrap_or(&[]),
            podiums: self.podiums.get(&user_id).copied().unwrap_or(0)
        }
    }
}
