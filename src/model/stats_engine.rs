use crate::{
    database::db_structs::CachedActivity,
    model::{
        constants::{STAT_MAX, STAT_MIN, TIER_THRESHOLDS},
        structures::{six_stats::SixStats, tier::Tier}
    }
};

/// Derives a card from ride history. Implementations must be pure and deterministic:
/// the weekly run relies on a full recompute yielding identical output for identical input.
pub trait StatsEngine: Send + Sync {
    fn compute_stats(&self, activities: &[CachedActivity]) -> SixStats;

    fn compute_ovr(&self, stats: &SixStats) -> i32;

    fn tier(&self, ovr: i32) -> Tier {
        tier_for(ovr)
    }
}

/// Returns the band containing `ovr`.
pub fn tier_for(ovr: i32) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .find(|(threshold, _)| ovr >= *threshold)
        .map(|(_, tier)| *tier)
        .unwrap_or(Tier::Bronze)
}

/// Linear scales from ride aggregates onto the stat range.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStatsEngine;

impl DefaultStatsEngine {
    fn scale(value: f64, low: f64, high: f64) -> i32 {
        let ratio = ((value - low) / (high - low)).clamp(0.0, 1.0);
        let scaled = STAT_MIN as f64 + ratio * (STAT_MAX - STAT_MIN) as f64;

        scaled.round() as i32
    }

    fn mean(values: impl Iterator<Item = f64>) -> f64 {
        let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        if n == 0 {
            return 0.0;
        }

        sum / n as f64
    }
}

impl StatsEngine for DefaultStatsEngine {
    fn compute_stats(&self, activities: &[CachedActivity]) -> SixStats {
        if activities.is_empty() {
            return SixStats::uniform(STAT_MIN);
        }

        let avg_speed_kmh = Self::mean(activities.iter().map(|a| a.avg_speed * 3.6));
        let avg_distance_km = Self::mean(activities.iter().map(|a| a.distance / 1000.0));
        let total_km: f64 = activities.iter().map(|a| a.distance / 1000.0).sum();
        let total_climb: f64 = activities.iter().map(|a| a.elevation_gain).sum();
        let climb_per_km = if total_km > 0.0 { total_climb / total_km } else { 0.0 };
        let avg_hours = Self::mean(activities.iter().map(|a| a.elapsed_time as f64 / 3600.0));
        let top_speed_kmh = activities.iter().map(|a| a.max_speed * 3.6).fold(0.0, f64::max);

        SixStats {
            pace: Self::scale(avg_speed_kmh, 15.0, 42.0),
            endurance: Self::scale(avg_distance_km, 10.0, 160.0),
            mountain: Self::scale(climb_per_km, 0.0, 25.0),
            resistance: Self::scale(avg_hours, 0.5, 6.0),
            sprint: Self::scale(top_speed_kmh, 30.0, 80.0),
            technique: Self::scale(activities.len() as f64, 0.0, 50.0)
        }
    }

    fn compute_ovr(&self, stats: &SixStats) -> i32 {
        let sum: i32 = stats.iter().map(|(_, v)| v).sum();

        (sum as f64 / 6.0).round() as i32
    }
}
