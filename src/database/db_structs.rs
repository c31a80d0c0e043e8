use crate::model::structures::{
    category::Category, period_type::PeriodType, six_stats::SixStats, special_card::SpecialCard, stat::Stat, tier::Tier
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's live card. Created by the activity sync, rewritten by every weekly run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceProfile {
    pub user_id: i32,
    pub stats: SixStats,
    pub ovr: i32,
    pub tier: Tier,
    /// Positive: consecutive active weeks. Negative: consecutive inactive weeks.
    pub streak: i32,
    pub special_card: Option<SpecialCard>,
    pub prev_stats: SixStats,
    pub prev_ovr: i32,
    pub prev_tier: Tier,
    pub last_synced_at: Option<DateTime<Utc>>
}

/// A cached ride, as stored by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedActivity {
    pub user_id: i32,
    /// Meters
    pub distance: f64,
    /// Meters
    pub elevation_gain: f64,
    /// Meters per second
    pub avg_speed: f64,
    /// Meters per second
    pub max_speed: f64,
    /// Seconds
    pub elapsed_time: i32,
    pub start_date: DateTime<Utc>,
    pub activity_type: String
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RaceResult {
    pub user_id: i32,
    pub position: i32,
    pub field_size: i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatBoost {
    pub user_id: i32,
    pub stat: Stat,
    pub amount: i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodiumFinish {
    pub user_id: i32,
    pub position: i32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyHistoryRecord {
    pub user_id: i32,
    pub week_label: String,
    pub stats: SixStats,
    pub ovr: i32,
    pub tier: Tier,
    pub km: f64,
    pub elevation: f64,
    pub rides: i32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardSnapshot {
    pub user_id: i32,
    pub period_type: PeriodType,
    pub period_label: String,
    pub km: f64,
    pub elevation: f64,
    pub rides: i32,
    /// Overall rating at the time the snapshot was written
    pub ovr: i32,
    /// The most recent week folded into this snapshot
    pub last_week_label: String
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryWinner {
    pub week_label: String,
    pub category: Category,
    pub user_id: i32,
    pub value: i32
}

/// A multi-week competition that is still being scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct League {
    pub id: i32,
    pub name: String,
    pub duration_weeks: i32,
    pub weeks_scored: i32,
    /// Opening label of the week most recently scored
    pub last_scored_week: Option<String>
}

/// The six row sets a run starts from.
#[derive(Debug, Clone, Default)]
pub struct BulkData {
    pub profiles: Vec<PerformanceProfile>,
    pub weekly_activities: Vec<CachedActivity>,
    pub cached_activities: Vec<CachedActivity>,
    pub race_results: Vec<RaceResult>,
    pub boosts: Vec<StatBoost>,
    pub podiums: Vec<PodiumFinish>
}
