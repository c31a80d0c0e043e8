use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::db_structs::{
    CachedActivity, CategoryWinner, LeaderboardSnapshot, League, PerformanceProfile, PodiumFinish, RaceResult,
    StatBoost, WeeklyHistoryRecord
};
use crate::{error::Result, model::structures::period_type::PeriodType};

/// The relational store a weekly run reads from and writes to.
///
/// Reads are bulk: each returns one flat row set for the whole population.
/// Writes take a chunk of rows and upsert them on their natural key, returning
/// the number of rows affected.
#[async_trait]
pub trait WeeklyStore: Send + Sync {
    /// Takes the named lease for `owner` if it is free or expired. Returns false when
    /// another owner holds an unexpired lease.
    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    async fn release_lease(&self, name: &str, owner: &str) -> Result<()>;

    async fn get_profiles(&self) -> Result<Vec<PerformanceProfile>>;

    /// Rides started in `[since, until)`
    async fn get_activities_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<CachedActivity>>;

    /// At most `per_user` rides per user started before `before`, newest first within each user
    async fn get_recent_activities(&self, per_user: usize, before: DateTime<Utc>) -> Result<Vec<CachedActivity>>;

    /// Races finished in `[since, until)`
    async fn get_race_results_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<RaceResult>>;

    /// Boosts that have not expired at `at`
    async fn get_active_boosts(&self, at: DateTime<Utc>) -> Result<Vec<StatBoost>>;

    /// Every podium finish, all time
    async fn get_podium_finishes(&self) -> Result<Vec<PodiumFinish>>;

    /// Writes rows whose (user_id, week_label) does not exist yet. Existing rows are untouched.
    async fn insert_history_if_absent(&self, records: &[WeeklyHistoryRecord]) -> Result<u64>;

    async fn upsert_history(&self, records: &[WeeklyHistoryRecord]) -> Result<u64>;

    async fn upsert_profiles(&self, profiles: &[PerformanceProfile]) -> Result<u64>;

    async fn upsert_leaderboard(&self, snapshots: &[LeaderboardSnapshot]) -> Result<u64>;

    async fn upsert_category_winners(&self, winners: &[CategoryWinner]) -> Result<u64>;

    async fn get_leaderboard_snapshots(
        &self,
        period_type: PeriodType,
        period_label: &str
    ) -> Result<Vec<LeaderboardSnapshot>>;

    async fn get_active_leagues(&self) -> Result<Vec<League>>;

    /// Records that `weeks_scored` weeks of the league are now scored, the last one under
    /// `week_label`, closing the league if `finished`.
    async fn record_league_week(
        &self,
        league_id: i32,
        weeks_scored: i32,
        week_label: &str,
        finished: bool
    ) -> Result<()>;

    /// Resets every member's transfer allowance for the new week
    async fn grant_league_transfers(&self, league_id: i32, transfers: i32) -> Result<u64>;
}
