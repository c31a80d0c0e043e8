use super::{
    db_structs::{
        CachedActivity, CategoryWinner, LeaderboardSnapshot, League, PerformanceProfile, PodiumFinish, RaceResult,
        StatBoost, WeeklyHistoryRecord
    },
    store::WeeklyStore
};
use crate::{
    error::{ProcessorError, Result},
    model::{
        constants::{PODIUM_POSITION, RIDE_TYPES},
        structures::{period_type::PeriodType, six_stats::SixStats, stat::Stat, tier::Tier}
    }
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{str::FromStr, sync::Arc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client)
        })
    }

    // Access the underlying Client
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }

    fn ride_types() -> Vec<String> {
        RIDE_TYPES.iter().map(|t| t.to_string()).collect()
    }

    fn profile_from_row(row: &Row) -> Result<PerformanceProfile> {
        Ok(PerformanceProfile {
            user_id: row.try_get("user_id")?,
            stats: Self::stats_from_row(row, "")?,
            ovr: row.try_get("ovr")?,
            tier: parse_column("tier", row.try_get("tier")?)?,
            streak: row.try_get("streak")?,
            special_card: row
                .try_get::<_, Option<String>>("special_card")?
                .map(|card| parse_column("special_card", card))
                .transpose()?,
            prev_stats: Self::stats_from_row(row, "prev_")?,
            prev_ovr: row.try_get("prev_ovr")?,
            prev_tier: parse_column("prev_tier", row.try_get("prev_tier")?)?,
            last_synced_at: row.try_get("last_synced_at")?
        })
    }

    fn stats_from_row(row: &Row, prefix: &str) -> Result<SixStats> {
        let column = |stat: &str| format!("{}{}", prefix, stat);

        Ok(SixStats {
            pace: row.try_get(column("pace").as_str())?,
            endurance: row.try_get(column("endurance").as_str())?,
            mountain: row.try_get(column("mountain").as_str())?,
            resistance: row.try_get(column("resistance").as_str())?,
            sprint: row.try_get(column("sprint").as_str())?,
            technique: row.try_get(column("technique").as_str())?
        })
    }

    fn activity_from_row(row: &Row) -> Result<CachedActivity> {
        Ok(CachedActivity {
            user_id: row.try_get("user_id")?,
            distance: row.try_get("distance")?,
            elevation_gain: row.try_get("elevation_gain")?,
            avg_speed: row.try_get("avg_speed")?,
            max_speed: row.try_get("max_speed")?,
            elapsed_time: row.try_get("elapsed_time")?,
            start_date: row.try_get("start_date")?,
            activity_type: row.try_get("activity_type")?
        })
    }

    fn snapshot_from_row(row: &Row) -> Result<LeaderboardSnapshot> {
        Ok(LeaderboardSnapshot {
            user_id: row.try_get("user_id")?,
            period_type: parse_column("period_type", row.try_get("period_type")?)?,
            period_label: row.try_get("period_label")?,
            km: row.try_get("km")?,
            elevation: row.try_get("elevation")?,
            rides: row.try_get("rides")?,
            ovr: row.try_get("ovr")?,
            last_week_label: row.try_get("last_week_label")?
        })
    }

    /// Writes history rows with a single UNNEST statement. `on_conflict` decides whether
    /// existing rows are kept or overwritten.
    async fn write_history(&self, records: &[WeeklyHistoryRecord], on_conflict: &str) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns = HistoryColumns::from(records);
        let query = format!(
            "INSERT INTO weekly_history (user_id, week_label, pace, endurance, mountain, resistance, sprint, \
             technique, ovr, tier, km, elevation, rides) \
             SELECT * FROM UNNEST($1::int4[], $2::text[], $3::int4[], $4::int4[], $5::int4[], $6::int4[], \
             $7::int4[], $8::int4[], $9::int4[], $10::text[], $11::float8[], $12::float8[], $13::int4[]) \
             ON CONFLICT (user_id, week_label) {}",
            on_conflict
        );

        let written = self
            .client
            .execute(
                query.as_str(),
                &[
                    &columns.user_ids,
                    &columns.week_labels,
                    &columns.stats.pace,
                    &columns.stats.endurance,
                    &columns.stats.mountain,
                    &columns.stats.resistance,
                    &columns.stats.sprint,
                    &columns.stats.technique,
                    &columns.ovrs,
                    &columns.tiers,
                    &columns.kms,
                    &columns.elevations,
                    &columns.rides
                ]
            )
            .await?;

        Ok(written)
    }
}

#[async_trait]
impl WeeklyStore for DbClient {
    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let ttl_seconds = ttl.num_seconds() as f64;
        let row = self
            .client
            .query_opt(
                "INSERT INTO run_leases (name, owner, acquired_at, expires_at) \
                 VALUES ($1, $2, now(), now() + make_interval(secs => $3)) \
                 ON CONFLICT (name) DO UPDATE SET owner = EXCLUDED.owner, \
                 acquired_at = EXCLUDED.acquired_at, expires_at = EXCLUDED.expires_at \
                 WHERE run_leases.expires_at < now() \
                 RETURNING owner",
                &[&name, &owner, &ttl_seconds]
            )
            .await?;

        Ok(row.is_some())
    }

    async fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        self.client
            .execute("DELETE FROM run_leases WHERE name = $1 AND owner = $2", &[&name, &owner])
            .await?;

        Ok(())
    }

    async fn get_profiles(&self) -> Result<Vec<PerformanceProfile>> {
        info!("Fetching performance profiles...");
        let rows = self
            .client
            .query(
                "SELECT user_id, pace, endurance, mountain, resistance, sprint, technique, ovr, tier, streak, \
                 special_card, prev_pace, prev_endurance, prev_mountain, prev_resistance, prev_sprint, \
                 prev_technique, prev_ovr, prev_tier, last_synced_at \
                 FROM performance_profiles ORDER BY user_id",
                &[]
            )
            .await?;

        let profiles = rows.iter().map(Self::profile_from_row).collect::<Result<Vec<_>>>()?;
        info!("Fetched {} profiles", profiles.len());

        Ok(profiles)
    }

    async fn get_activities_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<CachedActivity>> {
        let rows = self
            .client
            .query(
                "SELECT user_id, distance, elevation_gain, avg_speed, max_speed, elapsed_time, start_date, \
                 type AS activity_type \
                 FROM activities WHERE start_date >= $1 AND start_date < $2 AND type = ANY($3) \
                 ORDER BY user_id, start_date DESC",
                &[&since, &until, &Self::ride_types()]
            )
            .await?;

        debug!("Fetched {} activities between {} and {}", rows.len(), since, until);
        rows.iter().map(Self::activity_from_row).collect()
    }

    async fn get_recent_activities(&self, per_user: usize, before: DateTime<Utc>) -> Result<Vec<CachedActivity>> {
        let limit = per_user as i64;
        let rows = self
            .client
            .query(
                "SELECT user_id, distance, elevation_gain, avg_speed, max_speed, elapsed_time, start_date, \
                 activity_type FROM ( \
                     SELECT a.user_id, a.distance, a.elevation_gain, a.avg_speed, a.max_speed, a.elapsed_time, \
                     a.start_date, a.type AS activity_type, \
                     ROW_NUMBER() OVER (PARTITION BY a.user_id ORDER BY a.start_date DESC) AS rn \
                     FROM activities a WHERE a.type = ANY($2) AND a.start_date < $3 \
                 ) ranked WHERE rn <= $1 \
                 ORDER BY user_id, start_date DESC",
                &[&limit, &Self::ride_types(), &before]
            )
            .await?;

        debug!("Fetched {} cached activities", rows.len());
        rows.iter().map(Self::activity_from_row).collect()
    }

    async fn get_race_results_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<RaceResult>> {
        let rows = self
            .client
            .query(
                "SELECT user_id, position, field_size FROM race_results \
                 WHERE finished_at >= $1 AND finished_at < $2 ORDER BY finished_at, user_id",
                &[&since, &until]
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(RaceResult {
                    user_id: row.try_get("user_id")?,
                    position: row.try_get("position")?,
                    field_size: row.try_get("field_size")?
                })
            })
            .collect()
    }

    async fn get_active_boosts(&self, at: DateTime<Utc>) -> Result<Vec<StatBoost>> {
        let rows = self
            .client
            .query(
                "SELECT user_id, stat, amount FROM stat_boosts WHERE expires_at > $1 ORDER BY id",
                &[&at]
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(StatBoost {
                    user_id: row.try_get("user_id")?,
                    stat: parse_column::<Stat>("stat", row.try_get("stat")?)?,
                    amount: row.try_get("amount")?
                })
            })
            .collect()
    }

    async fn get_podium_finishes(&self) -> Result<Vec<PodiumFinish>> {
        let rows = self
            .client
            .query(
                "SELECT user_id, position FROM race_results WHERE position BETWEEN 1 AND $1",
                &[&PODIUM_POSITION]
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(PodiumFinish {
                    user_id: row.try_get("user_id")?,
                    position: row.try_get("position")?
                })
            })
            .collect()
    }

    async fn insert_history_if_absent(&self, records: &[WeeklyHistoryRecord]) -> Result<u64> {
        self.write_history(records, "DO NOTHING").await
    }

    async fn upsert_history(&self, records: &[WeeklyHistoryRecord]) -> Result<u64> {
        self.write_history(
            records,
            "DO UPDATE SET pace = EXCLUDED.pace, endurance = EXCLUDED.endurance, mountain = EXCLUDED.mountain, \
             resistance = EXCLUDED.resistance, sprint = EXCLUDED.sprint, technique = EXCLUDED.technique, \
             ovr = EXCLUDED.ovr, tier = EXCLUDED.tier, km = EXCLUDED.km, elevation = EXCLUDED.elevation, \
             rides = EXCLUDED.rides"
        )
        .await
    }

    async fn upsert_profiles(&self, profiles: &[PerformanceProfile]) -> Result<u64> {
        if profiles.is_empty() {
            return Ok(0);
        }

        let user_ids: Vec<i32> = profiles.iter().map(|p| p.user_id).collect();
        let stats = StatColumns::from_iter(profiles.iter().map(|p| &p.stats));
        let ovrs: Vec<i32> = profiles.iter().map(|p| p.ovr).collect();
        let tiers: Vec<String> = profiles.iter().map(|p| p.tier.to_string()).collect();
        let streaks: Vec<i32> = profiles.iter().map(|p| p.streak).collect();
        let special_cards: Vec<Option<String>> =
            profiles.iter().map(|p| p.special_card.map(|c| c.to_string())).collect();
        let prev_stats = StatColumns::from_iter(profiles.iter().map(|p| &p.prev_stats));
        let prev_ovrs: Vec<i32> = profiles.iter().map(|p| p.prev_ovr).collect();
        let prev_tiers: Vec<String> = profiles.iter().map(|p| p.prev_tier.to_string()).collect();
        let synced: Vec<Option<DateTime<Utc>>> = profiles.iter().map(|p| p.last_synced_at).collect();

        let written = self
            .client
            .execute(
                "INSERT INTO performance_profiles (user_id, pace, endurance, mountain, resistance, sprint, \
                 technique, ovr, tier, streak, special_card, prev_pace, prev_endurance, prev_mountain, \
                 prev_resistance, prev_sprint, prev_technique, prev_ovr, prev_tier, last_synced_at) \
                 SELECT * FROM UNNEST($1::int4[], $2::int4[], $3::int4[], $4::int4[], $5::int4[], $6::int4[], \
                 $7::int4[], $8::int4[], $9::text[], $10::int4[], $11::text[], $12::int4[], $13::int4[], \
                 $14::int4[], $15::int4[], $16::int4[], $17::int4[], $18::int4[], $19::text[], \
                 $20::timestamptz[]) \
                 ON CONFLICT (user_id) DO UPDATE SET pace = EXCLUDED.pace, endurance = EXCLUDED.endurance, \
                 mountain = EXCLUDED.mountain, resistance = EXCLUDED.resistance, sprint = EXCLUDED.sprint, \
                 technique = EXCLUDED.technique, ovr = EXCLUDED.ovr, tier = EXCLUDED.tier, \
                 streak = EXCLUDED.streak, special_card = EXCLUDED.special_card, \
                 prev_pace = EXCLUDED.prev_pace, prev_endurance = EXCLUDED.prev_endurance, \
                 prev_mountain = EXCLUDED.prev_mountain, prev_resistance = EXCLUDED.prev_resistance, \
                 prev_sprint = EXCLUDED.prev_sprint, prev_technique = EXCLUDED.prev_technique, \
                 prev_ovr = EXCLUDED.prev_ovr, prev_tier = EXCLUDED.prev_tier, \
                 last_synced_at = EXCLUDED.last_synced_at",
                &[
                    &user_ids,
                    &stats.pace,
                    &stats.endurance,
                    &stats.mountain,
                    &stats.resistance,
                    &stats.sprint,
                    &stats.technique,
                    &ovrs,
                    &tiers,
                    &streaks,
                    &special_cards,
                    &prev_stats.pace,
                    &prev_stats.endurance,
                    &prev_stats.mountain,
                    &prev_stats.resistance,
                    &prev_stats.sprint,
                    &prev_stats.technique,
                    &prev_ovrs,
                    &prev_tiers,
                    &synced
                ]
            )
            .await?;

        Ok(written)
    }

    async fn upsert_leaderboard(&self, snapshots: &[LeaderboardSnapshot]) -> Result<u64> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let user_ids: Vec<i32> = snapshots.iter().map(|s| s.user_id).collect();
        let period_types: Vec<String> = snapshots.iter().map(|s| s.period_type.to_string()).collect();
        let period_labels: Vec<&str> = snapshots.iter().map(|s| s.period_label.as_str()).collect();
        let kms: Vec<f64> = snapshots.iter().map(|s| s.km).collect();
        let elevations: Vec<f64> = snapshots.iter().map(|s| s.elevation).collect();
        let rides: Vec<i32> = snapshots.iter().map(|s| s.rides).collect();
        let ovrs: Vec<i32> = snapshots.iter().map(|s| s.ovr).collect();
        let last_weeks: Vec<&str> = snapshots.iter().map(|s| s.last_week_label.as_str()).collect();

        let written = self
            .client
            .execute(
                "INSERT INTO leaderboard_snapshots (user_id, period_type, period_label, km, elevation, rides, ovr, \
                 last_week_label) \
                 SELECT * FROM UNNEST($1::int4[], $2::text[], $3::text[], $4::float8[], $5::float8[], \
                 $6::int4[], $7::int4[], $8::text[]) \
                 ON CONFLICT (user_id, period_type, period_label) DO UPDATE SET km = EXCLUDED.km, \
                 elevation = EXCLUDED.elevation, rides = EXCLUDED.rides, ovr = EXCLUDED.ovr, \
                 last_week_label = EXCLUDED.last_week_label",
                &[
                    &user_ids,
                    &period_types,
                    &period_labels,
                    &kms,
                    &elevations,
                    &rides,
                    &ovrs,
                    &last_weeks
                ]
            )
            .await?;

        Ok(written)
    }

    async fn upsert_category_winners(&self, winners: &[CategoryWinner]) -> Result<u64> {
        if winners.is_empty() {
            return Ok(0);
        }

        let week_labels: Vec<&str> = winners.iter().map(|w| w.week_label.as_str()).collect();
        let categories: Vec<String> = winners.iter().map(|w| w.category.to_string()).collect();
        let user_ids: Vec<i32> = winners.iter().map(|w| w.user_id).collect();
        let values: Vec<i32> = winners.iter().map(|w| w.value).collect();

        let written = self
            .client
            .execute(
                "INSERT INTO category_winners (week_label, category, user_id, value) \
                 SELECT * FROM UNNEST($1::text[], $2::text[], $3::int4[], $4::int4[]) \
                 ON CONFLICT (week_label, category) DO UPDATE SET user_id = EXCLUDED.user_id, \
                 value = EXCLUDED.value",
                &[&week_labels, &categories, &user_ids, &values]
            )
            .await?;

        Ok(written)
    }

    async fn get_leaderboard_snapshots(
        &self,
        period_type: PeriodType,
        period_label: &str
    ) -> Result<Vec<LeaderboardSnapshot>> {
        let rows = self
            .client
            .query(
                "SELECT user_id, period_type, period_label, km, elevation, rides, ovr, last_week_label \
                 FROM leaderboard_snapshots WHERE period_type = $1 AND period_label = $2",
                &[&period_type.to_string(), &period_label]
            )
            .await?;

        rows.iter().map(Self::snapshot_from_row).collect()
    }

    async fn get_active_leagues(&self) -> Result<Vec<League>> {
        let rows = self
            .client
            .query(
                "SELECT id, name, duration_weeks, weeks_scored, last_scored_week FROM leagues \
                 WHERE status = 'active' ORDER BY id",
                &[]
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(League {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    duration_weeks: row.try_get("duration_weeks")?,
                    weeks_scored: row.try_get("weeks_scored")?,
                    last_scored_week: row.try_get("last_scored_week")?
                })
            })
            .collect()
    }

    async fn record_league_week(
        &self,
        league_id: i32,
        weeks_scored: i32,
        week_label: &str,
        finished: bool
    ) -> Result<()> {
        let status = if finished { "finished" } else { "active" };
        self.client
            .execute(
                "UPDATE leagues SET weeks_scored = $2, last_scored_week = $3, status = $4 WHERE id = $1",
                &[&league_id, &weeks_scored, &week_label, &status]
            )
            .await?;

        Ok(())
    }

    async fn grant_league_transfers(&self, league_id: i32, transfers: i32) -> Result<u64> {
        let granted = self
            .client
            .execute(
                "UPDATE league_members SET transfers_remaining = $2 WHERE league_id = $1",
                &[&league_id, &transfers]
            )
            .await?;

        Ok(granted)
    }
}

/// Column-major copy of a set of stat lines, one array per stat for UNNEST
#[derive(Default)]
struct StatColumns {
    pace: Vec<i32>,
    endurance: Vec<i32>,
    mountain: Vec<i32>,
    resistance: Vec<i32>,
    sprint: Vec<i32>,
    technique: Vec<i32>
}

impl<'a> FromIterator<&'a SixStats> for StatColumns {
    fn from_iter<I: IntoIterator<Item = &'a SixStats>>(iter: I) -> Self {
        let mut columns = StatColumns::default();
        for stats in iter {
            columns.pace.push(stats.pace);
            columns.endurance.push(stats.endurance);
            columns.mountain.push(stats.mountain);
            columns.resistance.push(stats.resistance);
            columns.sprint.push(stats.sprint);
            columns.technique.push(stats.technique);
        }
        columns
    }
}

struct HistoryColumns<'a> {
    user_ids: Vec<i32>,
    week_labels: Vec<&'a str>,
    stats: StatColumns,
    ovrs: Vec<i32>,
    tiers: Vec<String>,
    kms: Vec<f64>,
    elevations: Vec<f64>,
    rides: Vec<i32>
}

impl<'a> From<&'a [WeeklyHistoryRecord]> for HistoryColumns<'a> {
    fn from(records: &'a [WeeklyHistoryRecord]) -> Self {
        HistoryColumns {
            user_ids: records.iter().map(|r| r.user_id).collect(),
            week_labels: records.iter().map(|r| r.week_label.as_str()).collect(),
            stats: records.iter().map(|r| &r.stats).collect(),
            ovrs: records.iter().map(|r| r.ovr).collect(),
            tiers: records.iter().map(|r| r.tier.to_string()).collect(),
            kms: records.iter().map(|r| r.km).collect(),
            elevations: records.iter().map(|r| r.elevation).collect(),
            rides: records.iter().map(|r| r.rides).collect()
        }
    }
}

fn parse_column<T: FromStr>(column: &'static str, value: String) -> Result<T> {
    T::from_str(&value).map_err(|_| ProcessorError::InvalidColumn { column, value })
}
