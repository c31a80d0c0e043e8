use crate::{
    collaborators::{
        CacheLayer, CoinLedger, CollaboratorError, Collaborators, LeagueService, NotificationFeed, QuestService,
        SeasonRanking
    },
    database::{
        db_structs::{
            CachedActivity, CategoryWinner, LeaderboardSnapshot, League, PerformanceProfile, PodiumFinish, RaceResult,
            StatBoost, WeeklyHistoryRecord
        },
        store::WeeklyStore
    },
    error::{ProcessorError, Result},
    model::{
        constants::PODIUM_POSITION,
        effects::{CoinReason, NotificationKind},
        race_bonus::DefaultRaceBonus,
        recompute::UserOutcome,
        stats_engine::{tier_for, DefaultStatsEngine},
        structures::{period_type::PeriodType, six_stats::SixStats},
        week::WeekWindow
    }
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard}
};

/// Monday 2026-10-12 04:00 UTC, the start of 2026-W42
pub fn test_as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 4, 0, 0).unwrap()
}

pub fn test_window() -> WeekWindow {
    WeekWindow::new(test_as_of())
}

/// A one-hour ride started a day before the test reference instant
pub fn generate_activity(user_id: i32, distance_m: f64, elevation: f64) -> CachedActivity {
    CachedActivity {
        user_id,
        distance: distance_m,
        elevation_gain: elevation,
        avg_speed: distance_m / 3600.0,
        max_speed: distance_m / 3600.0 * 1.8,
        elapsed_time: 3600,
        start_date: test_as_of() - Duration::days(1),
        activity_type: "Ride".to_string()
    }
}

/// `n` seeded rides for one user, newest first, twelve hours apart
pub fn generate_activities(user_id: i32, n: usize, seed: u64) -> Vec<CachedActivity> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let distance = rng.random_range(8_000.0..=140_000.0);
            let avg_speed = rng.random_range(4.5..=11.0);
            let elapsed = (distance / avg_speed) as i32;

            CachedActivity {
                user_id,
                distance,
                elevation_gain: rng.random_range(0.0..=2_500.0),
                avg_speed,
                max_speed: avg_speed + rng.random_range(2.0..=10.0),
                elapsed_time: elapsed,
                start_date: test_as_of() - Duration::hours(12 * (i as i64 + 1)),
                activity_type: "Ride".to_string()
            }
        })
        .collect()
}

/// A card with every stat and the overall rating at `value`
pub fn generate_profile(user_id: i32, value: i32, streak: i32) -> PerformanceProfile {
    let stats = SixStats::uniform(value);

    PerformanceProfile {
        user_id,
        stats,
        ovr: value,
        tier: tier_for(value),
        streak,
        special_card: None,
        prev_stats: stats,
        prev_ovr: value,
        prev_tier: tier_for(value),
        last_synced_at: None
    }
}

/// A recomputed outcome that moved the overall rating from `prev_ovr` to `new_ovr`
pub fn generate_outcome(user_id: i32, prev_ovr: i32, new_ovr: i32) -> UserOutcome {
    let window = test_window();
    let mut profile = generate_profile(user_id, new_ovr, 1);
    profile.prev_stats = SixStats::uniform(prev_ovr);
    profile.prev_ovr = prev_ovr;
    profile.prev_tier = tier_for(prev_ovr);
    profile.last_synced_at = Some(window.as_of);

    let record = |label: &str, stats: SixStats, ovr: i32| WeeklyHistoryRecord {
        user_id,
        week_label: label.to_string(),
        stats,
        ovr,
        tier: tier_for(ovr),
        km: 0.0,
        elevation: 0.0,
        rides: 0
    };

    UserOutcome {
        closing: record(&window.closing_label, profile.prev_stats, prev_ovr),
        opening: record(&window.opening_label, profile.stats, new_ovr),
        weekly: LeaderboardSnapshot {
            user_id,
            period_type: PeriodType::Weekly,
            period_label: window.opening_label.clone(),
            km: 0.0,
            elevation: 0.0,
            rides: 0,
            ovr: new_ovr,
            last_week_label: window.opening_label.clone()
        },
        profile,
        effects: Vec::new(),
        active: false,
        decayed: false
    }
}

/// Row sets held by [`MemoryStore`], keyed the way the relational schema keys them
#[derive(Debug, Default)]
pub struct MemoryState {
    pub profiles: BTreeMap<i32, PerformanceProfile>,
    pub activities: Vec<CachedActivity>,
    pub races: Vec<(RaceResult, DateTime<Utc>)>,
    pub boosts: Vec<(StatBoost, DateTime<Utc>)>,
    pub history: BTreeMap<(i32, String), WeeklyHistoryRecord>,
    pub leaderboard: BTreeMap<(i32, String, String), LeaderboardSnapshot>,
    pub winners: BTreeMap<(String, String), CategoryWinner>,
    pub leagues: Vec<MemoryLeague>,
    pub leases: HashMap<String, (String, DateTime<Utc>)>,
    /// Number of write calls that reached the store, successful or not
    pub write_calls: usize
}

#[derive(Debug, Clone)]
pub struct MemoryLeague {
    pub league: League,
    pub finished: bool,
    pub transfers_remaining: i32
}

#[derive(Debug, Default)]
struct FailurePlan {
    reads: bool,
    profile_writes_for: Option<i32>
}

/// In-process [`WeeklyStore`] for unit and integration tests
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failures: Mutex<FailurePlan>
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn with_profiles(profiles: Vec<PerformanceProfile>) -> MemoryStore {
        let store = MemoryStore::new();
        store.state().profiles = profiles.into_iter().map(|p| (p.user_id, p)).collect();
        store
    }

    pub fn add_activities(&self, activities: Vec<CachedActivity>) {
        self.state().activities.extend(activities);
    }

    pub fn add_race(&self, result: RaceResult, finished_at: DateTime<Utc>) {
        self.state().races.push((result, finished_at));
    }

    pub fn add_boost(&self, boost: StatBoost, expires_at: DateTime<Utc>) {
        self.state().boosts.push((boost, expires_at));
    }

    pub fn add_league(&self, league: League) {
        self.state().leagues.push(MemoryLeague {
            league,
            finished: false,
            transfers_remaining: 0
        });
    }

    /// Every bulk read fails from now on
    pub fn fail_reads(&self) {
        self.failures.lock().unwrap().reads = true;
    }

    /// Any profile chunk containing `user_id` fails to write
    pub fn fail_profile_writes_for(&self, user_id: i32) {
        self.failures.lock().unwrap().profile_writes_for = Some(user_id);
    }

    pub fn profile(&self, user_id: i32) -> Option<PerformanceProfile> {
        self.state().profiles.get(&user_id).cloned()
    }

    pub fn history(&self, user_id: i32, week_label: &str) -> Option<WeeklyHistoryRecord> {
        self.state().history.get(&(user_id, week_label.to_string())).cloned()
    }

    pub fn snapshot(&self, user_id: i32, period_type: PeriodType, period_label: &str) -> Option<LeaderboardSnapshot> {
        self.state()
            .leaderboard
            .get(&(user_id, period_type.to_string(), period_label.to_string()))
            .cloned()
    }

    fn check_reads(&self) -> Result<()> {
        if self.failures.lock().unwrap().reads {
            return Err(ProcessorError::Unavailable("injected read failure".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl WeeklyStore for MemoryStore {
    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut state = self.state();

        let held_elsewhere = state
            .leases
            .get(name)
            .is_some_and(|(holder, expires_at)| holder != owner && *expires_at > now);
        if held_elsewhere {
            return Ok(false);
        }

        state.leases.insert(name.to_string(), (owner.to_string(), now + ttl));
        Ok(true)
    }

    async fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        let mut state = self.state();
        if state.leases.get(name).is_some_and(|(holder, _)| holder == owner) {
            state.leases.remove(name);
        }

        Ok(())
    }

    async fn get_profiles(&self) -> Result<Vec<PerformanceProfile>> {
        self.check_reads()?;
        Ok(self.state().profiles.values().cloned().collect())
    }

    async fn get_activities_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<CachedActivity>> {
        self.check_reads()?;
        let mut rides: Vec<CachedActivity> = self
            .state()
            .activities
            .iter()
            .filter(|a| a.start_date >= since && a.start_date < until)
            .cloned()
            .collect();
        rides.sort_by(|a, b| a.user_id.cmp(&b.user_id).then(b.start_date.cmp(&a.start_date)));

        Ok(rides)
    }

    async fn get_recent_activities(&self, per_user: usize, before: DateTime<Utc>) -> Result<Vec<CachedActivity>> {
        self.check_reads()?;
        let mut rides: Vec<CachedActivity> = self
            .state()
            .activities
            .iter()
            .filter(|a| a.start_date < before)
            .cloned()
            .collect();
        rides.sort_by(|a, b| a.user_id.cmp(&b.user_id).then(b.start_date.cmp(&a.start_date)));

        let mut taken: HashMap<i32, usize> = HashMap::new();
        rides.retain(|a| {
            let count = taken.entry(a.user_id).or_default();
            *count += 1;
            *count <= per_user
        });

        Ok(rides)
    }

    async fn get_race_results_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<RaceResult>> {
        self.check_reads()?;
        Ok(self
            .state()
            .races
            .iter()
            .filter(|(_, at)| *at >= since && *at < until)
            .map(|(race, _)| *race)
            .collect())
    }

    async fn get_active_boosts(&self, at: DateTime<Utc>) -> Result<Vec<StatBoost>> {
        self.check_reads()?;
        Ok(self
            .state()
            .boosts
            .iter()
            .filter(|(_, expires_at)| *expires_at > at)
            .map(|(boost, _)| *boost)
            .collect())
    }

    async fn get_podium_finishes(&self) -> Result<Vec<PodiumFinish>> {
        self.check_reads()?;
        Ok(self
            .state()
            .races
            .iter()
            .filter(|(race, _)| (1..=PODIUM_POSITION).contains(&race.position))
            .map(|(race, _)| PodiumFinish {
                user_id: race.user_id,
                position: race.position
            })
            .collect())
    }

    async fn insert_history_if_absent(&self, records: &[WeeklyHistoryRecord]) -> Result<u64> {
        let mut state = self.state();
        state.write_calls += 1;

        let mut written = 0;
        for record in records {
            let key = (record.user_id, record.week_label.clone());
            if !state.history.contains_key(&key) {
                state.history.insert(key, record.clone());
                written += 1;
            }
        }

        Ok(written)
    }

    async fn upsert_history(&self, records: &[WeeklyHistoryRecord]) -> Result<u64> {
        let mut state = self.state();
        state.write_calls += 1;

        for record in records {
            state
                .history
                .insert((record.user_id, record.week_label.clone()), record.clone());
        }

        Ok(records.len() as u64)
    }

    async fn upsert_profiles(&self, profiles: &[PerformanceProfile]) -> Result<u64> {
        let failing = self.failures.lock().unwrap().profile_writes_for;
        let mut state = self.state();
        state.write_calls += 1;

        if let Some(user_id) = failing {
            if profiles.iter().any(|p| p.user_id == user_id) {
                return Err(ProcessorError::Unavailable(format!(
                    "injected write failure for user {}",
                    user_id
                )));
            }
        }

        for profile in profiles {
            state.profiles.insert(profile.user_id, profile.clone());
        }

        Ok(profiles.len() as u64)
    }

    async fn upsert_leaderboard(&self, snapshots: &[LeaderboardSnapshot]) -> Result<u64> {
        let mut state = self.state();
        state.write_calls += 1;

        for snapshot in snapshots {
            let key = (
                snapshot.user_id,
                snapshot.period_type.to_string(),
                snapshot.period_label.clone()
            );
            state.leaderboard.insert(key, snapshot.clone());
        }

        Ok(snapshots.len() as u64)
    }

    async fn upsert_category_winners(&self, winners: &[CategoryWinner]) -> Result<u64> {
        let mut state = self.state();
        state.write_calls += 1;

        for winner in winners {
            let key = (winner.week_label.clone(), winner.category.to_string());
            state.winners.insert(key, winner.clone());
        }

        Ok(winners.len() as u64)
    }

    async fn get_leaderboard_snapshots(
        &self,
        period_type: PeriodType,
        period_label: &str
    ) -> Result<Vec<LeaderboardSnapshot>> {
        self.check_reads()?;
        Ok(self
            .state()
            .leaderboard
            .values()
            .filter(|s| s.period_type == period_type && s.period_label == period_label)
            .cloned()
            .collect())
    }

    async fn get_active_leagues(&self) -> Result<Vec<League>> {
        self.check_reads()?;
        Ok(self
            .state()
            .leagues
            .iter()
            .filter(|l| !l.finished)
            .map(|l| l.league.clone())
            .collect())
    }

    async fn record_league_week(
        &self,
        league_id: i32,
        weeks_scored: i32,
        week_label: &str,
        finished: bool
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(row) = state.leagues.iter_mut().find(|l| l.league.id == league_id) {
            row.league.weeks_scored = weeks_scored;
            row.league.last_scored_week = Some(week_label.to_string());
            row.finished = finished;
        }

        Ok(())
    }

    async fn grant_league_transfers(&self, league_id: i32, transfers: i32) -> Result<u64> {
        let mut state = self.state();
        match state.leagues.iter_mut().find(|l| l.league.id == league_id) {
            Some(row) => {
                row.transfers_remaining = transfers;
                Ok(1)
            }
            None => Ok(0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinGrant {
    pub user_id: i32,
    pub amount: i32,
    pub reason: CoinReason,
    pub idempotency_key: String
}

/// Records every collaborator call. Coin grants and season points honor idempotency keys
/// like the real ledger.
#[derive(Default)]
pub struct RecordingCollaborators {
    pub coin_grants: Mutex<Vec<CoinGrant>>,
    balances: Mutex<HashMap<i32, i64>>,
    seen_keys: Mutex<HashSet<String>>,
    seen_season_keys: Mutex<HashSet<String>>,
    pub season_points: Mutex<Vec<(i32, i32)>>,
    pub quests: Mutex<Vec<i32>>,
    pub notifications: Mutex<Vec<(i32, NotificationKind)>>,
    pub scored_weeks: Mutex<Vec<(i32, i32)>>,
    pub finalized: Mutex<Vec<i32>>,
    pub invalidated: Mutex<Vec<String>>,
    failing_coin_users: Mutex<HashSet<i32>>,
    failing_leagues: Mutex<HashSet<i32>>
}

impl RecordingCollaborators {
    pub fn new() -> Arc<RecordingCollaborators> {
        Arc::new(RecordingCollaborators::default())
    }

    /// Bundles this recorder with the default pure engines
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            stats_engine: Arc::new(DefaultStatsEngine),
            race_bonus: Arc::new(DefaultRaceBonus),
            coins: self.clone(),
            season: self.clone(),
            quests: self.clone(),
            leagues: self.clone(),
            feed: self.clone(),
            cache: self.clone()
        }
    }

    pub fn fail_coins_for(&self, user_id: i32) {
        self.failing_coin_users.lock().unwrap().insert(user_id);
    }

    pub fn fail_league(&self, league_id: i32) {
        self.failing_leagues.lock().unwrap().insert(league_id);
    }

    pub fn balance(&self, user_id: i32) -> i64 {
        self.balances.lock().unwrap().get(&user_id).copied().unwrap_or(0)
    }

    pub fn grants(&self) -> Vec<CoinGrant> {
        self.coin_grants.lock().unwrap().clone()
    }

    pub fn notified(&self, kind: NotificationKind) -> Vec<i32> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(user_id, _)| *user_id)
            .collect()
    }
}

#[async_trait]
impl CoinLedger for RecordingCollaborators {
    async fn add_coins(
        &self,
        user_id: i32,
        amount: i32,
        reason: CoinReason,
        _metadata: &Value,
        idempotency_key: &str
    ) -> std::result::Result<i64, CollaboratorError> {
        if self.failing_coin_users.lock().unwrap().contains(&user_id) {
            return Err(CollaboratorError::Rejected(format!("ledger unavailable for {}", user_id)));
        }

        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user_id).or_default();

        if self.seen_keys.lock().unwrap().insert(idempotency_key.to_string()) {
            *balance += amount as i64;
            self.coin_grants.lock().unwrap().push(CoinGrant {
                user_id,
                amount,
                reason,
                idempotency_key: idempotency_key.to_string()
            });
        }

        Ok(*balance)
    }
}

#[async_trait]
impl SeasonRanking for RecordingCollaborators {
    async fn add_season_points(
        &self,
        user_id: i32,
        points: i32,
        _metric: &str,
        _value: f64,
        idempotency_key: &str
    ) -> std::result::Result<(), CollaboratorError> {
        if self.seen_season_keys.lock().unwrap().insert(idempotency_key.to_string()) {
            self.season_points.lock().unwrap().push((user_id, points));
        }
        Ok(())
    }
}

#[async_trait]
impl QuestService for RecordingCollaborators {
    async fn assign_weekly_quests(&self, user_id: i32) -> std::result::Result<(), CollaboratorError> {
        self.quests.lock().unwrap().push(user_id);
        Ok(())
    }
}

#[async_trait]
impl LeagueService for RecordingCollaborators {
    async fn score_week(&self, league_id: i32, week_number: i32) -> std::result::Result<(), CollaboratorError> {
        if self.failing_leagues.lock().unwrap().contains(&league_id) {
            return Err(CollaboratorError::Rejected(format!("league {} unavailable", league_id)));
        }

        self.scored_weeks.lock().unwrap().push((league_id, week_number));
        Ok(())
    }

    async fn finalize(&self, league_id: i32) -> std::result::Result<(), CollaboratorError> {
        self.finalized.lock().unwrap().push(league_id);
        Ok(())
    }
}

#[async_trait]
impl NotificationFeed for RecordingCollaborators {
    async fn emit(
        &self,
        user_id: i32,
        kind: NotificationKind,
        _payload: &Value
    ) -> std::result::Result<(), CollaboratorError> {
        self.notifications.lock().unwrap().push((user_id, kind));
        Ok(())
    }
}

#[async_trait]
impl CacheLayer for RecordingCollaborators {
    async fn invalidate(&self, pattern: &str) -> std::result::Result<(), CollaboratorError> {
        self.invalidated.lock().unwrap().push(pattern.to_string());
        Ok(())
    }
}
