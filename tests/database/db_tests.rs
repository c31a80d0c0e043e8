use chrono::Duration;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use velo_processor::{
    collaborators::{CoinLedger, Collaborators, SeasonRanking},
    database::{db::DbClient, store::WeeklyStore},
    model::{
        constants::RUN_LEASE,
        effects::CoinReason,
        structures::{special_card::SpecialCard, stat::Stat, tier::Tier}
    },
    processor::{ProcessorConfig, WeeklyProcessor},
    utils::test_utils::{generate_activity, generate_outcome, test_as_of, test_window, RecordingCollaborators}
};

use super::test_helpers::{insert_activities, TestDatabase};
use crate::common::init_test_env;

async fn seeded() -> (TestDatabase, DbClient) {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    test_db.seed_test_data().await.expect("Failed to seed test data");

    let db_client = DbClient::connect(&test_db.connection_string)
        .await
        .expect("Failed to connect");

    (test_db, db_client)
}

async fn count(test_db: &TestDatabase, query: &str) -> i64 {
    let client = test_db.get_client().await.unwrap();
    client.query_one(query, &[]).await.unwrap().get(0)
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_get_profiles() {
    let (_test_db, db_client) = seeded().await;

    let profiles = db_client.get_profiles().await.unwrap();

    assert_eq!(profiles.len(), 3);
    assert_eq!(profiles[0].user_id, 1);
    assert_eq!(profiles[0].tier, Tier::Silver);
    assert_eq!(profiles[2].tier, Tier::Platinum);
    assert_eq!(profiles[2].streak, -1);
    assert_eq!(profiles[2].special_card, None);
    assert_eq!(profiles[2].last_synced_at, None);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_activity_reads_only_return_rides() {
    let (test_db, db_client) = seeded().await;
    let mut later_ride = generate_activity(2, 45_000.0, 600.0);
    later_ride.start_date = test_as_of() + Duration::days(2);
    insert_activities(&test_db.get_client().await.unwrap(), &[later_ride])
        .await
        .unwrap();

    let weekly = db_client
        .get_activities_between(test_window().since, test_as_of())
        .await
        .unwrap();
    let recent = db_client.get_recent_activities(3, test_as_of()).await.unwrap();

    // The walk and the ride after the reference instant are both excluded
    assert_eq!(weekly.len(), 6);
    assert!(weekly.iter().all(|a| a.activity_type == "Ride"));
    assert!(weekly.iter().all(|a| a.start_date < test_as_of()));
    assert_eq!(recent.iter().filter(|a| a.user_id == 1).count(), 3);
    assert_eq!(recent.iter().filter(|a| a.user_id == 2).count(), 1);
    // Newest first within each rider
    let user_1: Vec<_> = recent.iter().filter(|a| a.user_id == 1).collect();
    assert!(user_1[0].start_date > user_1[1].start_date);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_races_podiums_and_boosts() {
    let (_test_db, db_client) = seeded().await;

    let races = db_client
        .get_race_results_between(test_window().since, test_as_of())
        .await
        .unwrap();
    let podiums = db_client.get_podium_finishes().await.unwrap();
    let boosts = db_client.get_active_boosts(test_as_of()).await.unwrap();

    assert!(races.is_empty());
    assert_eq!(podiums.len(), 3);
    assert_eq!(boosts.len(), 1);
    assert_eq!(boosts[0].stat, Stat::Sprint);
    assert_eq!(boosts[0].amount, 3);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_closing_history_is_never_overwritten() {
    let (test_db, db_client) = seeded().await;
    let mut closing = generate_outcome(1, 50, 55).closing;

    assert_eq!(db_client.insert_history_if_absent(&[closing.clone()]).await.unwrap(), 1);

    closing.ovr = 99;
    assert_eq!(db_client.insert_history_if_absent(&[closing.clone()]).await.unwrap(), 0);
    assert_eq!(count(&test_db, "SELECT ovr::int8 FROM weekly_history").await, 50);

    assert_eq!(db_client.upsert_history(&[closing]).await.unwrap(), 1);
    assert_eq!(count(&test_db, "SELECT ovr::int8 FROM weekly_history").await, 99);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_run_lease() {
    let (_test_db, db_client) = seeded().await;
    let ttl = Duration::minutes(30);

    assert!(db_client.acquire_lease(RUN_LEASE, "first", ttl).await.unwrap());
    assert!(!db_client.acquire_lease(RUN_LEASE, "second", ttl).await.unwrap());

    // Only the owner can release
    db_client.release_lease(RUN_LEASE, "second").await.unwrap();
    assert!(!db_client.acquire_lease(RUN_LEASE, "second", ttl).await.unwrap());

    db_client.release_lease(RUN_LEASE, "first").await.unwrap();
    assert!(db_client.acquire_lease(RUN_LEASE, "second", ttl).await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_expired_lease_is_taken_over() {
    let (_test_db, db_client) = seeded().await;

    // A run that crashed without releasing
    assert!(db_client
        .acquire_lease(RUN_LEASE, "crashed", Duration::seconds(-60))
        .await
        .unwrap());

    assert!(db_client
        .acquire_lease(RUN_LEASE, "recovery", Duration::minutes(30))
        .await
        .unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_coin_grants_are_idempotent() {
    let (test_db, db_client) = seeded().await;
    let metadata = json!({ "km": 5.0 });

    let first = db_client
        .add_coins(1, 10, CoinReason::WeeklyRide, &metadata, "weekly-ride:1:2026-W42")
        .await
        .unwrap();
    let replay = db_client
        .add_coins(1, 10, CoinReason::WeeklyRide, &metadata, "weekly-ride:1:2026-W42")
        .await
        .unwrap();
    let next = db_client
        .add_coins(1, 10, CoinReason::WeeklyRide, &metadata, "weekly-ride:1:2026-W43")
        .await
        .unwrap();

    assert_eq!(first, 10);
    assert_eq!(replay, 10);
    assert_eq!(next, 20);
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM coin_transactions").await, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_season_points_are_idempotent() {
    let (test_db, db_client) = seeded().await;

    for _ in 0..2 {
        db_client
            .add_season_points(1, 20, "distance_km", 42.0, "season-distance:1:2026-W42")
            .await
            .unwrap();
    }
    db_client
        .add_season_points(1, 20, "distance_km", 40.0, "season-distance:1:2026-W43")
        .await
        .unwrap();

    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM season_points").await, 2);
    assert_eq!(count(&test_db, "SELECT SUM(points)::int8 FROM season_points").await, 40);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_weekly_run_against_postgres() {
    let (test_db, db_client) = seeded().await;
    let store = Arc::new(db_client);
    let recorder = RecordingCollaborators::new();
    let collaborators = Collaborators {
        coins: store.clone(),
        season: store.clone(),
        ..recorder.collaborators()
    };
    let config = ProcessorConfig {
        chunk_size: 2,
        chunk_pause: std::time::Duration::ZERO,
        ..ProcessorConfig::default()
    };
    let processor = WeeklyProcessor::new(store.clone(), collaborators, config);

    let summary = processor.run(test_as_of()).await.unwrap();

    assert_eq!(summary.users_updated, 3);
    assert_eq!(summary.failed_chunks, 0);
    assert_eq!(summary.side_effects.failed(), 0);
    assert_eq!(summary.downstream.leagues_scored, 2);
    assert_eq!(summary.downstream.leagues_finalized, 1);

    let profiles = store.get_profiles().await.unwrap();
    assert!(profiles.iter().all(|p| p.last_synced_at == Some(test_as_of())));
    assert_eq!(profiles[1].special_card, Some(SpecialCard::InForm));
    assert_eq!(profiles[2].streak, -2);
    assert_eq!(profiles[2].prev_ovr, 70);

    // Closing and opening rows for three riders
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM weekly_history").await, 6);
    // Weekly, monthly and yearly rows for three riders
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM leaderboard_snapshots").await, 9);
    assert_eq!(
        count(&test_db, "SELECT COUNT(*) FROM leagues WHERE status = 'finished'").await,
        1
    );
    assert_eq!(
        count(&test_db, "SELECT MIN(transfers_remaining)::int8 FROM league_members WHERE league_id = 1").await,
        2
    );
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM run_leases").await, 0);

    let balance = count(&test_db, "SELECT COALESCE(SUM(balance), 0)::int8 FROM user_wallets").await;
    assert!(balance > 0);
    let season_points = count(&test_db, "SELECT COUNT(*) FROM season_points").await;
    let weeks_scored = count(&test_db, "SELECT SUM(weeks_scored)::int8 FROM leagues").await;

    // Replaying the week changes neither row counts nor balances
    let replay = processor.run(test_as_of()).await.unwrap();

    assert_eq!(replay.downstream.leagues_scored, 0);
    assert_eq!(replay.downstream.leagues_skipped, 1);
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM season_points").await, season_points);
    assert_eq!(count(&test_db, "SELECT SUM(weeks_scored)::int8 FROM leagues").await, weeks_scored);

    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM weekly_history").await, 6);
    assert_eq!(count(&test_db, "SELECT COUNT(*) FROM leaderboard_snapshots").await, 9);
    assert_eq!(
        count(&test_db, "SELECT COALESCE(SUM(balance), 0)::int8 FROM user_wallets").await,
        balance
    );
}
