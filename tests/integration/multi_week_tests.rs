use crate::common::init_test_env;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use velo_processor::{
    database::db_structs::League,
    model::{structures::period_type::PeriodType, week::WeekWindow},
    processor::{ProcessorConfig, RunSummary, WeeklyProcessor},
    utils::test_utils::{
        generate_activities, generate_activity, generate_profile, test_as_of, MemoryStore, RecordingCollaborators
    }
};

fn config() -> ProcessorConfig {
    ProcessorConfig {
        chunk_pause: std::time::Duration::ZERO,
        ..ProcessorConfig::default()
    }
}

fn week(n: i64) -> DateTime<Utc> {
    test_as_of() + Duration::weeks(n)
}

async fn run_week(store: &Arc<MemoryStore>, recorder: &Arc<RecordingCollaborators>, n: i64) -> RunSummary {
    WeeklyProcessor::new(store.clone(), recorder.collaborators(), config())
        .run(week(n))
        .await
        .unwrap()
}

/// Rider 1 rides in the first week only; rider 2 never rides.
fn population() -> Arc<MemoryStore> {
    let store = MemoryStore::with_profiles(vec![generate_profile(1, 55, 2), generate_profile(2, 70, -1)]);
    store.add_activities(generate_activities(1, 4, 7));
    Arc::new(store)
}

#[tokio::test]
async fn test_decay_stops_after_four_inactive_weeks() {
    init_test_env();
    let store = population();
    let recorder = RecordingCollaborators::new();

    let mut paces = Vec::new();
    for n in 0..4 {
        let summary = run_week(&store, &recorder, n).await;
        assert_eq!(summary.failed_chunks, 0);
        paces.push(store.profile(2).unwrap().stats.pace);
    }

    // 70 -> 68 -> 66 -> 64, then frozen once the fourth inactive week is reached
    assert_eq!(paces, vec![68, 66, 64, 64]);
    assert_eq!(store.profile(2).unwrap().streak, -5);
}

#[tokio::test]
async fn test_streak_flips_sign_when_rider_stops() {
    init_test_env();
    let store = population();
    let recorder = RecordingCollaborators::new();

    run_week(&store, &recorder, 0).await;
    assert_eq!(store.profile(1).unwrap().streak, 3);

    let summary = run_week(&store, &recorder, 1).await;
    assert_eq!(store.profile(1).unwrap().streak, -1);
    assert_eq!(summary.active_users, 0);
    assert_eq!(summary.users_decayed, 2);
}

#[tokio::test]
async fn test_closed_week_keeps_its_first_row() {
    init_test_env();
    let store = population();
    let recorder = RecordingCollaborators::new();

    run_week(&store, &recorder, 0).await;
    let opened = store.history(1, &WeekWindow::new(week(0)).opening_label).unwrap();

    run_week(&store, &recorder, 1).await;
    let window = WeekWindow::new(week(1));

    // The week opened by the first run is the week closed by the second
    assert_eq!(window.closing_label, opened.week_label);
    assert_eq!(store.history(1, &window.closing_label).unwrap(), opened);
    assert!(store.history(1, &window.opening_label).is_some());
}

#[tokio::test]
async fn test_monthly_totals_accumulate_across_weeks() {
    init_test_env();
    let store = population();
    let recorder = RecordingCollaborators::new();

    run_week(&store, &recorder, 0).await;
    let mut late_ride = generate_activity(1, 25_000.0, 120.0);
    late_ride.start_date = week(1) - Duration::days(1);
    store.add_activities(vec![late_ride]);
    run_week(&store, &recorder, 1).await;

    let first = WeekWindow::new(week(0));
    let second = WeekWindow::new(week(1));
    assert_eq!(first.month_label, second.month_label);

    let weekly_first = store.snapshot(1, PeriodType::Weekly, &first.opening_label).unwrap();
    let weekly_second = store.snapshot(1, PeriodType::Weekly, &second.opening_label).unwrap();
    let monthly = store.snapshot(1, PeriodType::Monthly, &second.month_label).unwrap();

    assert_eq!(weekly_second.rides, 1);
    assert_eq!(monthly.rides, weekly_first.rides + weekly_second.rides);
    assert_eq!(monthly.last_week_label, second.opening_label);

    // Replaying the second week leaves the cumulative totals alone
    run_week(&store, &recorder, 1).await;
    assert_eq!(store.snapshot(1, PeriodType::Monthly, &second.month_label).unwrap().rides, monthly.rides);
}

#[tokio::test]
async fn test_league_runs_to_completion() {
    init_test_env();
    let store = population();
    store.add_league(League {
        id: 3,
        name: "Sprint Series".to_string(),
        duration_weeks: 2,
        weeks_scored: 0,
        last_scored_week: None
    });
    let recorder = RecordingCollaborators::new();

    let first = run_week(&store, &recorder, 0).await;
    let second = run_week(&store, &recorder, 1).await;
    let third = run_week(&store, &recorder, 2).await;

    assert_eq!(first.downstream.leagues_finalized, 0);
    assert_eq!(second.downstream.leagues_finalized, 1);
    assert_eq!(third.downstream.leagues_scored, 0);
    assert_eq!(*recorder.scored_weeks.lock().unwrap(), vec![(3, 1), (3, 2)]);
    assert_eq!(*recorder.finalized.lock().unwrap(), vec![3]);
}
