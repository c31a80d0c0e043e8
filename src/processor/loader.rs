use crate::{
    database::{db_structs::BulkData, store::WeeklyStore},
    error::Result,
    model::{constants::MAX_CACHED_ACTIVITIES, week::WeekWindow}
};
use tracing::info;

/// Issues the six bulk reads concurrently. Any failure aborts the whole load.
pub async fn load_bulk_data<S: WeeklyStore>(store: &S, window: &WeekWindow) -> Result<BulkData> {
    info!("Loading bulk data for {} to {}", window.since, window.as_of);

    let (profiles, weekly_activities, cached_activities, race_results, boosts, podiums) = tokio::try_join!(
        store.get_profiles(),
        store.get_activities_between(window.since, window.as_of),
        store.get_recent_activities(MAX_CACHED_ACTIVITIES, window.as_of),
        store.get_race_results_between(window.since, window.as_of),
        store.get_active_boosts(window.as_of),
        store.get_podium_finishes()
    )?;

    info!(
        "Loaded {} profiles, {} weekly rides, {} cached rides, {} race results, {} boosts, {} podiums",
        profiles.len(),
        weekly_activities.len(),
        cached_activities.len(),
        race_results.len(),
        boosts.len(),
        podiums.len()
    );

    Ok(BulkData {
        profiles,
        weekly_activities,
        cached_activities,
        race_results,
        boosts,
        podiums
    })
}
