use crate::{
    collaborators::Collaborators,
    database::{db_structs::LeaderboardSnapshot, store::WeeklyStore},
    model::{
        constants::{CACHE_NAMESPACES, LEAGUE_WEEKLY_TRANSFERS},
        leaderboard::fold_cumulative,
        structures::period_type::PeriodType,
        week::WeekWindow
    },
    processor::writer::BatchWriter
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of the work that follows the batch write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownstreamReport {
    pub monthly_rows: u64,
    pub yearly_rows: u64,
    pub leaderboard_failures: usize,
    pub leagues_scored: usize,
    pub leagues_finalized: usize,
    /// Leagues already scored for this week by an earlier run
    pub leagues_skipped: usize,
    pub league_failures: usize,
    pub caches_invalidated: usize,
    pub cache_failures: usize
}

/// Rolls the weekly snapshots into the cumulative leaderboards.
///
/// A failure on one granularity is counted and does not affect the other.
pub async fn update_cumulative_leaderboards<S: WeeklyStore>(
    store: &S,
    writer: &BatchWriter<'_, S>,
    window: &WeekWindow,
    weekly: &[LeaderboardSnapshot],
    report: &mut DownstreamReport
) {
    let (monthly, yearly) = tokio::join!(
        store.get_leaderboard_snapshots(PeriodType::Monthly, &window.month_label),
        store.get_leaderboard_snapshots(PeriodType::Yearly, &window.year_label)
    );

    for (period_type, label, prior) in [
        (PeriodType::Monthly, &window.month_label, monthly),
        (PeriodType::Yearly, &window.year_label, yearly)
    ] {
        let prior = match prior {
            Ok(prior) => prior,
            Err(e) => {
                warn!("Skipping {} leaderboard {}: {}", period_type, label, e);
                report.leaderboard_failures += 1;
                continue;
            }
        };

        let folded = fold_cumulative(weekly, prior, period_type, label, &window.opening_label);
        let family = match period_type {
            PeriodType::Monthly => "monthly_leaderboard",
            _ => "yearly_leaderboard"
        };
        let written = writer.write_snapshots(family, &folded).await;

        report.leaderboard_failures += written.failed_chunks;
        match period_type {
            PeriodType::Monthly => report.monthly_rows = written.rows_written,
            _ => report.yearly_rows = written.rows_written
        }
    }
}

/// Scores the week for every active league, finalizing those that reached their last week,
/// and resets each remaining league's transfer allowance.
///
/// A league whose last scored week is the week being opened is left alone, so replaying
/// a week never advances a league twice.
pub async fn advance_leagues<S: WeeklyStore>(
    store: &S,
    collaborators: &Collaborators,
    window: &WeekWindow,
    report: &mut DownstreamReport
) {
    let leagues = match store.get_active_leagues().await {
        Ok(leagues) => leagues,
        Err(e) => {
            warn!("Failed to load active leagues: {}", e);
            report.league_failures += 1;
            return;
        }
    };

    for league in leagues {
        if league.last_scored_week.as_deref() == Some(window.opening_label.as_str()) {
            debug!("League {} already scored for {}", league.name, window.opening_label);
            report.leagues_skipped += 1;
            continue;
        }

        let week_number = league.weeks_scored + 1;

        if let Err(e) = collaborators.leagues.score_week(league.id, week_number).await {
            warn!("Failed to score week {} of league {}: {}", week_number, league.name, e);
            report.league_failures += 1;
            continue;
        }
        report.leagues_scored += 1;

        let mut finished = false;
        if week_number >= league.duration_weeks {
            match collaborators.leagues.finalize(league.id).await {
                Ok(()) => {
                    info!("League {} finalized after {} weeks", league.name, week_number);
                    report.leagues_finalized += 1;
                    finished = true;
                }
                Err(e) => {
                    warn!("Failed to finalize league {}: {}", league.name, e);
                    report.league_failures += 1;
                }
            }
        }

        if let Err(e) = store
            .record_league_week(league.id, week_number, &window.opening_label, finished)
            .await
        {
            warn!("Failed to record week {} of league {}: {}", week_number, league.name, e);
            report.league_failures += 1;
            continue;
        }

        if !finished {
            if let Err(e) = store.grant_league_transfers(league.id, LEAGUE_WEEKLY_TRANSFERS).await {
                warn!("Failed to grant transfers for league {}: {}", league.name, e);
                report.league_failures += 1;
            }
        }
    }
}

/// Invalidates every read cache namespace the run touched
pub async fn invalidate_caches(collaborators: &Collaborators, report: &mut DownstreamReport) {
    for pattern in CACHE_NAMESPACES {
        match collaborators.cache.invalidate(pattern).await {
            Ok(()) => report.caches_invalidated += 1,
            Err(e) => {
                warn!("Failed to invalidate {}: {}", pattern, e);
                report.cache_failures += 1;
            }
        }
    }
}
