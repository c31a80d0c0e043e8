use crate::{
    database::{
        db_structs::{CategoryWinner, LeaderboardSnapshot, PerformanceProfile, WeeklyHistoryRecord},
        store::WeeklyStore
    },
    error::Result,
    model::recompute::UserOutcome,
    utils::progress_utils::progress_bar
};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Rows written and chunks lost for one row family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyReport {
    pub rows_written: u64,
    pub failed_chunks: usize
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub families: IndexMap<&'static str, FamilyReport>
}

impl WriteReport {
    pub fn failed_chunks(&self) -> usize {
        self.families.values().map(|f| f.failed_chunks).sum()
    }

    pub fn rows_written(&self, family: &str) -> u64 {
        self.families.get(family).map(|f| f.rows_written).unwrap_or(0)
    }

    fn record(&mut self, family: &'static str, report: FamilyReport) {
        let entry = self.families.entry(family).or_default();
        entry.rows_written += report.rows_written;
        entry.failed_chunks += report.failed_chunks;
    }
}

/// Writes row families in fixed-size chunks, pausing between chunks.
///
/// A failed chunk is logged and counted and the remaining chunks are still
/// attempted. Rows already written are never rolled back.
pub struct BatchWriter<'a, S: WeeklyStore> {
    store: &'a S,
    chunk_size: usize,
    pause: Duration
}

impl<'a, S: WeeklyStore> BatchWriter<'a, S> {
    pub fn new(store: &'a S, chunk_size: usize, pause: Duration) -> Self {
        BatchWriter {
            store,
            chunk_size: chunk_size.max(1),
            pause
        }
    }

    /// Closing history, refreshed profiles, opening history and the weekly leaderboard, in that order
    pub async fn write_outcomes(&self, outcomes: &[UserOutcome]) -> WriteReport {
        let closing: Vec<WeeklyHistoryRecord> = outcomes.iter().map(|o| o.closing.clone()).collect();
        let profiles: Vec<PerformanceProfile> = outcomes.iter().map(|o| o.profile.clone()).collect();
        let opening: Vec<WeeklyHistoryRecord> = outcomes.iter().map(|o| o.opening.clone()).collect();
        let weekly: Vec<LeaderboardSnapshot> = outcomes.iter().map(|o| o.weekly.clone()).collect();

        let mut report = WriteReport::default();
        let store = self.store;

        report.record(
            "closing_history",
            self.write_family("closing_history", &closing, |chunk| store.insert_history_if_absent(chunk))
                .await
        );
        report.record(
            "profiles",
            self.write_family("profiles", &profiles, |chunk| store.upsert_profiles(chunk))
                .await
        );
        report.record(
            "opening_history",
            self.write_family("opening_history", &opening, |chunk| store.upsert_history(chunk))
                .await
        );
        report.record(
            "weekly_leaderboard",
            self.write_family("weekly_leaderboard", &weekly, |chunk| store.upsert_leaderboard(chunk))
                .await
        );

        info!(
            "Batch write complete: {} profiles written, {} failed chunks",
            report.rows_written("profiles"),
            report.failed_chunks()
        );

        report
    }

    pub async fn write_snapshots(&self, family: &'static str, snapshots: &[LeaderboardSnapshot]) -> FamilyReport {
        let store = self.store;
        self.write_family(family, snapshots, |chunk| store.upsert_leaderboard(chunk))
            .await
    }

    pub async fn write_winners(&self, winners: &[CategoryWinner]) -> FamilyReport {
        let store = self.store;
        self.write_family("category_winners", winners, |chunk| store.upsert_category_winners(chunk))
            .await
    }

    async fn write_family<'r, T>(
        &self,
        family: &'static str,
        rows: &'r [T],
        write: impl Fn(&'r [T]) -> BoxFuture<'r, Result<u64>>
    ) -> FamilyReport
    where
        'a: 'r
    {
        let mut report = FamilyReport::default();
        if rows.is_empty() {
            return report;
        }

        let chunks = rows.len().div_ceil(self.chunk_size);
        let bar = progress_bar(chunks as u64, format!("Writing {}", family));

        for (i, chunk) in rows.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            match write(chunk).await {
                Ok(written) => report.rows_written += written,
                Err(e) => {
                    warn!(
                        "Failed to write {} chunk {}/{} ({} rows): {}",
                        family,
                        i + 1,
                        chunks,
                        chunk.len(),
                        e
                    );
                    report.failed_chunks += 1;
                }
            }

            bar.inc(1);
        }

        bar.finish();
        report
    }
}
