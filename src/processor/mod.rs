//! The weekly run: lease, bulk load, pure recompute, chunked write, then the
//! best-effort work that hangs off the written rows.

pub mod dispatcher;
pub mod loader;
pub mod side_effects;
pub mod writer;

use crate::{
    collaborators::Collaborators,
    database::store::WeeklyStore,
    error::{ProcessorError, Result},
    model::{
        aggregator::aggregate,
        categories::{select_winners, winner_effects},
        constants::RUN_LEASE,
        effects::Effect,
        recompute::{recompute_population, RecomputeContext, UserOutcome},
        week::WeekWindow
    }
};
use chrono::{DateTime, Utc};
use dispatcher::DownstreamReport;
use serde::Serialize;
use side_effects::{PendingSideEffects, SideEffectReport};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;
use writer::{BatchWriter, WriteReport};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
    pub side_effect_concurrency: usize,
    pub lease_ttl: chrono::Duration
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            chunk_size: 500,
            chunk_pause: Duration::from_millis(100),
            side_effect_concurrency: 32,
            lease_ttl: chrono::Duration::minutes(30)
        }
    }
}

/// What a run did, for operators. Partial failures show up here rather than as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub as_of: DateTime<Utc>,
    pub closing_week: String,
    pub opening_week: String,
    pub users_processed: usize,
    pub users_updated: u64,
    pub users_decayed: usize,
    pub active_users: usize,
    pub failed_chunks: usize,
    pub category_winners: usize,
    pub writes: WriteReport,
    pub downstream: DownstreamReport,
    pub side_effects: SideEffectReport
}

pub struct WeeklyProcessor<S: WeeklyStore> {
    store: Arc<S>,
    collaborators: Collaborators,
    config: ProcessorConfig
}

impl<S: WeeklyStore> WeeklyProcessor<S> {
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: ProcessorConfig) -> Self {
        WeeklyProcessor {
            store,
            collaborators,
            config
        }
    }

    /// Runs the weekly recompute for the week ending at `as_of`.
    ///
    /// Fails only when the run lease is held elsewhere or the bulk load fails; in both
    /// cases nothing has been written. Every later failure is logged, counted in the
    /// summary, and does not stop the run.
    pub async fn run(&self, as_of: DateTime<Utc>) -> Result<RunSummary> {
        let window = WeekWindow::new(as_of);
        let owner = Uuid::new_v4().to_string();
        info!(
            "Starting weekly run {} (closing {}, opening {})",
            owner, window.closing_label, window.opening_label
        );

        if !self.store.acquire_lease(RUN_LEASE, &owner, self.config.lease_ttl).await? {
            warn!("Lease '{}' is held by another run, exiting", RUN_LEASE);
            return Err(ProcessorError::LeaseHeld {
                lease: RUN_LEASE.to_string()
            });
        }

        let writer = BatchWriter::new(self.store.as_ref(), self.config.chunk_size, self.config.chunk_pause);
        let computed = self.recompute_and_write(&window, &writer).await;

        if let Err(e) = self.store.release_lease(RUN_LEASE, &owner).await {
            warn!("Failed to release lease '{}', it expires on its own: {}", RUN_LEASE, e);
        }

        let (outcomes, writes) = computed?;

        let winners = select_winners(&outcomes, &window.opening_label);
        let effects: Vec<Effect> = outcomes
            .iter()
            .flat_map(|o| o.effects.iter().cloned())
            .chain(winner_effects(&winners))
            .collect();
        let pending = PendingSideEffects::spawn(effects, &self.collaborators, self.config.side_effect_concurrency);

        let mut writes = writes;
        let winners_written = writer.write_winners(&winners).await;
        writes.families.insert("category_winners", winners_written);

        let mut downstream = DownstreamReport::default();
        let weekly: Vec<_> = outcomes.iter().map(|o| o.weekly.clone()).collect();
        dispatcher::update_cumulative_leaderboards(self.store.as_ref(), &writer, &window, &weekly, &mut downstream)
            .await;
        dispatcher::advance_leagues(self.store.as_ref(), &self.collaborators, &window, &mut downstream).await;
        dispatcher::invalidate_caches(&self.collaborators, &mut downstream).await;

        let side_effects = pending.settle().await;

        let summary = RunSummary {
            as_of,
            closing_week: window.closing_label.clone(),
            opening_week: window.opening_label.clone(),
            users_processed: outcomes.len(),
            users_updated: writes.rows_written("profiles"),
            users_decayed: outcomes.iter().filter(|o| o.decayed).count(),
            active_users: outcomes.iter().filter(|o| o.active).count(),
            failed_chunks: writes.failed_chunks(),
            category_winners: winners.len(),
            writes,
            downstream,
            side_effects
        };

        info!(
            "Weekly run complete: {} users updated, {} decayed, {} failed chunks, {} failed side effects",
            summary.users_updated,
            summary.users_decayed,
            summary.failed_chunks,
            summary.side_effects.failed()
        );

        Ok(summary)
    }

    /// The leased section: load, recompute, write.
    async fn recompute_and_write(
        &self,
        window: &WeekWindow,
        writer: &BatchWriter<'_, S>
    ) -> Result<(Vec<UserOutcome>, WriteReport)> {
        let data = loader::load_bulk_data(self.store.as_ref(), window).await?;
        let (profiles, inputs) = aggregate(data);

        let ctx = RecomputeContext {
            window,
            stats_engine: self.collaborators.stats_engine.as_ref(),
            race_bonus: self.collaborators.race_bonus.as_ref()
        };
        let outcomes = recompute_population(&profiles, &inputs, &ctx);

        let writes = writer.write_outcomes(&outcomes).await;
        Ok((outcomes, writes))
    }
}
