use crate::{
    collaborators::{CollaboratorError, Collaborators},
    model::effects::Effect,
    utils::progress_utils::progress_bar
};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub attempted: usize,
    pub failed: usize
}

/// Attempted and failed side effects, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideEffectReport {
    pub kinds: IndexMap<&'static str, KindReport>
}

impl SideEffectReport {
    pub fn failed(&self) -> usize {
        self.kinds.values().map(|k| k.failed).sum()
    }

    pub fn attempted(&self) -> usize {
        self.kinds.values().map(|k| k.attempted).sum()
    }

    pub fn kind(&self, kind: &str) -> KindReport {
        self.kinds.get(kind).copied().unwrap_or_default()
    }

    fn settle(&mut self, kind: &'static str, ok: bool) {
        let entry = self.kinds.entry(kind).or_default();
        entry.attempted += 1;
        if !ok {
            entry.failed += 1;
        }
    }
}

/// Best-effort side effects in flight. At most `concurrency` calls run at once.
pub struct PendingSideEffects {
    tasks: JoinSet<(&'static str, Result<(), CollaboratorError>)>,
    total: usize
}

impl PendingSideEffects {
    /// Spawns every effect immediately; each task waits for a permit before calling out.
    pub fn spawn(effects: Vec<Effect>, collaborators: &Collaborators, concurrency: usize) -> PendingSideEffects {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let total = effects.len();

        for effect in effects {
            let permits = permits.clone();
            let collaborators = collaborators.clone();

            tasks.spawn(async move {
                let kind = effect.kind();
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => apply(&effect, &collaborators).await,
                    Err(_) => Err(CollaboratorError::Rejected("side effect pool closed".to_string()))
                };

                if let Err(e) = &result {
                    debug!("{} side effect for user {} failed: {}", kind, effect.user_id(), e);
                }

                (kind, result)
            });
        }

        PendingSideEffects { tasks, total }
    }

    /// Waits for every effect to settle. Failures are counted, never propagated.
    pub async fn settle(mut self) -> SideEffectReport {
        let mut report = SideEffectReport::default();
        let bar = progress_bar(self.total as u64, "Settling side effects".to_string());

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((kind, result)) => report.settle(kind, result.is_ok()),
                Err(e) => {
                    warn!("Side effect task did not complete: {}", e);
                    report.settle("aborted", false);
                }
            }
            bar.inc(1);
        }

        bar.finish();

        for (kind, counts) in report.kinds.iter().filter(|(_, k)| k.failed > 0) {
            warn!("{} of {} {} side effects failed", counts.failed, counts.attempted, kind);
        }

        report
    }
}

async fn apply(effect: &Effect, collaborators: &Collaborators) -> Result<(), CollaboratorError> {
    match effect {
        Effect::Coins {
            user_id,
            amount,
            reason,
            metadata,
            idempotency_key
        } => collaborators
            .coins
            .add_coins(*user_id, *amount, *reason, metadata, idempotency_key)
            .await
            .map(|_| ()),
        Effect::SeasonPoints {
            user_id,
            points,
            metric,
            value,
            idempotency_key
        } => collaborators.season.add_season_points(*user_id, *points, metric, *value, idempotency_key).await,
        Effect::AssignQuests { user_id } => collaborators.quests.assign_weekly_quests(*user_id).await,
        Effect::Notify {
            user_id,
            kind,
            payload
        } => collaborators.feed.emit(*user_id, *kind, payload).await
    }
}
