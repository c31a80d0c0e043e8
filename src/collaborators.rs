//! Services the weekly run calls into but does not own.
//!
//! Every call is best-effort: a failure is logged and counted by the caller and
//! never rolls back rows that were already written.

use crate::{
    messaging::PublisherError,
    model::{
        effects::{CoinReason, NotificationKind},
        race_bonus::RaceBonus,
        stats_engine::StatsEngine
    }
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublisherError),

    #[error("Rejected: {0}")]
    Rejected(String)
}

#[async_trait]
pub trait CoinLedger: Send + Sync {
    /// Credits `amount` coins and returns the new balance. A repeated `idempotency_key`
    /// credits nothing and returns the current balance.
    async fn add_coins(
        &self,
        user_id: i32,
        amount: i32,
        reason: CoinReason,
        metadata: &Value,
        idempotency_key: &str
    ) -> Result<i64, CollaboratorError>;
}

#[async_trait]
pub trait SeasonRanking: Send + Sync {
    /// Awards season points. A repeated `idempotency_key` awards nothing.
    async fn add_season_points(
        &self,
        user_id: i32,
        points: i32,
        metric: &str,
        value: f64,
        idempotency_key: &str
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait QuestService: Send + Sync {
    async fn assign_weekly_quests(&self, user_id: i32) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait LeagueService: Send + Sync {
    async fn score_week(&self, league_id: i32, week_number: i32) -> Result<(), CollaboratorError>;

    async fn finalize(&self, league_id: i32) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait NotificationFeed: Send + Sync {
    async fn emit(&self, user_id: i32, kind: NotificationKind, payload: &Value) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Drops every cached entry whose key matches `pattern`, e.g. `profile:*`
    async fn invalidate(&self, pattern: &str) -> Result<(), CollaboratorError>;
}

/// Every collaborator a run needs, constructed once by the caller.
#[derive(Clone)]
pub struct Collaborators {
    pub stats_engine: Arc<dyn StatsEngine>,
    pub race_bonus: Arc<dyn RaceBonus>,
    pub coins: Arc<dyn CoinLedger>,
    pub season: Arc<dyn SeasonRanking>,
    pub quests: Arc<dyn QuestService>,
    pub leagues: Arc<dyn LeagueService>,
    pub feed: Arc<dyn NotificationFeed>,
    pub cache: Arc<dyn CacheLayer>
}
