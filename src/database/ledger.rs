use super::db::DbClient;
use crate::{
    collaborators::{CoinLedger, CollaboratorError, SeasonRanking},
    model::effects::CoinReason
};
use async_trait::async_trait;
use postgres_types::Json;
use serde_json::Value;
use tracing::debug;

/// Coin credits share the run's database. The transaction row is keyed on the
/// idempotency key; the wallet is only touched when that insert succeeds.
#[async_trait]
impl CoinLedger for DbClient {
    async fn add_coins(
        &self,
        user_id: i32,
        amount: i32,
        reason: CoinReason,
        metadata: &Value,
        idempotency_key: &str
    ) -> Result<i64, CollaboratorError> {
        let credited = self
            .client()
            .query_opt(
                "WITH inserted AS ( \
                     INSERT INTO coin_transactions (user_id, amount, reason, metadata, idempotency_key) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (idempotency_key) DO NOTHING \
                     RETURNING user_id, amount \
                 ) \
                 INSERT INTO user_wallets (user_id, balance) \
                 SELECT user_id, amount::int8 FROM inserted \
                 ON CONFLICT (user_id) DO UPDATE SET balance = user_wallets.balance + EXCLUDED.balance \
                 RETURNING balance",
                &[&user_id, &amount, &reason.to_string(), &Json(metadata), &idempotency_key]
            )
            .await?;

        if let Some(row) = credited {
            return Ok(row.try_get("balance")?);
        }

        debug!("Coin grant {} already applied", idempotency_key);
        let balance = self
            .client()
            .query_opt("SELECT balance FROM user_wallets WHERE user_id = $1", &[&user_id])
            .await?
            .map(|row| row.try_get::<_, i64>("balance"))
            .transpose()?
            .unwrap_or(0);

        Ok(balance)
    }
}

#[async_trait]
impl SeasonRanking for DbClient {
    async fn add_season_points(
        &self,
        user_id: i32,
        points: i32,
        metric: &str,
        value: f64,
        idempotency_key: &str
    ) -> Result<(), CollaboratorError> {
        let awarded = self
            .client()
            .execute(
                "INSERT INTO season_points (user_id, points, metric, value, idempotency_key, awarded_at) \
                 VALUES ($1, $2, $3, $4, $5, now()) \
                 ON CONFLICT (idempotency_key) DO NOTHING",
                &[&user_id, &points, &metric, &value, &idempotency_key]
            )
            .await?;

        if awarded == 0 {
            debug!("Season points {} already awarded", idempotency_key);
        }

        Ok(())
    }
}
