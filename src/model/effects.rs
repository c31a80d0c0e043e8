use serde::Serialize;
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoinReason {
    WeeklyRide,
    StreakBonus,
    Echappee
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TierChange,
    StreakMilestone,
    EchappeeWinner
}

/// A best-effort call decided by the pure recompute step and dispatched later.
/// None of these are transactional with the batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Coins {
        user_id: i32,
        amount: i32,
        reason: CoinReason,
        metadata: Value,
        idempotency_key: String
    },
    SeasonPoints {
        user_id: i32,
        points: i32,
        metric: String,
        value: f64,
        idempotency_key: String
    },
    AssignQuests {
        user_id: i32
    },
    Notify {
        user_id: i32,
        kind: NotificationKind,
        payload: Value
    }
}

impl Effect {
    /// Grouping key for the side-effect report
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Coins { .. } => "coins",
            Effect::SeasonPoints { .. } => "season_points",
            Effect::AssignQuests { .. } => "quests",
            Effect::Notify { .. } => "notifications"
        }
    }

    pub fn user_id(&self) -> i32 {
        match self {
            Effect::Coins { user_id, .. }
            | Effect::SeasonPoints { user_id, .. }
            | Effect::AssignQuests { user_id }
            | Effect::Notify { user_id, .. } => *user_id
        }
    }
}
