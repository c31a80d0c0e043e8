use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Leaderboard granularity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeriodType {
    Weekly,
    Monthly,
    Yearly
}

impl PeriodType {
    /// Monthly and yearly snapshots accumulate weekly deltas.
    pub fn is_cumulative(&self) -> bool {
        !matches!(self, PeriodType::Weekly)
    }
}
