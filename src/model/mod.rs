//! Pure weekly recompute: aggregation, per-user rules and the reductions over
//! the recomputed population. Nothing in here performs I/O.

pub mod aggregator;
pub mod categories;
pub mod constants;
pub mod decay;
pub mod effects;
pub mod leaderboard;
pub mod race_bonus;
pub mod recompute;
pub mod stats_engine;
pub mod streak;
pub mod structures;
pub mod week;
