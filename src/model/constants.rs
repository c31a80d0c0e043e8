use crate::model::structures::tier::Tier;

// Stat bounds
pub const STAT_MIN: i32 = 1;
pub const STAT_MAX: i32 = 99;

// Tier thresholds (inclusive lower bound of each band's overall rating)
pub const TIER_THRESHOLDS: [(i32, Tier); 5] = [
    (85, Tier::Legend),
    (75, Tier::Diamond),
    (65, Tier::Platinum),
    (50, Tier::Silver),
    (0, Tier::Bronze)
];

// Activity window
pub const RIDE_TYPES: [&str; 5] = ["Ride", "VirtualRide", "GravelRide", "MountainBikeRide", "EBikeRide"];
pub const MAX_CACHED_ACTIVITIES: usize = 50;
pub const WEEK_DAYS: i64 = 7;

// Race bonuses
pub const RACE_RESISTANCE_CAP: i32 = 5;
pub const RACE_OVERALL_CAP: i32 = 3;

// Decay
pub const DECAY_FACTOR: f64 = 0.97;
pub const DECAY_MAX_WEEKS: i32 = 4;

// Special card
pub const IN_FORM_OVR_DELTA: i32 = 5;
pub const IN_FORM_PODIUMS: u32 = 3;
pub const PODIUM_POSITION: i32 = 3;

// Rewards
pub const COINS_PER_KM: f64 = 2.0;
pub const SEASON_POINTS_PER_KM: f64 = 1.0;
pub const STREAK_BONUS_INTERVAL: i32 = 4;
pub const STREAK_BONUS_COINS_PER_WEEK: i32 = 10;
pub const STREAK_MILESTONES: [i32; 3] = [5, 10, 25];
pub const ECHAPPEE_REWARD_COINS: i32 = 100;

// Concurrency
pub const RUN_LEASE: &str = "weekly-recompute";

// Multi-week competitions
pub const LEAGUE_WEEKLY_TRANSFERS: i32 = 2;

// Read caches touched by a run
pub const CACHE_NAMESPACES: [&str; 5] = ["profile:*", "history:*", "leaderboard:*", "echappee:*", "league:*"];
