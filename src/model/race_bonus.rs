use crate::{
    database::db_structs::RaceResult,
    model::constants::{RACE_OVERALL_CAP, RACE_RESISTANCE_CAP}
};

/// A per-race bonus pair. Summed across a week, then capped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaceBoost {
    pub resistance: i32,
    pub overall: i32
}

/// Rank-to-bonus function owned by the race subsystem. Must be monotonic:
/// a better finish never yields a smaller bonus.
pub trait RaceBonus: Send + Sync {
    fn bonus(&self, position: i32, field_size: i32) -> RaceBoost;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRaceBonus;

impl RaceBonus for DefaultRaceBonus {
    fn bonus(&self, position: i32, field_size: i32) -> RaceBoost {
        if position < 1 || field_size < 1 || position > field_size {
            return RaceBoost::default();
        }

        // 1.0 for the winner, approaching 0 for last place
        let standing = 1.0 - (position - 1) as f64 / field_size as f64;
        let overall = match position {
            1 => 2,
            2 | 3 => 1,
            _ => 0
        };

        RaceBoost {
            resistance: (standing * 3.0).round() as i32,
            overall
        }
    }
}

/// Sums the bonus of every race, then clamps each component to its weekly cap.
pub fn capped_race_boost(bonus: &dyn RaceBonus, races: &[RaceResult]) -> RaceBoost {
    let total = races.iter().fold(RaceBoost::default(), |acc, race| {
        let b = bonus.bonus(race.position, race.field_size);
        RaceBoost {
            resistance: acc.resistance + b.resistance,
            overall: acc.overall + b.overall
        }
    });

    RaceBoost {
        resistance: total.resistance.clamp(0, RACE_RESISTANCE_CAP),
        overall: total.overall.clamp(0, RACE_OVERALL_CAP)
    }
}
