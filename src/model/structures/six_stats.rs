use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::stat::Stat;
use crate::model::constants::{STAT_MAX, STAT_MIN};

/// The six card skills, each kept within [`STAT_MIN`, `STAT_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SixStats {
    pub pace: i32,
    pub endurance: i32,
    pub mountain: i32,
    pub resistance: i32,
    pub sprint: i32,
    pub technique: i32
}

impl SixStats {
    pub fn uniform(value: i32) -> SixStats {
        SixStats {
            pace: value,
            endurance: value,
            mountain: value,
            resistance: value,
            sprint: value,
            technique: value
        }
    }

    pub fn get(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Pace => self.pace,
            Stat::Endurance => self.endurance,
            Stat::Mountain => self.mountain,
            Stat::Resistance => self.resistance,
            Stat::Sprint => self.sprint,
            Stat::Technique => self.technique
        }
    }

    pub fn get_mut(&mut self, stat: Stat) -> &mut i32 {
        match stat {
            Stat::Pace => &mut self.pace,
            Stat::Endurance => &mut self.endurance,
            Stat::Mountain => &mut self.mountain,
            Stat::Resistance => &mut self.resistance,
            Stat::Sprint => &mut self.sprint,
            Stat::Technique => &mut self.technique
        }
    }

    /// Applies `f` to every stat, then clamps the result into the valid range.
    pub fn map(&self, f: impl Fn(i32) -> i32) -> SixStats {
        let mut out = *self;
        for stat in Stat::iter() {
            *out.get_mut(stat) = f(self.get(stat)).clamp(STAT_MIN, STAT_MAX);
        }

        out
    }

    pub fn clamped(&self) -> SixStats {
        self.map(|v| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stat, i32)> + '_ {
        Stat::iter().map(move |stat| (stat, self.get(stat)))
    }
}
