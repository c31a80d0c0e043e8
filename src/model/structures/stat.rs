use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// One of the six card skills. The short codes are what the boost inventory
/// and the category table store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr, Display)]
pub enum Stat {
    #[serde(rename = "pac")]
    #[strum(to_string = "pac", serialize = "pace")]
    Pace,
    #[serde(rename = "end")]
    #[strum(to_string = "end", serialize = "endurance")]
    Endurance,
    #[serde(rename = "mon")]
    #[strum(to_string = "mon", serialize = "mountain")]
    Mountain,
    #[serde(rename = "res")]
    #[strum(to_string = "res", serialize = "resistance")]
    Resistance,
    #[serde(rename = "spr")]
    #[strum(to_string = "spr", serialize = "sprint")]
    Sprint,
    #[serde(rename = "tec")]
    #[strum(to_string = "tec", serialize = "technique")]
    Technique
}
