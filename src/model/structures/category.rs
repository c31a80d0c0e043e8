use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};
use strum::IntoEnumIterator;

use super::stat::Stat;

/// An Échappée category: the overall rating, one of the six stats, or the
/// week's largest overall progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Overall,
    Stat(Stat),
    Progression
}

impl Category {
    /// Categories decided by a plain maximum, in selection order.
    pub fn ranked() -> impl Iterator<Item = Category> {
        std::iter::once(Category::Overall).chain(Stat::iter().map(Category::Stat))
    }

    /// Progression winners are recorded but not rewarded.
    pub fn is_rewarded(&self) -> bool {
        !matches!(self, Category::Progression)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Overall => write!(f, "ovr"),
            Category::Stat(stat) => write!(f, "{}", stat),
            Category::Progression => write!(f, "progression")
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ovr" => Ok(Category::Overall),
            "progression" => Ok(Category::Progression),
            other => Stat::from_str(other).map(Category::Stat).map_err(|_| ())
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
