//! Catalog category definitions
//!
//! Each category has its own identifier space, cursor row and default upper bound.

use crate::config::CrawlerConfig;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A class of catalog entity with its own dense identifier space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Show,
}

impl Category {
    /// Converts the category to its database string representation
    ///
    /// This value is stored in the `type` column of every per-identifier table.
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
        }
    }

    /// Parses a category from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "show" => Some(Self::Show),
            _ => None,
        }
    }

    /// Upper bound used when a scan is started with `end = 0`
    pub fn default_max_id(&self, config: &CrawlerConfig) -> u64 {
        match self {
            Self::Movie => config.movie_max_id,
            Self::Show => config.show_max_id,
        }
    }

    /// Returns all categories
    pub fn all() -> [Self; 2] {
        [Self::Movie, Self::Show]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(s).ok_or_else(|| format!("unknown category '{}'", s))
    }
}
