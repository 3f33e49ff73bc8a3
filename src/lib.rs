//! tmdb-harvester: a resumable, rate-paced catalog harvester
//!
//! This crate walks the dense numeric identifier space of a remote movie/show
//! catalog, fetching each entry through a single-lane request pacer and
//! checkpointing progress in SQLite so a harvest can be stopped and resumed
//! without re-fetching what is already known.

pub mod config;
pub mod crawler;
pub mod imdb;
pub mod manager;
pub mod output;
pub mod server;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} job is already running")]
    AlreadyRunning { kind: manager::JobKind },

    #[error("Import error: {0}")]
    Import(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CatalogClient, Crawler, FetchOutcome, Pacer};
pub use manager::{JobKind, ScrapeManager, ScrapeStats};
pub use state::{Category, ScanState};
