//! Configuration module for tmdb-harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! plus the handful of environment overrides used for secrets and deployment paths.
//!
//! # Example
//!
//! ```no_run
//! use tmdb_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Pacing requests every {}ms", config.pacer.min_interval_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, FetchErrorPolicy, ImdbConfig, PacerConfig, ServerConfig,
    StorageConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
};
