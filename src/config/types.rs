use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for tmdb-harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub pacer: PacerConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub imdb: ImdbConfig,
}

/// Remote catalog API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the catalog API, without a trailing slash
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(rename = "access-token", default)]
    pub access_token: String,
}

/// Request pacer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PacerConfig {
    /// Minimum spacing between two dispatch starts (milliseconds)
    #[serde(rename = "min-interval-ms", default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Per-call transport timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PacerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// What the scan does with an identifier whose fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorPolicy {
    /// Log the failure and move the cursor past the identifier
    #[default]
    Advance,

    /// Log the failure and keep the cursor below the identifier so a
    /// resumed scan retries it
    Hold,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Default upper bound of the movie identifier space
    #[serde(rename = "movie-max-id", default = "default_movie_max_id")]
    pub movie_max_id: u64,

    /// Default upper bound of the show identifier space
    #[serde(rename = "show-max-id", default = "default_show_max_id")]
    pub show_max_id: u64,

    #[serde(rename = "on-fetch-error", default)]
    pub on_fetch_error: FetchErrorPolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            movie_max_id: default_movie_max_id(),
            show_max_id: default_show_max_id(),
            on_fetch_error: FetchErrorPolicy::default(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Control surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP control surface binds to
    #[serde(rename = "listen-addr", default = "default_listen_addr")]
    pub listen_addr: String,

    /// How long to wait for jobs to stop cooperatively on shutdown (seconds)
    #[serde(rename = "shutdown-grace-secs", default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// IMDb ratings importer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImdbConfig {
    /// Location of the gzipped ratings dataset
    #[serde(rename = "dataset-url", default = "default_dataset_url")]
    pub dataset_url: String,

    /// Directory the dataset is downloaded into
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Hours between two scheduled syncs
    #[serde(rename = "update-interval-hours", default = "default_update_interval_hours")]
    pub update_interval_hours: u64,
}

impl ImdbConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_hours * 60 * 60)
    }
}

impl Default for ImdbConfig {
    fn default() -> Self {
        Self {
            dataset_url: default_dataset_url(),
            data_dir: default_data_dir(),
            update_interval_hours: default_update_interval_hours(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_min_interval_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_movie_max_id() -> u64 {
    2_000_000
}

fn default_show_max_id() -> u64 {
    350_000
}

fn default_listen_addr() -> String {
    "0.0.0.0:6996".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    15
}

fn default_dataset_url() -> String {
    "https://datasets.imdbws.com/title.ratings.tsv.gz".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_update_interval_hours() -> u64 {
    12
}
