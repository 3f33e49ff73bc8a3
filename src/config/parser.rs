use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable that overrides `api.access-token`
pub const ACCESS_TOKEN_ENV: &str = "TMDB_ACCESS_TOKEN";

/// Environment variable that overrides `storage.database-path`
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Environment variable that overrides `imdb.data-dir`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation, so a config file
/// without an access token is valid as long as `TMDB_ACCESS_TOKEN` is set.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tmdb_harvester::config::load_config;
///
/// let config = load_config(Path::new("harvester.toml")).unwrap();
/// println!("Movies up to id {}", config.crawler.movie_max_id);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Parses configuration text without applying overrides or validation
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}

/// Applies environment overrides using the given lookup function
///
/// Empty values are ignored so an exported-but-blank variable does not wipe
/// out a value from the file.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(token) = non_empty(ACCESS_TOKEN_ENV) {
        config.api.access_token = token;
    }
    if let Some(path) = non_empty(DATABASE_PATH_ENV) {
        config.storage.database_path = path;
    }
    if let Some(dir) = non_empty(DATA_DIR_ENV) {
        config.imdb.data_dir = dir;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup to correlate harvest runs with configuration changes.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
