use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, ImdbConfig, PacerConfig, ServerConfig, StorageConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_pacer_config(&config.pacer)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_server_config(&config.server)?;
    validate_imdb_config(&config.imdb)?;
    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;

    if config.access_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "access-token cannot be empty (set it in [api] or via TMDB_ACCESS_TOKEN)".to_string(),
        ));
    }

    Ok(())
}

/// Validates pacer configuration
fn validate_pacer_config(config: &PacerConfig) -> Result<(), ConfigError> {
    if config.min_interval_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "min-interval-ms must be >= 1, got {}",
            config.min_interval_ms
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.movie_max_id < 1 {
        return Err(ConfigError::Validation(
            "movie-max-id must be >= 1".to_string(),
        ));
    }

    if config.show_max_id < 1 {
        return Err(ConfigError::Validation(
            "show-max-id must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates control surface configuration
fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.listen_addr.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "listen-addr '{}' is not a socket address: {}",
            config.listen_addr, e
        ))
    })?;

    Ok(())
}

/// Validates importer configuration
fn validate_imdb_config(config: &ImdbConfig) -> Result<(), ConfigError> {
    validate_http_url("dataset-url", &config.dataset_url)?;

    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.update_interval_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "update-interval-hours must be >= 1, got {}",
            config.update_interval_hours
        )));
    }

    Ok(())
}

/// Validates that a URL parses and uses an HTTP(S) scheme
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
