//! Crawler module for harvesting catalog records
//!
//! This module contains the core harvesting logic, including:
//! - The single-lane request pacer shared by every outbound call
//! - The catalog API client and its three-way fetch outcome
//! - The resumable per-category scan loop

mod client;
mod pacer;
mod scanner;

pub use client::{build_http_client, CatalogClient, CatalogSource, FetchError, FetchOutcome};
pub use pacer::{Pacer, PacerError};
pub use scanner::{Crawler, ScanReport};

use crate::config::Config;
use crate::HarvestError;
use std::sync::Arc;

/// Builds the paced catalog client described by the configuration
///
/// Spawns the pacer's admission loop, so this must run inside a Tokio runtime.
///
/// # Arguments
///
/// * `config` - The harvester configuration
///
/// # Returns
///
/// * `Ok(Arc<CatalogClient>)` - A client ready to be shared by crawlers
/// * `Err(HarvestError)` - The HTTP client could not be built
pub fn build_catalog_client(config: &Config) -> Result<Arc<CatalogClient>, HarvestError> {
    let http = build_http_client(&config.pacer)?;
    let pacer = Pacer::new(http, config.pacer.min_interval());
    Ok(Arc::new(CatalogClient::new(pacer, &config.api)))
}
