//! Catalog API client
//!
//! This module turns (category, identifier) pairs into paced detail requests
//! against the catalog API, including:
//! - Building the HTTP client with the configured per-call timeout
//! - Bearer authentication and `append_to_response` query shaping
//! - Follow-up requests for composite records (collections, seasons)
//! - Classifying each fetch as found, confirmed-absent, or failed

use crate::config::{ApiConfig, PacerConfig};
use crate::crawler::pacer::{Pacer, PacerError};
use crate::state::Category;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Sub-resources appended to the primary movie request
const MOVIE_APPEND: &str = "credits,images,external_ids,similar,belongs_to_collection";

/// Sub-resources appended to the primary show request
const SHOW_APPEND: &str = "credits,external_ids,images,similar";

/// The API accepts at most this many appended seasons per request
const SEASONS_PER_REQUEST: usize = 10;

/// Why a single fetch failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("decode error: {0}")]
    Decode(String),
}

/// Result of fetching one identifier
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The record exists; the merged payload
    Found(Value),

    /// The API affirmatively reports that the identifier does not exist
    NotFound,

    /// The fetch failed; the identifier's existence is unknown
    Error(FetchError),
}

/// Anything the crawler can fetch catalog records from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the full record for one identifier
    async fn fetch(&self, category: Category, tmdb_id: u64) -> FetchOutcome;
}

/// Builds the HTTP client used for catalog requests
///
/// # Arguments
///
/// * `config` - Pacer configuration carrying the per-call timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &PacerConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(config.request_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Catalog API client routing every request through a [`Pacer`]
pub struct CatalogClient {
    pacer: Pacer,
    base_url: String,
    access_token: String,
}

impl CatalogClient {
    /// Creates a new client
    pub fn new(pacer: Pacer, config: &ApiConfig) -> Self {
        Self {
            pacer,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        }
    }

    /// GETs `path` and decodes the JSON body
    ///
    /// `Ok(None)` means the API answered 404.
    async fn get_json(&self, path: &str, append: &str) -> Result<Option<Value>, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self
            .pacer
            .client()
            .get(&url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.access_token);
        if !append.is_empty() {
            builder = builder.query(&[("append_to_response", append)]);
        }
        let request = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let response = self
            .pacer
            .submit(request)
            .await
            .map_err(|e: PacerError| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Like `get_json`, for follow-up requests where a 404 is a failure
    async fn get_required(&self, path: &str, append: &str) -> Result<Value, FetchError> {
        self.get_json(path, append)
            .await?
            .ok_or(FetchError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
            })
    }

    async fn fetch_movie(&self, tmdb_id: u64) -> Result<Option<Value>, FetchError> {
        let Some(mut movie) = self
            .get_json(&format!("/movie/{}", tmdb_id), MOVIE_APPEND)
            .await?
        else {
            return Ok(None);
        };

        let collection_id = movie
            .get("belongs_to_collection")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_u64)
            .filter(|id| *id != 0);

        if let Some(collection_id) = collection_id {
            let collection = self
                .get_required(&format!("/collection/{}", collection_id), "")
                .await?;
            set_field(&mut movie, "collection", collection)?;
        }

        Ok(Some(movie))
    }

    async fn fetch_show(&self, tmdb_id: u64) -> Result<Option<Value>, FetchError> {
        let path = format!("/tv/{}", tmdb_id);
        let Some(mut show) = self.get_json(&path, SHOW_APPEND).await? else {
            return Ok(None);
        };

        let season_numbers: Vec<u64> = show
            .get("seasons")
            .and_then(Value::as_array)
            .map(|seasons| {
                seasons
                    .iter()
                    .filter_map(|s| s.get("season_number").and_then(Value::as_u64))
                    .filter(|n| *n != 0)
                    .collect()
            })
            .unwrap_or_default();

        let mut seasons = Vec::with_capacity(season_numbers.len());
        for chunk in season_numbers.chunks(SEASONS_PER_REQUEST) {
            let keys: Vec<String> = chunk.iter().map(|n| format!("season/{}", n)).collect();
            let mut batch = self.get_required(&path, &keys.join(",")).await?;

            for key in &keys {
                let season = batch
                    .get_mut(key.as_str())
                    .map(Value::take)
                    .filter(|s| s.is_object())
                    .ok_or_else(|| {
                        FetchError::Decode(format!("missing '{}' in season response", key))
                    })?;
                seasons.push(season);
            }
        }

        set_field(&mut show, "seasons", Value::Array(seasons))?;

        Ok(Some(show))
    }
}

fn set_field(record: &mut Value, key: &str, value: Value) -> Result<(), FetchError> {
    match record.as_object_mut() {
        Some(object) => {
            object.insert(key.to_string(), value);
            Ok(())
        }
        None => Err(FetchError::Decode("record is not a JSON object".to_string())),
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch(&self, category: Category, tmdb_id: u64) -> FetchOutcome {
        let result = match category {
            Category::Movie => self.fetch_movie(tmdb_id).await,
            Category::Show => self.fetch_show(tmdb_id).await,
        };

        match result {
            Ok(Some(payload)) => FetchOutcome::Found(payload),
            Ok(None) => FetchOutcome::NotFound,
            Err(e) => FetchOutcome::Error(e),
        }
    }
}
