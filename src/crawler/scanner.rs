//! Per-category scan loop
//!
//! This module contains the resumable scan over a category's identifier
//! space, including:
//! - Computing the resume point from the persisted cursor
//! - Skipping identifiers already stored or confirmed absent
//! - Recording fetch outcomes in the progress store
//! - Checkpointing the cursor after every processed identifier
//! - Cooperative cancellation at identifier boundaries

use crate::config::{CrawlerConfig, FetchErrorPolicy};
use crate::crawler::client::{CatalogSource, FetchOutcome};
use crate::manager::JobKind;
use crate::state::{Category, ScanState};
use crate::storage::{ProgressStore, StorageResult};
use crate::{HarvestError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Identifiers between two progress log lines
const PROGRESS_LOG_EVERY: u64 = 1_000;

/// Summary of one scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub category: Category,

    /// First identifier of the range
    pub first: u64,

    /// Last identifier of the range, inclusive
    pub last: u64,

    /// `Completed` or `Cancelled`
    pub final_state: ScanState,

    /// Identifiers passed to the catalog source
    pub fetched: u64,

    /// Payloads persisted
    pub stored: u64,

    /// Skipped because a payload was already stored
    pub skipped_existing: u64,

    /// Skipped because the identifier was confirmed absent earlier
    pub skipped_not_found: u64,

    /// Newly confirmed absent
    pub not_found: u64,

    /// Fetches that failed
    pub errors: u64,

    /// Store writes that failed
    pub persistence_failures: u64,

    /// Cursor value when the scan ended
    pub cursor: u64,
}

impl ScanReport {
    fn new(category: Category, first: u64, last: u64, cursor: u64) -> Self {
        Self {
            category,
            first,
            last,
            final_state: ScanState::Scanning,
            fetched: 0,
            stored: 0,
            skipped_existing: 0,
            skipped_not_found: 0,
            not_found: 0,
            errors: 0,
            persistence_failures: 0,
            cursor,
        }
    }
}

/// What happened to one identifier
enum Step {
    /// Fully processed; the cursor may move past it
    Processed,

    /// Left for a resumed scan to retry
    Hole,
}

/// Returns the crawler to `Idle` when a scan ends, even by panic
struct ScanningGuard<'a> {
    state: &'a Mutex<ScanState>,
}

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = ScanState::Idle;
    }
}

/// Resumable scanner over one category's identifier space
pub struct Crawler<S: ProgressStore> {
    category: Category,
    store: Arc<Mutex<S>>,
    source: Arc<dyn CatalogSource>,
    config: CrawlerConfig,
    state: Mutex<ScanState>,
}

impl<S: ProgressStore> Crawler<S> {
    /// Creates a crawler for one category
    ///
    /// # Arguments
    ///
    /// * `category` - The identifier space this crawler walks
    /// * `store` - Shared progress store
    /// * `source` - Where records are fetched from
    /// * `config` - Default upper bounds and the fetch-error policy
    pub fn new(
        category: Category,
        store: Arc<Mutex<S>>,
        source: Arc<dyn CatalogSource>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            category,
            store,
            source,
            config,
            state: Mutex::new(ScanState::Idle),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Current lifecycle state of this crawler
    pub fn state(&self) -> ScanState {
        *self.state.lock().expect("scan state lock poisoned")
    }

    /// Reads the persisted cursor for this category
    pub fn get_progress(&self) -> StorageResult<u64> {
        self.store().get_progress(self.category)
    }

    /// Runs one scan to completion or cancellation
    ///
    /// # Arguments
    ///
    /// * `cancel` - Checked before every identifier
    /// * `start` - First identifier; 0 resumes at the persisted cursor + 1
    /// * `end` - Last identifier, inclusive; 0 uses the category default
    /// * `overwrite` - Re-fetch identifiers whose payload is already stored
    ///
    /// # Returns
    ///
    /// * `Ok(ScanReport)` - The scan ended, completed or cancelled
    /// * `Err(HarvestError::AlreadyRunning)` - This crawler is already scanning
    /// * `Err(HarvestError::Storage)` - The resume point could not be read
    pub async fn start(
        &self,
        cancel: CancellationToken,
        start: u64,
        end: u64,
        overwrite: bool,
    ) -> Result<ScanReport> {
        let _scanning = self.begin()?;

        let result = self.scan(&cancel, start, end, overwrite).await;

        self.finish(match &result {
            Ok(report) => report.final_state,
            Err(_) => ScanState::Cancelled,
        });

        result
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        start: u64,
        end: u64,
        overwrite: bool,
    ) -> Result<ScanReport> {
        let cursor = self.get_progress()?;

        let first = if start == 0 { cursor + 1 } else { start };
        let last = if end == 0 {
            self.category.default_max_id(&self.config)
        } else {
            end
        };

        let mut report = ScanReport::new(self.category, first, last, cursor);

        tracing::info!(
            "Starting {} scan from {} to {} (cursor {}, overwrite {})",
            self.category,
            first,
            last,
            cursor,
            overwrite
        );

        // Set once an identifier is left unprocessed; the cursor stays below it
        let mut holding = false;
        let mut final_state = ScanState::Completed;

        for tmdb_id in first..=last {
            if cancel.is_cancelled() {
                tracing::info!("{} scan cancelled before {}", self.category, tmdb_id);
                final_state = ScanState::Cancelled;
                break;
            }

            match self.process(tmdb_id, overwrite, &mut report).await {
                Step::Processed if !holding => self.advance(tmdb_id, &mut report),
                Step::Processed => {}
                Step::Hole => {
                    if !holding {
                        tracing::warn!(
                            "{} cursor held at {} until {} is retried",
                            self.category,
                            report.cursor,
                            tmdb_id
                        );
                    }
                    holding = true;
                }
            }

            if (tmdb_id - first + 1) % PROGRESS_LOG_EVERY == 0 {
                tracing::info!(
                    "Progress: {} at {} of {}, {} fetched, {} stored, {} errors",
                    self.category,
                    tmdb_id,
                    last,
                    report.fetched,
                    report.stored,
                    report.errors
                );
            }
        }

        report.final_state = final_state;

        tracing::info!(
            "{} scan {}: cursor {}, {} fetched, {} stored, {} not found, {} errors, {} persistence failures",
            self.category,
            final_state,
            report.cursor,
            report.fetched,
            report.stored,
            report.not_found,
            report.errors,
            report.persistence_failures
        );

        Ok(report)
    }

    /// Decides and performs the work for one identifier
    async fn process(&self, tmdb_id: u64, overwrite: bool, report: &mut ScanReport) -> Step {
        if !overwrite {
            match self.store().record_exists(self.category, tmdb_id) {
                Ok(true) => {
                    tracing::debug!("{} {} already stored, skipping", self.category, tmdb_id);
                    report.skipped_existing += 1;
                    return Step::Processed;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    "Failed to check stored {} {}: {}",
                    self.category,
                    tmdb_id,
                    e
                ),
            }
        }

        match self.store().not_found_exists(self.category, tmdb_id) {
            Ok(true) => {
                tracing::debug!("{} {} confirmed absent, skipping", self.category, tmdb_id);
                report.skipped_not_found += 1;
                return Step::Processed;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(
                "Failed to check absence of {} {}: {}",
                self.category,
                tmdb_id,
                e
            ),
        }

        report.fetched += 1;

        match self.source.fetch(self.category, tmdb_id).await {
            FetchOutcome::Found(payload) => {
                let result = self
                    .store()
                    .store_record(self.category, tmdb_id, &payload.to_string());
                match result {
                    Ok(()) => {
                        report.stored += 1;
                        Step::Processed
                    }
                    Err(e) => {
                        tracing::error!("Failed to store {} {}: {}", self.category, tmdb_id, e);
                        report.persistence_failures += 1;
                        self.log_error(tmdb_id, &format!("persistence error: {}", e));
                        Step::Hole
                    }
                }
            }

            FetchOutcome::NotFound => {
                tracing::debug!("{} {} not found", self.category, tmdb_id);
                let result = self.store().insert_not_found(self.category, tmdb_id);
                match result {
                    Ok(()) => {
                        report.not_found += 1;
                        Step::Processed
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to record {} {} as not found: {}",
                            self.category,
                            tmdb_id,
                            e
                        );
                        report.persistence_failures += 1;
                        self.log_error(tmdb_id, &format!("persistence error: {}", e));
                        Step::Hole
                    }
                }
            }

            FetchOutcome::Error(e) => {
                tracing::warn!("Failed to fetch {} {}: {}", self.category, tmdb_id, e);
                report.errors += 1;
                self.log_error(tmdb_id, &e.to_string());

                match self.config.on_fetch_error {
                    FetchErrorPolicy::Advance => Step::Processed,
                    FetchErrorPolicy::Hold => Step::Hole,
                }
            }
        }
    }

    /// Moves the cursor to `tmdb_id`; the cursor never decreases
    fn advance(&self, tmdb_id: u64, report: &mut ScanReport) {
        if tmdb_id <= report.cursor {
            return;
        }

        let result = self.store().update_progress(self.category, tmdb_id);
        match result {
            Ok(()) => report.cursor = tmdb_id,
            Err(e) => tracing::error!(
                "Failed to move {} cursor to {}: {}",
                self.category,
                tmdb_id,
                e
            ),
        }
    }

    fn log_error(&self, tmdb_id: u64, message: &str) {
        let result = self.store().insert_error(self.category, tmdb_id, message);
        if let Err(e) = result {
            tracing::error!(
                "Failed to log error for {} {}: {}",
                self.category,
                tmdb_id,
                e
            );
        }
    }

    fn begin(&self) -> Result<ScanningGuard<'_>> {
        let mut state = self.state.lock().expect("scan state lock poisoned");
        if !state.can_transition_to(ScanState::Scanning) {
            return Err(HarvestError::AlreadyRunning {
                kind: JobKind::from(self.category),
            });
        }
        *state = ScanState::Scanning;
        Ok(ScanningGuard { state: &self.state })
    }

    fn finish(&self, terminal: ScanState) {
        let mut state = self.state.lock().expect("scan state lock poisoned");
        if state.can_transition_to(terminal) {
            *state = terminal;
        }
        tracing::debug!("{} crawler {} -> idle", self.category, *state);
    }

    fn store(&self) -> MutexGuard<'_, S> {
        self.store.lock().expect("progress store lock poisoned")
    }
}
