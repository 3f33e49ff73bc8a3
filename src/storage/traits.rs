//! Storage traits and error types
//!
//! This module defines the trait interface the crawler uses to checkpoint
//! progress, and the associated error types.

use crate::state::Category;
use crate::storage::ErrorRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for progress store implementations
///
/// This is the transactional source of truth for a harvest. The crawler never
/// caches any of it beyond the cursor of the scan it is running; every
/// existence check goes to the store.
pub trait ProgressStore {
    // ===== Cursor =====

    /// Gets the highest fully processed identifier, 0 when none was recorded
    fn get_progress(&self, category: Category) -> StorageResult<u64>;

    /// Records the highest fully processed identifier
    fn update_progress(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()>;

    // ===== Existence checks =====

    /// Checks whether a payload is stored for (category, id)
    fn record_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool>;

    /// Checks whether (category, id) was confirmed absent by the remote source
    fn not_found_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool>;

    // ===== Writes =====

    /// Stores a fetched payload, replacing any previous payload for the key
    fn store_record(&mut self, category: Category, tmdb_id: u64, payload: &str)
        -> StorageResult<()>;

    /// Records a confirmed-absent marker. Recording it twice is a no-op.
    fn insert_not_found(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()>;

    /// Appends an entry to the error log
    fn insert_error(&mut self, category: Category, tmdb_id: u64, message: &str)
        -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts stored payloads
    fn count_records(&self, category: Category) -> StorageResult<u64>;

    /// Counts confirmed-absent markers
    fn count_not_found(&self, category: Category) -> StorageResult<u64>;

    /// Counts error log entries
    fn count_errors(&self, category: Category) -> StorageResult<u64>;

    /// Gets the most recent error log entries, newest first
    fn recent_errors(&self, category: Category, limit: usize) -> StorageResult<Vec<ErrorRecord>>;
}
