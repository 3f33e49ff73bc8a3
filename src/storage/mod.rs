//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Per-category crawl cursors
//! - Stored catalog payloads and confirmed-absent markers
//! - The append-only fetch error log
//! - Bulk upsert of the IMDb ratings dataset

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{RatingRow, SqliteStorage};
pub use traits::{ProgressStore, StorageError, StorageResult};

use crate::state::Category;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open the file or create the schema
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// An entry of the fetch error log
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub category: Category,
    pub tmdb_id: u64,
    pub message: String,
    pub failed_at: String,
}
