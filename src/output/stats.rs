//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! per-category harvest statistics from the storage layer.

use crate::state::Category;
use crate::storage::{ErrorRecord, ProgressStore, SqliteStorage, StorageResult};

/// Number of recent error log entries shown per category
pub const RECENT_ERRORS: usize = 5;

/// Statistics for one category
#[derive(Debug, Clone)]
pub struct CategoryStatistics {
    pub category: Category,

    /// Persisted cursor
    pub cursor: u64,

    /// Stored payloads
    pub stored: u64,

    /// Confirmed-absent markers
    pub not_found: u64,

    /// Error log entries
    pub failed: u64,

    /// Most recent error log entries, newest first
    pub recent_errors: Vec<ErrorRecord>,
}

impl CategoryStatistics {
    /// Identifiers at or below the cursor that are neither stored nor absent
    pub fn unaccounted(&self) -> u64 {
        self.cursor.saturating_sub(self.stored + self.not_found)
    }
}

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    pub categories: Vec<CategoryStatistics>,

    /// Rows in the ratings table
    pub ratings: u64,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<CatalogStatistics> {
    let categories = Category::all()
        .into_iter()
        .map(|category| {
            Ok(CategoryStatistics {
                category,
                cursor: storage.get_progress(category)?,
                stored: storage.count_records(category)?,
                not_found: storage.count_not_found(category)?,
                failed: storage.count_errors(category)?,
                recent_errors: storage.recent_errors(category, RECENT_ERRORS)?,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(CatalogStatistics {
        categories,
        ratings: storage.count_ratings()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Harvest Statistics ===\n");

    for category in &stats.categories {
        println!("{}:", category.category);
        println!("  Cursor: {}", category.cursor);
        println!("  Stored: {}", category.stored);
        println!("  Confirmed absent: {}", category.not_found);
        println!("  Failed fetches logged: {}", category.failed);

        let coverage = if category.cursor > 0 {
            ((category.stored + category.not_found) as f64 / category.cursor as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  Coverage: {:.1}% ({} unaccounted below cursor)",
            coverage,
            category.unaccounted()
        );

        if !category.recent_errors.is_empty() {
            println!("  Recent errors:");
            for error in &category.recent_errors {
                println!(
                    "    - {} at {}: {}",
                    error.tmdb_id, error.failed_at, error.message
                );
            }
        }
        println!();
    }

    println!("IMDb ratings: {}", stats.ratings);
}
