//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ProgressStore trait,
//! plus the bulk ratings upsert used by the IMDb importer.

use crate::state::Category;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProgressStore, StorageError, StorageResult};
use crate::storage::ErrorRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a writer waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows between two cancellation checks during a bulk import
const CANCEL_CHECK_EVERY: u64 = 10_000;

/// One row of the IMDb ratings dataset
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRow {
    pub tconst: String,
    pub average_rating: f64,
    pub num_votes: i64,
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or create the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets the importer's connection write while the crawler reads
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads rating rows into a staging table and upserts them into `imdb_ratings`
    ///
    /// Everything happens in one transaction. When `cancel` fires mid-stream the
    /// transaction is rolled back and `Ok(None)` is returned; otherwise the number
    /// of staged rows is returned.
    pub fn import_ratings<I>(
        &mut self,
        rows: I,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<u64>>
    where
        I: IntoIterator<Item = StorageResult<RatingRow>>,
    {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            "
            CREATE TEMP TABLE IF NOT EXISTS temp_ratings (
                tconst TEXT,
                average_rating REAL,
                num_votes INTEGER
            );
            DELETE FROM temp.temp_ratings;
        ",
        )?;

        let mut row_count: u64 = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO temp.temp_ratings (tconst, average_rating, num_votes) VALUES (?1, ?2, ?3)",
            )?;

            for row in rows {
                if row_count % CANCEL_CHECK_EVERY == 0 && cancel.is_cancelled() {
                    tracing::info!("Ratings import cancelled after {} rows, rolling back", row_count);
                    return Ok(None);
                }

                let row = row?;
                stmt.execute(params![row.tconst, row.average_rating, row.num_votes])?;
                row_count += 1;
            }
        }

        tracing::info!("Staged {} rating rows, performing upsert", row_count);

        // The WHERE clause disambiguates ON CONFLICT from a join constraint
        tx.execute(
            "INSERT INTO imdb_ratings (tconst, average_rating, num_votes)
             SELECT tconst, average_rating, num_votes FROM temp.temp_ratings WHERE true
             ON CONFLICT(tconst) DO UPDATE SET
                 average_rating = excluded.average_rating,
                 num_votes = excluded.num_votes",
            [],
        )?;
        tx.execute("DROP TABLE temp.temp_ratings", [])?;

        tx.commit()?;

        Ok(Some(row_count))
    }

    /// Counts rows in the ratings table
    pub fn count_ratings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM imdb_ratings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Gets a single rating by title id
    pub fn get_rating(&self, tconst: &str) -> StorageResult<Option<RatingRow>> {
        let rating = self
            .conn
            .query_row(
                "SELECT tconst, average_rating, num_votes FROM imdb_ratings WHERE tconst = ?1",
                params![tconst],
                |row| {
                    Ok(RatingRow {
                        tconst: row.get(0)?,
                        average_rating: row.get(1)?,
                        num_votes: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(rating)
    }

    /// Gets a stored payload
    pub fn get_record(&self, category: Category, tmdb_id: u64) -> StorageResult<Option<String>> {
        let data = self
            .conn
            .query_row(
                "SELECT data FROM details WHERE type = ?1 AND tmdb_id = ?2",
                params![category.to_db_string(), tmdb_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    fn count_for(&self, table: &str, category: Category) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE type = ?1", table),
            params![category.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn exists_in(&self, table: &str, category: Category, tmdb_id: u64) -> StorageResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE type = ?1 AND tmdb_id = ?2)",
                table
            ),
            params![category.to_db_string(), tmdb_id as i64],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }
}

impl ProgressStore for SqliteStorage {
    // ===== Cursor =====

    fn get_progress(&self, category: Category) -> StorageResult<u64> {
        let progress: Option<i64> = self
            .conn
            .query_row(
                "SELECT progress FROM crawl_progress WHERE category = ?1",
                params![category.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        match progress {
            Some(value) if value < 0 => Err(StorageError::Database(format!(
                "negative cursor {} stored for {}",
                value, category
            ))),
            Some(value) => Ok(value as u64),
            None => Ok(0),
        }
    }

    fn update_progress(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_progress (category, progress, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(category) DO UPDATE SET progress = excluded.progress, updated_at = excluded.updated_at",
            params![category.to_db_string(), tmdb_id as i64, now],
        )?;
        Ok(())
    }

    // ===== Existence checks =====

    fn record_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool> {
        self.exists_in("details", category, tmdb_id)
    }

    fn not_found_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool> {
        self.exists_in("not_found", category, tmdb_id)
    }

    // ===== Writes =====

    fn store_record(
        &mut self,
        category: Category,
        tmdb_id: u64,
        payload: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO details (tmdb_id, type, data, fetched_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(type, tmdb_id) DO UPDATE SET data = excluded.data, fetched_at = excluded.fetched_at",
            params![tmdb_id as i64, category.to_db_string(), payload, now],
        )?;
        Ok(())
    }

    fn insert_not_found(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO not_found (type, tmdb_id, recorded_at) VALUES (?1, ?2, ?3)",
            params![category.to_db_string(), tmdb_id as i64, now],
        )?;
        Ok(())
    }

    fn insert_error(
        &mut self,
        category: Category,
        tmdb_id: u64,
        message: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO failed (type, tmdb_id, error, failed_at) VALUES (?1, ?2, ?3, ?4)",
            params![category.to_db_string(), tmdb_id as i64, message, now],
        )?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_records(&self, category: Category) -> StorageResult<u64> {
        self.count_for("details", category)
    }

    fn count_not_found(&self, category: Category) -> StorageResult<u64> {
        self.count_for("not_found", category)
    }

    fn count_errors(&self, category: Category) -> StorageResult<u64> {
        self.count_for("failed", category)
    }

    fn recent_errors(&self, category: Category, limit: usize) -> StorageResult<Vec<ErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT tmdb_id, error, failed_at FROM failed WHERE type = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let errors = stmt
            .query_map(params![category.to_db_string(), limit as i64], |row| {
                Ok(ErrorRecord {
                    category,
                    tmdb_id: row.get::<_, i64>(0)? as u64,
                    message: row.get(1)?,
                    failed_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(errors)
    }
}
