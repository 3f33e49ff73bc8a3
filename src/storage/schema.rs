//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Fetched catalog payloads
CREATE TABLE IF NOT EXISTS details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tmdb_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    data TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE(type, tmdb_id)
);

-- One cursor row per category
CREATE TABLE IF NOT EXISTS crawl_progress (
    category TEXT PRIMARY KEY,
    progress INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

-- Identifiers the remote source reported as nonexistent
CREATE TABLE IF NOT EXISTS not_found (
    type TEXT NOT NULL,
    tmdb_id INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY(type, tmdb_id)
);

-- Append-only fetch error log
CREATE TABLE IF NOT EXISTS failed (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    tmdb_id INTEGER NOT NULL,
    error TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failed_type ON failed(type);

-- IMDb ratings dataset
CREATE TABLE IF NOT EXISTS imdb_ratings (
    tconst TEXT PRIMARY KEY,
    average_rating REAL,
    num_votes INTEGER
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
