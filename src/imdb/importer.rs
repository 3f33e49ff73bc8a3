//! Download, decode and bulk-load of the ratings dataset

use crate::config::ImdbConfig;
use crate::storage::{RatingRow, SqliteStorage, StorageError, StorageResult};
use crate::{HarvestError, Result};
use flate2::read::GzDecoder;
use reqwest::Client;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// File name the dataset is downloaded to inside the data directory
pub const DATASET_FILE: &str = "title.ratings.tsv.gz";

/// Decodes a gzipped ratings TSV into rows
///
/// The header line is skipped. Rows with fewer than three fields are
/// dropped; unparsable ratings or vote counts become 0.
pub fn parse_ratings<R: Read>(reader: R) -> impl Iterator<Item = StorageResult<RatingRow>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(GzDecoder::new(reader))
        .into_records()
        .filter_map(|record| match record {
            Ok(record) if record.len() < 3 => None,
            Ok(record) => Some(Ok(RatingRow {
                tconst: record[0].to_string(),
                average_rating: record[1].trim().parse().unwrap_or(0.0),
                num_votes: record[2].trim().parse().unwrap_or(0),
            })),
            Err(e) => Some(Err(StorageError::Serialization(e.to_string()))),
        })
}

/// Keeps the `imdb_ratings` table in sync with the public dataset
pub struct ImdbImporter {
    config: ImdbConfig,
    database_path: PathBuf,
    client: Client,
}

impl ImdbImporter {
    /// Creates a new importer
    ///
    /// # Arguments
    ///
    /// * `config` - Dataset location, download directory and sync interval
    /// * `database_path` - The SQLite file; the importer opens its own connection
    /// * `client` - HTTP client used for the download
    pub fn new(config: ImdbConfig, database_path: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            config,
            database_path: database_path.into(),
            client,
        }
    }

    /// Syncs once, then again every update interval until cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Cancelled
    /// * `Err(HarvestError)` - A sync failed; the loop stops
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        tracing::info!("Starting initial ratings sync");
        self.run_sync(&cancel).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Ratings importer stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.update_interval()) => {
                    tracing::info!("Starting scheduled ratings sync");
                    self.run_sync(&cancel).await?;
                }
            }
        }
    }

    /// Downloads and imports the dataset once
    ///
    /// # Returns
    ///
    /// * `Ok(Some(rows))` - Rows imported
    /// * `Ok(None)` - Cancelled; nothing was committed
    /// * `Err(HarvestError)` - Download, decode or database failure
    pub async fn run_sync(&self, cancel: &CancellationToken) -> Result<Option<u64>> {
        tokio::fs::create_dir_all(&self.config.data_dir).await?;
        let path = Path::new(&self.config.data_dir).join(DATASET_FILE);

        let result = match self.download(&path, cancel).await {
            Ok(true) => self.load(path.clone(), cancel.clone()).await,
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }

        match &result {
            Ok(Some(rows)) => tracing::info!("Ratings sync completed: {} rows", rows),
            Ok(None) => tracing::info!("Ratings sync cancelled"),
            Err(e) => tracing::error!("Ratings sync failed: {}", e),
        }

        result
    }

    /// Streams the dataset to `dest`; `Ok(false)` when cancelled
    async fn download(&self, dest: &Path, cancel: &CancellationToken) -> Result<bool> {
        tracing::info!("Downloading {}", self.config.dataset_url);

        let mut response = self
            .client
            .get(&self.config.dataset_url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                chunk = response.chunk() => chunk?,
            };

            match chunk {
                Some(bytes) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                None => break,
            }
        }
        file.flush().await?;

        tracing::debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(true)
    }

    /// Decodes the file and upserts it on a blocking thread
    async fn load(&self, path: PathBuf, cancel: CancellationToken) -> Result<Option<u64>> {
        let database_path = self.database_path.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<u64>> {
            let file = std::fs::File::open(&path)?;
            let mut storage = SqliteStorage::new(&database_path)?;
            let rows = parse_ratings(BufReader::new(file));
            Ok(storage.import_ratings(rows, &cancel)?)
        })
        .await
        .map_err(|e| HarvestError::Import(format!("import task failed: {}", e)))?
    }
}
