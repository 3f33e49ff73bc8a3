//! Scrape manager
//!
//! Owns one crawler per category plus the ratings importer, and guarantees
//! that at most one job of each kind is running at any time.

use crate::config::Config;
use crate::crawler::{build_catalog_client, build_http_client, CatalogSource, Crawler};
use crate::imdb::ImdbImporter;
use crate::state::Category;
use crate::storage::SqliteStorage;
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval at which `wait_idle` re-checks the job table
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A kind of job the manager can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Movie,
    Show,
    Imdb,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
            Self::Imdb => "imdb",
        }
    }

    /// The crawl category this job walks, if it is a crawl
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Movie => Some(Category::Movie),
            Self::Show => Some(Category::Show),
            Self::Imdb => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Movie, Self::Show, Self::Imdb]
    }
}

impl From<Category> for JobKind {
    fn from(category: Category) -> Self {
        match category {
            Category::Movie => Self::Movie,
            Category::Show => Self::Show,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "show" => Ok(Self::Show),
            "imdb" => Ok(Self::Imdb),
            other => Err(format!("unknown job type '{}'", other)),
        }
    }
}

/// In-memory state of one job kind
#[derive(Debug, Default)]
struct JobState {
    running: bool,
    cancel: Option<CancellationToken>,
    last_start: Option<DateTime<Utc>>,
}

/// Snapshot returned by [`ScrapeManager::get_stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeStats {
    pub movie_crawling: bool,
    pub show_crawling: bool,
    pub imdb_working: bool,
    pub movie_progress: u64,
    pub show_progress: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_movie_crawler_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_show_crawler_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_imdb_sync_time: Option<DateTime<Utc>>,
}

type JobTable = Arc<Mutex<HashMap<JobKind, JobState>>>;

/// Single entry point for starting, stopping and inspecting jobs
pub struct ScrapeManager {
    movie: Arc<Crawler<SqliteStorage>>,
    show: Arc<Crawler<SqliteStorage>>,
    imdb: Arc<ImdbImporter>,
    jobs: JobTable,
}

impl ScrapeManager {
    /// Creates a manager around already-built workers
    pub fn new(
        movie: Arc<Crawler<SqliteStorage>>,
        show: Arc<Crawler<SqliteStorage>>,
        imdb: Arc<ImdbImporter>,
    ) -> Self {
        let jobs = JobKind::all()
            .into_iter()
            .map(|kind| (kind, JobState::default()))
            .collect();

        Self {
            movie,
            show,
            imdb,
            jobs: Arc::new(Mutex::new(jobs)),
        }
    }

    /// Builds the crawlers, the paced catalog client and the importer
    ///
    /// Must run inside a Tokio runtime (the pacer spawns its loop).
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `store` - The shared progress store both crawlers write to
    pub fn from_config(config: &Config, store: Arc<Mutex<SqliteStorage>>) -> Result<Self> {
        let source: Arc<dyn CatalogSource> = build_catalog_client(config)?;

        let movie = Crawler::new(
            Category::Movie,
            store.clone(),
            source.clone(),
            config.crawler.clone(),
        );
        let show = Crawler::new(Category::Show, store, source, config.crawler.clone());

        let imdb = ImdbImporter::new(
            config.imdb.clone(),
            &config.storage.database_path,
            build_http_client(&config.pacer)?,
        );

        Ok(Self::new(Arc::new(movie), Arc::new(show), Arc::new(imdb)))
    }

    fn crawler(&self, category: Category) -> &Arc<Crawler<SqliteStorage>> {
        match category {
            Category::Movie => &self.movie,
            Category::Show => &self.show,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobKind, JobState>> {
        lock_jobs(&self.jobs)
    }

    /// Marks `kind` as running and hands out its cancellation token
    fn begin(&self, kind: JobKind) -> Result<CancellationToken> {
        let mut jobs = self.jobs();
        let state = jobs.entry(kind).or_default();

        if state.running {
            return Err(HarvestError::AlreadyRunning { kind });
        }

        let cancel = CancellationToken::new();
        state.running = true;
        state.cancel = Some(cancel.clone());
        state.last_start = Some(Utc::now());

        Ok(cancel)
    }

    /// Starts any job kind; start/end/overwrite only apply to crawls
    pub fn start(&self, kind: JobKind, start: u64, end: u64, overwrite: bool) -> Result<()> {
        match kind.category() {
            Some(category) => self.start_category(category, start, end, overwrite),
            None => self.start_imdb(),
        }
    }

    /// Launches a scan of `category` in the background
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The scan was launched
    /// * `Err(HarvestError::AlreadyRunning)` - A scan of this category is active
    pub fn start_category(
        &self,
        category: Category,
        start: u64,
        end: u64,
        overwrite: bool,
    ) -> Result<()> {
        let kind = JobKind::from(category);
        let cancel = self.begin(kind)?;

        let crawler = self.crawler(category).clone();
        let jobs = self.jobs.clone();

        tracing::info!("Starting {} crawler", kind);
        tokio::spawn(async move {
            let _guard = RunningGuard { jobs, kind };
            match crawler.start(cancel, start, end, overwrite).await {
                Ok(report) => tracing::info!(
                    "{} crawler finished ({}) at cursor {}",
                    kind,
                    report.final_state,
                    report.cursor
                ),
                Err(e) => tracing::error!("{} crawler errored out: {}", kind, e),
            }
        });

        Ok(())
    }

    /// Launches the ratings importer in the background
    pub fn start_imdb(&self) -> Result<()> {
        let kind = JobKind::Imdb;
        let cancel = self.begin(kind)?;

        let importer = self.imdb.clone();
        let jobs = self.jobs.clone();

        tracing::info!("Starting ratings importer");
        tokio::spawn(async move {
            let _guard = RunningGuard { jobs, kind };
            if let Err(e) = importer.start(cancel).await {
                tracing::error!("Ratings importer errored out: {}", e);
            }
        });

        Ok(())
    }

    /// Signals cancellation to a running job; a no-op otherwise
    ///
    /// The job stops at its next cancellation check, not immediately.
    pub fn stop(&self, kind: JobKind) {
        let token = self.jobs().get_mut(&kind).and_then(|state| state.cancel.take());

        match token {
            Some(token) => {
                tracing::info!("Stopping {} job", kind);
                token.cancel();
            }
            None => tracing::debug!("Stop requested for {} but it is not running", kind),
        }
    }

    pub fn stop_category(&self, category: Category) {
        self.stop(JobKind::from(category));
    }

    /// Returns true while a job of `kind` is running
    pub fn is_running(&self, kind: JobKind) -> bool {
        self.jobs().get(&kind).map(|s| s.running).unwrap_or(false)
    }

    /// Collects running flags, last start times and live cursors
    ///
    /// A cursor that cannot be read is logged and reported as 0.
    pub fn get_stats(&self) -> ScrapeStats {
        let (running, started): (HashMap<_, _>, HashMap<_, _>) = self
            .jobs()
            .iter()
            .map(|(kind, state)| ((*kind, state.running), (*kind, state.last_start)))
            .unzip();

        let progress = |category: Category| match self.crawler(category).get_progress() {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!("Error getting {} progress: {}", category, e);
                0
            }
        };

        ScrapeStats {
            movie_crawling: running.get(&JobKind::Movie).copied().unwrap_or(false),
            show_crawling: running.get(&JobKind::Show).copied().unwrap_or(false),
            imdb_working: running.get(&JobKind::Imdb).copied().unwrap_or(false),
            movie_progress: progress(Category::Movie),
            show_progress: progress(Category::Show),
            last_movie_crawler_time: started.get(&JobKind::Movie).copied().flatten(),
            last_show_crawler_time: started.get(&JobKind::Show).copied().flatten(),
            last_imdb_sync_time: started.get(&JobKind::Imdb).copied().flatten(),
        }
    }

    /// Signals cancellation to every running job
    pub fn shut_down(&self) {
        let tokens: Vec<(JobKind, CancellationToken)> = self
            .jobs()
            .iter_mut()
            .filter_map(|(kind, state)| state.cancel.take().map(|token| (*kind, token)))
            .collect();

        for (kind, token) in tokens {
            tracing::info!("Cancelling {} job for shutdown", kind);
            token.cancel();
        }
    }

    /// Waits until no job is running, up to `timeout`
    ///
    /// # Returns
    ///
    /// `true` if every job finished in time
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let busy: Vec<JobKind> = self
                .jobs()
                .iter()
                .filter(|(_, state)| state.running)
                .map(|(kind, _)| *kind)
                .collect();

            if busy.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Jobs still running after {:?}: {:?}", timeout, busy);
                return false;
            }

            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

fn lock_jobs(jobs: &JobTable) -> MutexGuard<'_, HashMap<JobKind, JobState>> {
    jobs.lock().expect("job table lock poisoned")
}

/// Flips a job back to not running when its task ends, panics included
struct RunningGuard {
    jobs: JobTable,
    kind: JobKind,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        // Runs during unwinding too, so a poisoned table must not panic again
        let mut jobs = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let state = jobs.entry(self.kind).or_default();
        state.running = false;
        state.cancel = None;
    }
}
