//! IMDb ratings importer
//!
//! Periodically downloads the public `title.ratings.tsv.gz` dataset and
//! upserts it into the `imdb_ratings` table.

mod importer;

pub use importer::{parse_ratings, ImdbImporter, DATASET_FILE};
