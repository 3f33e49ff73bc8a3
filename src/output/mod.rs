//! Output module for reporting harvest results
//!
//! This module handles:
//! - Loading per-category statistics from the database
//! - Printing them for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics, CategoryStatistics};
