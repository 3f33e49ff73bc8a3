//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `Category`: The kinds of catalog entity being harvested (movie, show)
//! - `ScanState`: Lifecycle of a single scan over a category's identifier space

mod category;
mod scan_state;

// Re-export main types
pub use category::Category;
pub use scan_state::ScanState;
