//! Upstream payload shapes
//!
//! This crate handles:
//! - Search API statuses and their mapping to `Tweet`
//! - Market-data daily adjusted series and its mapping to `DailyBar`
//! - The project query file that carries per-group watermarks

pub mod market;
pub mod query_file;
pub mod search;

pub use market::*;
pub use query_file::*;
pub use search::*;
