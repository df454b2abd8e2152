//! Incremental Sync Engine
//!
//! This crate handles:
//! - Cursor-based paging against rate-limited upstream APIs
//! - Watermark bookkeeping so each run fetches only new records
//! - Deduplicating merges into SQLite (or in-memory) stores
//! - Per-group checkpoints kept in the project's query file

pub mod engine;
pub mod merge;
pub mod record;
pub mod source;
pub mod sqlite;
pub mod store;
pub mod watermark;

pub use engine::*;
pub use record::*;
pub use source::*;
pub use store::*;
pub use watermark::*;
