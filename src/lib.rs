//! Listen Catalog Library
//!
//! Resolves scrobbled listens onto a deduplicated artist/album/track catalog
//! and answers listening statistics over loosely specified time windows.

pub mod analytics;
pub mod background_jobs;
pub mod cache;
pub mod catalog;
pub mod catalog_store;
pub mod config;
pub mod error;
pub mod providers;
pub mod request_queue;
pub mod sqlite_persistence;
pub mod timeframe;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use error::{CatalogError, CatalogResult};
