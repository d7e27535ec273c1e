//! Incremental duplicate and similarity grouping for a media library.
//!
//! A pass mirrors the library into a SQLite catalog, buckets byte-identical
//! assets into duplicate groups, and clusters the rest by perceptual
//! distance. Results persist between runs so only new assets are examined.

pub mod config;
pub mod core;
pub mod database;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, EngineConfig};
pub use database::{AssetRecord, CatalogError, Database, GroupType, MediaType};
pub use services::{GroupingOrchestrator, GroupingStatus, GroupingWorker};
