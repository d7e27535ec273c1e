pub mod models;
pub mod repositories;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use models::{
    AssetKey, AssetRecord, CategoryTotals, GroupState, GroupSummary, GroupType,
    InvariantViolation, MediaType,
};
pub use repositories::{AssetFilter, AssetRepository, CatalogWriter};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    asset_id       TEXT NOT NULL,
    media_type     TEXT NOT NULL,
    creation_date  TEXT NOT NULL,
    group_type     TEXT NOT NULL DEFAULT 'other',
    subgroup_id    TEXT,
    content_hash   BLOB,
    feature_vector BLOB,
    size_bytes     INTEGER NOT NULL DEFAULT 0,
    is_checked     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (media_type, asset_id)
);

CREATE INDEX IF NOT EXISTS idx_assets_group ON assets(media_type, group_type);
CREATE INDEX IF NOT EXISTS idx_assets_subgroup ON assets(subgroup_id);
CREATE INDEX IF NOT EXISTS idx_assets_checked ON assets(media_type, is_checked);
CREATE INDEX IF NOT EXISTS idx_assets_hash ON assets(media_type, content_hash);

CREATE TABLE IF NOT EXISTS catalog_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database query error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Refusing to write invalid record: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Corrupt value {value:?} in column {column}")]
    Corrupt { column: &'static str, value: String },

    #[error("Catalog connection lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handle to the catalog connection. Cloning is cheap; every clone
/// talks to the same database.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;
        log::debug!("Catalog schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::LockPoisoned)
    }
}

pub fn default_database_path() -> Result<PathBuf, CatalogError> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find data directory",
        ))
    })?;

    Ok(data_dir.join("cullrs").join("catalog.db"))
}
