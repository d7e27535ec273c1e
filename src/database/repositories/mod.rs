pub mod asset;
pub mod filter;
pub mod writer;

pub use asset::AssetRepository;
pub use filter::AssetFilter;
pub use writer::CatalogWriter;

use super::{CatalogError, Database};
use rusqlite::Connection;
use std::sync::MutexGuard;

pub trait Repository {
    fn database(&self) -> &Database;

    fn get_connection(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.database().lock()
    }
}
