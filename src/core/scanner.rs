use super::library::{LibraryError, MediaLibrary};
use crate::database::CatalogError;
use crate::database::models::{AssetRecord, MediaType};
use crate::database::repositories::{AssetFilter, AssetRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Media library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub inserted: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub size_defaults: usize,
}

/// Reconciles catalog membership with the media library, one media type at
/// a time.
pub struct LibraryDiffScanner<'a> {
    library: &'a dyn MediaLibrary,
    repo: &'a AssetRepository,
}

impl<'a> LibraryDiffScanner<'a> {
    pub fn new(library: &'a dyn MediaLibrary, repo: &'a AssetRepository) -> Self {
        Self { library, repo }
    }

    /// Inserts newly appeared items as unchecked `Other` records and deletes
    /// records whose item vanished. Saved before returning.
    pub fn sync(&self, media_type: MediaType) -> Result<DiffReport, ScanError> {
        let mut known: HashMap<String, AssetRecord> = self
            .repo
            .fetch(&AssetFilter::media(media_type))?
            .into_iter()
            .map(|record| (record.asset_id.clone(), record))
            .collect();

        let items = self.library.list_items(media_type)?;
        let mut report = DiffReport::default();
        let mut fresh = Vec::new();

        for item in items {
            if known.remove(&item.id).is_some() {
                report.unchanged += 1;
                continue;
            }

            let size_bytes = match item.size.map(i64::try_from) {
                Some(Ok(size)) => size,
                _ => {
                    log::warn!("Size unavailable for {} {}, recording 0", media_type, item.id);
                    report.size_defaults += 1;
                    0
                }
            };
            fresh.push(AssetRecord::discovered(
                item.id,
                media_type,
                item.created_at,
                size_bytes,
            ));
        }

        let mut writer = self.repo.writer();
        report.inserted = fresh.len();
        writer.insert(fresh);
        report.removed = known.len();
        for vanished in known.values() {
            writer.delete(vanished);
        }
        writer.save()?;

        log::info!(
            "Synced {}: {} new, {} removed, {} unchanged",
            media_type,
            report.inserted,
            report.removed,
            report.unchanged
        );
        Ok(report)
    }
}
