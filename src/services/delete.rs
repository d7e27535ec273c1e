use crate::core::library::{LibraryError, MediaLibrary};
use crate::database::CatalogError;
use crate::database::models::{GroupState, GroupType, MediaType};
use crate::database::repositories::{AssetFilter, AssetRepository};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("Media library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub removed: usize,
    pub freed_bytes: i64,
    pub demoted: usize,
}

/// Removes assets from the library and then from the catalog. Groups left
/// with a single member are demoted to `Other`.
pub fn delete_assets(
    library: &dyn MediaLibrary,
    repo: &AssetRepository,
    media_type: MediaType,
    ids: &[String],
) -> Result<DeleteReport, DeleteError> {
    if ids.is_empty() {
        return Ok(DeleteReport::default());
    }

    let doomed = repo.fetch(&AssetFilter::media(media_type).asset_ids(ids.iter()))?;
    library.delete_items(media_type, ids)?;

    let mut report = DeleteReport::default();
    let doomed_ids: HashSet<&str> = doomed.iter().map(|r| r.asset_id.as_str()).collect();
    let touched: BTreeSet<_> = doomed.iter().filter_map(|r| r.subgroup_id).collect();

    let mut writer = repo.writer();
    for record in &doomed {
        writer.delete(record);
        report.removed += 1;
        report.freed_bytes += record.size_bytes;
    }

    for subgroup_id in touched {
        let survivors: Vec<_> = repo
            .fetch_group(media_type, subgroup_id)?
            .into_iter()
            .filter(|r| !doomed_ids.contains(r.asset_id.as_str()))
            .collect();
        if survivors.len() != 1 {
            continue;
        }

        for survivor in survivors {
            log::debug!(
                "Demoting {} after its {} group lost its peers",
                survivor.asset_id,
                survivor.group_type
            );
            // A former exact duplicate has never been compared for similarity.
            let was_duplicate = survivor.group_type == GroupType::Duplicate;
            let demoted = survivor.reclassify(GroupState::Other);
            let demoted = if was_duplicate {
                demoted.checked(false)
            } else {
                demoted
            };
            writer.update([demoted]);
            report.demoted += 1;
        }
    }
    writer.save()?;

    log::info!(
        "Deleted {} {} asset(s), freed {} bytes, demoted {}",
        report.removed,
        media_type,
        report.freed_bytes,
        report.demoted
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::services::grouping::GroupingOrchestrator;
    use crate::testing::{MemoryLibrary, TableFingerprinter};
    use std::sync::Arc;

    struct Fixture {
        library: Arc<MemoryLibrary>,
        fingerprinter: Arc<TableFingerprinter>,
        orchestrator: GroupingOrchestrator,
    }

    impl Fixture {
        fn new() -> Self {
            let library = Arc::new(MemoryLibrary::new());
            let fingerprinter = Arc::new(TableFingerprinter::new());
            let orchestrator = GroupingOrchestrator::new(
                AssetRepository::new(Database::open_in_memory().unwrap()),
                library.clone(),
                fingerprinter.clone(),
            )
            .with_media_types(vec![MediaType::Photo]);
            Self {
                library,
                fingerprinter,
                orchestrator,
            }
        }

        fn add(&self, id: &str, hash: &[u8], vector: u8) {
            self.library.add(MediaType::Photo, id, Some(500));
            self.fingerprinter.set(id, hash, &[vector]);
        }

        fn repo(&self) -> &AssetRepository {
            self.orchestrator.repository()
        }

        fn get(&self, id: &str) -> Option<crate::database::AssetRecord> {
            self.repo()
                .fetch(&AssetFilter::media(MediaType::Photo).asset_ids([id]))
                .unwrap()
                .pop()
        }

        fn delete(&self, ids: &[&str]) -> Result<DeleteReport, DeleteError> {
            let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
            delete_assets(self.library.as_ref(), self.repo(), MediaType::Photo, &ids)
        }
    }

    #[test]
    fn test_deleting_a_duplicate_demotes_the_survivor() {
        let fx = Fixture::new();
        fx.add("p1", b"H1", 0);
        fx.add("p2", b"H1", 0);
        fx.orchestrator.run_pass().unwrap();

        let report = fx.delete(&["p2"]).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.freed_bytes, 500);
        assert_eq!(report.demoted, 1);

        assert!(fx.get("p2").is_none());
        assert_eq!(fx.library.ids(MediaType::Photo), vec!["p1".to_string()]);
        let p1 = fx.get("p1").unwrap();
        assert_eq!(p1.group_type, GroupType::Other);
        assert!(p1.subgroup_id.is_none());
        assert!(!p1.is_checked);
    }

    #[test]
    fn test_larger_group_keeps_its_id() {
        let fx = Fixture::new();
        fx.add("a", b"A", 0b0000_0000);
        fx.add("b", b"B", 0b0000_0001);
        fx.add("c", b"C", 0b0000_0011);
        fx.orchestrator.run_pass().unwrap();
        let group = fx.get("a").unwrap().subgroup_id;
        assert!(group.is_some());

        let report = fx.delete(&["b"]).unwrap();
        assert_eq!(report.demoted, 0);
        assert_eq!(fx.get("a").unwrap().subgroup_id, group);
        assert_eq!(fx.get("c").unwrap().subgroup_id, group);
        assert_eq!(fx.get("a").unwrap().group_type, GroupType::Similar);
    }

    #[test]
    fn test_similar_survivor_stays_checked() {
        let fx = Fixture::new();
        fx.add("a", b"A", 0b0000_0000);
        fx.add("b", b"B", 0b0000_0001);
        fx.orchestrator.run_pass().unwrap();

        let report = fx.delete(&["a"]).unwrap();
        assert_eq!(report.demoted, 1);
        let b = fx.get("b").unwrap();
        assert_eq!(b.group_type, GroupType::Other);
        assert!(b.is_checked);
        assert!(b.validate().is_ok());

        let before = fx.repo().fetch(&AssetFilter::new()).unwrap();
        fx.orchestrator.run_pass().unwrap();
        assert_eq!(fx.repo().fetch(&AssetFilter::new()).unwrap(), before);
    }

    #[test]
    fn test_library_failure_leaves_catalog_untouched() {
        let fx = Fixture::new();
        fx.add("p1", b"H1", 0);
        fx.add("p2", b"H1", 0);
        fx.orchestrator.run_pass().unwrap();
        let before = fx.repo().fetch(&AssetFilter::new()).unwrap();

        let result = fx.delete(&["p2", "missing"]);
        assert!(matches!(result, Err(DeleteError::Library(_))));
        assert_eq!(fx.repo().fetch(&AssetFilter::new()).unwrap(), before);
    }

    #[test]
    fn test_empty_request_is_a_no_op() {
        let fx = Fixture::new();
        fx.add("p1", b"H1", 0);
        fx.orchestrator.run_pass().unwrap();

        assert_eq!(fx.delete(&[]).unwrap(), DeleteReport::default());
        assert!(fx.get("p1").is_some());
    }
}
