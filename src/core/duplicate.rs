// Exact duplicate detection: assets whose content digests are equal are
// byte-identical and share one Duplicate subgroup.

use super::fingerprint::Fingerprinter;
use crate::database::CatalogError;
use crate::database::models::{AssetRecord, GroupState, GroupType, MediaType};
use crate::database::repositories::{AssetFilter, AssetRepository};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub hashed: usize,
    pub hash_failures: usize,
    pub groups: usize,
    pub grouped_assets: usize,
    pub demoted: usize,
}

pub struct DuplicateClusterer<'a> {
    repo: &'a AssetRepository,
    fingerprinter: &'a dyn Fingerprinter,
}

impl<'a> DuplicateClusterer<'a> {
    pub fn new(repo: &'a AssetRepository, fingerprinter: &'a dyn Fingerprinter) -> Self {
        Self {
            repo,
            fingerprinter,
        }
    }

    pub fn run(&self, media_type: MediaType) -> Result<DuplicateReport, CatalogError> {
        let mut report = DuplicateReport::default();
        let newly_hashed = self.hash_pending(media_type, &mut report)?;

        let hashed = self
            .repo
            .fetch(&AssetFilter::media(media_type).has_hash(true))?;

        let mut order: Vec<Vec<u8>> = Vec::new();
        let mut buckets: HashMap<Vec<u8>, Vec<AssetRecord>> = HashMap::new();
        for record in hashed {
            let Some(hash) = record.content_hash.clone() else {
                continue;
            };
            buckets
                .entry(hash.clone())
                .or_insert_with(|| {
                    order.push(hash);
                    Vec::new()
                })
                .push(record);
        }

        let mut writer = self.repo.writer();
        for hash in &order {
            let Some(members) = buckets.remove(hash) else {
                continue;
            };

            if members.len() > 1 {
                let subgroup_id = members
                    .iter()
                    .find_map(|m| match m.group_state() {
                        GroupState::Duplicate(id) => Some(id),
                        _ => None,
                    })
                    .unwrap_or_else(Uuid::new_v4);

                report.groups += 1;
                report.grouped_assets += members.len();
                log::debug!(
                    "Duplicate group {} has {} member(s)",
                    subgroup_id,
                    members.len()
                );

                writer.update(members.into_iter().filter_map(|member| {
                    let grouped = member
                        .clone()
                        .reclassify(GroupState::Duplicate(subgroup_id))
                        .checked(true);
                    (grouped != member).then_some(grouped)
                }));
                continue;
            }

            for member in members {
                if member.group_type == GroupType::Duplicate {
                    log::debug!("Demoting {} from a shrunken duplicate group", member.asset_id);
                    report.demoted += 1;
                    writer.update([member.reclassify(GroupState::Other).checked(false)]);
                } else if newly_hashed.contains(&member.asset_id) && member.is_checked {
                    writer.update([member.checked(false)]);
                }
            }
        }
        writer.save()?;

        log::info!(
            "Duplicate pass for {}: {} hashed, {} group(s) covering {} asset(s), {} demoted",
            media_type,
            report.hashed,
            report.groups,
            report.grouped_assets,
            report.demoted
        );
        Ok(report)
    }

    /// Computes and persists digests for every unhashed record. Failures
    /// leave the digest empty so the asset is retried next pass.
    fn hash_pending(
        &self,
        media_type: MediaType,
        report: &mut DuplicateReport,
    ) -> Result<HashSet<String>, CatalogError> {
        let pending = self
            .repo
            .fetch(&AssetFilter::media(media_type).has_hash(false))?;
        if pending.is_empty() {
            return Ok(HashSet::new());
        }

        log::info!("Hashing {} new {} asset(s)", pending.len(), media_type);
        let fingerprinter = self.fingerprinter;
        let results: Vec<_> = pending
            .into_par_iter()
            .map(|record| {
                let hash = fingerprinter.content_hash(media_type, &record.asset_id);
                (record, hash)
            })
            .collect();

        let mut writer = self.repo.writer();
        let mut newly_hashed = HashSet::new();
        for (mut record, hash) in results {
            match hash {
                Ok(hash) => {
                    record.content_hash = Some(hash);
                    newly_hashed.insert(record.asset_id.clone());
                    writer.update([record]);
                }
                Err(e) => {
                    log::warn!("Could not hash {} {}: {}", media_type, record.asset_id, e);
                    report.hash_failures += 1;
                }
            }
        }
        report.hashed = newly_hashed.len();
        writer.save()?;

        Ok(newly_hashed)
    }
}
