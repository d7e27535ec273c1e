use super::fingerprint::Fingerprinter;
use super::perceptual::distance;
use crate::database::CatalogError;
use crate::database::models::{AssetRecord, GroupState, GroupType, MediaType};
use crate::database::repositories::{AssetFilter, AssetRepository};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Similarity pass cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub candidates: usize,
    pub compared: usize,
    pub groups_touched: usize,
    pub vector_failures: usize,
    pub orphans_settled: usize,
}

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merges the sets holding `a` and `b`. Returns false if they were
    /// already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    pub fn members(&mut self, x: usize) -> Vec<usize> {
        let root = self.find(x);
        (0..self.parent.len())
            .filter(|&k| self.find(k) == root)
            .collect()
    }
}

/// Groups visually similar assets that are not exact duplicates.
///
/// Only records not yet checked are compared, each against every record
/// before it in `checked ++ unchecked` order, so a pass costs
/// `O(new × all)` rather than `O(all²)`. Duplicate-group members never take
/// part.
pub struct SimilarityClusterer<'a> {
    repo: &'a AssetRepository,
    fingerprinter: &'a dyn Fingerprinter,
    threshold: f64,
    cancel: Option<&'a AtomicBool>,
    on_progress: Option<&'a (dyn Fn(usize, usize) + Sync)>,
}

impl<'a> SimilarityClusterer<'a> {
    pub fn new(
        repo: &'a AssetRepository,
        fingerprinter: &'a dyn Fingerprinter,
        threshold: f64,
    ) -> Self {
        Self {
            repo,
            fingerprinter,
            threshold,
            cancel: None,
            on_progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, on_progress: &'a (dyn Fn(usize, usize) + Sync)) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn run(&self, media_type: MediaType) -> Result<SimilarityReport, SimilarityError> {
        let mut report = SimilarityReport {
            orphans_settled: self.settle_orphans(media_type)?,
            ..Default::default()
        };

        let candidates = self.repo.fetch(
            &AssetFilter::media(media_type)
                .not_group_type(GroupType::Duplicate)
                .has_hash(true),
        )?;
        let (old, new): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|r| r.is_checked);
        if new.is_empty() {
            log::debug!("No unchecked {} assets, similarity pass skipped", media_type);
            return Ok(report);
        }

        let old = self.ensure_vectors(media_type, old, &mut report)?;
        let new = self.ensure_vectors(media_type, new, &mut report)?;
        let boundary = old.len();
        let mut all: Vec<AssetRecord> = old.into_iter().chain(new).collect();
        report.candidates = all.len();

        let mut sets = UnionFind::new(all.len());
        let mut first_of_group: HashMap<Uuid, usize> = HashMap::new();
        for (index, record) in all.iter().enumerate() {
            if let GroupState::Similar(id) = record.group_state() {
                let first = *first_of_group.entry(id).or_insert(index);
                sets.union(first, index);
            }
        }

        log::info!(
            "Comparing {} unchecked {} asset(s) against {} candidate(s)",
            all.len() - boundary,
            media_type,
            all.len()
        );

        let mut touched: HashSet<Uuid> = HashSet::new();
        let total = all.len() - boundary;
        for i in boundary..all.len() {
            if self.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                log::info!(
                    "Similarity pass for {} cancelled at {}/{}",
                    media_type,
                    i - boundary,
                    total
                );
                return Err(SimilarityError::Cancelled);
            }

            for j in 0..i {
                let (Some(a), Some(b)) = (&all[i].feature_vector, &all[j].feature_vector) else {
                    continue;
                };
                report.compared += 1;
                if distance(a, b).is_some_and(|d| d <= self.threshold) {
                    sets.union(i, j);
                }
            }

            self.checkpoint(&mut all, &mut sets, i, &mut touched)?;

            if let Some(on_progress) = self.on_progress {
                on_progress(i - boundary + 1, total);
            }
        }

        report.groups_touched = touched.len();
        log::info!(
            "Similarity pass for {}: {} comparison(s), {} group(s) touched",
            media_type,
            report.compared,
            report.groups_touched
        );
        Ok(report)
    }

    /// Writes the component containing `index` back to the catalog so that a
    /// stop after this point leaves every record fully classified.
    fn checkpoint(
        &self,
        all: &mut [AssetRecord],
        sets: &mut UnionFind,
        index: usize,
        touched: &mut HashSet<Uuid>,
    ) -> Result<(), CatalogError> {
        let members = sets.members(index);
        let mut writer = self.repo.writer();

        if members.len() > 1 {
            let subgroup_id = members
                .iter()
                .find_map(|&k| match all[k].group_state() {
                    GroupState::Similar(id) => Some(id),
                    _ => None,
                })
                .unwrap_or_else(Uuid::new_v4);
            touched.insert(subgroup_id);

            for k in members {
                let grouped = all[k]
                    .clone()
                    .reclassify(GroupState::Similar(subgroup_id))
                    .checked(true);
                if grouped != all[k] {
                    log::debug!("{} joins similar group {}", grouped.asset_id, subgroup_id);
                    writer.update([grouped.clone()]);
                    all[k] = grouped;
                }
            }
        } else if !all[index].is_checked {
            all[index].is_checked = true;
            writer.update([all[index].clone()]);
        }

        writer.save()?;
        Ok(())
    }

    /// Fills in missing feature vectors and persists them. Records whose
    /// vector cannot be computed are dropped from this pass.
    fn ensure_vectors(
        &self,
        media_type: MediaType,
        records: Vec<AssetRecord>,
        report: &mut SimilarityReport,
    ) -> Result<Vec<AssetRecord>, CatalogError> {
        let fingerprinter = self.fingerprinter;
        let results: Vec<(AssetRecord, bool)> = records
            .into_par_iter()
            .map(|mut record| {
                if record.feature_vector.is_some() {
                    return (record, false);
                }
                match fingerprinter.feature_vector(media_type, &record.asset_id) {
                    Ok(vector) => {
                        record.feature_vector = Some(vector);
                    }
                    Err(e) => {
                        log::warn!(
                            "Could not compute features for {} {}: {}",
                            media_type,
                            record.asset_id,
                            e
                        );
                    }
                }
                (record, true)
            })
            .collect();

        let mut writer = self.repo.writer();
        let mut ready = Vec::with_capacity(results.len());
        for (record, computed) in results {
            if record.feature_vector.is_none() {
                report.vector_failures += 1;
                continue;
            }
            if computed {
                writer.update([record.clone()]);
            }
            ready.push(record);
        }
        writer.save()?;

        Ok(ready)
    }

    /// Demotes Similar groups left with a single member after deletions.
    fn settle_orphans(&self, media_type: MediaType) -> Result<usize, CatalogError> {
        let similar = self
            .repo
            .fetch(&AssetFilter::media(media_type).group_type(GroupType::Similar))?;

        let mut sizes: HashMap<Uuid, usize> = HashMap::new();
        for record in &similar {
            if let Some(id) = record.subgroup_id {
                *sizes.entry(id).or_default() += 1;
            }
        }

        let mut writer = self.repo.writer();
        let mut settled = 0;
        for record in similar {
            if record.subgroup_id.and_then(|id| sizes.get(&id)) == Some(&1) {
                log::debug!("{} is the last member of its similar group", record.asset_id);
                writer.update([record.reclassify(GroupState::Other)]);
                settled += 1;
            }
        }
        writer.save()?;
        Ok(settled)
    }
}
