use crate::core::duplicate::{DuplicateClusterer, DuplicateReport};
use crate::core::fingerprint::Fingerprinter;
use crate::core::library::MediaLibrary;
use crate::core::scanner::{DiffReport, LibraryDiffScanner, ScanError};
use crate::core::similarity::{SimilarityClusterer, SimilarityError, SimilarityReport};
use crate::database::CatalogError;
use crate::database::models::{AssetRecord, GroupState, GroupType, MediaType};
use crate::database::repositories::{AssetFilter, AssetRepository};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Catalog setting naming the encoding of the stored feature vectors.
const DESCRIPTOR_KEY: &str = "feature_descriptor";

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("Library sync failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<SimilarityError> for GroupingError {
    fn from(e: SimilarityError) -> Self {
        match e {
            SimilarityError::Catalog(e) => GroupingError::Catalog(e),
            SimilarityError::Cancelled => GroupingError::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingStatus {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassStage {
    Diff,
    Duplicates,
    Similarity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassProgress {
    pub media_type: MediaType,
    pub stage: PassStage,
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPassReport {
    pub media_type: MediaType,
    pub diff: DiffReport,
    pub duplicates: DuplicateReport,
    /// `None` when the fingerprinter has no perceptual descriptor for the
    /// media type.
    pub similarity: Option<SimilarityReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub reports: Vec<MediaPassReport>,
    /// Records whose feature vectors were dropped because the descriptor
    /// changed since the last pass.
    pub features_reset: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Completed(PassSummary),
    /// Another pass already held the catalog; this call did nothing.
    Coalesced,
}

/// Runs diff, duplicate clustering, and similarity clustering for every
/// configured media type, in that order, and publishes the pass status.
pub struct GroupingOrchestrator {
    repo: AssetRepository,
    library: Arc<dyn MediaLibrary>,
    fingerprinter: Arc<dyn Fingerprinter>,
    similarity_threshold: f64,
    media_types: Vec<MediaType>,
    pass_guard: Mutex<()>,
    status: watch::Sender<GroupingStatus>,
    cancellation_token: Arc<AtomicBool>,
    progress_sender: Option<mpsc::UnboundedSender<PassProgress>>,
}

impl GroupingOrchestrator {
    pub fn new(
        repo: AssetRepository,
        library: Arc<dyn MediaLibrary>,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> Self {
        let (status, _) = watch::channel(GroupingStatus::Idle);
        Self {
            repo,
            library,
            fingerprinter,
            similarity_threshold: 0.40,
            media_types: MediaType::ALL.to_vec(),
            pass_guard: Mutex::new(()),
            status,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            progress_sender: None,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_media_types(mut self, media_types: Vec<MediaType>) -> Self {
        self.media_types = media_types;
        self
    }

    pub fn with_progress_sender(mut self, sender: mpsc::UnboundedSender<PassProgress>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn repository(&self) -> &AssetRepository {
        &self.repo
    }

    pub fn status(&self) -> GroupingStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupingStatus> {
        self.status.subscribe()
    }

    /// Asks the running pass to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Runs one full pass. If a pass is already running the call coalesces
    /// into it and returns [`PassOutcome::Coalesced`] without touching state.
    pub fn run_pass(&self) -> Result<PassOutcome, GroupingError> {
        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                log::info!("Grouping pass already running, request coalesced");
                return Ok(PassOutcome::Coalesced);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        self.status.send_replace(GroupingStatus::InProgress);
        let mut reset = PassReset {
            status: &self.status,
            cancellation_token: &self.cancellation_token,
            finished: false,
        };
        let started = Instant::now();
        let result = self.run_stages(started);
        reset.finished = true;
        drop(reset);

        match result {
            Ok(summary) => {
                log::info!("Grouping pass completed in {:.2?}", summary.elapsed);
                self.status.send_replace(GroupingStatus::Completed);
                Ok(PassOutcome::Completed(summary))
            }
            Err(e) => {
                log::error!("Grouping pass aborted: {}", e);
                self.status.send_replace(GroupingStatus::Idle);
                Err(e)
            }
        }
    }

    fn run_stages(&self, started: Instant) -> Result<PassSummary, GroupingError> {
        let features_reset = self.reconcile_descriptor()?;
        let mut reports = Vec::with_capacity(self.media_types.len());

        for &media_type in &self.media_types {
            self.check_cancelled()?;
            self.send_progress(media_type, PassStage::Diff, 0, 0);
            let diff = LibraryDiffScanner::new(self.library.as_ref(), &self.repo).sync(media_type)?;

            self.check_cancelled()?;
            self.send_progress(media_type, PassStage::Duplicates, 0, 0);
            let duplicates =
                DuplicateClusterer::new(&self.repo, self.fingerprinter.as_ref()).run(media_type)?;

            self.check_cancelled()?;
            let similarity = if self.fingerprinter.supports_features(media_type) {
                let on_progress = |processed: usize, total: usize| {
                    self.send_progress(media_type, PassStage::Similarity, processed, total)
                };
                let report = SimilarityClusterer::new(
                    &self.repo,
                    self.fingerprinter.as_ref(),
                    self.similarity_threshold,
                )
                .with_cancellation(&self.cancellation_token)
                .with_progress(&on_progress)
                .run(media_type)?;
                Some(report)
            } else {
                log::debug!("Skipping similarity for {}", media_type);
                None
            };

            reports.push(MediaPassReport {
                media_type,
                diff,
                duplicates,
                similarity,
            });
        }

        Ok(PassSummary {
            reports,
            features_reset,
            elapsed: started.elapsed(),
        })
    }

    /// Drops feature vectors computed under another descriptor. Similar
    /// groups built from them are dissolved and their members compared again.
    fn reconcile_descriptor(&self) -> Result<usize, CatalogError> {
        let current = self.fingerprinter.descriptor();
        let stored = self.repo.meta(DESCRIPTOR_KEY)?;
        if stored.as_deref() == Some(current.as_str()) {
            return Ok(0);
        }

        let stale = self
            .repo
            .fetch(&AssetFilter::new().has_feature_vector(true))?;
        let count = stale.len();
        let mut writer = self.repo.writer();
        writer.update(stale.into_iter().map(|record| {
            let record = if record.group_type == GroupType::Duplicate {
                record
            } else {
                record.reclassify(GroupState::Other).checked(false)
            };
            AssetRecord {
                feature_vector: None,
                ..record
            }
        }));
        writer.save()?;
        self.repo.set_meta(DESCRIPTOR_KEY, &current)?;

        if count > 0 {
            log::info!(
                "Feature descriptor changed ({} -> {}), reset {} asset(s)",
                stored.as_deref().unwrap_or("none"),
                current,
                count
            );
        }
        Ok(count)
    }

    fn check_cancelled(&self) -> Result<(), GroupingError> {
        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(GroupingError::Cancelled);
        }
        Ok(())
    }

    fn send_progress(
        &self,
        media_type: MediaType,
        stage: PassStage,
        processed: usize,
        total: usize,
    ) {
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(PassProgress {
                media_type,
                stage,
                processed,
                total,
            });
        }
    }
}

/// Clears the cancel flag when a pass ends and publishes `Idle` if the pass
/// unwound before reporting an outcome.
struct PassReset<'a> {
    status: &'a watch::Sender<GroupingStatus>,
    cancellation_token: &'a AtomicBool,
    finished: bool,
}

impl Drop for PassReset<'_> {
    fn drop(&mut self) {
        self.cancellation_token.store(false, Ordering::Relaxed);
        if !self.finished {
            log::error!("Grouping pass panicked");
            self.status.send_replace(GroupingStatus::Idle);
        }
    }
}
