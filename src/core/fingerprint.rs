use super::hash::{HashError, HashService};
use super::library::DirectoryLibrary;
use super::perceptual::{PerceptualAlgorithm, PerceptualError, PerceptualService};
use crate::database::models::MediaType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Asset id does not resolve inside the library: {asset_id}")]
    InvalidAssetId { asset_id: String },

    #[error("No perceptual descriptor for {media_type} assets")]
    Unsupported { media_type: MediaType },

    #[error("Hash computation error: {0}")]
    Hash(#[from] HashError),

    #[error("Perceptual hash error: {0}")]
    Perceptual(#[from] PerceptualError),
}

/// Produces content digests and perceptual descriptors for assets. Both
/// calls may be slow and IO-bound; implementations must be shareable across
/// the worker's threads.
pub trait Fingerprinter: Send + Sync {
    fn content_hash(
        &self,
        media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError>;

    fn feature_vector(
        &self,
        media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError>;

    /// Whether `feature_vector` can succeed for this media type at all.
    fn supports_features(&self, media_type: MediaType) -> bool;

    /// Names the feature vector encoding. Vectors produced under different
    /// descriptors must never be compared.
    fn descriptor(&self) -> String;
}

/// Fingerprints files of a [`DirectoryLibrary`].
#[derive(Debug)]
pub struct FileFingerprinter {
    library: DirectoryLibrary,
    hash_service: HashService,
    perceptual_service: PerceptualService,
    algorithm: PerceptualAlgorithm,
    hash_size: u32,
}

impl FileFingerprinter {
    pub fn new(library: DirectoryLibrary, algorithm: PerceptualAlgorithm, hash_size: u32) -> Self {
        Self {
            library,
            hash_service: HashService::new(),
            perceptual_service: PerceptualService::new(algorithm, hash_size),
            algorithm,
            hash_size,
        }
    }
}

impl Fingerprinter for FileFingerprinter {
    fn content_hash(
        &self,
        _media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError> {
        let path = self
            .library
            .resolve(asset_id)
            .ok_or_else(|| FingerprintError::InvalidAssetId {
                asset_id: asset_id.to_string(),
            })?;
        Ok(self.hash_service.compute_content_hash(&path)?)
    }

    fn feature_vector(
        &self,
        media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError> {
        if !self.supports_features(media_type) {
            return Err(FingerprintError::Unsupported { media_type });
        }
        let path = self
            .library
            .resolve(asset_id)
            .ok_or_else(|| FingerprintError::InvalidAssetId {
                asset_id: asset_id.to_string(),
            })?;
        Ok(self.perceptual_service.compute_feature_vector(&path)?)
    }

    fn supports_features(&self, media_type: MediaType) -> bool {
        media_type.is_still_image()
    }

    fn descriptor(&self) -> String {
        format!("{}/{}", self.algorithm.as_str(), self.hash_size)
    }
}
