use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceptualError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptualAlgorithm {
    Mean,
    Median,
    #[default]
    Gradient,
    VertGradient,
    DoubleGradient,
    Blockhash,
}

impl PerceptualAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerceptualAlgorithm::Mean => "mean",
            PerceptualAlgorithm::Median => "median",
            PerceptualAlgorithm::Gradient => "gradient",
            PerceptualAlgorithm::VertGradient => "vert_gradient",
            PerceptualAlgorithm::DoubleGradient => "double_gradient",
            PerceptualAlgorithm::Blockhash => "blockhash",
        }
    }
}

impl From<PerceptualAlgorithm> for HashAlg {
    fn from(alg: PerceptualAlgorithm) -> Self {
        match alg {
            PerceptualAlgorithm::Mean => HashAlg::Mean,
            PerceptualAlgorithm::Median => HashAlg::Median,
            PerceptualAlgorithm::Gradient => HashAlg::Gradient,
            PerceptualAlgorithm::VertGradient => HashAlg::VertGradient,
            PerceptualAlgorithm::DoubleGradient => HashAlg::DoubleGradient,
            PerceptualAlgorithm::Blockhash => HashAlg::Blockhash,
        }
    }
}

/// Computes perceptual feature vectors and compares them.
pub struct PerceptualService {
    hasher: Hasher,
}

impl std::fmt::Debug for PerceptualService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualService").finish_non_exhaustive()
    }
}

impl PerceptualService {
    pub fn new(algorithm: PerceptualAlgorithm, hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(algorithm.into())
            .hash_size(hash_size, hash_size)
            .to_hasher();
        Self { hasher }
    }

    pub fn compute_feature_vector(&self, image_path: &Path) -> Result<Vec<u8>, PerceptualError> {
        let img = ImageReader::open(image_path)?
            .with_guessed_format()?
            .decode()?;
        Ok(self.feature_vector_of(&img))
    }

    pub fn feature_vector_of(&self, img: &DynamicImage) -> Vec<u8> {
        self.hasher.hash_image(img).as_bytes().to_vec()
    }
}

impl Default for PerceptualService {
    fn default() -> Self {
        Self::new(PerceptualAlgorithm::default(), 8)
    }
}

/// Normalized Hamming distance between two feature vectors: `0.0` for
/// identical bits, `1.0` when every bit differs. Vectors of different
/// lengths were produced by different hashers and are incomparable.
pub fn distance(a: &[u8], b: &[u8]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let differing: u32 = a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum();
    Some(differing as f64 / (a.len() * 8) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn gradient(offset: u8, reversed: bool) -> DynamicImage {
        let img = GrayImage::from_fn(64, 64, |x, _| {
            let x = if reversed { 63 - x } else { x };
            Luma([(x * 3) as u8 + offset])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_distance_bounds() {
        assert_eq!(distance(&[0b1010_1010], &[0b1010_1010]), Some(0.0));
        assert_eq!(distance(&[0x00, 0x00], &[0xff, 0xff]), Some(1.0));
        assert_eq!(distance(&[0x0f], &[0x00]), Some(0.5));
    }

    #[test]
    fn test_distance_rejects_mismatched_lengths() {
        assert_eq!(distance(&[0x00], &[0x00, 0x00]), None);
        assert_eq!(distance(&[], &[]), None);
    }

    #[test]
    fn test_brightness_shift_is_near_and_mirror_is_far() {
        let service = PerceptualService::default();
        let base = service.feature_vector_of(&gradient(0, false));
        let brighter = service.feature_vector_of(&gradient(10, false));
        let mirrored = service.feature_vector_of(&gradient(0, true));

        let near = distance(&base, &brighter).unwrap();
        let far = distance(&base, &mirrored).unwrap();
        assert!(near <= 0.1, "near distance was {near}");
        assert!(far >= 0.5, "far distance was {far}");
    }

    #[test]
    fn test_compute_feature_vector_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gradient.png");
        gradient(0, false).save(&path).unwrap();

        let service = PerceptualService::default();
        let from_file = service.compute_feature_vector(&path).unwrap();
        assert_eq!(from_file, service.feature_vector_of(&gradient(0, false)));
        assert_eq!(from_file.len(), 8);
    }

    #[test]
    fn test_undecodable_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let result = PerceptualService::default().compute_feature_vector(&path);
        assert!(result.is_err());
    }
}
