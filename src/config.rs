use crate::core::perceptual::PerceptualAlgorithm;
use crate::database::models::MediaType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest normalized perceptual distance still treated as "similar".
    pub similarity_threshold: f64,
    pub hash_algorithm: PerceptualAlgorithm,
    /// Side length of the perceptual hash grid, in bits.
    pub hash_size: u32,
    pub media_types: Vec<MediaType>,
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.40,
            hash_algorithm: PerceptualAlgorithm::Gradient,
            hash_size: 8,
            media_types: MediaType::ALL.to_vec(),
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(2..=64).contains(&self.hash_size) {
            return Err(ConfigError::Invalid(format!(
                "hash_size must be within [2, 64], got {}",
                self.hash_size
            )));
        }
        if self.media_types.is_empty() {
            return Err(ConfigError::Invalid(
                "media_types must name at least one media type".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cullrs").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig::load(temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.similarity_threshold, 0.40);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "similarity_threshold": 0.25, "media_types": ["photo", "screenshot"] }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.similarity_threshold, 0.25);
        assert_eq!(config.media_types, vec![MediaType::Photo, MediaType::Screenshot]);
        assert_eq!(config.hash_size, 8);
        assert_eq!(config.hash_algorithm, PerceptualAlgorithm::Gradient);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "similarity_threshold": 1.5 }"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
