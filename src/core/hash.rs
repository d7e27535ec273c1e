use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service for computing exact content digests of media files
#[derive(Debug, Clone, Copy, Default)]
pub struct HashService;

impl HashService {
    pub fn new() -> Self {
        Self
    }

    /// Compute the BLAKE3 digest of the file's raw bytes.
    /// Equal digests mean byte-identical files.
    pub fn compute_content_hash(&self, file_path: &Path) -> Result<Vec<u8>, HashError> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0; 64 * 1024];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().as_bytes().to_vec())
    }
}
