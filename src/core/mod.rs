pub mod duplicate;
pub mod fingerprint;
pub mod hash;
pub mod library;
pub mod perceptual;
pub mod scanner;
pub mod similarity;

pub use duplicate::{DuplicateClusterer, DuplicateReport};
pub use fingerprint::{FileFingerprinter, FingerprintError, Fingerprinter};
pub use library::{DirectoryLibrary, LibraryError, LibraryItem, MediaLibrary};
pub use perceptual::PerceptualAlgorithm;
pub use scanner::{DiffReport, LibraryDiffScanner, ScanError};
pub use similarity::{SimilarityClusterer, SimilarityError, SimilarityReport, UnionFind};
