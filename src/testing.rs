//! In-memory collaborators for exercising the pipeline without touching disk.

use crate::core::fingerprint::{FingerprintError, Fingerprinter};
use crate::core::hash::HashError;
use crate::core::library::{LibraryError, LibraryItem, MediaLibrary};
use crate::database::models::MediaType;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute as i64)
}

#[derive(Debug, Default)]
pub struct MemoryLibrary {
    items: Mutex<HashMap<MediaType, Vec<LibraryItem>>>,
    fail_listing: AtomicBool,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item whose creation order follows insertion order.
    pub fn add(&self, media_type: MediaType, id: &str, size: Option<u64>) {
        let mut items = self.items.lock().unwrap();
        let list = items.entry(media_type).or_default();
        let created_at = at_minute(list.len() as u32);
        list.push(LibraryItem {
            id: id.to_string(),
            size,
            created_at,
        });
    }

    pub fn remove(&self, media_type: MediaType, id: &str) {
        let mut items = self.items.lock().unwrap();
        if let Some(list) = items.get_mut(&media_type) {
            list.retain(|item| item.id != id);
        }
    }

    pub fn ids(&self, media_type: MediaType) -> Vec<String> {
        let items = self.items.lock().unwrap();
        items
            .get(&media_type)
            .map(|list| list.iter().map(|i| i.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

impl MediaLibrary for MemoryLibrary {
    fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(LibraryError::Io(std::io::Error::other("library offline")));
        }
        let items = self.items.lock().unwrap();
        Ok(items.get(&media_type).cloned().unwrap_or_default())
    }

    fn delete_items(&self, media_type: MediaType, ids: &[String]) -> Result<(), LibraryError> {
        let mut items = self.items.lock().unwrap();
        let list = items.entry(media_type).or_default();
        for id in ids {
            if !list.iter().any(|item| &item.id == id) {
                return Err(LibraryError::NotFound {
                    asset_id: id.clone(),
                });
            }
        }
        list.retain(|item| !ids.contains(&item.id));
        Ok(())
    }
}

/// Fingerprints looked up from a table. Missing entries fail, the way an
/// unreadable file would.
#[derive(Debug, Default)]
pub struct TableFingerprinter {
    hashes: Mutex<HashMap<String, Vec<u8>>>,
    vectors: Mutex<HashMap<String, Vec<u8>>>,
    descriptor: Mutex<String>,
    crash_on: Mutex<HashSet<String>>,
    hold_hashing: AtomicBool,
    hash_calls: AtomicUsize,
    vector_calls: AtomicUsize,
}

impl TableFingerprinter {
    pub fn new() -> Self {
        let fingerprinter = Self::default();
        fingerprinter.set_descriptor("table/8");
        fingerprinter
    }

    pub fn set_descriptor(&self, descriptor: &str) {
        *self.descriptor.lock().unwrap() = descriptor.to_string();
    }

    /// Makes `content_hash` panic for `id`, the way a crashing decoder would.
    pub fn crash_on(&self, id: &str, crash: bool) {
        let mut crash_on = self.crash_on.lock().unwrap();
        if crash {
            crash_on.insert(id.to_string());
        } else {
            crash_on.remove(id);
        }
    }

    /// While held, `content_hash` blocks after counting the call.
    pub fn hold_hashing(&self, hold: bool) {
        self.hold_hashing.store(hold, Ordering::SeqCst);
    }

    pub fn set(&self, id: &str, hash: &[u8], vector: &[u8]) {
        self.set_hash(id, hash);
        self.set_vector(id, vector);
    }

    pub fn set_hash(&self, id: &str, hash: &[u8]) {
        self.hashes
            .lock()
            .unwrap()
            .insert(id.to_string(), hash.to_vec());
    }

    pub fn set_vector(&self, id: &str, vector: &[u8]) {
        self.vectors
            .lock()
            .unwrap()
            .insert(id.to_string(), vector.to_vec());
    }

    pub fn hash_calls(&self) -> usize {
        self.hash_calls.load(Ordering::SeqCst)
    }

    pub fn vector_calls(&self) -> usize {
        self.vector_calls.load(Ordering::SeqCst)
    }
}

impl Fingerprinter for TableFingerprinter {
    fn content_hash(
        &self,
        _media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError> {
        self.hash_calls.fetch_add(1, Ordering::SeqCst);
        while self.hold_hashing.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        let crash = self.crash_on.lock().unwrap().contains(asset_id);
        if crash {
            panic!("fingerprinter crashed on {asset_id}");
        }
        self.hashes
            .lock()
            .unwrap()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| {
                FingerprintError::Hash(HashError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    asset_id.to_string(),
                )))
            })
    }

    fn feature_vector(
        &self,
        media_type: MediaType,
        asset_id: &str,
    ) -> Result<Vec<u8>, FingerprintError> {
        self.vector_calls.fetch_add(1, Ordering::SeqCst);
        if !self.supports_features(media_type) {
            return Err(FingerprintError::Unsupported { media_type });
        }
        self.vectors
            .lock()
            .unwrap()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| FingerprintError::InvalidAssetId {
                asset_id: asset_id.to_string(),
            })
    }

    fn supports_features(&self, media_type: MediaType) -> bool {
        media_type.is_still_image()
    }

    fn descriptor(&self) -> String {
        self.descriptor.lock().unwrap().clone()
    }
}
