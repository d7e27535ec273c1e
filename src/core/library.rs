use crate::database::models::MediaType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Invalid library root: {path}")]
    InvalidRoot { path: String },

    #[error("Library item not found: {asset_id}")]
    NotFound { asset_id: String },

    #[error("{asset_id} is not a {media_type} item")]
    WrongMediaType {
        asset_id: String,
        media_type: MediaType,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One item as reported by the media library. `size` is `None` when the
/// library could not read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub size: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// The device media library the engine indexes.
pub trait MediaLibrary: Send + Sync {
    fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError>;

    fn delete_items(&self, media_type: MediaType, ids: &[String]) -> Result<(), LibraryError>;
}

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp"];
const RECORDING_MARKERS: &[&str] = &[
    "screen recording",
    "screen_recording",
    "screenrecording",
    "screen-recording",
];

/// A media library backed by a directory tree. Asset ids are paths relative
/// to the root, joined with `/`.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self, LibraryError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(LibraryError::InvalidRoot {
                path: root.to_string_lossy().to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Resolves an asset id back to a path under the root, rejecting ids that
    /// would escape it.
    pub fn resolve(&self, asset_id: &str) -> Option<PathBuf> {
        let relative = Path::new(asset_id);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || asset_id.is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn asset_id(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// Classifies a file by extension and name, the way phone galleries split
/// camera roll, screenshots, and screen recordings.
pub fn classify(path: &Path) -> Option<MediaType> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let lowered = path.to_string_lossy().to_lowercase();

    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        let recording = RECORDING_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker));
        return Some(if recording {
            MediaType::ScreenRecording
        } else {
            MediaType::Video
        });
    }

    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        let screenshot = lowered.contains("screenshot") || lowered.contains("screen shot");
        return Some(if screenshot {
            MediaType::Screenshot
        } else {
            MediaType::Photo
        });
    }

    None
}

/// Get the creation time (or modification time) of a file, falling back to
/// UNIX_EPOCH on error.
fn created_at(metadata: Option<&fs::Metadata>) -> DateTime<Utc> {
    let time = metadata
        .and_then(|m| m.created().or_else(|_| m.modified()).ok())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(time)
}

impl MediaLibrary for DirectoryLibrary {
    fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError> {
        let mut items = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    log::warn!("Skipping unreadable library entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(id) = self.asset_id(entry.path()) else {
                continue;
            };
            if classify(Path::new(&id)) != Some(media_type) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    log::warn!("Could not read metadata for {}: {}", id, e);
                    None
                }
            };

            items.push(LibraryItem {
                id,
                size: metadata.as_ref().map(|m| m.len()),
                created_at: created_at(metadata.as_ref()),
            });
        }

        log::debug!(
            "Listed {} {} item(s) under {}",
            items.len(),
            media_type,
            self.root.display()
        );
        Ok(items)
    }

    /// Removes the files behind `ids`. Every id must name an existing file
    /// of `media_type`; otherwise nothing is deleted.
    fn delete_items(&self, media_type: MediaType, ids: &[String]) -> Result<(), LibraryError> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self
                .resolve(id)
                .filter(|p| p.is_file())
                .ok_or_else(|| LibraryError::NotFound {
                    asset_id: id.clone(),
                })?;
            if classify(Path::new(id)) != Some(media_type) {
                return Err(LibraryError::WrongMediaType {
                    asset_id: id.clone(),
                    media_type,
                });
            }
            paths.push(path);
        }

        for path in paths {
            fs::remove_file(&path)?;
            log::info!("Deleted {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library_with(files: &[&str]) -> (TempDir, DirectoryLibrary) {
        let temp_dir = TempDir::new().unwrap();
        for file in files {
            let path = temp_dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.as_bytes()).unwrap();
        }
        let library = DirectoryLibrary::new(temp_dir.path()).unwrap();
        (temp_dir, library)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Path::new("a/IMG_1.JPG")), Some(MediaType::Photo));
        assert_eq!(
            classify(Path::new("Screenshots/2024.png")),
            Some(MediaType::Screenshot)
        );
        assert_eq!(classify(Path::new("clip.mov")), Some(MediaType::Video));
        assert_eq!(
            classify(Path::new("Screen Recording 2024.mp4")),
            Some(MediaType::ScreenRecording)
        );
        assert_eq!(classify(Path::new("notes.txt")), None);
        assert_eq!(classify(Path::new("no_extension")), None);
    }

    #[test]
    fn test_list_items_by_media_type() {
        let (_dir, library) = library_with(&[
            "camera/IMG_1.jpg",
            "camera/IMG_2.png",
            "Screenshots/shot.png",
            "movies/trip.mp4",
            "readme.txt",
        ]);

        let mut photos: Vec<String> = library
            .list_items(MediaType::Photo)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        photos.sort();
        assert_eq!(photos, vec!["camera/IMG_1.jpg", "camera/IMG_2.png"]);

        let shots = library.list_items(MediaType::Screenshot).unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].size, Some("Screenshots/shot.png".len() as u64));

        assert_eq!(library.list_items(MediaType::Video).unwrap().len(), 1);
        assert!(library.list_items(MediaType::ScreenRecording).unwrap().is_empty());
    }

    #[test]
    fn test_delete_items() {
        let (dir, library) = library_with(&["a.jpg", "b.jpg"]);

        library
            .delete_items(MediaType::Photo, &["a.jpg".to_string()])
            .unwrap();
        assert!(!dir.path().join("a.jpg").exists());
        assert!(dir.path().join("b.jpg").exists());

        let missing = library.delete_items(MediaType::Photo, &["a.jpg".to_string()]);
        assert!(matches!(missing, Err(LibraryError::NotFound { .. })));
    }

    #[test]
    fn test_delete_items_rejects_other_media_types() {
        let (dir, library) = library_with(&["IMG_1.jpg", "trip.mp4"]);

        let result = library.delete_items(MediaType::Video, &["IMG_1.jpg".to_string()]);
        assert!(matches!(result, Err(LibraryError::WrongMediaType { .. })));
        assert!(dir.path().join("IMG_1.jpg").exists());

        let mixed = ["trip.mp4".to_string(), "IMG_1.jpg".to_string()];
        let result = library.delete_items(MediaType::Video, &mixed);
        assert!(matches!(result, Err(LibraryError::WrongMediaType { .. })));
        assert!(dir.path().join("trip.mp4").exists());

        library
            .delete_items(MediaType::Video, &["trip.mp4".to_string()])
            .unwrap();
        assert!(!dir.path().join("trip.mp4").exists());
    }

    #[test]
    fn test_resolve_rejects_escaping_ids() {
        let (_dir, library) = library_with(&[]);
        assert!(library.resolve("../etc/passwd").is_none());
        assert!(library.resolve("/abs/path.jpg").is_none());
        assert!(library.resolve("").is_none());
        assert!(library.resolve("ok/file.jpg").is_some());
    }

    #[test]
    fn test_invalid_root() {
        let result = DirectoryLibrary::new("/definitely/not/a/real/dir");
        assert!(matches!(result, Err(LibraryError::InvalidRoot { .. })));
    }
}
