//! Persistent record of the flashes already shown to the user.
//!
//! The store is a single JSON file holding an array of [`Flash`] objects,
//! pretty-printed with four-space indentation.  It is always rewritten in
//! full: [`FlashStore::save`] sorts by date, keeps the newest `max_stored`
//! entries, writes a temp file next to the target and renames it into
//! place, so a crash mid-write leaves the previous contents intact.
//!
//! There is no schema version field.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::source::Flash;

/// File name used when no explicit store path is configured.
pub const DEFAULT_FILE_NAME: &str = "flashes.json";

/// How many flashes are remembered by default.
pub const DEFAULT_MAX_STORED: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No file yet, or the file is blank.  Callers treat this as "no prior
    /// state" rather than as a failure.
    #[error("no flash storage at {} or it is empty", .0.display())]
    NotFound(PathBuf),

    #[error("flash storage at {} is corrupt: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode flashes: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes the bounded set of seen flashes.
#[derive(Debug, Clone)]
pub struct FlashStore {
    path: PathBuf,
    max_stored: usize,
}

impl FlashStore {
    pub fn new(path: impl Into<PathBuf>, max_stored: usize) -> Self {
        Self {
            path: path.into(),
            max_stored,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_stored(&self) -> usize {
        self.max_stored
    }

    /// Load the stored flashes in file order (oldest first).
    pub fn load(&self) -> Result<Vec<Flash>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if text.trim().is_empty() {
            return Err(StoreError::NotFound(self.path.clone()));
        }

        serde_json::from_str(&text).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored set with the newest `max_stored` of `items`.
    pub fn save(&self, items: &[Flash]) -> Result<(), StoreError> {
        let retained = retain_newest(items, self.max_stored);
        let bytes = encode(&retained)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &bytes).map_err(|e| StoreError::io(&tmp_path, e))?;
        if let Ok(file) = fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::io(&self.path, e)
        })
    }

    /// Forget every stored flash.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.save(&[])
    }

    // -- async wrappers --------------------------------------------------------
    //
    // File I/O is blocking; these move it onto tokio's blocking pool so the
    // caller's task (and the UI loop) never stalls on disk.

    pub async fn load_async(&self) -> Result<Vec<Flash>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| StoreError::io(&self.path, io::Error::other(e)))?
    }

    pub async fn save_async(&self, items: Vec<Flash>) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save(&items))
            .await
            .map_err(|e| StoreError::io(&self.path, io::Error::other(e)))?
    }

    pub async fn clear_async(&self) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.clear())
            .await
            .map_err(|e| StoreError::io(&self.path, io::Error::other(e)))?
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

/// Sort `items` by date ascending and keep at most the newest `max`.
///
/// The sort is stable, so flashes sharing a timestamp keep their relative
/// order.  Truncation only ever drops from the oldest end.
pub fn retain_newest(items: &[Flash], max: usize) -> Vec<Flash> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|f| f.date);
    if sorted.len() > max {
        sorted.drain(..sorted.len() - max);
    }
    sorted
}

fn encode(items: &[Flash]) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    items.serialize(&mut serializer).map_err(StoreError::Encode)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
