//! Destination path resolution: duplicate-extension cleanup and
//! collision-free unique path allocation.

use crate::config::FiletypeTable;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Returns true when the filename's stem still contains a recognized media
/// extension token, e.g. `clip.mp4.mp4` or `photo.jpg (1).jpg`.
///
/// This is a substring match over the stem, not a suffix match, and it is a
/// known source of false positives: a screenshot legitimately named after a
/// video (`video_name.mp4.jpg`) will be flagged too.
pub fn has_duplicate_extension(file_name: &str, table: &FiletypeTable) -> bool {
    let Some((stem, _)) = file_name.rsplit_once('.') else {
        return false;
    };

    table.media_tokens().any(|token| stem.contains(token))
}

/// Removes every media extension token from the stem and reattaches the true
/// final extension. Returns the name unchanged when nothing was stripped.
pub fn strip_duplicate_extensions(file_name: &str, table: &FiletypeTable) -> String {
    let Some((stem, extension)) = file_name.rsplit_once('.') else {
        return file_name.to_string();
    };

    let mut cleaned = stem.to_string();
    for token in table.media_tokens() {
        if cleaned.contains(token) {
            cleaned = cleaned.replace(token, "");
        }
    }

    let candidate = format!("{}.{}", cleaned, extension);
    if candidate == file_name {
        file_name.to_string()
    } else {
        candidate
    }
}

/// Allocates destination paths that are guaranteed not to collide, across
/// all worker threads of a run.
///
/// A candidate that neither exists on disk nor has been handed out before is
/// returned unchanged. Otherwise the allocator probes
/// `<stem>_duplicate_1`, `<stem>_duplicate_2`, ... in the same directory and
/// returns the first free probe. The probe stem is lower-cased to match the
/// executor's destination normalization.
///
/// Allocations are serialized by a single lock and every returned path is
/// remembered for the rest of the run, so two workers racing toward the same
/// destination directory can never claim the same probe index, and repeated
/// calls before any filesystem mutation yield strictly increasing indices.
#[derive(Debug, Default)]
pub struct UniquePathAllocator {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl UniquePathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a destination that is expected to be free.
    ///
    /// Returns false when the path already exists on disk or was claimed by
    /// another worker this run; the caller then has to re-evaluate the
    /// collision or fall back to [`unique_path`](Self::unique_path).
    pub fn reserve(&self, path: &Path) -> bool {
        let mut reserved = self
            .reserved
            .lock()
            .expect("path allocator lock poisoned");

        if path.exists() || reserved.contains(path) {
            return false;
        }
        reserved.insert(path.to_path_buf());
        true
    }

    /// Returns a path in the candidate's directory that does not exist and
    /// has not been reserved by any other allocation this run.
    pub fn unique_path(&self, candidate: &Path) -> PathBuf {
        let mut reserved = self
            .reserved
            .lock()
            .expect("path allocator lock poisoned");

        if !candidate.exists() && !reserved.contains(candidate) {
            reserved.insert(candidate.to_path_buf());
            return candidate.to_path_buf();
        }

        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let extension = candidate
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let probe =
                candidate.with_file_name(format!("{}_duplicate_{}{}", stem, attempts, extension));
            if !probe.exists() && !reserved.contains(&probe) {
                reserved.insert(probe.clone());
                return probe;
            }
        }
    }
}
