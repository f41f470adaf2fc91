//! Directory traversal driving the per-file pipeline.
//!
//! The descent is an explicit work queue rather than recursion, so stack
//! depth stays flat no matter how deep the tree is. Traversal itself is
//! single-threaded — exclusion rules are evaluated in one place and the
//! queue bounds memory — while the per-file work it hands out runs on the
//! worker pool.
//!
//! An unreadable directory is logged and skipped; a single bad subtree never
//! aborts the whole run.

use crate::config::CompiledExclusions;
use crate::output::OutputFormatter;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Counters gathered during one traversal.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    /// Regular files handed to the pipeline.
    pub files: u64,
    /// Directories skipped by protection rules.
    pub excluded_dirs: u64,
    /// Directories that could not be read.
    pub unreadable_dirs: u64,
    /// Partially-downloaded files skipped by marker extension.
    pub partial_skipped: u64,
}

/// Walks the tree under a root, applying exclusion rules per directory.
pub struct Walker<'a> {
    root: &'a Path,
    exclusions: &'a CompiledExclusions,
    partial_marker: &'a str,
}

impl<'a> Walker<'a> {
    pub fn new(root: &'a Path, exclusions: &'a CompiledExclusions, partial_marker: &'a str) -> Self {
        Self {
            root,
            exclusions,
            partial_marker,
        }
    }

    /// Enumerates every non-excluded regular file under the root, invoking
    /// `on_file` exactly once per file.
    ///
    /// Directories created while the walk is in flight (for example a fresh
    /// premium subfolder) may or may not be visited in the same run; a
    /// second run settles them, since processing is idempotent.
    pub fn run(&self, mut on_file: impl FnMut(PathBuf)) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(self.root.to_path_buf());

        while let Some(dir) = queue.pop_front() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    OutputFormatter::error(&format!(
                        "Skipping unreadable directory {}: {}",
                        dir.display(),
                        e
                    ));
                    stats.unreadable_dirs += 1;
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        OutputFormatter::error(&format!(
                            "Skipping unreadable entry in {}: {}",
                            dir.display(),
                            e
                        ));
                        continue;
                    }
                };

                let path = entry.path();
                if path.is_dir() {
                    if self.exclusions.is_excluded_dir(&path) {
                        stats.excluded_dirs += 1;
                        continue;
                    }
                    queue.push_back(path);
                } else if path.is_file() {
                    if self.is_partial_download(&path) {
                        stats.partial_skipped += 1;
                        continue;
                    }
                    stats.files += 1;
                    on_file(path);
                }
            }
        }

        stats
    }

    fn is_partial_download(&self, path: &Path) -> bool {
        crate::classifier::extension_of(path) == self.partial_marker
    }
}
