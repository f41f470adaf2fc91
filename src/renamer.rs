//! Validated, collision-aware rename execution.
//!
//! Every stage that wants to move or rename a file builds a [`RenamePlan`]
//! and hands it to the single [`RenameExecutor`], so collision handling is
//! uniform across the whole pipeline. A plan runs through
//! validate → attempt → outcome:
//!
//! - the source must still exist as a regular file, or nothing happens;
//! - the destination filename is lower-cased before the move;
//! - a destination that already exists with the same byte size is treated as
//!   the same content: the source is deleted and no history is written;
//! - a same-name destination with a different size gets a fresh
//!   `_duplicate_N` sibling from the allocator and the move is retried;
//! - only an actually performed move appends a history record.

use crate::history::HistoryStore;
use crate::resolver::UniquePathAllocator;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Why a rename was requested. Used for console output only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameReason {
    DedupExtension,
    SanitizeName,
    Lowercase,
    PremiumImport,
    LooseImport,
    FormatConvert,
}

impl RenameReason {
    /// Verb for "Would {verb} a to b" dry-run lines.
    pub fn verb(&self) -> &'static str {
        match self {
            RenameReason::PremiumImport | RenameReason::LooseImport => "move",
            RenameReason::FormatConvert => "convert",
            _ => "rename",
        }
    }
}

/// One requested move, consumed immediately by the executor.
#[derive(Debug, Clone)]
pub struct RenamePlan {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: RenameReason,
}

impl RenamePlan {
    pub fn new(source: PathBuf, destination: PathBuf, reason: RenameReason) -> Self {
        Self {
            source,
            destination,
            reason,
        }
    }
}

/// Terminal failure of a rename attempt.
#[derive(Debug)]
pub enum RenameFailure {
    /// The source vanished or is not a regular file.
    InvalidSource { path: PathBuf },
    /// Unexpected I/O or permission error.
    Io { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for RenameFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSource { path } => {
                write!(f, "Invalid file path: {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Could not rename {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RenameFailure {}

/// How a rename request ended.
#[derive(Debug)]
pub enum RenameOutcome {
    /// Moved to the planned destination.
    Succeeded { new_path: PathBuf },
    /// The destination already held identical-size content; the source was
    /// deleted instead, and no history record was written.
    DuplicateResolved,
    /// A collision forced a `_duplicate_N` sibling destination.
    RetriedTo { new_path: PathBuf },
    /// Nothing was moved.
    Failed(RenameFailure),
}

impl RenameOutcome {
    /// The path the file lives at after a successful move.
    pub fn new_path(&self) -> Option<&Path> {
        match self {
            RenameOutcome::Succeeded { new_path } | RenameOutcome::RetriedTo { new_path } => {
                Some(new_path)
            }
            _ => None,
        }
    }
}

/// Executes rename plans against the filesystem.
pub struct RenameExecutor<'a> {
    allocator: &'a UniquePathAllocator,
    history: &'a Mutex<HistoryStore>,
}

impl<'a> RenameExecutor<'a> {
    pub fn new(allocator: &'a UniquePathAllocator, history: &'a Mutex<HistoryStore>) -> Self {
        Self { allocator, history }
    }

    /// Runs one plan to a terminal outcome.
    pub fn execute(&self, plan: &RenamePlan) -> RenameOutcome {
        let source = &plan.source;

        match fs::metadata(source) {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return RenameOutcome::Failed(RenameFailure::InvalidSource {
                    path: source.clone(),
                });
            }
        }

        let mut destination = lowercase_file_name(&plan.destination);
        let mut retried = false;

        loop {
            // A case-only rename on a case-insensitive filesystem makes the
            // destination "exist" while being the same file; that is not a
            // collision.
            if !same_file(source, &destination) {
                if destination.exists() {
                    match self.resolve_collision(source, &destination) {
                        CollisionResolution::SourceDeleted => {
                            return RenameOutcome::DuplicateResolved;
                        }
                        CollisionResolution::RetryAt(next) => {
                            destination = next;
                            retried = true;
                            continue;
                        }
                        CollisionResolution::Error(failure) => {
                            return RenameOutcome::Failed(failure);
                        }
                    }
                }

                if !self.allocator.reserve(&destination) {
                    // Claimed by a concurrent worker, or a file just landed
                    // there. Re-check for a real collision, otherwise probe.
                    if destination.exists() {
                        continue;
                    }
                    destination = self.allocator.unique_path(&destination);
                    retried = true;
                    continue;
                }
            }

            match fs::rename(source, &destination) {
                Ok(()) => {
                    self.history
                        .lock()
                        .expect("history lock poisoned")
                        .append(source, &destination);
                    return if retried {
                        RenameOutcome::RetriedTo {
                            new_path: destination,
                        }
                    } else {
                        RenameOutcome::Succeeded {
                            new_path: destination,
                        }
                    };
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // Lost a race with another process; go around and resolve
                    // the collision properly.
                    continue;
                }
                Err(e) => {
                    return RenameOutcome::Failed(RenameFailure::Io {
                        path: source.clone(),
                        source: e,
                    });
                }
            }
        }
    }

    fn resolve_collision(&self, source: &Path, destination: &Path) -> CollisionResolution {
        let source_size = match fs::metadata(source) {
            Ok(m) => m.len(),
            Err(e) => {
                return CollisionResolution::Error(RenameFailure::Io {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        };
        let destination_size = match fs::metadata(destination) {
            Ok(m) => m.len(),
            Err(e) => {
                return CollisionResolution::Error(RenameFailure::Io {
                    path: destination.to_path_buf(),
                    source: e,
                });
            }
        };

        if source_size == destination_size {
            match fs::remove_file(source) {
                Ok(()) => CollisionResolution::SourceDeleted,
                Err(e) => CollisionResolution::Error(RenameFailure::Io {
                    path: source.to_path_buf(),
                    source: e,
                }),
            }
        } else {
            CollisionResolution::RetryAt(self.allocator.unique_path(destination))
        }
    }
}

enum CollisionResolution {
    SourceDeleted,
    RetryAt(PathBuf),
    Error(RenameFailure),
}

/// Lower-cases the filename component, leaving the directory untouched.
pub fn lowercase_file_name(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(name.to_string_lossy().to_lowercase()),
        None => path.to_path_buf(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
