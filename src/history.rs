//! Durable, append-only log of completed renames.
//!
//! The history file is the audit trail for everything the tool has ever
//! done. Records are keyed by random identifiers, never edited or deleted,
//! and the whole map is rewritten in one save at the end of a run. Before
//! each save the previous file is copied to a `.bak` sibling, unless the
//! existing backup is already at least as large — a crashed half-written
//! history must never replace a good backup.
//!
//! The store is *not* consulted for idempotence decisions at runtime; those
//! are always computed fresh from the filesystem.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One completed rename. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub input_path: String,
    pub output_path: String,
    pub timestamp: String,
}

/// Errors raised by history persistence.
#[derive(Debug)]
pub enum HistoryError {
    /// Failed to read the history file.
    ReadFailed { source: std::io::Error },
    /// Failed to write the history file.
    WriteFailed { source: std::io::Error },
    /// Failed to refresh the backup copy.
    BackupFailed { source: std::io::Error },
    /// The history file exists but cannot be parsed.
    InvalidFormat { reason: String },
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed { source } => write!(f, "Failed to read history file: {}", source),
            Self::WriteFailed { source } => write!(f, "Failed to write history file: {}", source),
            Self::BackupFailed { source } => {
                write!(f, "Failed to back up history file: {}", source)
            }
            Self::InvalidFormat { reason } => {
                write!(f, "Invalid history file format: {}", reason)
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// In-memory history with wholesale load/save.
#[derive(Debug)]
pub struct HistoryStore {
    history_file: PathBuf,
    records: BTreeMap<String, HistoryRecord>,
    appended: usize,
}

impl HistoryStore {
    /// Loads existing history, or starts empty when the file is missing or
    /// has no content yet.
    ///
    /// # Errors
    ///
    /// A present-but-unparsable file is an error: an audit log that cannot
    /// be read should stop the run, not be silently replaced.
    pub fn load(history_file: &Path) -> Result<Self, HistoryError> {
        let mut records = BTreeMap::new();

        if history_file.exists() {
            let content = fs::read_to_string(history_file)
                .map_err(|e| HistoryError::ReadFailed { source: e })?;
            if !content.trim().is_empty() {
                records = serde_json::from_str(&content)
                    .map_err(|e| HistoryError::InvalidFormat {
                        reason: e.to_string(),
                    })?;
            }
        }

        Ok(Self {
            history_file: history_file.to_path_buf(),
            records,
            appended: 0,
        })
    }

    /// Appends a record for one completed rename and returns its identifier.
    ///
    /// Identifiers are random 128-bit UUIDs, so concurrent appends can never
    /// collide on a key.
    pub fn append(&mut self, input_path: &Path, output_path: &Path) -> String {
        let identifier = Uuid::new_v4().to_string();
        self.records.insert(
            identifier.clone(),
            HistoryRecord {
                input_path: input_path.display().to_string(),
                output_path: output_path.display().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.appended += 1;
        identifier
    }

    /// Total number of records, including those loaded from disk.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records appended during this run.
    pub fn appended_this_run(&self) -> usize {
        self.appended
    }

    pub fn get(&self, identifier: &str) -> Option<&HistoryRecord> {
        self.records.get(identifier)
    }

    /// All records, keyed by identifier.
    pub fn records(&self) -> &BTreeMap<String, HistoryRecord> {
        &self.records
    }

    /// Returns true when some record's output path matches `path`.
    pub fn mentions_output(&self, path: &Path) -> bool {
        let needle = path.display().to_string();
        self.records.values().any(|r| r.output_path == needle)
    }

    /// Writes the full map to disk, refreshing the backup first.
    pub fn save(&self) -> Result<(), HistoryError> {
        self.refresh_backup()?;

        let json = serde_json::to_string_pretty(&self.records).map_err(|e| {
            HistoryError::WriteFailed {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            }
        })?;

        fs::write(&self.history_file, json).map_err(|e| HistoryError::WriteFailed { source: e })
    }

    /// Path of the backup sibling, e.g. `history.json.bak`.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.history_file.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Copies the current history file over the backup, unless the backup is
    /// already at least as large as the current file.
    fn refresh_backup(&self) -> Result<(), HistoryError> {
        let Ok(current) = fs::metadata(&self.history_file) else {
            return Ok(());
        };

        let backup = self.backup_path();
        if let Ok(existing) = fs::metadata(&backup)
            && existing.len() >= current.len()
        {
            return Ok(());
        }

        fs::copy(&self.history_file, &backup)
            .map(|_| ())
            .map_err(|e| HistoryError::BackupFailed { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_starts_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let store = HistoryStore::load(&tmp.path().join("history.json")).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_empty_file_starts_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("history.json");
        fs::write(&path, "").expect("write");
        let store = HistoryStore::load(&path).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("history.json");
        fs::write(&path, "{not json").expect("write");
        assert!(HistoryStore::load(&path).is_err());
    }

    #[test]
    fn test_append_generates_distinct_identifiers() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = HistoryStore::load(&tmp.path().join("history.json")).expect("load");

        let a = store.append(Path::new("/a/1"), Path::new("/b/1"));
        let b = store.append(Path::new("/a/2"), Path::new("/b/2"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.appended_this_run(), 2);
    }

    #[test]
    fn test_round_trip_preserves_existing_records() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("history.json");

        let mut store = HistoryStore::load(&path).expect("load");
        let first_id = store.append(Path::new("/a/old.jpg"), Path::new("/b/old.jpg"));
        store.save().expect("save");

        let mut reloaded = HistoryStore::load(&path).expect("reload");
        let original = reloaded.get(&first_id).expect("record survives").clone();
        reloaded.append(Path::new("/a/new.jpg"), Path::new("/b/new.jpg"));
        reloaded.save().expect("save again");

        let last = HistoryStore::load(&path).expect("final load");
        assert_eq!(last.len(), 2);
        assert_eq!(last.get(&first_id), Some(&original));
    }

    #[test]
    fn test_save_refreshes_backup() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("history.json");

        let mut store = HistoryStore::load(&path).expect("load");
        store.append(Path::new("/a/1"), Path::new("/b/1"));
        store.save().expect("first save");
        assert!(!store.backup_path().exists());

        // Second save backs up the first file before overwriting it.
        let mut store = HistoryStore::load(&path).expect("reload");
        store.append(Path::new("/a/2"), Path::new("/b/2"));
        store.save().expect("second save");
        assert!(store.backup_path().exists());

        let backup: BTreeMap<String, HistoryRecord> = serde_json::from_str(
            &fs::read_to_string(store.backup_path()).expect("read backup"),
        )
        .expect("parse backup");
        assert_eq!(backup.len(), 1);
    }

    #[test]
    fn test_backup_not_replaced_by_smaller_history() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("history.json");

        // A large, known-good backup from an earlier run.
        let backup_path = {
            let store = HistoryStore::load(&path).expect("load");
            store.backup_path()
        };
        fs::write(&backup_path, vec![b'x'; 4096]).expect("write backup");
        // The current history file is smaller, e.g. truncated by a crash.
        fs::write(&path, "{}").expect("write history");

        let mut store = HistoryStore::load(&path).expect("load");
        store.append(Path::new("/a/1"), Path::new("/b/1"));
        store.save().expect("save");

        let backup = fs::read(&backup_path).expect("read backup");
        assert_eq!(backup.len(), 4096, "good backup must not be overwritten");
    }

    #[test]
    fn test_mentions_output() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = HistoryStore::load(&tmp.path().join("history.json")).expect("load");
        store.append(Path::new("/a/src.jpg"), Path::new("/b/dst.jpg"));

        assert!(store.mentions_output(Path::new("/b/dst.jpg")));
        assert!(!store.mentions_output(Path::new("/b/other.jpg")));
    }
}
