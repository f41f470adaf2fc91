//! Snapshot of every file visited during a run.
//!
//! The inventory records each visit regardless of what the pipeline decided
//! to do with the file, and is written once at the very end of the run. It
//! is a reporting artifact only: nothing in the rename pipeline reads it or
//! waits for it.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Per-top-level-directory listing of visited files.
///
/// Entries are kept as an ordered list of (subfolder, filename) pairs in
/// visit order; the export groups them by subfolder.
#[derive(Debug, Default)]
pub struct InventoryIndex {
    entries: BTreeMap<String, Vec<(String, String)>>,
}

impl InventoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one visited file by its position relative to the root.
    ///
    /// Paths outside the root are ignored; the walker never produces them.
    pub fn record(&mut self, root: &Path, path: &Path) {
        let Ok(rel) = path.strip_prefix(root) else {
            return;
        };
        let Some(top) = rel
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
        else {
            return;
        };

        let subfolder = rel
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_name = rel
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.entries
            .entry(top)
            .or_default()
            .push((subfolder, file_name));
    }

    /// Number of recorded visits.
    pub fn file_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Builds the export document: each top-level directory maps to a list
    /// of `{subfolder: [filenames]}` objects, subfolders in first-seen
    /// order.
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();

        for (top, files) in &self.entries {
            let mut order: Vec<&str> = Vec::new();
            let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

            for (subfolder, file_name) in files {
                if !grouped.contains_key(subfolder.as_str()) {
                    order.push(subfolder);
                }
                grouped
                    .entry(subfolder)
                    .or_default()
                    .push(file_name.as_str());
            }

            let groups: Vec<Value> = order
                .iter()
                .map(|subfolder| {
                    let mut group = Map::new();
                    group.insert((*subfolder).to_string(), json!(grouped[*subfolder]));
                    Value::Object(group)
                })
                .collect();

            doc.insert(top.clone(), Value::Array(groups));
        }

        Value::Object(doc)
    }

    /// Writes the export document, pretty-printed.
    pub fn export(&self, output_path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(output_path, json)
    }
}
