//! Part-record storage for accepted changelogs.
//!
//! Every accepted pull request is written as one YAML file per category into
//! the parts directory of the document repository. The external compaction
//! script later folds those files into the consolidated documents and deletes
//! them; this crate never removes records itself.
//!
//! **File layout:** `<parts_dir>/pr-<number>-<category>.yml`
//!
//! ```yaml
//! author: "Jane Doe"
//! time: "2021-01-01T01:01:01+00:00"
//! url: "https://github.com/org/game/pull/123"
//! changes:
//! - type: "Add"
//!   message: "Added a thing"
//! category: "Admin"   # omitted for the default category
//! ```
//!
//! Every scalar is double-quoted. The compaction script reads these files
//! with a YAML 1.1 loader, which would otherwise turn the timestamp into a
//! datetime and messages such as `yes` or `2024-01-01` into other types.

use std::path::{Path, PathBuf};

use changelog_shared::{ChangeEntry, ChangelogError, ChangelogResult, MAIN_CATEGORY, Result};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

/// Persists accepted changelog results.
pub trait RecordStore: Send + Sync {
    /// Write every record for `result`. Returns the number of records written.
    fn write(&self, result: &ChangelogResult) -> Result<usize>;
}

/// One on-disk part record: a single (pull request, category) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub author: String,
    /// ISO-8601 timestamp.
    pub time: String,
    pub url: String,
    pub changes: Vec<ChangeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// YAML part files under a single directory.
#[derive(Debug, Clone)]
pub struct PartsStore {
    parts_dir: PathBuf,
}

impl PartsStore {
    pub fn new(parts_dir: impl Into<PathBuf>) -> Self {
        Self {
            parts_dir: parts_dir.into(),
        }
    }

    pub fn parts_dir(&self) -> &Path {
        &self.parts_dir
    }

    /// Path of the record for one pull request and category.
    pub fn record_path(&self, number: u64, category: &str) -> PathBuf {
        self.parts_dir.join(format!("pr-{number}-{category}.yml"))
    }

    /// Build the records for a result, one per category block.
    ///
    /// A result with no blocks still yields one default-category record with
    /// an empty change list.
    pub fn records(result: &ChangelogResult) -> Vec<(String, PartRecord)> {
        let time = result.time.to_rfc3339_opts(SecondsFormat::AutoSi, false);
        let make = |category: &str, changes: Vec<ChangeEntry>| PartRecord {
            author: result.author.clone(),
            time: time.clone(),
            url: result.url.clone(),
            changes,
            category: (category != MAIN_CATEGORY).then(|| category.to_string()),
        };

        if result.categories.is_empty() {
            return vec![(MAIN_CATEGORY.to_string(), make(MAIN_CATEGORY, Vec::new()))];
        }

        result
            .categories
            .iter()
            .map(|block| {
                (
                    block.category.clone(),
                    make(&block.category, block.changes.clone()),
                )
            })
            .collect()
    }

    /// List the part files currently waiting for compaction, sorted by name.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.parts_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.parts_dir)
            .map_err(|e| ChangelogError::io(&self.parts_dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ChangelogError::io(&self.parts_dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "yml") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read one part file back.
    pub fn read(path: &Path) -> Result<PartRecord> {
        let content = std::fs::read_to_string(path).map_err(|e| ChangelogError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| {
            ChangelogError::Serialization(format!("invalid part record {}: {e}", path.display()))
        })
    }
}

impl RecordStore for PartsStore {
    #[instrument(skip_all, fields(pr = result.number))]
    fn write(&self, result: &ChangelogResult) -> Result<usize> {
        std::fs::create_dir_all(&self.parts_dir)
            .map_err(|e| ChangelogError::io(&self.parts_dir, e))?;

        let records = Self::records(result);
        for (category, record) in &records {
            let path = self.record_path(result.number, category);
            trace!(path = %path.display(), "writing changelog part");

            let yaml = render(record)?;
            std::fs::write(&path, yaml).map_err(|e| ChangelogError::io(&path, e))?;
        }

        debug!(records = records.len(), "changelog parts written");
        Ok(records.len())
    }
}

/// Render a record as block YAML with every scalar double-quoted.
///
/// A JSON string literal is a valid YAML double-quoted scalar, so each value
/// is escaped with `serde_json`.
fn render(record: &PartRecord) -> Result<String> {
    let mut out = format!(
        "author: {}\ntime: {}\nurl: {}\n",
        quoted(&record.author)?,
        quoted(&record.time)?,
        quoted(&record.url)?,
    );

    if record.changes.is_empty() {
        out.push_str("changes: []\n");
    } else {
        out.push_str("changes:\n");
        for change in &record.changes {
            out.push_str(&format!(
                "- type: {}\n  message: {}\n",
                quoted(&change.kind)?,
                quoted(&change.message)?,
            ));
        }
    }

    if let Some(category) = &record.category {
        out.push_str(&format!("category: {}\n", quoted(category)?));
    }
    Ok(out)
}

fn quoted<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ChangelogError::Serialization(e.to_string()))
}
