//! Core domain types for parsed changelogs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The implicit category every submission can use without a directive.
pub const MAIN_CATEGORY: &str = "Main";

// ---------------------------------------------------------------------------
// ChangeType
// ---------------------------------------------------------------------------

/// Canonical change type after synonym folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Add,
    Remove,
    Fix,
    Tweak,
}

impl ChangeType {
    /// Fold a bullet keyword (any case) to its canonical type.
    ///
    /// `fix`, `bugfix` and `bug` all become [`ChangeType::Fix`].
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "fix" | "bugfix" | "bug" => Some(Self::Fix),
            "tweak" => Some(Self::Tweak),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "Add",
            Self::Remove => "Remove",
            Self::Fix => "Fix",
            Self::Tweak => "Tweak",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Parsed changelog
// ---------------------------------------------------------------------------

/// A single typed bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    #[serde(rename = "type")]
    pub kind: ChangeType,
    /// Trimmed, non-empty message text.
    pub message: String,
}

impl ChangeEntry {
    pub fn new(kind: ChangeType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// All entries of one category, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBlock {
    /// Canonical (configured-case) category name.
    pub category: String,
    pub changes: Vec<ChangeEntry>,
}

/// The structured outcome of parsing one merged pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogResult {
    /// Override from the header line, or the submitter's login.
    pub author: String,
    /// Blocks ordered by first appearance of their category.
    pub categories: Vec<CategoryBlock>,
    /// Merge time, or parse time when the merge time is unknown.
    pub time: DateTime<Utc>,
    /// Pull request number.
    pub number: u64,
    /// Pull request HTML URL.
    pub url: String,
}

impl ChangelogResult {
    /// Total number of entries across all blocks.
    pub fn entry_count(&self) -> usize {
        self.categories.iter().map(|c| c.changes.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A merged pull request as observed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub body: String,
    pub author_login: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub number: u64,
    pub html_url: String,
}

// ---------------------------------------------------------------------------
// CategorySet
// ---------------------------------------------------------------------------

/// Case-insensitive set of recognised categories.
///
/// Always contains [`MAIN_CATEGORY`] first, followed by the configured extras
/// in configuration order. Names keep their configured case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    /// Build a set from the configured extra categories.
    ///
    /// Duplicates (ignoring case, including "main") are dropped; the first
    /// spelling wins.
    pub fn new<I, S>(extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = vec![MAIN_CATEGORY.to_string()];
        for extra in extras {
            let extra = extra.as_ref().trim();
            if extra.is_empty() {
                continue;
            }
            if !names.iter().any(|n| same_name(n, extra)) {
                names.push(extra.to_string());
            }
        }
        Self { names }
    }

    /// Look up `name` ignoring case and return the canonical spelling.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| same_name(n, name))
            .map(String::as_str)
    }

    /// The implicit default category.
    pub fn default_category(&self) -> &str {
        &self.names[0]
    }

    /// Every category, default first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The configured extras, without the default.
    pub fn extras(&self) -> impl Iterator<Item = &str> {
        self.names[1..].iter().map(String::as_str)
    }

    pub fn is_default(&self, name: &str) -> bool {
        same_name(self.default_category(), name)
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_synonyms_fold() {
        for kw in ["fix", "BUGFIX", "Bug"] {
            assert_eq!(ChangeType::from_keyword(kw), Some(ChangeType::Fix));
        }
        assert_eq!(ChangeType::from_keyword("tweak"), Some(ChangeType::Tweak));
        assert_eq!(ChangeType::from_keyword("refactor"), None);
    }

    #[test]
    fn category_set_always_has_main() {
        let set = CategorySet::default();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Main"]);
        assert_eq!(set.resolve("MAIN"), Some("Main"));
        assert_eq!(set.extras().count(), 0);
    }

    #[test]
    fn category_set_resolves_case_insensitively() {
        let set = CategorySet::new(["Admin", "admin", "main", "Maps"]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Main", "Admin", "Maps"]);
        assert_eq!(set.resolve("ADMIN"), Some("Admin"));
        assert_eq!(set.resolve("maps"), Some("Maps"));
        assert_eq!(set.resolve("Server"), None);
        assert!(set.is_default("mAiN"));
        assert!(!set.is_default("Admin"));
    }

    #[test]
    fn change_entry_serializes_type_field() {
        let entry = ChangeEntry::new(ChangeType::Tweak, "Made it shinier");
        let json = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(json, r#"{"type":"Tweak","message":"Made it shinier"}"#);
    }
}
