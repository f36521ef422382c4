//! Line grammar for changelog blocks embedded in pull request descriptions.
//!
//! ```text
//! Fixed the thing, see screenshots.
//!
//! :cl: Optional Author Name
//! - add: Added a thing
//! - bugfix: Fixed a thing
//! ADMIN:
//! - tweak: Tweaked an admin thing
//! ```
//!
//! - HTML comments are removed before anything else is matched
//! - The header is `:cl:` or `🆑`, optionally followed by an author override
//! - A line that is exactly `word:` switches category if `word` is recognised
//! - Bullets are `- type: message`, where `type` is add/remove/tweak/fix/bug/bugfix

use std::sync::LazyLock;

use changelog_shared::{CategoryBlock, CategorySet, ChangeEntry, ChangeType};
use regex::Regex;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The author and grouped entries found in a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChangelog {
    /// Header override if present, else the fallback author.
    pub author: String,
    /// Blocks in order of first category use.
    pub categories: Vec<CategoryBlock>,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `<!-- ... -->`, possibly spanning lines.
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));

/// Header line: marker plus optional author override.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?::cl:|🆑) *([a-z0-9_\-, &]+)?\s*$").expect("header regex")
});

/// A bare `word:` line.
static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([a-z]+):\s*$").expect("category regex"));

/// `- type: message`, bullet optional.
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ *[*-]? *(add|remove|tweak|fix|bugfix|bug): *([^\n\r]+)\r?$")
        .expect("entry regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a description body.
///
/// Returns `None` when no header marker exists outside HTML comments. A header
/// with no recognisable bullets yields `Some` with zero blocks.
pub(crate) fn parse_text(
    body: &str,
    categories: &CategorySet,
    fallback_author: &str,
) -> Option<ParsedChangelog> {
    let body = COMMENT_RE.replace_all(body, "");
    let header = HEADER_RE.captures(&body)?;

    let author = header
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|a| !a.is_empty())
        .unwrap_or(fallback_author)
        .to_string();

    let rest_start = header.get(0).map_or(0, |m| m.end());
    let rest = &body[rest_start..];

    let (_, entries) = rest.lines().fold(
        (categories.default_category(), Vec::new()),
        |(current, mut entries), line| {
            // Directive check first; it only matches a line that is exactly `word:`.
            if let Some(caps) = CATEGORY_RE.captures(line) {
                let next = categories.resolve(&caps[1]).unwrap_or(current);
                return (next, entries);
            }

            if let Some(entry) = parse_entry(line) {
                entries.push((current, entry));
            }

            (current, entries)
        },
    );

    Some(ParsedChangelog {
        author,
        categories: group_blocks(entries),
    })
}

/// Match a single bullet line.
fn parse_entry(line: &str) -> Option<ChangeEntry> {
    let caps = ENTRY_RE.captures(line)?;
    let kind = ChangeType::from_keyword(&caps[1])?;
    let message = caps[2].trim();
    if message.is_empty() {
        return None;
    }
    Some(ChangeEntry::new(kind, message))
}

/// Merge entries per category, ordered by first appearance.
fn group_blocks(entries: Vec<(&str, ChangeEntry)>) -> Vec<CategoryBlock> {
    let mut blocks: Vec<CategoryBlock> = Vec::new();
    for (category, entry) in entries {
        match blocks.iter_mut().find(|b| b.category == category) {
            Some(block) => block.changes.push(entry),
            None => blocks.push(CategoryBlock {
                category: category.to_string(),
                changes: vec![entry],
            }),
        }
    }
    blocks
}
