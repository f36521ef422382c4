//! Changelog extraction from pull request descriptions.
//!
//! Merged pull requests may carry a `:cl:` block listing user-facing changes.
//! [`parse`] turns a [`Submission`] into a [`ChangelogResult`], or `None` when
//! the description has no changelog marker at all. Parsing is pure and safe to
//! call from any number of tasks at once.

mod parser;

use changelog_shared::{CategorySet, ChangelogResult, Submission};
use chrono::Utc;
use tracing::trace;

pub use parser::ParsedChangelog;

/// Parse a raw description against the recognised categories.
///
/// `fallback_author` is used when the header carries no author override.
pub fn parse_text(
    body: &str,
    categories: &CategorySet,
    fallback_author: &str,
) -> Option<ParsedChangelog> {
    parser::parse_text(body, categories, fallback_author)
}

/// Parse a merged pull request into a changelog result.
///
/// The timestamp is the merge time, or now when the merge time is unknown.
pub fn parse(submission: &Submission, categories: &CategorySet) -> Option<ChangelogResult> {
    let Some(parsed) = parser::parse_text(&submission.body, categories, &submission.author_login)
    else {
        trace!(pr = submission.number, "no changelog marker found");
        return None;
    };

    Some(ChangelogResult {
        author: parsed.author,
        categories: parsed.categories,
        time: submission.merged_at.unwrap_or_else(Utc::now),
        number: submission.number,
        url: submission.html_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use changelog_shared::ChangeType;
    use chrono::TimeZone;

    fn submission(body: &str) -> Submission {
        Submission {
            body: body.into(),
            author_login: "PJB".into(),
            merged_at: Some(Utc.with_ymd_and_hms(2021, 1, 1, 1, 1, 1).unwrap()),
            number: 123,
            html_url: "https://github.com/org/game/pull/123".into(),
        }
    }

    #[test]
    fn parse_carries_provenance() {
        let sub = submission("Did stuff!\n\n:cl:\n- add: Did the thing\n");
        let result = parse(&sub, &CategorySet::default()).unwrap();

        assert_eq!(result.author, "PJB");
        assert_eq!(result.time, sub.merged_at.unwrap());
        assert_eq!(result.number, 123);
        assert_eq!(result.url, "https://github.com/org/game/pull/123");
        assert_eq!(result.entry_count(), 1);
        assert_eq!(result.categories[0].changes[0].kind, ChangeType::Add);
    }

    #[test]
    fn parse_defaults_time_to_now() {
        let mut sub = submission(":cl:\n- tweak: t\n");
        sub.merged_at = None;

        let before = Utc::now();
        let result = parse(&sub, &CategorySet::default()).unwrap();
        let after = Utc::now();

        assert!(result.time >= before && result.time <= after);
    }

    #[test]
    fn parse_without_marker_is_none() {
        let sub = submission("- add: no header\n");
        assert!(parse(&sub, &CategorySet::default()).is_none());
    }

    #[test]
    fn parse_header_only_yields_empty_result() {
        let sub = submission(":cl: Someone Else\n");
        let result = parse(&sub, &CategorySet::default()).unwrap();
        assert_eq!(result.author, "Someone Else");
        assert!(result.categories.is_empty());
        assert_eq!(result.entry_count(), 0);
    }
}
