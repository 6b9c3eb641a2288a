//! Raw post cleanup: mention stripping, timestamp parsing, metric parsing,
//! natural-key derivation.

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::metrics::parse_engagement;
use crate::types::{Post, RawPost};

/// Normalization policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizePolicy {
    /// Drop posts whose cleaned content has fewer words than this.
    /// `None` disables the check.
    pub min_words: Option<usize>,
}

/// Why a raw post was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// Nothing left after stripping mentions and trimming.
    EmptyContent,
    /// Cleaned content is below the configured word minimum.
    TooShort,
}

/// Turn a raw extracted post into a storage-ready one, or reject it.
///
/// Two lossy fallbacks are deliberate and observable in the logs rather
/// than surfaced as errors: an unparseable timestamp becomes "now", and a
/// missing source id degrades the natural key to author + day + content hash.
pub fn normalize(raw: &RawPost, policy: &NormalizePolicy) -> Result<Post, Reject> {
    let mention_re = Regex::new(r"@\S+").expect("valid regex");
    let content = mention_re.replace_all(&raw.content, "").trim().to_string();
    if content.is_empty() {
        return Err(Reject::EmptyContent);
    }
    if let Some(min) = policy.min_words {
        if content.split_whitespace().count() < min {
            return Err(Reject::TooShort);
        }
    }

    let occurred_at = match DateTime::parse_from_rfc3339(&raw.timestamp) {
        Ok(t) => t.with_timezone(&Utc),
        Err(_) => {
            warn!(
                author = raw.author.as_str(),
                timestamp = raw.timestamp.as_str(),
                "Unparseable post timestamp, falling back to ingest time"
            );
            Utc::now()
        }
    };

    let natural_key = match raw.source_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let key = format!(
                "{}:{}:{:x}",
                raw.author,
                occurred_at.format("%Y-%m-%d"),
                crate::content_hash(&content)
            );
            debug!(
                author = raw.author.as_str(),
                "Post has no source id, deduplicating by content+author+day"
            );
            key
        }
    };

    let engagement = parse_engagement(&raw.engagement);

    Ok(Post {
        natural_key,
        author: raw.author.clone(),
        occurred_at,
        content,
        reply_count: engagement.replies.unwrap_or(0),
        retweet_count: engagement.retweets.unwrap_or(0),
        like_count: engagement.likes.unwrap_or(0),
        view_count: engagement.views.unwrap_or(0),
        ingested_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(content: &str) -> RawPost {
        RawPost {
            source_id: Some("1234567890".into()),
            author: "someuser".into(),
            timestamp: "2025-06-01T10:30:00.000Z".into(),
            content: content.into(),
            engagement: String::new(),
        }
    }

    #[test]
    fn strips_mentions_and_trims() {
        let post = normalize(&raw("@someone @other hello there"), &NormalizePolicy::default())
            .expect("normalizes");
        assert_eq!(post.content, "hello there");
    }

    #[test]
    fn rejects_mention_only_content() {
        let result = normalize(&raw("@someone @other"), &NormalizePolicy::default());
        assert_eq!(result.unwrap_err(), Reject::EmptyContent);
    }

    #[test]
    fn word_minimum_is_a_policy_not_a_constant() {
        let policy = NormalizePolicy { min_words: Some(4) };
        let short = normalize(&raw("too few words"), &policy);
        assert_eq!(short.unwrap_err(), Reject::TooShort);

        let enough = normalize(&raw("exactly four words here"), &policy);
        assert!(enough.is_ok());

        // No minimum configured: short content passes.
        assert!(normalize(&raw("ok"), &NormalizePolicy::default()).is_ok());
    }

    #[test]
    fn parses_iso_timestamp() {
        let post = normalize(&raw("hello"), &NormalizePolicy::default()).expect("normalizes");
        assert_eq!(post.occurred_at.to_rfc3339(), "2025-06-01T10:30:00+00:00");
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_now() {
        let mut input = raw("hello");
        input.timestamp = "undefined".into();
        let before = Utc::now();
        let post = normalize(&input, &NormalizePolicy::default()).expect("normalizes");
        assert!(post.occurred_at >= before);
        assert!(post.occurred_at <= Utc::now());
    }

    #[test]
    fn source_id_becomes_natural_key() {
        let post = normalize(&raw("hello"), &NormalizePolicy::default()).expect("normalizes");
        assert_eq!(post.natural_key, "1234567890");
    }

    #[test]
    fn missing_source_id_degrades_to_content_key() {
        let mut input = raw("hello world");
        input.source_id = None;
        let post = normalize(&input, &NormalizePolicy::default()).expect("normalizes");
        assert!(post.natural_key.starts_with("someuser:2025-06-01:"));

        // Same author, same day, same content: same degraded key.
        let again = normalize(&input, &NormalizePolicy::default()).expect("normalizes");
        assert_eq!(post.natural_key, again.natural_key);
    }

    #[test]
    fn engagement_counts_default_to_zero() {
        let mut input = raw("hello");
        input.engagement = "1,2 rb suka, 3 balasan".into();
        let post = normalize(&input, &NormalizePolicy::default()).expect("normalizes");
        assert_eq!(post.like_count, 1200);
        assert_eq!(post.reply_count, 3);
        assert_eq!(post.retweet_count, 0);
        assert_eq!(post.view_count, 0);
    }
}
