//! Core domain types shared across the harvester and the status API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which timeline tab a search lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineOrder {
    Top,
    #[default]
    Latest,
}

/// Result filters the source site supports as `filter:<name>` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostFilter {
    Media,
    Twimg,
    Images,
    Videos,
    Periscope,
    NativeVideo,
    Vine,
    ConsumerVideo,
    ProVideo,
    Verified,
    BlueVerified,
    Follows,
    Social,
    Trusted,
    Safe,
    News,
    Spaces,
    Replies,
    Retweets,
    #[serde(rename = "nativeretweets")]
    NativeRetweets,
    Quote,
    Links,
}

impl PostFilter {
    /// The filter name as the source site spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostFilter::Media => "media",
            PostFilter::Twimg => "twimg",
            PostFilter::Images => "images",
            PostFilter::Videos => "videos",
            PostFilter::Periscope => "periscope",
            PostFilter::NativeVideo => "native_video",
            PostFilter::Vine => "vine",
            PostFilter::ConsumerVideo => "consumer_video",
            PostFilter::ProVideo => "pro_video",
            PostFilter::Verified => "verified",
            PostFilter::BlueVerified => "blue_verified",
            PostFilter::Follows => "follows",
            PostFilter::Social => "social",
            PostFilter::Trusted => "trusted",
            PostFilter::Safe => "safe",
            PostFilter::News => "news",
            PostFilter::Spaces => "spaces",
            PostFilter::Replies => "replies",
            PostFilter::Retweets => "retweets",
            PostFilter::NativeRetweets => "nativeretweets",
            PostFilter::Quote => "quote",
            PostFilter::Links => "links",
        }
    }
}

/// The text-matching part of a search. Exactly one mode applies to a search,
/// so the alternatives are an enum rather than a struct of optionals. A
/// config layer that parses optional fields must reject zero or multiple
/// populated modes before constructing one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    /// Free text matched loosely.
    Plaintext(String),
    /// Quoted phrase matched verbatim.
    ExactPhrase(String),
    /// Any of the terms (OR group).
    AnyOf(Vec<String>),
    /// All of `include`, none of `exclude`.
    Terms {
        include: Vec<String>,
        exclude: Vec<String>,
    },
}

/// A fully-validated timeline search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub text: TextQuery,
    pub author: Option<String>,
    pub replies_to: Option<String>,
    pub mentions: Option<String>,
    pub filters: Vec<PostFilter>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub order: TimelineOrder,
}

impl SearchSpec {
    pub fn new(text: TextQuery) -> Self {
        Self {
            text,
            author: None,
            replies_to: None,
            mentions: None,
            filters: Vec::new(),
            since: None,
            until: None,
            order: TimelineOrder::default(),
        }
    }
}

/// A post as the extraction collaborator hands it over: free-text fields,
/// nothing parsed or validated yet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    /// The source's own id for the post. Absent when the extraction script
    /// could not find a permalink.
    #[serde(default)]
    pub source_id: Option<String>,
    pub author: String,
    /// ISO timestamp, or a sentinel like "undefined" when the element was missing.
    pub timestamp: String,
    pub content: String,
    /// Localized engagement blob, e.g. "1,2 rb suka, 3 balasan".
    #[serde(default)]
    pub engagement: String,
}

/// A storage-ready post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    /// Deduplication key: the source id when available, otherwise a
    /// content+author+day fallback (degraded mode).
    pub natural_key: String,
    pub author: String,
    pub occurred_at: DateTime<Utc>,
    pub content: String,
    pub reply_count: i64,
    pub retweet_count: i64,
    pub like_count: i64,
    pub view_count: i64,
    pub ingested_at: DateTime<Utc>,
}

/// Durable progress record of one harvest session.
///
/// `[smallest_date, timeline_start_date]` is the window currently being
/// searched. `smallest_date` only ever moves backward in time, and stays at
/// or below `timeline_start_date` after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestLog {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Upper bound (most recent moment) of the current search window.
    pub timeline_start_date: DateTime<Utc>,
    /// Oldest moment reached so far within the current window.
    pub smallest_date: DateTime<Utc>,
}
