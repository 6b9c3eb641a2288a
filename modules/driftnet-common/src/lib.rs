pub mod config;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod query;
pub mod types;

pub use config::Config;
pub use error::HarvestError;
pub use metrics::{parse_engagement, Engagement};
pub use normalize::{normalize, NormalizePolicy, Reject};
pub use query::build_search_url;
pub use types::*;

/// Fast hash for content-derived keys. Not cryptographic.
pub fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}
