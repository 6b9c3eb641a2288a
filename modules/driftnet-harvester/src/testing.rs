//! Test doubles for the controller's three trait boundaries:
//! ScriptedBrowser (TimelineBrowser), MemoryCheckpointStore
//! (CheckpointStore), MemoryPostStore (PostStore). No network, no
//! database, `cargo test` in seconds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use driftnet_common::{HarvestLog, Post, RawPost};

use crate::browse::{NavigateError, TimelineBrowser};
use crate::store::{BatchOutcome, CheckpointStore, PostStore};

// ---------------------------------------------------------------------------
// ScriptedBrowser
// ---------------------------------------------------------------------------

/// Plays back a queue of extraction batches; once the queue is empty every
/// further extraction returns no posts. Navigations are recorded for
/// assertion, and the next `n` of them can be scripted to rate-limit.
#[derive(Default)]
pub struct ScriptedBrowser {
    batches: Mutex<VecDeque<Vec<RawPost>>>,
    pending_rate_limits: Mutex<u32>,
    navigations: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, batch: Vec<RawPost>) {
        self.batches.lock().expect("batches lock").push_back(batch);
    }

    /// The next `n` navigation attempts report a rate limit.
    pub fn rate_limit_next(&self, n: u32) {
        *self.pending_rate_limits.lock().expect("limits lock") = n;
    }

    /// URLs of all successful navigations, in order.
    pub fn navigated(&self) -> Vec<String> {
        self.navigations.lock().expect("navigations lock").clone()
    }
}

#[async_trait]
impl TimelineBrowser for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> Result<(), NavigateError> {
        {
            let mut pending = self.pending_rate_limits.lock().expect("limits lock");
            if *pending > 0 {
                *pending -= 1;
                return Err(NavigateError::RateLimited);
            }
        }
        self.navigations
            .lock()
            .expect("navigations lock")
            .push(url.to_string());
        Ok(())
    }

    async fn extract_batch(&self, _limit: u32, _budget: Duration) -> Result<Vec<RawPost>> {
        Ok(self
            .batches
            .lock()
            .expect("batches lock")
            .pop_front()
            .unwrap_or_default())
    }
}

/// Shorthand for building extraction input in tests.
pub fn raw_post(source_id: &str, author: &str, timestamp: &str, content: &str) -> RawPost {
    RawPost {
        source_id: Some(source_id.to_string()),
        author: author.to_string(),
        timestamp: timestamp.to_string(),
        content: content.to_string(),
        engagement: String::new(),
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCheckpointStore {
    logs: Mutex<HashMap<Uuid, HarvestLog>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing session, as if an earlier run had created it.
    pub fn seed(&self, log: HarvestLog) {
        self.logs.lock().expect("logs lock").insert(log.id, log);
    }

    pub fn all(&self) -> Vec<HarvestLog> {
        self.logs.lock().expect("logs lock").values().cloned().collect()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn create(&self, initial_bound: DateTime<Utc>) -> Result<HarvestLog> {
        let log = HarvestLog {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            timeline_start_date: initial_bound,
            smallest_date: initial_bound,
        };
        self.logs
            .lock()
            .expect("logs lock")
            .insert(log.id, log.clone());
        Ok(log)
    }

    async fn get(&self, id: Uuid) -> Result<Option<HarvestLog>> {
        Ok(self.logs.lock().expect("logs lock").get(&id).cloned())
    }

    async fn latest(&self) -> Result<Option<HarvestLog>> {
        Ok(self
            .logs
            .lock()
            .expect("logs lock")
            .values()
            .max_by_key(|l| l.started_at)
            .cloned())
    }

    async fn advance_smallest_date(
        &self,
        id: Uuid,
        candidate: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let mut logs = self.logs.lock().expect("logs lock");
        let Some(log) = logs.get_mut(&id) else {
            bail!("Harvest log {id} is missing");
        };
        log.smallest_date = log.smallest_date.min(candidate);
        Ok(log.smallest_date)
    }

    async fn narrow_window(&self, id: Uuid, new_until: DateTime<Utc>) -> Result<()> {
        let mut logs = self.logs.lock().expect("logs lock");
        let Some(log) = logs.get_mut(&id) else {
            bail!("Harvest log {id} is missing");
        };
        log.timeline_start_date = new_until;
        log.smallest_date = log.smallest_date.min(new_until);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPostStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<Vec<Post>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Post> {
        self.posts.lock().expect("posts lock").clone()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert_batch(&self, batch: &[Post]) -> Result<BatchOutcome> {
        let mut posts = self.posts.lock().expect("posts lock");
        let mut keys: HashSet<String> = posts.iter().map(|p| p.natural_key.clone()).collect();

        let mut outcome = BatchOutcome::default();
        for post in batch {
            if keys.insert(post.natural_key.clone()) {
                posts.push(post.clone());
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.posts.lock().expect("posts lock").len() as i64)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Post>> {
        let mut posts = self.posts.lock().expect("posts lock").clone();
        posts.sort_by_key(|p| std::cmp::Reverse(p.ingested_at));
        posts.truncate(limit.max(0) as usize);
        Ok(posts)
    }
}

// ---------------------------------------------------------------------------
// Store behavior tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("valid date")
    }

    #[tokio::test]
    async fn smallest_date_is_monotonically_non_increasing() {
        let store = MemoryCheckpointStore::new();
        let log = store.create(at(2025, 6, 1, 0)).await.expect("creates");

        let mut previous = log.smallest_date;
        for candidate in [
            at(2025, 5, 20, 12),
            at(2025, 5, 25, 12), // later than current smallest, must not move forward
            at(2025, 5, 10, 6),
        ] {
            let stored = store
                .advance_smallest_date(log.id, candidate)
                .await
                .expect("advances");
            assert!(stored <= previous);
            previous = stored;

            let fresh = store.get(log.id).await.expect("gets").expect("exists");
            assert!(fresh.smallest_date <= fresh.timeline_start_date);
        }
        assert_eq!(previous, at(2025, 5, 10, 6));
    }

    #[tokio::test]
    async fn narrow_window_keeps_the_invariant() {
        let store = MemoryCheckpointStore::new();
        let log = store.create(at(2025, 6, 1, 0)).await.expect("creates");
        store
            .advance_smallest_date(log.id, at(2025, 5, 10, 6))
            .await
            .expect("advances");

        // Step-back narrows below the stored smallest date; both fields clamp.
        store
            .narrow_window(log.id, at(2025, 5, 9, 6))
            .await
            .expect("narrows");

        let fresh = store.get(log.id).await.expect("gets").expect("exists");
        assert_eq!(fresh.timeline_start_date, at(2025, 5, 9, 6));
        assert_eq!(fresh.smallest_date, at(2025, 5, 9, 6));
        assert!(fresh.smallest_date <= fresh.timeline_start_date);
    }

    #[tokio::test]
    async fn inserting_the_same_batch_twice_is_idempotent() {
        let store = MemoryPostStore::new();
        let batch = vec![
            post("100", at(2025, 5, 1, 0)),
            post("200", at(2025, 5, 2, 0)),
        ];

        let first = store.insert_batch(&batch).await.expect("inserts");
        assert_eq!(first, BatchOutcome { inserted: 2, duplicates: 0 });

        let second = store.insert_batch(&batch).await.expect("inserts");
        assert_eq!(second, BatchOutcome { inserted: 0, duplicates: 2 });

        assert_eq!(store.count().await.expect("counts"), 2);
    }

    #[tokio::test]
    async fn duplicate_keys_do_not_block_the_rest_of_a_batch() {
        let store = MemoryPostStore::new();
        store
            .insert_batch(&[post("100", at(2025, 5, 1, 0))])
            .await
            .expect("inserts");

        let outcome = store
            .insert_batch(&[post("100", at(2025, 5, 1, 0)), post("300", at(2025, 5, 3, 0))])
            .await
            .expect("inserts");
        assert_eq!(outcome, BatchOutcome { inserted: 1, duplicates: 1 });
    }

    fn post(key: &str, occurred_at: DateTime<Utc>) -> Post {
        Post {
            natural_key: key.to_string(),
            author: "someuser".to_string(),
            occurred_at,
            content: "content".to_string(),
            reply_count: 0,
            retweet_count: 0,
            like_count: 0,
            view_count: 0,
            ingested_at: Utc::now(),
        }
    }
}
