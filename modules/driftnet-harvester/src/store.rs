//! Postgres persistence for harvest logs and posts.
//!
//! Both stores are trait seams so the controller can run against in-memory
//! implementations in tests. Every mutation is a single statement: the
//! store's per-row atomicity is what keeps a checkpoint's fields race-free
//! across processes (one controller per session id is an operator invariant,
//! not enforced here).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use driftnet_common::{HarvestLog, Post};

/// Outcome of a best-effort batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    /// Natural-key collisions. Expected, not an error.
    pub duplicates: u64,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create a log for a new session. Both window bounds start at
    /// `initial_bound` so the window invariant holds from the first read.
    async fn create(&self, initial_bound: DateTime<Utc>) -> Result<HarvestLog>;

    async fn get(&self, id: Uuid) -> Result<Option<HarvestLog>>;

    /// The most recently started log.
    async fn latest(&self) -> Result<Option<HarvestLog>>;

    /// Persist `min(stored, candidate)` against the freshest stored value.
    /// Returns the value now stored.
    async fn advance_smallest_date(
        &self,
        id: Uuid,
        candidate: DateTime<Utc>,
    ) -> Result<DateTime<Utc>>;

    /// Narrow the window's upper bound after exhausting it. Clamps
    /// `smallest_date` to the new bound so it never exceeds the window start.
    async fn narrow_window(&self, id: Uuid, new_until: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Unordered, independent writes: one bad record never blocks the rest.
    /// Only a store-level failure (unreachable, pool closed) is an `Err`.
    async fn insert_batch(&self, posts: &[Post]) -> Result<BatchOutcome>;

    async fn count(&self) -> Result<i64>;

    /// Most recently ingested posts.
    async fn recent(&self, limit: i64) -> Result<Vec<Post>>;
}

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type LogRow = (Uuid, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>);

fn row_to_log(r: LogRow) -> HarvestLog {
    HarvestLog {
        id: r.0,
        started_at: r.1,
        timeline_start_date: r.2,
        smallest_date: r.3,
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn create(&self, initial_bound: DateTime<Utc>) -> Result<HarvestLog> {
        let log = HarvestLog {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            timeline_start_date: initial_bound,
            smallest_date: initial_bound,
        };

        sqlx::query(
            r#"
            INSERT INTO harvest_logs (id, started_at, timeline_start_date, smallest_date)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(log.id)
        .bind(log.started_at)
        .bind(log.timeline_start_date)
        .bind(log.smallest_date)
        .execute(&self.pool)
        .await?;

        Ok(log)
    }

    async fn get(&self, id: Uuid) -> Result<Option<HarvestLog>> {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, started_at, timeline_start_date, smallest_date
            FROM harvest_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_log))
    }

    async fn latest(&self) -> Result<Option<HarvestLog>> {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, started_at, timeline_start_date, smallest_date
            FROM harvest_logs
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_log))
    }

    async fn advance_smallest_date(
        &self,
        id: Uuid,
        candidate: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        // LEAST() against the stored value inside the UPDATE keeps this a
        // single atomic read-modify-write: no lost updates between batches.
        let stored = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE harvest_logs
            SET smallest_date = LEAST(smallest_date, $2)
            WHERE id = $1
            RETURNING smallest_date
            "#,
        )
        .bind(id)
        .bind(candidate)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some(value) => Ok(value),
            None => bail!("Harvest log {id} is missing"),
        }
    }

    async fn narrow_window(&self, id: Uuid, new_until: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE harvest_logs
            SET timeline_start_date = $2,
                smallest_date = LEAST(smallest_date, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_until)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            bail!("Harvest log {id} is missing");
        }
        Ok(())
    }
}

pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type PostRow = (
    String,
    String,
    DateTime<Utc>,
    String,
    i64,
    i64,
    i64,
    i64,
    DateTime<Utc>,
);

fn row_to_post(r: PostRow) -> Post {
    Post {
        natural_key: r.0,
        author: r.1,
        occurred_at: r.2,
        content: r.3,
        reply_count: r.4,
        retweet_count: r.5,
        like_count: r.6,
        view_count: r.7,
        ingested_at: r.8,
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert_batch(&self, posts: &[Post]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for post in posts {
            let result = sqlx::query(
                r#"
                INSERT INTO posts
                    (id, natural_key, author, occurred_at, content,
                     reply_count, retweet_count, like_count, view_count, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (natural_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&post.natural_key)
            .bind(&post.author)
            .bind(post.occurred_at)
            .bind(&post.content)
            .bind(post.reply_count)
            .bind(post.retweet_count)
            .bind(post.like_count)
            .bind(post.view_count)
            .bind(post.ingested_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => outcome.duplicates += 1,
                Ok(_) => outcome.inserted += 1,
                // A rejected row shouldn't sink the rest of the batch.
                Err(sqlx::Error::Database(e)) => {
                    warn!(
                        natural_key = post.natural_key.as_str(),
                        error = %e,
                        "Failed to write post, skipping"
                    );
                }
                Err(e) => return Err(e).context("Post store unreachable"),
            }
        }

        Ok(outcome)
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT natural_key, author, occurred_at, content,
                   reply_count, retweet_count, like_count, view_count, ingested_at
            FROM posts
            ORDER BY ingested_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.min(100))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_post).collect())
    }
}
