//! The crawl controller: a sequential state machine that turns one-shot
//! timeline extraction into a resumable, backward-marching harvest.
//!
//! Cycle: navigate -> extract -> persist (non-empty batch, same window) or
//! rewind (empty batch, narrow the window to the oldest date reached and
//! re-query). The harvest log is the only durable state; a restarted
//! process resumes exactly where the log points.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use driftnet_common::{
    build_search_url, normalize, HarvestLog, NormalizePolicy, RawPost, SearchSpec,
};

use crate::browse::{NavigateError, TimelineBrowser};
use crate::store::{CheckpointStore, PostStore};

/// How a session obtains its harvest log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start a new session with a fresh log.
    Fresh,
    /// Continue the most recently started session.
    ResumeLatest,
    /// Continue a specific session.
    ResumeById(Uuid),
}

/// Controller tunables. All of these arrive validated from the config
/// surface; the controller never re-checks them.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Max posts per extraction batch.
    pub batch_limit: u32,
    /// Time budget for one extraction batch.
    pub extract_budget: Duration,
    /// How long to sleep when navigation reports a rate limit.
    pub rate_limit_backoff: Duration,
    /// Stop (successfully) once the window reaches this date.
    pub lower_bound: Option<DateTime<Utc>>,
    /// Minimum word count for normalized content.
    pub min_words: Option<usize>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            batch_limit: 10,
            extract_budget: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_secs(600),
            lower_bound: None,
            min_words: None,
        }
    }
}

/// Counters from one harvest session.
#[derive(Debug, Default)]
pub struct HarvestStats {
    pub batches: u32,
    pub posts_extracted: u32,
    pub posts_rejected: u32,
    pub posts_inserted: u64,
    pub duplicate_posts: u64,
    pub rate_limit_waits: u32,
    pub windows_rewound: u32,
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Session ===")?;
        writeln!(f, "Batches persisted: {}", self.batches)?;
        writeln!(f, "Posts extracted:   {}", self.posts_extracted)?;
        writeln!(f, "Posts rejected:    {}", self.posts_rejected)?;
        writeln!(f, "Posts inserted:    {}", self.posts_inserted)?;
        writeln!(f, "Duplicate posts:   {}", self.duplicate_posts)?;
        writeln!(f, "Rate-limit waits:  {}", self.rate_limit_waits)?;
        writeln!(f, "Windows rewound:   {}", self.windows_rewound)?;
        Ok(())
    }
}

enum Rewind {
    /// Window narrowed; continue with the re-built query.
    Continue { query: String },
    /// The configured lower bound has been reached. Terminal, successful.
    AtLowerBound,
}

pub struct Harvester {
    browser: Arc<dyn TimelineBrowser>,
    checkpoints: Arc<dyn CheckpointStore>,
    posts: Arc<dyn PostStore>,
    spec: SearchSpec,
    opts: HarvestOptions,
}

impl Harvester {
    pub fn new(
        browser: Arc<dyn TimelineBrowser>,
        checkpoints: Arc<dyn CheckpointStore>,
        posts: Arc<dyn PostStore>,
        spec: SearchSpec,
        opts: HarvestOptions,
    ) -> Self {
        Self {
            browser,
            checkpoints,
            posts,
            spec,
            opts,
        }
    }

    /// Run the session until the lower bound is reached or a structural
    /// failure aborts it. Without a lower bound this runs until killed;
    /// the harvest log makes the next run pick up where this one stopped.
    pub async fn run(&self, mode: RunMode) -> Result<HarvestStats> {
        let mut stats = HarvestStats::default();

        let log = self.bootstrap(mode).await?;
        let resumed = mode != RunMode::Fresh;

        if let Some(bound) = self.opts.lower_bound {
            if resumed && log.smallest_date <= bound {
                info!(
                    smallest_date = %log.smallest_date,
                    lower_bound = %bound,
                    "Session already at its lower bound, nothing to do"
                );
                return Ok(stats);
            }
        }

        let mut spec = self.spec.clone();
        if resumed {
            // Pick up below the oldest date the session had reached.
            spec.until = Some(log.smallest_date.date_naive());
        }
        let mut query = build_search_url(&spec);

        loop {
            self.navigate_with_backoff(&query, &mut stats).await?;

            let batch = self
                .browser
                .extract_batch(self.opts.batch_limit, self.opts.extract_budget)
                .await
                .context("Extraction failed")?;

            if batch.is_empty() {
                match self.rewind(log.id, &mut stats).await? {
                    Rewind::Continue { query: narrowed } => query = narrowed,
                    Rewind::AtLowerBound => {
                        info!("{stats}");
                        return Ok(stats);
                    }
                }
            } else {
                info!(count = batch.len(), "Acquired posts");
                self.persist_batch(log.id, &batch, &mut stats).await?;
            }
        }
    }

    /// Resolve or create the harvest log for this session.
    async fn bootstrap(&self, mode: RunMode) -> Result<HarvestLog> {
        match mode {
            RunMode::Fresh => {
                let initial_bound = self
                    .spec
                    .until
                    .map(|d| d.and_time(NaiveTime::MIN).and_utc())
                    .unwrap_or_else(Utc::now);
                let log = self
                    .checkpoints
                    .create(initial_bound)
                    .await
                    .context("Failed to create harvest log")?;
                info!(id = %log.id, "Created harvest log");
                Ok(log)
            }
            RunMode::ResumeLatest => {
                let log = self
                    .checkpoints
                    .latest()
                    .await
                    .context("Failed to look up the latest harvest log")?
                    .ok_or_else(|| anyhow!("No harvest log to resume"))?;
                info!(id = %log.id, smallest_date = %log.smallest_date, "Resuming latest session");
                Ok(log)
            }
            RunMode::ResumeById(id) => {
                let log = self
                    .checkpoints
                    .get(id)
                    .await
                    .context("Failed to look up harvest log")?
                    .ok_or_else(|| anyhow!("No harvest log with id {id}"))?;
                info!(id = %log.id, smallest_date = %log.smallest_date, "Resuming session");
                Ok(log)
            }
        }
    }

    /// Navigate, retrying unboundedly on the rate-limit signal only. Every
    /// other failure class propagates as fatal.
    async fn navigate_with_backoff(&self, query: &str, stats: &mut HarvestStats) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.browser.navigate(query).await {
                Ok(()) => return Ok(()),
                Err(NavigateError::RateLimited) => {
                    attempt += 1;
                    stats.rate_limit_waits += 1;
                    warn!(
                        attempt,
                        backoff_secs = self.opts.rate_limit_backoff.as_secs(),
                        "Rate limit detected, waiting before retrying navigation"
                    );
                    tokio::time::sleep(self.opts.rate_limit_backoff).await;
                }
                Err(NavigateError::Fatal(e)) => return Err(e.context("Navigation failed")),
            }
        }
    }

    /// Normalize a batch, advance the watermark, write the posts.
    /// Checkpoint failures are fatal: the log must always reflect true
    /// progress. Post-store duplicates are expected and merely counted.
    async fn persist_batch(
        &self,
        log_id: Uuid,
        batch: &[RawPost],
        stats: &mut HarvestStats,
    ) -> Result<()> {
        stats.posts_extracted += batch.len() as u32;

        let policy = NormalizePolicy {
            min_words: self.opts.min_words,
        };
        let mut cleaned = Vec::with_capacity(batch.len());
        for raw in batch {
            match normalize(raw, &policy) {
                Ok(post) => cleaned.push(post),
                Err(reason) => {
                    stats.posts_rejected += 1;
                    debug!(author = raw.author.as_str(), ?reason, "Dropped post");
                }
            }
        }

        let Some(batch_min) = cleaned.iter().map(|p| p.occurred_at).min() else {
            // Every post in the batch was rejected; nothing to persist, and
            // the watermark only moves on real data.
            return Ok(());
        };

        let watermark = self
            .checkpoints
            .advance_smallest_date(log_id, batch_min)
            .await
            .context("Failed to update harvest log")?;
        debug!(smallest_date = %watermark, "Advanced watermark");

        let outcome = self
            .posts
            .insert_batch(&cleaned)
            .await
            .context("Failed to write post batch")?;

        stats.batches += 1;
        stats.posts_inserted += outcome.inserted;
        stats.duplicate_posts += outcome.duplicates;
        info!(
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "Persisted batch"
        );
        Ok(())
    }

    /// The current window is exhausted: narrow its upper bound to the oldest
    /// date reached and re-query, or stop at the configured lower bound.
    async fn rewind(&self, log_id: Uuid, stats: &mut HarvestStats) -> Result<Rewind> {
        info!("Reached end of current timeline window");

        let log = self
            .checkpoints
            .get(log_id)
            .await
            .context("Failed to read harvest log")?
            .ok_or_else(|| anyhow!("Harvest log {log_id} is missing"))?;

        let mut next_until = log.smallest_date;
        if log.timeline_start_date - next_until < chrono::Duration::days(1) {
            // A window narrower than the date filter's granularity would
            // re-query the same day forever.
            next_until = next_until - chrono::Duration::days(1);
            warn!("Window collapsed below one day, stepping back an extra day");
        }

        if let Some(bound) = self.opts.lower_bound {
            if next_until <= bound {
                info!(lower_bound = %bound, "Reached configured lower bound");
                return Ok(Rewind::AtLowerBound);
            }
        }

        self.checkpoints
            .narrow_window(log_id, next_until)
            .await
            .context("Failed to narrow harvest window")?;
        stats.windows_rewound += 1;

        let mut spec = self.spec.clone();
        spec.until = Some(next_until.date_naive());
        info!(until = %next_until, "Re-querying narrowed window");
        Ok(Rewind::Continue {
            query: build_search_url(&spec),
        })
    }
}
