//! End-to-end controller runs against scripted collaborators: real state
//! machine, real normalization, in-memory stores, no network.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use driftnet_common::{build_search_url, HarvestLog, SearchSpec, TextQuery};
use driftnet_harvester::harvester::{Harvester, HarvestOptions, RunMode};
use driftnet_harvester::store::PostStore;
use driftnet_harvester::testing::{raw_post, MemoryCheckpointStore, MemoryPostStore, ScriptedBrowser};

fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0)
        .single()
        .expect("valid date")
}

fn spec() -> SearchSpec {
    SearchSpec::new(TextQuery::AnyOf(vec!["x".into()]))
}

fn options(lower_bound: DateTime<Utc>) -> HarvestOptions {
    HarvestOptions {
        batch_limit: 10,
        extract_budget: Duration::from_millis(10),
        rate_limit_backoff: Duration::from_millis(5),
        lower_bound: Some(lower_bound),
        min_words: None,
    }
}

fn harvester(
    browser: &Arc<ScriptedBrowser>,
    checkpoints: &Arc<MemoryCheckpointStore>,
    posts: &Arc<MemoryPostStore>,
    opts: HarvestOptions,
) -> Harvester {
    Harvester::new(
        browser.clone(),
        checkpoints.clone(),
        posts.clone(),
        spec(),
        opts,
    )
}

#[tokio::test]
async fn fresh_session_drains_a_window_then_rewinds_to_the_lower_bound() {
    let browser = Arc::new(ScriptedBrowser::new());
    browser.push_batch(vec![
        raw_post("1001", "desk_a", "2025-05-30T12:00:00.000Z", "newer post body"),
        raw_post("1002", "desk_b", "2025-05-28T08:00:00.000Z", "older post body"),
    ]);

    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());
    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 5, 27, 0)));

    let stats = h.run(RunMode::Fresh).await.expect("run completes");

    // One non-empty batch, fully persisted.
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.posts_extracted, 2);
    assert_eq!(stats.posts_inserted, 2);
    assert_eq!(stats.duplicate_posts, 0);
    assert_eq!(stats.rate_limit_waits, 0);
    assert_eq!(posts.count().await.expect("counts"), 2);

    // Exactly one checkpoint for the session.
    let logs = checkpoints.all();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];

    // The first rewind narrowed the window to the older post's timestamp;
    // the second collapsed below a day and stepped back one further day
    // before hitting the lower bound.
    assert_eq!(stats.windows_rewound, 2);
    assert_eq!(log.timeline_start_date, at(2025, 5, 27, 8));
    assert_eq!(log.smallest_date, at(2025, 5, 27, 8));
    assert!(log.smallest_date <= log.timeline_start_date);

    // Navigation trace: initial query twice (drain + discover-empty), then
    // one re-query per rewind, each carrying the narrowed until date.
    let initial = build_search_url(&spec());
    let mut rewound_1 = spec();
    rewound_1.until = Some(at(2025, 5, 28, 8).date_naive());
    let mut rewound_2 = spec();
    rewound_2.until = Some(at(2025, 5, 27, 8).date_naive());
    assert_eq!(
        browser.navigated(),
        vec![
            initial.clone(),
            initial,
            build_search_url(&rewound_1),
            build_search_url(&rewound_2),
        ]
    );
}

#[tokio::test]
async fn rate_limited_navigation_backs_off_and_retries() {
    let browser = Arc::new(ScriptedBrowser::new());
    browser.rate_limit_next(1);
    browser.push_batch(vec![raw_post(
        "2001",
        "desk_a",
        "2025-05-30T12:00:00.000Z",
        "only post",
    )]);

    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());
    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 5, 30, 0)));

    let stats = h.run(RunMode::Fresh).await.expect("run completes");

    assert_eq!(stats.rate_limit_waits, 1);
    assert_eq!(stats.posts_inserted, 1);
    // The refused attempt is not in the trace; the retry is.
    assert_eq!(browser.navigated().len(), 3);
}

#[tokio::test]
async fn re_extracted_posts_are_deduplicated_not_reinserted() {
    let browser = Arc::new(ScriptedBrowser::new());
    let seen_twice = raw_post("3001", "desk_a", "2025-05-30T12:00:00.000Z", "repeated post");
    browser.push_batch(vec![seen_twice.clone()]);
    browser.push_batch(vec![seen_twice]);

    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());
    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 5, 30, 0)));

    let stats = h.run(RunMode::Fresh).await.expect("run completes");

    assert_eq!(stats.posts_extracted, 2);
    assert_eq!(stats.posts_inserted, 1);
    assert_eq!(stats.duplicate_posts, 1);
    assert_eq!(posts.count().await.expect("counts"), 1);
}

#[tokio::test]
async fn rejected_posts_are_dropped_without_aborting_the_batch() {
    let browser = Arc::new(ScriptedBrowser::new());
    browser.push_batch(vec![
        raw_post("4001", "desk_a", "2025-05-30T12:00:00.000Z", "a real post"),
        raw_post("4002", "desk_b", "2025-05-30T13:00:00.000Z", "@only @mentions"),
    ]);

    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());
    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 5, 30, 0)));

    let stats = h.run(RunMode::Fresh).await.expect("run completes");

    assert_eq!(stats.posts_extracted, 2);
    assert_eq!(stats.posts_rejected, 1);
    assert_eq!(stats.posts_inserted, 1);
}

#[tokio::test]
async fn resume_by_id_queries_below_the_stored_watermark() {
    let browser = Arc::new(ScriptedBrowser::new());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());

    let id = Uuid::new_v4();
    checkpoints.seed(HarvestLog {
        id,
        started_at: at(2025, 6, 2, 0),
        timeline_start_date: at(2025, 6, 1, 0),
        smallest_date: at(2025, 5, 15, 9),
    });

    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 5, 15, 0)));
    let stats = h.run(RunMode::ResumeById(id)).await.expect("run completes");

    // The very first query resumes below the stored watermark.
    let mut resumed = spec();
    resumed.until = Some(at(2025, 5, 15, 9).date_naive());
    assert_eq!(browser.navigated()[0], build_search_url(&resumed));
    assert_eq!(checkpoints.all().len(), 1);
    assert_eq!(stats.posts_inserted, 0);
}

#[tokio::test]
async fn resume_at_or_below_the_lower_bound_stops_without_navigating() {
    let browser = Arc::new(ScriptedBrowser::new());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let posts = Arc::new(MemoryPostStore::new());

    let id = Uuid::new_v4();
    checkpoints.seed(HarvestLog {
        id,
        started_at: at(2025, 6, 2, 0),
        timeline_start_date: at(2025, 6, 1, 0),
        smallest_date: at(2025, 5, 1, 0),
    });

    let h = harvester(&browser, &checkpoints, &posts, options(at(2025, 6, 1, 0)));
    let stats = h.run(RunMode::ResumeLatest).await.expect("run completes");

    assert!(browser.navigated().is_empty());
    assert_eq!(stats.windows_rewound, 0);
    assert_eq!(stats.posts_extracted, 0);
}
