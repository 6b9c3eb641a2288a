//! Timeline navigation and extraction.
//!
//! The controller only sees the `TimelineBrowser` trait. The production
//! implementation drives a Browserless instance: navigation probes the page
//! and classifies a missing timeline container as the rate-limit signal
//! (the site serves an empty shell when throttled), extraction runs a
//! bounded scroll-and-collect script against the current search URL.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use browserless_client::BrowserlessClient;
use driftnet_common::{content_hash, RawPost};

/// The timeline container the search page renders its results into.
/// Locale-specific: the harvested site is browsed in Indonesian.
const TIMELINE_SELECTOR: &str = r#"[aria-label="Timeline: Cari timeline"]"#;

/// How long navigation waits for the timeline container before calling the
/// page rate-limited.
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack added on top of a script's own deadline for page load and transport.
const CALL_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum NavigateError {
    #[error("Rate limited: timeline did not appear before the wait deadline")]
    RateLimited,

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

#[async_trait]
pub trait TimelineBrowser: Send + Sync {
    /// Load a search URL and wait for its timeline container.
    async fn navigate(&self, url: &str) -> Result<(), NavigateError>;

    /// Collect up to `limit` posts not yet returned for the current page,
    /// spending at most `budget`. An empty result means the timeline is
    /// exhausted, never an error.
    async fn extract_batch(&self, limit: u32, budget: Duration) -> Result<Vec<RawPost>>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// Per-URL extraction progress. Browserless calls are stateless, so the
/// client remembers which posts it already handed out for the current page
/// and asks the script to scroll deep enough to reach new ones. Progress
/// resets whenever the controller navigates to a different URL; the
/// date-window rewind is the real pagination mechanism.
struct PageSession {
    url: Option<String>,
    seen: HashSet<String>,
}

pub struct BrowserlessTimeline {
    client: BrowserlessClient,
    cookies: serde_json::Value,
    proxy: Option<ProxyCredentials>,
    scroll_delay: Duration,
    session: Mutex<PageSession>,
}

impl BrowserlessTimeline {
    /// Build a timeline browser. Session cookies come from a JSON file
    /// exported from an authenticated browser; without one we browse
    /// anonymously, which the source throttles much sooner.
    pub fn new(
        client: BrowserlessClient,
        cookie_path: &str,
        proxy: Option<ProxyCredentials>,
        scroll_delay: Duration,
    ) -> Result<Self> {
        let cookies = match std::fs::read_to_string(cookie_path) {
            Ok(text) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&text).context("Cookie file is not valid JSON")?;
                anyhow::ensure!(parsed.is_array(), "Cookie file is not an array");
                info!(cookie_path, "Loaded session cookies");
                parsed
            }
            Err(_) => {
                warn!(cookie_path, "No cookie file, browsing unauthenticated");
                serde_json::Value::Array(Vec::new())
            }
        };

        Ok(Self {
            client,
            cookies,
            proxy,
            scroll_delay,
            session: Mutex::new(PageSession {
                url: None,
                seen: HashSet::new(),
            }),
        })
    }

    fn base_context(&self, url: &str) -> serde_json::Value {
        serde_json::json!({
            "url": url,
            "cookies": self.cookies,
            "proxy": self.proxy,
            "selector": TIMELINE_SELECTOR,
            "containerTimeoutMs": CONTAINER_TIMEOUT.as_millis() as u64,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[async_trait]
impl TimelineBrowser for BrowserlessTimeline {
    async fn navigate(&self, url: &str) -> Result<(), NavigateError> {
        info!(url, "Navigating to search timeline");

        let outcome: ScriptOutcome = self
            .client
            .function(NAVIGATE_SCRIPT, self.base_context(url), CALL_MARGIN)
            .await
            .map_err(|e| NavigateError::Fatal(anyhow::anyhow!(e).context("Navigation failed")))?;

        match outcome.status.as_str() {
            "ok" => {
                let mut session = self.session.lock().expect("session lock");
                if session.url.as_deref() != Some(url) {
                    session.url = Some(url.to_string());
                    session.seen.clear();
                }
                info!(url, "Loaded timeline");
                Ok(())
            }
            "timeout" => Err(NavigateError::RateLimited),
            other => Err(NavigateError::Fatal(anyhow::anyhow!(
                "Unexpected navigation outcome: {other} ({})",
                outcome.message.unwrap_or_default()
            ))),
        }
    }

    async fn extract_batch(&self, limit: u32, budget: Duration) -> Result<Vec<RawPost>> {
        let (url, already_seen) = {
            let session = self.session.lock().expect("session lock");
            let url = session
                .url
                .clone()
                .context("extract_batch called before a successful navigation")?;
            (url, session.seen.len())
        };

        let mut context = self.base_context(&url);
        let extra = serde_json::json!({
            "target": already_seen as u64 + limit as u64,
            "budgetMs": budget.as_millis() as u64,
            "scrollDelayMs": self.scroll_delay.as_millis() as u64,
        });
        merge(&mut context, extra);

        let outcome: ScriptOutcome = self
            .client
            .function(EXTRACT_SCRIPT, context, budget + CALL_MARGIN)
            .await
            .map_err(|e| anyhow::anyhow!(e).context("Extraction call failed"))?;

        if outcome.status != "ok" {
            // Structural failure: the page no longer looks like a timeline.
            anyhow::bail!(
                "Extraction failed: {}",
                outcome.message.unwrap_or_else(|| outcome.status.clone())
            );
        }

        let mut session = self.session.lock().expect("session lock");
        let mut fresh = Vec::new();
        for post in outcome.posts {
            if session.seen.insert(raw_key(&post)) {
                fresh.push(post);
            }
            if fresh.len() as u32 >= limit {
                break;
            }
        }
        info!(url, fresh = fresh.len(), "Extracted batch");
        Ok(fresh)
    }
}

/// Identity of a raw post before normalization, for page-level de-duplication.
fn raw_key(post: &RawPost) -> String {
    match post.source_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!(
            "{}|{}|{:x}",
            post.author,
            post.timestamp,
            content_hash(&post.content)
        ),
    }
}

fn merge(base: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base_map), serde_json::Value::Object(extra_map)) = (base.as_object_mut(), extra) {
        base_map.extend(extra_map);
    }
}

/// Probe a search URL: authenticate, load, wait for the timeline container.
const NAVIGATE_SCRIPT: &str = r#"
export default async function ({ page, context }) {
    const { url, cookies, proxy, selector, containerTimeoutMs } = context;
    if (proxy) {
        await page.authenticate({ username: proxy.username, password: proxy.password });
    }
    if (cookies.length > 0) {
        await page.setCookie(...cookies);
    }
    await page.goto(url, { waitUntil: "networkidle2" });
    try {
        await page.waitForSelector(selector, { timeout: containerTimeoutMs });
    } catch (err) {
        return { status: "timeout" };
    }
    return { status: "ok" };
}
"#;

/// Scroll the timeline and collect rendered posts until `target` distinct
/// posts are on hand or the budget runs out.
const EXTRACT_SCRIPT: &str = r#"
export default async function ({ page, context }) {
    const { url, cookies, proxy, selector, target, budgetMs, scrollDelayMs, containerTimeoutMs } = context;
    if (proxy) {
        await page.authenticate({ username: proxy.username, password: proxy.password });
    }
    if (cookies.length > 0) {
        await page.setCookie(...cookies);
    }
    await page.goto(url, { waitUntil: "networkidle2" });
    try {
        await page.waitForSelector(selector, { timeout: containerTimeoutMs });
    } catch (err) {
        return { status: "error", message: "timeline container missing" };
    }
    const posts = await page.evaluate(
        async (selector, target, budgetMs, scrollDelayMs) => {
            const collected = new Map();
            const harvest = () => {
                for (const article of document.querySelectorAll(selector + " article")) {
                    const link = article.querySelector('a[href*="/status/"]');
                    const match = link ? link.getAttribute("href").match(/status\/(\d+)/) : null;
                    const sourceId = match ? match[1] : undefined;
                    const author = article.querySelector('[data-testid="User-Name"] span')?.textContent;
                    const timestamp = article.querySelector("time")?.getAttribute("datetime") || "undefined";
                    const content = article.querySelector('[data-testid="tweetText"]')?.textContent || "";
                    const engagement = article.querySelector('[role="group"]')?.getAttribute("aria-label") || "";
                    if (!author || content.length === 0) continue;
                    const key = sourceId || author + timestamp + content;
                    if (!collected.has(key)) {
                        collected.set(key, { sourceId, author, timestamp, content, engagement });
                    }
                }
            };
            const deadline = Date.now() + budgetMs;
            harvest();
            while (Date.now() < deadline && collected.size < target) {
                window.scrollBy(0, window.innerHeight);
                await new Promise((resolve) => setTimeout(resolve, scrollDelayMs));
                harvest();
            }
            return Array.from(collected.values());
        },
        selector, target, budgetMs, scrollDelayMs
    );
    return { status: "ok", posts };
}
"#;
