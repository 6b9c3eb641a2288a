//! The harvest definition file: what to search for and how hard to push.
//!
//! Parsed from TOML and validated here, before the controller exists. The
//! controller receives only the already-checked `SearchSpec` and
//! `HarvestOptions`; an invalid definition never gets as far as a browser.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use driftnet_common::{HarvestError, PostFilter, SearchSpec, TextQuery, TimelineOrder};

use crate::harvester::HarvestOptions;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestFile {
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub harvest: HarvestSection,
}

/// The `[search]` table. The four text-matching fields are mutually
/// exclusive; `into_spec` enforces exactly one.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchSection {
    pub plaintext: Option<String>,
    pub exact: Option<String>,
    pub any_of: Option<Vec<String>>,
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,

    pub author: Option<String>,
    pub replies_to: Option<String>,
    pub mentions: Option<String>,
    #[serde(default)]
    pub filters: Vec<PostFilter>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub order: TimelineOrder,
}

/// The `[harvest]` table. Defaults mirror a cautious interactive session.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestSection {
    pub batch_limit: Option<u32>,
    pub extract_budget_secs: Option<u64>,
    pub scroll_delay_ms: Option<u64>,
    pub rate_limit_backoff_secs: Option<u64>,
    pub min_words: Option<usize>,
    /// Stop once the window reaches this date.
    pub lower_bound: Option<NaiveDate>,
}

pub fn load(path: &Path) -> Result<HarvestFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read harvest file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid harvest file {}", path.display()))
}

impl SearchSection {
    pub fn into_spec(self) -> Result<SearchSpec, HarvestError> {
        let terms_mode = self.includes.is_some() || self.excludes.is_some();
        let populated = [
            self.plaintext.is_some(),
            self.exact.is_some(),
            self.any_of.is_some(),
            terms_mode,
        ]
        .iter()
        .filter(|p| **p)
        .count();

        if populated != 1 {
            return Err(HarvestError::Config(
                "exactly one of plaintext, exact, any_of, includes/excludes must be set"
                    .to_string(),
            ));
        }

        let text = if let Some(text) = self.plaintext {
            TextQuery::Plaintext(text)
        } else if let Some(phrase) = self.exact {
            TextQuery::ExactPhrase(phrase)
        } else if let Some(terms) = self.any_of {
            if terms.is_empty() {
                return Err(HarvestError::Config("any_of must not be empty".to_string()));
            }
            TextQuery::AnyOf(terms)
        } else {
            let include = self.includes.unwrap_or_default();
            let exclude = self.excludes.unwrap_or_default();
            if include.is_empty() && exclude.is_empty() {
                return Err(HarvestError::Config(
                    "includes/excludes must not both be empty".to_string(),
                ));
            }
            TextQuery::Terms { include, exclude }
        };

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(HarvestError::Config(format!(
                    "since ({since}) is after until ({until})"
                )));
            }
        }

        Ok(SearchSpec {
            text,
            author: self.author,
            replies_to: self.replies_to,
            mentions: self.mentions,
            filters: self.filters,
            since: self.since,
            until: self.until,
            order: self.order,
        })
    }
}

impl HarvestSection {
    pub fn into_options(self) -> HarvestOptions {
        let defaults = HarvestOptions::default();
        HarvestOptions {
            batch_limit: self.batch_limit.unwrap_or(defaults.batch_limit),
            extract_budget: self
                .extract_budget_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.extract_budget),
            rate_limit_backoff: self
                .rate_limit_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_backoff),
            lower_bound: self
                .lower_bound
                .map(|d| d.and_time(NaiveTime::MIN).and_utc()),
            min_words: self.min_words,
        }
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms.unwrap_or(1000))
    }
}
