//! Engagement counter parsing.
//!
//! The extraction collaborator hands us the timeline's accessibility label
//! for a post's counter row: a comma-delimited list of localized
//! `<number>[<suffix>] <label>` tokens, e.g. "1,2 rb suka, 3 balasan".
//! Labels follow the source site's configured locale (Indonesian here).

use regex::Regex;

/// Parsed engagement counts. A `None` means the label was not present in the
/// text, which callers treat the same as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub replies: Option<i64>,
    pub retweets: Option<i64>,
    pub likes: Option<i64>,
    pub views: Option<i64>,
    pub bookmarks: Option<i64>,
}

/// Magnitude suffixes: ribu (thousand), juta (million).
const MULTIPLIERS: &[(&str, f64)] = &[("rb", 1_000.0), ("jt", 1_000_000.0)];

/// Parse a localized counter blob. Unrecognized labels are ignored; the
/// source vocabulary is not exhaustively known and new counters appear
/// without notice.
pub fn parse_engagement(text: &str) -> Engagement {
    let token_re =
        Regex::new(r"(?i)([0-9][0-9.,]*)\s*(?:\b(rb|jt)\b)?\s*([^,0-9]+)").expect("valid regex");

    let mut out = Engagement::default();
    for cap in token_re.captures_iter(text) {
        // The number uses ',' as its decimal separator.
        let normalized = cap[1].replace(',', ".");
        let Ok(mut value) = normalized.parse::<f64>() else {
            continue;
        };

        if let Some(suffix) = cap.get(2) {
            let suffix = suffix.as_str().to_lowercase();
            if let Some((_, mult)) = MULTIPLIERS.iter().find(|(s, _)| *s == suffix) {
                value *= mult;
            }
        }

        let count = value.round() as i64;
        match cap[3].trim().to_lowercase().as_str() {
            "balasan" => out.replies = Some(count),
            "posting ulang" => out.retweets = Some(count),
            "suka" => out.likes = Some(count),
            "tayangan" => out.views = Some(count),
            "markah" => out.bookmarks = Some(count),
            _ => {}
        }
    }
    out
}
