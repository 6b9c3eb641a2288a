//! Search URL construction.
//!
//! Pure and deterministic: the same spec always yields the byte-identical
//! URL, which is what makes re-navigation after a rewind idempotent.

use crate::types::{SearchSpec, TextQuery, TimelineOrder};

const SEARCH_BASE: &str = "https://x.com/search";

/// Build the full search URL for a spec.
///
/// Clause order is fixed: author, reply target, mention, text query, filters,
/// since, until. Clauses are joined with single spaces and encoded as one
/// `q` parameter.
pub fn build_search_url(spec: &SearchSpec) -> String {
    let mut clauses: Vec<String> = Vec::new();

    if let Some(author) = &spec.author {
        clauses.push(format!("from:{author}"));
    }
    if let Some(target) = &spec.replies_to {
        clauses.push(format!("to:{target}"));
    }
    if let Some(user) = &spec.mentions {
        clauses.push(format!("@{user}"));
    }

    match &spec.text {
        TextQuery::Plaintext(text) => clauses.push(text.clone()),
        TextQuery::ExactPhrase(phrase) => clauses.push(format!("\"{phrase}\"")),
        TextQuery::Terms { include, exclude } => {
            for term in include {
                clauses.push(term.clone());
            }
            for term in exclude {
                clauses.push(format!("-{term}"));
            }
        }
        TextQuery::AnyOf(terms) => {
            let group = terms
                .iter()
                .map(|t| quote_if_spaced(t))
                .collect::<Vec<_>>()
                .join(" OR ");
            clauses.push(format!("({group})"));
        }
    }

    for filter in &spec.filters {
        clauses.push(format!("filter:{}", filter.as_str()));
    }
    if let Some(since) = spec.since {
        clauses.push(format!("since:{}", since.format("%Y-%m-%d")));
    }
    if let Some(until) = spec.until {
        clauses.push(format!("until:{}", until.format("%Y-%m-%d")));
    }

    let q = clauses.join(" ");

    let mut url = url::Url::parse(SEARCH_BASE).expect("valid base url");
    url.query_pairs_mut()
        .append_pair("q", &q)
        .append_pair("src", "typed_query");
    if spec.order == TimelineOrder::Latest {
        url.query_pairs_mut().append_pair("f", "live");
    }
    url.to_string()
}

/// Terms inside an OR group are individually quoted when they contain a space.
fn quote_if_spaced(term: &str) -> String {
    if term.contains(' ') {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostFilter;
    use chrono::NaiveDate;

    fn spec(text: TextQuery) -> SearchSpec {
        SearchSpec::new(text)
    }

    #[test]
    fn deterministic_for_identical_specs() {
        let a = spec(TextQuery::AnyOf(vec!["one".into(), "two".into()]));
        let b = a.clone();
        assert_eq!(build_search_url(&a), build_search_url(&b));
    }

    #[test]
    fn clause_order_is_fixed() {
        let mut s = spec(TextQuery::Terms {
            include: vec!["budget".into()],
            exclude: vec!["rumor".into()],
        });
        s.author = Some("somedesk".into());
        s.replies_to = Some("council".into());
        s.mentions = Some("mayor".into());
        s.filters = vec![PostFilter::Links];
        s.since = NaiveDate::from_ymd_opt(2025, 3, 1);
        s.until = NaiveDate::from_ymd_opt(2025, 4, 1);

        let url = build_search_url(&s);
        let q = extract_q(&url);
        assert_eq!(
            q,
            "from:somedesk to:council @mayor budget -rumor filter:links since:2025-03-01 until:2025-04-01"
        );
    }

    #[test]
    fn or_group_quotes_spaced_terms() {
        let s = spec(TextQuery::AnyOf(vec!["one term".into(), "two".into()]));
        assert_eq!(extract_q(&build_search_url(&s)), "(\"one term\" OR two)");
    }

    #[test]
    fn exact_phrase_is_quoted() {
        let s = spec(TextQuery::ExactPhrase("exact words".into()));
        assert_eq!(extract_q(&build_search_url(&s)), "\"exact words\"");
    }

    #[test]
    fn dates_are_zero_padded() {
        let mut s = spec(TextQuery::Plaintext("x".into()));
        s.until = NaiveDate::from_ymd_opt(2025, 1, 5);
        assert!(extract_q(&build_search_url(&s)).ends_with("until:2025-01-05"));
    }

    #[test]
    fn latest_order_adds_live_param() {
        let mut s = spec(TextQuery::Plaintext("x".into()));
        s.order = TimelineOrder::Latest;
        assert!(build_search_url(&s).contains("f=live"));
        s.order = TimelineOrder::Top;
        assert!(!build_search_url(&s).contains("f=live"));
    }

    #[test]
    fn nativeretweets_filter_uses_source_spelling() {
        let mut s = spec(TextQuery::Plaintext("x".into()));
        s.filters = vec![PostFilter::NativeRetweets];
        assert!(extract_q(&build_search_url(&s)).contains("filter:nativeretweets"));
    }

    /// Pull the decoded `q` parameter back out of a built URL.
    fn extract_q(url: &str) -> String {
        let parsed = url::Url::parse(url).expect("valid url");
        parsed
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .expect("q parameter present")
    }
}
