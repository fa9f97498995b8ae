//! `geographic_distribution.json` → [`RegionalBreakdown`].
//!
//! A distribution entry lists every country its timezone could belong to.
//! The entry's commits and authors are attributed to each of them in full,
//! so the same commit can count toward several countries.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use insights_core::models::{identity_key, RegionalBreakdown, RegionalBucket};

use super::{decode, lenient_count, lenient_string, lenient_vec, total, GEOGRAPHIC_DISTRIBUTION};
use crate::error::SourceFailure;

/// Bucket for entries that name no country at all.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

static QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("regex is valid"));

#[derive(Debug, Deserialize)]
struct DistributionDoc {
    #[serde(deserialize_with = "lenient_vec")]
    geographic_distribution: Vec<DistributionEntry>,
}

#[derive(Debug, Deserialize)]
struct DistributionEntry {
    #[serde(default, deserialize_with = "lenient_vec")]
    likely_countries: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    commit_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    unique_authors: u64,
    #[serde(default, deserialize_with = "lenient_vec")]
    top_authors: Vec<TopAuthor>,
}

#[derive(Debug, Deserialize)]
struct TopAuthor {
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
}

/// Strip region qualifiers: `"USA (West Coast)"` → `"USA"`.
pub fn normalize_country(raw: &str) -> String {
    QUALIFIER.replace_all(raw, "").trim().to_string()
}

pub fn try_transform(raw: &Value, repository: &str) -> Result<RegionalBreakdown, SourceFailure> {
    let doc: DistributionDoc = decode(raw)?;
    let mut breakdown = RegionalBreakdown::default();

    for entry in doc.geographic_distribution {
        let mut countries: BTreeSet<String> = entry
            .likely_countries
            .iter()
            .map(|c| normalize_country(c))
            .filter(|c| !c.is_empty())
            .collect();
        if countries.is_empty() {
            countries.insert(UNKNOWN_COUNTRY.to_string());
        }

        let emails: BTreeSet<String> = entry
            .top_authors
            .into_iter()
            .filter_map(|a| a.email)
            .map(|e| identity_key(&e))
            .collect();

        for country in countries {
            let mut bucket = RegionalBucket::new(country.as_str());
            bucket.commits = entry.commit_count;
            bucket.developers = entry.unique_authors;
            bucket.developer_emails = emails.clone();
            bucket.repositories.insert(repository.to_string());
            breakdown.bucket_mut(&country).merge(&bucket);
        }
    }

    Ok(breakdown)
}

/// Total form of [`try_transform`].
pub fn transform(raw: Option<&Value>, repository: &str) -> RegionalBreakdown {
    total(GEOGRAPHIC_DISTRIBUTION, raw, |v| try_transform(v, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_country_strips_qualifiers() {
        assert_eq!(normalize_country("USA (West Coast)"), "USA");
        assert_eq!(normalize_country("  Germany "), "Germany");
        assert_eq!(normalize_country("Kazakhstan (East)"), "Kazakhstan");
        assert_eq!(normalize_country("(nowhere)"), "");
    }

    #[test]
    fn test_multi_country_entry_fans_out() {
        let raw = json!({"geographic_distribution": [{
            "timezone_offset": "+1",
            "likely_countries": ["France", "Germany"],
            "commit_count": 10,
            "unique_authors": 2,
            "top_authors": [{"email": "A@x.io", "commits": 7}, {"email": "b@x.io", "commits": 3}]
        }]});
        let regional = transform(Some(&raw), "api");

        assert_eq!(regional.len(), 2);
        for country in ["France", "Germany"] {
            let bucket = regional.get(country).unwrap();
            assert_eq!(bucket.commits, 10);
            assert_eq!(bucket.developers, 2);
            assert!(bucket.developer_emails.contains("a@x.io"));
            assert!(bucket.repositories.contains("api"));
        }
    }

    #[test]
    fn test_qualified_entries_collapse_into_one_country() {
        let raw = json!({"geographic_distribution": [
            {"likely_countries": ["USA (West Coast)", "Canada (BC)"], "commit_count": 4, "unique_authors": 3},
            {"likely_countries": ["USA (East Coast)"], "commit_count": 6, "unique_authors": 1}
        ]});
        let regional = transform(Some(&raw), "api");

        let usa = regional.get("USA").unwrap();
        assert_eq!(usa.commits, 10);
        assert_eq!(usa.developers, 3);
        assert_eq!(regional.get("Canada").unwrap().commits, 4);
    }

    #[test]
    fn test_entry_without_countries_goes_to_unknown() {
        let raw = json!({"geographic_distribution": [{"commit_count": 2}]});
        let regional = transform(Some(&raw), "api");
        assert_eq!(regional.get(UNKNOWN_COUNTRY).unwrap().commits, 2);
    }

    #[test]
    fn test_malformed_and_absent_yield_empty() {
        assert!(transform(None, "api").is_empty());
        assert!(transform(Some(&json!("text")), "api").is_empty());
        assert!(transform(Some(&json!({"summary": {}})), "api").is_empty());
    }
}
