//! `developer_rankings.json` → [`DeveloperSet`].

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use insights_core::models::{DeveloperRecord, DeveloperSet};
use insights_core::timestamps::TimestampProcessor;

use super::{
    decode, lenient_count, lenient_score, lenient_string, lenient_vec, total, DEVELOPER_RANKINGS,
};
use crate::error::SourceFailure;

/// Domain used for emails synthesized from display names.
pub const PLACEHOLDER_DOMAIN: &str = "unknown.local";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("regex is valid"));

#[derive(Debug, Deserialize)]
struct RankingsDoc {
    #[serde(deserialize_with = "lenient_vec")]
    rankings: Vec<RankingEntry>,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    developer: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    rank: u64,
    #[serde(default, deserialize_with = "lenient_score")]
    weighted_score: Option<f64>,
    #[serde(default)]
    metrics: RankingMetrics,
    /// Flat commit count used by older ranking files without `metrics`.
    #[serde(default, deserialize_with = "lenient_count")]
    commits: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RankingMetrics {
    #[serde(default, deserialize_with = "lenient_count")]
    commits: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    lines_added: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    lines_deleted: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    last_commit_date: Option<String>,
}

/// Deterministic stand-in email for a developer listed without one.
///
/// `"Ada  Lovelace"` → `"ada.lovelace@unknown.local"`.
pub fn synthesize_email(name: &str) -> String {
    let local = WHITESPACE.replace_all(name.trim(), ".").to_lowercase();
    format!("{local}@{PLACEHOLDER_DOMAIN}")
}

pub fn try_transform(raw: &Value, repository: &str) -> Result<DeveloperSet, SourceFailure> {
    let doc: RankingsDoc = decode(raw)?;
    let mut set = DeveloperSet::default();

    for entry in doc.rankings {
        let (email, name) = match (entry.email, entry.developer) {
            (Some(email), Some(name)) => (email, name),
            (Some(email), None) => (email.clone(), email),
            (None, Some(name)) => (synthesize_email(&name), name),
            (None, None) => continue,
        };
        let commits = if entry.metrics.commits > 0 {
            entry.metrics.commits
        } else {
            entry.commits
        };

        let mut record = DeveloperRecord::new(email, name, repository, commits);
        record.lines_added = entry.metrics.lines_added;
        record.lines_deleted = entry.metrics.lines_deleted;
        if let Some(score) = entry.weighted_score {
            record.scores_by_repository.insert(repository.to_string(), score);
        }
        if entry.rank > 0 {
            record.rank_by_repository.insert(repository.to_string(), entry.rank);
        }
        record.last_commit = entry
            .metrics
            .last_commit_date
            .as_deref()
            .and_then(TimestampProcessor::parse_str)
            .map(|dt| dt.with_timezone(&Utc));
        set.insert(record);
    }

    Ok(set)
}

/// Total form of [`try_transform`].
pub fn transform(raw: Option<&Value>, repository: &str) -> DeveloperSet {
    total(DEVELOPER_RANKINGS, raw, |v| try_transform(v, repository))
}
