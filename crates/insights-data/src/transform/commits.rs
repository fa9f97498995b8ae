//! `commits.json` → [`CommitSummary`].
//!
//! Commits are bucketed by the calendar month of their author-local
//! timestamp. Each message lands in exactly one work-type bucket; message
//! keywords and changed-file extensions tag per-author technologies.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use insights_core::classify::{classify_work_type, technologies_for_commit};
use insights_core::models::{identity_key, AuthorActivity, CommitSummary};
use insights_core::timestamps::TimestampProcessor;

use super::developers::synthesize_email;
use super::{decode, lenient_string, lenient_vec, total, COMMITS};
use crate::error::SourceFailure;

const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct CommitLog {
    #[serde(deserialize_with = "lenient_vec")]
    commits: Vec<CommitEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_email: Option<String>,
    #[serde(default)]
    pub date: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub files: Vec<Value>,
}

impl CommitEntry {
    /// The author email as reported, synthesized from the name if absent.
    pub fn author_email(&self) -> String {
        match (&self.author_email, &self.author_name) {
            (Some(email), _) => email.clone(),
            (None, Some(name)) => synthesize_email(name),
            (None, None) => synthesize_email(UNKNOWN_AUTHOR),
        }
    }

    /// Changed-file paths; entries may be bare paths or `{path|file|filename}`
    /// objects.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().filter_map(|f| match f {
            Value::String(path) => Some(path.as_str()),
            Value::Object(obj) => ["path", "file", "filename"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str)),
            _ => None,
        })
    }
}

/// Parse the commit entries of a commit-log document.
pub(crate) fn entries(raw: &Value) -> Result<Vec<CommitEntry>, SourceFailure> {
    Ok(decode::<CommitLog>(raw)?.commits)
}

/// Fold commit entries into a summary.
pub(crate) fn summarize(entries: &[CommitEntry]) -> CommitSummary {
    let mut summary = CommitSummary::default();

    for entry in entries {
        let message = entry.message.as_deref().unwrap_or_default();
        let when = TimestampProcessor::parse(&entry.date);
        let work_type = classify_work_type(message);

        summary.total_commits += 1;
        if let Some(dt) = &when {
            *summary
                .by_month
                .entry(TimestampProcessor::month_key(dt))
                .or_insert(0) += 1;
        }
        *summary.work_types.entry(work_type).or_insert(0) += 1;

        let email = entry.author_email();
        let mut activity = AuthorActivity {
            email: email.clone(),
            name: entry
                .author_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            ..Default::default()
        };
        activity.record(when.map(|dt| dt.with_timezone(&Utc)), work_type);
        for tag in technologies_for_commit(message, entry.file_paths()) {
            *activity.technologies.entry(tag.name).or_insert(0) += 1;
        }
        summary
            .authors
            .entry(identity_key(&email))
            .or_default()
            .merge(&activity);
    }

    summary.recompute_average();
    summary
}

pub fn try_transform(raw: &Value) -> Result<CommitSummary, SourceFailure> {
    Ok(summarize(&entries(raw)?))
}

/// Total form of [`try_transform`].
pub fn transform(raw: Option<&Value>) -> CommitSummary {
    total(COMMITS, raw, try_transform)
}
