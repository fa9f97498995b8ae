//! Presentation result structures.
//!
//! Each view is a pure projection of an [`AggregateResult`]. A single
//! repository is presented through the aggregate of its one snapshot, so the
//! same builders serve both the per-repository and the combined scope.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use insights_core::models::{
    DeveloperRecord, OverallSummary, RegionalBucket, TechCategory, TechnologyUsageRecord,
    VulnerabilityCounts, WorkType,
};

use crate::aggregator::AggregateResult;

// ── ViewKind ──────────────────────────────────────────────────────────────────

/// The independently requestable result structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Developers,
    Regional,
    Technology,
    Commits,
    Vulnerabilities,
    Summary,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Developers => "developers",
            ViewKind::Regional => "regional",
            ViewKind::Technology => "technology",
            ViewKind::Commits => "commits",
            ViewKind::Vulnerabilities => "vulnerabilities",
            ViewKind::Summary => "summary",
        }
    }

    /// Parse a `--view` value. `yearly` and `discover` are not snapshot views
    /// and yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "developers" => Some(ViewKind::Developers),
            "regional" => Some(ViewKind::Regional),
            "technology" => Some(ViewKind::Technology),
            "commits" => Some(ViewKind::Commits),
            "vulnerabilities" => Some(ViewKind::Vulnerabilities),
            "summary" => Some(ViewKind::Summary),
            _ => None,
        }
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Developer contributions ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperContributions {
    pub scope: String,
    pub total_developers: usize,
    pub total_commits: u64,
    /// True when the order follows the pipeline's weighted scores.
    pub ranked_by_score: bool,
    /// Highest weighted score first (unscored developers after the scored
    /// ones), then most commits, then email.
    pub developers: Vec<DeveloperRecord>,
}

impl DeveloperContributions {
    pub fn build(scope: &str, result: &AggregateResult) -> Self {
        let mut developers: Vec<DeveloperRecord> = result.developers.0.values().cloned().collect();
        developers.sort_by(|a, b| {
            let by_score = match (a.weighted_score(), b.weighted_score()) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_score
                .then_with(|| b.total_commits.cmp(&a.total_commits))
                .then_with(|| a.email.cmp(&b.email))
        });
        Self {
            scope: scope.to_string(),
            total_developers: developers.len(),
            total_commits: result.developers.total_commits(),
            ranked_by_score: developers.iter().any(|d| d.weighted_score().is_some()),
            developers,
        }
    }
}

// ── Regional analysis ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalAnalysis {
    pub scope: String,
    pub total_regions: usize,
    pub total_commits: u64,
    pub top_region: Option<String>,
    pub regions: Vec<RegionalBucket>,
}

impl RegionalAnalysis {
    pub fn build(scope: &str, result: &AggregateResult) -> Self {
        let mut regions: Vec<RegionalBucket> = result.regions.0.values().cloned().collect();
        regions.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.country.cmp(&b.country)));
        Self {
            scope: scope.to_string(),
            total_regions: regions.len(),
            total_commits: regions.iter().map(|r| r.commits).sum(),
            top_region: result.totals.top_region.clone(),
            regions,
        }
    }
}

// ── Technology stack ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyStack {
    pub scope: String,
    pub total_technologies: usize,
    pub top_technology: Option<String>,
    /// Usage count summed per category.
    pub by_category: BTreeMap<TechCategory, u64>,
    pub technologies: Vec<TechnologyUsageRecord>,
}

impl TechnologyStack {
    pub fn build(scope: &str, result: &AggregateResult) -> Self {
        let mut technologies: Vec<TechnologyUsageRecord> =
            result.technologies.0.values().cloned().collect();
        technologies.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut by_category = BTreeMap::new();
        for tech in &technologies {
            *by_category.entry(tech.category).or_insert(0) += tech.usage_count;
        }

        Self {
            scope: scope.to_string(),
            total_technologies: technologies.len(),
            top_technology: result.technologies.top().map(str::to_string),
            by_category,
            technologies,
        }
    }
}

// ── Commit analysis ───────────────────────────────────────────────────────────

/// One row of the author leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorCommits {
    pub author: String,
    pub name: String,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitAnalysis {
    pub scope: String,
    pub total_commits: u64,
    pub active_months: usize,
    pub average_per_month: f64,
    pub by_month: BTreeMap<String, u64>,
    pub work_types: BTreeMap<WorkType, u64>,
    pub authors: Vec<AuthorCommits>,
}

impl CommitAnalysis {
    pub fn build(scope: &str, result: &AggregateResult) -> Self {
        let commits = &result.commits;
        let mut authors: Vec<AuthorCommits> = commits
            .authors
            .iter()
            .map(|(key, activity)| AuthorCommits {
                author: key.clone(),
                name: activity.name.clone(),
                commits: activity.commits,
            })
            .collect();
        authors.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.author.cmp(&b.author)));

        Self {
            scope: scope.to_string(),
            total_commits: result.totals.total_commits,
            active_months: commits.active_months(),
            average_per_month: commits.average_per_month,
            by_month: commits.by_month.clone(),
            work_types: commits.work_types.clone(),
            authors,
        }
    }
}

// ── Vulnerability data ────────────────────────────────────────────────────────

/// Health label derived from the severity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityStatus {
    Critical,
    AtRisk,
    Healthy,
}

impl SecurityStatus {
    pub fn from_counts(counts: &VulnerabilityCounts) -> Self {
        if counts.critical > 0 {
            SecurityStatus::Critical
        } else if counts.high > 0 {
            SecurityStatus::AtRisk
        } else {
            SecurityStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityData {
    pub scope: String,
    pub status: SecurityStatus,
    pub counts: VulnerabilityCounts,
}

impl VulnerabilityData {
    pub fn build(scope: &str, result: &AggregateResult) -> Self {
        Self {
            scope: scope.to_string(),
            status: SecurityStatus::from_counts(&result.vulnerabilities),
            counts: result.vulnerabilities,
        }
    }
}

// ── View ──────────────────────────────────────────────────────────────────────

/// Any one of the result structures, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum View {
    Developers(DeveloperContributions),
    Regional(RegionalAnalysis),
    Technology(TechnologyStack),
    Commits(CommitAnalysis),
    Vulnerabilities(VulnerabilityData),
    Summary(OverallSummary),
}

impl View {
    pub fn build(kind: ViewKind, scope: &str, result: &AggregateResult) -> Self {
        match kind {
            ViewKind::Developers => View::Developers(DeveloperContributions::build(scope, result)),
            ViewKind::Regional => View::Regional(RegionalAnalysis::build(scope, result)),
            ViewKind::Technology => View::Technology(TechnologyStack::build(scope, result)),
            ViewKind::Commits => View::Commits(CommitAnalysis::build(scope, result)),
            ViewKind::Vulnerabilities => {
                View::Vulnerabilities(VulnerabilityData::build(scope, result))
            }
            ViewKind::Summary => View::Summary(result.totals.clone()),
        }
    }

    pub fn kind(&self) -> ViewKind {
        match self {
            View::Developers(_) => ViewKind::Developers,
            View::Regional(_) => ViewKind::Regional,
            View::Technology(_) => ViewKind::Technology,
            View::Commits(_) => ViewKind::Commits,
            View::Vulnerabilities(_) => ViewKind::Vulnerabilities,
            View::Summary(_) => ViewKind::Summary,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
