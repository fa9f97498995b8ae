//! Normalized data model shared by the transformers, the aggregators and the
//! presentation layer.
//!
//! Every keyed collection is a `BTreeMap`/`BTreeSet` and every merge rule is
//! commutative and associative (sum, max, min, union), so folding the same
//! values in any order serializes to the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::csv_table::CsvRow;

// ── WorkType ──────────────────────────────────────────────────────────────────

/// Work-type bucket a commit message is classified into.
///
/// Declaration order is the classification precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    BugFix,
    Feature,
    Documentation,
    Testing,
    Refactor,
    Merge,
    Maintenance,
    Other,
}

impl WorkType {
    pub const ALL: [WorkType; 8] = [
        WorkType::BugFix,
        WorkType::Feature,
        WorkType::Documentation,
        WorkType::Testing,
        WorkType::Refactor,
        WorkType::Merge,
        WorkType::Maintenance,
        WorkType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::BugFix => "bug_fix",
            WorkType::Feature => "feature",
            WorkType::Documentation => "documentation",
            WorkType::Testing => "testing",
            WorkType::Refactor => "refactor",
            WorkType::Merge => "merge",
            WorkType::Maintenance => "maintenance",
            WorkType::Other => "other",
        }
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── TechCategory ──────────────────────────────────────────────────────────────

/// The seven fixed technology categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechCategory {
    Language,
    Framework,
    Database,
    Security,
    Networking,
    Platform,
    Tool,
}

impl TechCategory {
    pub const ALL: [TechCategory; 7] = [
        TechCategory::Language,
        TechCategory::Framework,
        TechCategory::Database,
        TechCategory::Security,
        TechCategory::Networking,
        TechCategory::Platform,
        TechCategory::Tool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TechCategory::Language => "language",
            TechCategory::Framework => "framework",
            TechCategory::Database => "database",
            TechCategory::Security => "security",
            TechCategory::Networking => "networking",
            TechCategory::Platform => "platform",
            TechCategory::Tool => "tool",
        }
    }
}

impl std::fmt::Display for TechCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Small merge helpers ───────────────────────────────────────────────────────

/// Add every count of `other` into `into`.
pub fn add_counts<K: Ord + Clone>(into: &mut BTreeMap<K, u64>, other: &BTreeMap<K, u64>) {
    for (key, count) in other {
        *into.entry(key.clone()).or_insert(0) += count;
    }
}

fn min_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Pick a name or email independent of merge order: the lexicographically
/// smallest non-empty candidate.
fn merge_name(current: &mut String, other: &str) {
    if other.is_empty() {
        return;
    }
    if current.is_empty() || other < current.as_str() {
        *current = other.to_string();
    }
}

fn max_score(into: &mut BTreeMap<String, f64>, other: &BTreeMap<String, f64>) {
    for (key, score) in other {
        into.entry(key.clone())
            .and_modify(|s| *s = s.max(*score))
            .or_insert(*score);
    }
}

fn min_rank(into: &mut BTreeMap<String, u64>, other: &BTreeMap<String, u64>) {
    for (key, rank) in other {
        into.entry(key.clone())
            .and_modify(|r| *r = (*r).min(*rank))
            .or_insert(*rank);
    }
}

/// Join key for an email: trimmed and lower-cased. Records keep the email as
/// reported; sets and lookups go through this key.
pub fn identity_key(email: &str) -> String {
    email.trim().to_lowercase()
}

// ── DeveloperRecord ───────────────────────────────────────────────────────────

/// One developer, keyed system-wide by [`identity_key`] of the email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperRecord {
    pub email: String,
    pub name: String,
    pub total_commits: u64,
    pub commits_by_repository: BTreeMap<String, u64>,
    /// Pipeline ranking score per repository.
    #[serde(default)]
    pub scores_by_repository: BTreeMap<String, f64>,
    /// Pipeline rank (1 = top) per repository.
    #[serde(default)]
    pub rank_by_repository: BTreeMap<String, u64>,
    pub repositories: BTreeSet<String>,
    pub first_commit: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub work_types: BTreeMap<WorkType, u64>,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_deleted: u64,
}

impl DeveloperRecord {
    /// A record for `email` that contributed `commits` to `repository`.
    pub fn new(email: impl Into<String>, name: impl Into<String>, repository: &str, commits: u64) -> Self {
        let mut record = Self {
            email: email.into(),
            name: name.into(),
            ..Default::default()
        };
        record.total_commits = commits;
        record
            .commits_by_repository
            .insert(repository.to_string(), commits);
        record.repositories.insert(repository.to_string());
        record
    }

    /// Fold `other` (same email) into `self`: counts add, sets union, the
    /// activity window widens.
    pub fn merge(&mut self, other: &DeveloperRecord) {
        merge_name(&mut self.email, &other.email);
        merge_name(&mut self.name, &other.name);
        self.total_commits += other.total_commits;
        add_counts(&mut self.commits_by_repository, &other.commits_by_repository);
        max_score(&mut self.scores_by_repository, &other.scores_by_repository);
        min_rank(&mut self.rank_by_repository, &other.rank_by_repository);
        self.repositories.extend(other.repositories.iter().cloned());
        self.first_commit = min_time(self.first_commit, other.first_commit);
        self.last_commit = max_time(self.last_commit, other.last_commit);
        add_counts(&mut self.work_types, &other.work_types);
        self.lines_added += other.lines_added;
        self.lines_deleted += other.lines_deleted;
    }

    /// Sum of the per-repository ranking scores, `None` when unranked.
    pub fn weighted_score(&self) -> Option<f64> {
        if self.scores_by_repository.is_empty() {
            return None;
        }
        Some(self.scores_by_repository.values().sum())
    }
}

/// All developers of a snapshot or aggregate, keyed by [`identity_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeveloperSet(pub BTreeMap<String, DeveloperRecord>);

impl DeveloperSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, email: &str) -> Option<&DeveloperRecord> {
        self.0.get(&identity_key(email))
    }

    pub fn insert(&mut self, record: DeveloperRecord) {
        let key = identity_key(&record.email);
        match self.0.get_mut(&key) {
            Some(existing) => existing.merge(&record),
            None => {
                self.0.insert(key, record);
            }
        }
    }

    pub fn merge(&mut self, other: &DeveloperSet) {
        for record in other.0.values() {
            self.insert(record.clone());
        }
    }

    pub fn total_commits(&self) -> u64 {
        self.0.values().map(|d| d.total_commits).sum()
    }
}

// ── RegionalBucket ────────────────────────────────────────────────────────────

/// Commit activity attributed to one normalized country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionalBucket {
    pub country: String,
    pub commits: u64,
    /// Highest developer count any single source reported.
    pub developers: u64,
    /// Identity keys of the authors listed for the region.
    pub developer_emails: BTreeSet<String>,
    pub repositories: BTreeSet<String>,
    pub work_types: BTreeMap<WorkType, u64>,
    pub technologies: BTreeMap<String, u64>,
}

impl RegionalBucket {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: &RegionalBucket) {
        self.commits += other.commits;
        self.developers = self.developers.max(other.developers);
        self.developer_emails
            .extend(other.developer_emails.iter().cloned());
        self.repositories.extend(other.repositories.iter().cloned());
        add_counts(&mut self.work_types, &other.work_types);
        add_counts(&mut self.technologies, &other.technologies);
    }
}

/// Regional buckets keyed by normalized country name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionalBreakdown(pub BTreeMap<String, RegionalBucket>);

impl RegionalBreakdown {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, country: &str) -> Option<&RegionalBucket> {
        self.0.get(country)
    }

    pub fn bucket_mut(&mut self, country: &str) -> &mut RegionalBucket {
        self.0
            .entry(country.to_string())
            .or_insert_with(|| RegionalBucket::new(country))
    }

    pub fn merge(&mut self, other: &RegionalBreakdown) {
        for (country, bucket) in &other.0 {
            self.bucket_mut(country).merge(bucket);
        }
    }
}

// ── TechnologyUsageRecord ─────────────────────────────────────────────────────

/// Usage of one technology, keyed by lower-cased name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyUsageRecord {
    pub name: String,
    pub category: TechCategory,
    pub usage_count: u64,
    #[serde(default)]
    pub lines: u64,
    #[serde(default)]
    pub code_lines: u64,
    #[serde(default)]
    pub complexity: u64,
}

impl TechnologyUsageRecord {
    pub fn merge(&mut self, other: &TechnologyUsageRecord) {
        self.usage_count += other.usage_count;
        self.lines += other.lines;
        self.code_lines += other.code_lines;
        self.complexity += other.complexity;
    }
}

/// Technology usage keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnologyUsage(pub BTreeMap<String, TechnologyUsageRecord>);

impl TechnologyUsage {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TechnologyUsageRecord> {
        self.0.get(name)
    }

    pub fn insert(&mut self, record: TechnologyUsageRecord) {
        match self.0.get_mut(&record.name) {
            Some(existing) => existing.merge(&record),
            None => {
                self.0.insert(record.name.clone(), record);
            }
        }
    }

    pub fn merge(&mut self, other: &TechnologyUsage) {
        for record in other.0.values() {
            self.insert(record.clone());
        }
    }

    /// Name of the most used technology; ties resolve to the smaller name.
    pub fn top(&self) -> Option<&str> {
        self.0
            .values()
            .max_by(|a, b| {
                a.usage_count
                    .cmp(&b.usage_count)
                    .then_with(|| b.name.cmp(&a.name))
            })
            .map(|r| r.name.as_str())
    }
}

// ── CommitSummary ─────────────────────────────────────────────────────────────

/// Per-author activity derived from the commit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorActivity {
    /// Email as it appears in the log.
    #[serde(default)]
    pub email: String,
    pub name: String,
    pub commits: u64,
    pub first_commit: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub work_types: BTreeMap<WorkType, u64>,
    pub technologies: BTreeMap<String, u64>,
}

impl AuthorActivity {
    pub fn merge(&mut self, other: &AuthorActivity) {
        merge_name(&mut self.email, &other.email);
        merge_name(&mut self.name, &other.name);
        self.commits += other.commits;
        self.first_commit = min_time(self.first_commit, other.first_commit);
        self.last_commit = max_time(self.last_commit, other.last_commit);
        add_counts(&mut self.work_types, &other.work_types);
        add_counts(&mut self.technologies, &other.technologies);
    }

    /// Record one commit at `when` classified as `work_type`.
    pub fn record(&mut self, when: Option<DateTime<Utc>>, work_type: WorkType) {
        self.commits += 1;
        self.first_commit = min_time(self.first_commit, when);
        self.last_commit = max_time(self.last_commit, when);
        *self.work_types.entry(work_type).or_insert(0) += 1;
    }
}

/// Commit log rollup: monthly buckets, work-type buckets, per-author activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub total_commits: u64,
    /// `"YYYY-MM"` → commits.
    pub by_month: BTreeMap<String, u64>,
    pub work_types: BTreeMap<WorkType, u64>,
    /// Keyed by [`identity_key`] of the author email.
    pub authors: BTreeMap<String, AuthorActivity>,
    /// Mean over months with at least one commit.
    pub average_per_month: f64,
}

impl CommitSummary {
    pub fn merge(&mut self, other: &CommitSummary) {
        self.total_commits += other.total_commits;
        add_counts(&mut self.by_month, &other.by_month);
        add_counts(&mut self.work_types, &other.work_types);
        for (email, activity) in &other.authors {
            self.authors
                .entry(email.clone())
                .or_default()
                .merge(activity);
        }
        self.recompute_average();
    }

    /// Recompute `average_per_month` from `by_month`.
    pub fn recompute_average(&mut self) {
        let active: Vec<u64> = self.by_month.values().copied().filter(|c| *c > 0).collect();
        self.average_per_month = if active.is_empty() {
            0.0
        } else {
            active.iter().sum::<u64>() as f64 / active.len() as f64
        };
    }

    pub fn active_months(&self) -> usize {
        self.by_month.values().filter(|c| **c > 0).count()
    }
}

// ── VulnerabilityCounts ───────────────────────────────────────────────────────

/// Flat vulnerability rollup over the four fixed severity tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityCounts {
    pub total: u64,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl VulnerabilityCounts {
    pub fn merge(&mut self, other: &VulnerabilityCounts) {
        self.total += other.total;
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }
}

// ── Code analysis tables ──────────────────────────────────────────────────────

/// The named code-analysis CSV tables published per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeTable {
    EntityChurn,
    EntityEffort,
    EntityOwnership,
    Fragmentation,
    Coupling,
    AuthorChurn,
    AbsChurn,
    Revisions,
}

impl CodeTable {
    pub const ALL: [CodeTable; 8] = [
        CodeTable::EntityChurn,
        CodeTable::EntityEffort,
        CodeTable::EntityOwnership,
        CodeTable::Fragmentation,
        CodeTable::Coupling,
        CodeTable::AuthorChurn,
        CodeTable::AbsChurn,
        CodeTable::Revisions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeTable::EntityChurn => "entity_churn",
            CodeTable::EntityEffort => "entity_effort",
            CodeTable::EntityOwnership => "entity_ownership",
            CodeTable::Fragmentation => "fragmentation",
            CodeTable::Coupling => "coupling",
            CodeTable::AuthorChurn => "author_churn",
            CodeTable::AbsChurn => "abs_churn",
            CodeTable::Revisions => "revisions",
        }
    }

    /// Artifact file name, e.g. `"api_code-analysis_entity_churn.csv"`.
    pub fn file_name(&self, repository: &str) -> String {
        format!("{repository}_code-analysis_{}.csv", self.as_str())
    }
}

/// Code-analysis tables that resolved; absent tables have no entry.
pub type CodeAnalysis = BTreeMap<CodeTable, Vec<CsvRow>>;

// ── OverallSummary ────────────────────────────────────────────────────────────

/// Headline figures derived from the other snapshot fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_commits: u64,
    pub total_developers: usize,
    pub total_regions: usize,
    pub total_technologies: usize,
    pub active_months: usize,
    pub top_technology: Option<String>,
    pub top_region: Option<String>,
    pub total_vulnerabilities: u64,
    pub has_critical_vulnerabilities: bool,
    /// Lines added + deleted from the entity churn table, when published.
    pub code_churn: Option<u64>,
}

// ── RepositorySnapshot ────────────────────────────────────────────────────────

/// The assembled, normalized view of one repository's artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    pub repository: String,
    pub commits: CommitSummary,
    pub developers: DeveloperSet,
    pub regional: RegionalBreakdown,
    pub technology: TechnologyUsage,
    pub vulnerabilities: VulnerabilityCounts,
    pub raw_vulnerabilities: Option<serde_json::Value>,
    pub complexity: Option<serde_json::Value>,
    pub code_analysis: CodeAnalysis,
    pub overall_summary: OverallSummary,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
