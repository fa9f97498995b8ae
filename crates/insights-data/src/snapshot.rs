//! Snapshot assembly: raw artifacts → [`RepositorySnapshot`].
//!
//! Every artifact goes through its transformer; unrecognizable artifacts are
//! recorded as malformed and contribute their empty fragment. The commit log
//! then enriches developers and regions, and the overall summary is computed
//! last.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use insights_core::csv_table::parse_table;
use insights_core::models::{
    add_counts, CodeAnalysis, CodeTable, CommitSummary, DeveloperRecord, DeveloperSet,
    OverallSummary, RegionalBreakdown, RepositorySnapshot, TechnologyUsage, VulnerabilityCounts,
};

use crate::error::SourceFailure;
use crate::partial::Partial;
use crate::transform::{
    self, commits, developers, regional, technology, vulnerabilities, COMPLEXITY,
};

/// One repository's artifacts as fetched, before transformation.
#[derive(Debug, Clone, Default)]
pub struct RawArtifacts {
    /// Parsed JSON artifacts keyed by file name.
    pub json: BTreeMap<String, Value>,
    /// CSV bodies of the code-analysis tables that arrived.
    pub csv: BTreeMap<CodeTable, String>,
}

impl RawArtifacts {
    pub fn get(&self, artifact: &str) -> Option<&Value> {
        self.json.get(artifact)
    }
}

/// Run a transformer, recording a malformed artifact in `failed`.
fn checked<T: Default>(
    failed: &mut BTreeMap<String, SourceFailure>,
    artifact: &str,
    raw: Option<&Value>,
    f: impl FnOnce(&Value) -> Result<T, SourceFailure>,
) -> T {
    let Some(raw) = raw else {
        return T::default();
    };
    match f(raw) {
        Ok(fragment) => fragment,
        Err(failure) => {
            tracing::warn!(artifact, %failure, "artifact degraded to empty fragment");
            failed.insert(artifact.to_string(), failure);
            T::default()
        }
    }
}

/// Transform and assemble one repository's artifacts.
pub fn assemble(repository: &str, raw: Partial<RawArtifacts>) -> Partial<RepositorySnapshot> {
    let Partial { value: raw, mut failed } = raw;

    let commits = checked(&mut failed, transform::COMMITS, raw.get(transform::COMMITS), |v| {
        commits::try_transform(v)
    });
    let developers = checked(
        &mut failed,
        transform::DEVELOPER_RANKINGS,
        raw.get(transform::DEVELOPER_RANKINGS),
        |v| developers::try_transform(v, repository),
    );
    let regional = checked(
        &mut failed,
        transform::GEOGRAPHIC_DISTRIBUTION,
        raw.get(transform::GEOGRAPHIC_DISTRIBUTION),
        |v| regional::try_transform(v, repository),
    );
    let technology = checked(
        &mut failed,
        transform::TECH_STACK,
        raw.get(transform::TECH_STACK),
        technology::try_transform,
    );
    let vulnerabilities = checked(
        &mut failed,
        transform::VULNERABILITIES,
        raw.get(transform::VULNERABILITIES),
        vulnerabilities::try_transform,
    );

    let code_analysis: CodeAnalysis = raw
        .csv
        .iter()
        .map(|(table, text)| (*table, parse_table(text)))
        .collect();

    let mut snapshot = RepositorySnapshot {
        repository: repository.to_string(),
        developers: enrich_developers(developers, &commits, repository),
        regional: enrich_regions(regional, &commits),
        technology: if technology.is_empty() {
            technology_from_commits(&commits)
        } else {
            technology
        },
        commits,
        vulnerabilities,
        raw_vulnerabilities: raw.get(transform::VULNERABILITIES).cloned(),
        complexity: raw.get(COMPLEXITY).cloned(),
        code_analysis,
        overall_summary: OverallSummary::default(),
    };
    snapshot.overall_summary = summarize(
        &snapshot.commits,
        &snapshot.developers,
        &snapshot.regional,
        &snapshot.technology,
        &snapshot.vulnerabilities,
        code_churn(&snapshot.code_analysis),
    );

    debug!(
        repository,
        commits = snapshot.overall_summary.total_commits,
        developers = snapshot.overall_summary.total_developers,
        degraded = failed.len(),
        "snapshot assembled"
    );
    Partial {
        value: snapshot,
        failed,
    }
}

// ── Enrichment ────────────────────────────────────────────────────────────────

/// Join commit-log activity onto developer records by identity key. Without a
/// rankings artifact the commit authors become the developer set.
fn enrich_developers(mut set: DeveloperSet, commits: &CommitSummary, repository: &str) -> DeveloperSet {
    if set.is_empty() {
        for (key, activity) in &commits.authors {
            let email = if activity.email.is_empty() { key } else { &activity.email };
            let mut record = DeveloperRecord::new(email.as_str(), activity.name.as_str(), repository, activity.commits);
            record.first_commit = activity.first_commit;
            record.last_commit = activity.last_commit;
            record.work_types = activity.work_types.clone();
            set.insert(record);
        }
        return set;
    }

    for (key, record) in set.0.iter_mut() {
        let Some(activity) = commits.authors.get(key) else {
            continue;
        };
        record.first_commit = match (record.first_commit, activity.first_commit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        record.last_commit = match (record.last_commit, activity.last_commit) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if record.work_types.is_empty() {
            record.work_types = activity.work_types.clone();
        }
    }
    set
}

/// Credit each region with the work types and technologies of the authors
/// listed in it.
fn enrich_regions(mut regional: RegionalBreakdown, commits: &CommitSummary) -> RegionalBreakdown {
    for bucket in regional.0.values_mut() {
        for email in &bucket.developer_emails {
            if let Some(activity) = commits.authors.get(email) {
                add_counts(&mut bucket.work_types, &activity.work_types);
                add_counts(&mut bucket.technologies, &activity.technologies);
            }
        }
    }
    regional
}

/// Technology usage derived from commit tags: usage is the number of commits
/// touching each technology.
pub fn technology_from_commits(commits: &CommitSummary) -> TechnologyUsage {
    let mut tallies = BTreeMap::new();
    for activity in commits.authors.values() {
        add_counts(&mut tallies, &activity.technologies);
    }
    let mut usage = TechnologyUsage::default();
    for (name, count) in tallies {
        if count > 0 {
            usage.insert(technology::usage_record(&name, count));
        }
    }
    usage
}

// ── Overall summary ───────────────────────────────────────────────────────────

/// Lines added plus deleted across the entity churn table, when present.
pub fn code_churn(code_analysis: &CodeAnalysis) -> Option<u64> {
    let rows = code_analysis.get(&CodeTable::EntityChurn)?;
    let total: f64 = rows
        .iter()
        .map(|row| row.number("added").max(0.0) + row.number("deleted").max(0.0))
        .sum();
    Some(total.round() as u64)
}

/// Headline figures over already-normalized fragments.
pub fn summarize(
    commits: &CommitSummary,
    developers: &DeveloperSet,
    regional: &RegionalBreakdown,
    technology: &TechnologyUsage,
    vulnerabilities: &VulnerabilityCounts,
    code_churn: Option<u64>,
) -> OverallSummary {
    let top_region = regional
        .0
        .values()
        .max_by(|a, b| a.commits.cmp(&b.commits).then_with(|| b.country.cmp(&a.country)))
        .map(|b| b.country.clone());

    OverallSummary {
        total_commits: if commits.total_commits > 0 {
            commits.total_commits
        } else {
            developers.total_commits()
        },
        total_developers: developers.len(),
        total_regions: regional.len(),
        total_technologies: technology.len(),
        active_months: commits.active_months(),
        top_technology: technology.top().map(str::to_string),
        top_region,
        total_vulnerabilities: vulnerabilities.total,
        has_critical_vulnerabilities: vulnerabilities.critical > 0,
        code_churn,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
