//! Cross-year aggregation over `{year}/aggregated_analysis.json`.
//!
//! A year file is either pre-aggregated across repositories or a raw list
//! of per-repository entries. Both normalize into an [`AggregateResult`]
//! before the years are summed. For a single project only the raw shape is
//! attributable, and technology usage is derived from the project's own
//! commit records in `{year}/{project}_{year}.json`.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use insights_core::classify::technologies_for_commit;
use insights_core::models::{identity_key, DeveloperRecord, RegionalBucket, TechnologyUsage, VulnerabilityCounts};

use crate::aggregator::AggregateResult;
use crate::error::SourceFailure;
use crate::partial::Partial;
use crate::source::{fetch_json, ArtifactSource};
use crate::transform::developers::synthesize_email;
use crate::transform::regional::normalize_country;
use crate::transform::technology::usage_record;
use crate::transform::{decode, lenient_count, lenient_string, lenient_vec, vulnerabilities};

pub const YEAR_ARTIFACT: &str = "aggregated_analysis.json";

/// Keys of which a pre-aggregated year file carries at least one.
const PRE_AGGREGATED_KEYS: [&str; 5] = [
    "total_commits",
    "developers",
    "regional_summary",
    "technology_summary",
    "vulnerabilities",
];

pub fn year_artifact_path(year: i32) -> String {
    format!("{year}/{YEAR_ARTIFACT}")
}

pub fn project_artifact_path(year: i32, project: &str) -> String {
    format!("{year}/{project}_{year}.json")
}

// ── Shapes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearArtifact {
    RawPerYear {
        #[serde(deserialize_with = "lenient_vec")]
        repositories: Vec<RepositoryYear>,
    },
    PreAggregated(PreAggregatedYear),
}

#[derive(Debug, Deserialize)]
struct PreAggregatedYear {
    #[serde(default, deserialize_with = "lenient_count")]
    total_commits: u64,
    #[serde(default, deserialize_with = "lenient_vec")]
    developers: Vec<YearDeveloper>,
    #[serde(default)]
    regional_summary: Map<String, Value>,
    #[serde(default)]
    technology_summary: Map<String, Value>,
    #[serde(default)]
    vulnerabilities: Value,
}

#[derive(Debug, Deserialize)]
struct RepositoryYear {
    #[serde(default, deserialize_with = "lenient_string")]
    repository: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    total_commits: u64,
    #[serde(default, deserialize_with = "lenient_vec")]
    developers: Vec<YearDeveloper>,
    #[serde(default, deserialize_with = "lenient_vec")]
    regional_breakdown: Vec<YearRegion>,
    #[serde(default, deserialize_with = "lenient_vec")]
    technologies: Vec<YearTechnology>,
    #[serde(default)]
    vulnerabilities: Value,
}

#[derive(Debug, Deserialize)]
struct YearDeveloper {
    #[serde(default, alias = "developer", deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    commits: u64,
    #[serde(default, deserialize_with = "lenient_vec")]
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct YearRegion {
    #[serde(default, deserialize_with = "lenient_string")]
    country: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    commits: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    developers: u64,
    #[serde(default, deserialize_with = "lenient_vec")]
    emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct YearTechnology {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ProjectCommits {
    #[serde(deserialize_with = "lenient_vec")]
    commits: Vec<ProjectCommit>,
}

#[derive(Debug, Deserialize)]
struct ProjectCommit {
    #[serde(default, deserialize_with = "lenient_string")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    files: Vec<String>,
}

// ── Adapters ──────────────────────────────────────────────────────────────────

fn add_developers(result: &mut AggregateResult, developers: Vec<YearDeveloper>, repository: Option<&str>) {
    for dev in developers {
        let (email, name) = match (dev.email, dev.name) {
            (Some(email), Some(name)) => (email, name),
            (Some(email), None) => (email.clone(), email),
            (None, Some(name)) => (synthesize_email(&name), name),
            (None, None) => continue,
        };
        let mut record = DeveloperRecord {
            email,
            name,
            total_commits: dev.commits,
            ..Default::default()
        };
        let repositories: BTreeSet<String> = repository
            .map(str::to_string)
            .into_iter()
            .chain(dev.repositories)
            .collect();
        if let Some(repo) = repository {
            record.commits_by_repository.insert(repo.to_string(), dev.commits);
        }
        record.repositories = repositories;
        result.developers.insert(record);
    }
}

fn add_region(result: &mut AggregateResult, raw_country: &str, region: YearRegion, repository: Option<&str>) {
    let country = normalize_country(raw_country);
    if country.is_empty() {
        return;
    }
    let mut bucket = RegionalBucket::new(country.as_str());
    bucket.commits = region.commits;
    bucket.developers = region.developers;
    bucket.developer_emails = region.emails.iter().map(|e| identity_key(e)).collect();
    if let Some(repo) = repository {
        bucket.repositories.insert(repo.to_string());
    }
    result.regions.bucket_mut(&country).merge(&bucket);
}

fn add_technology(result: &mut AggregateResult, name: &str, count: u64) {
    if count > 0 && !name.trim().is_empty() {
        result.technologies.insert(usage_record(name, count));
    }
}

fn year_vulnerabilities(raw: &Value) -> VulnerabilityCounts {
    if raw.is_null() {
        return VulnerabilityCounts::default();
    }
    vulnerabilities::transform(Some(raw))
}

fn from_pre_aggregated(year: PreAggregatedYear) -> AggregateResult {
    let mut result = AggregateResult {
        reported_commits: year.total_commits,
        ..Default::default()
    };
    add_developers(&mut result, year.developers, None);
    for (country, stats) in year.regional_summary {
        let region = match stats {
            Value::Object(_) => match YearRegion::deserialize(&stats) {
                Ok(region) => region,
                Err(_) => continue,
            },
            other => YearRegion {
                country: None,
                commits: crate::transform::count(&other),
                developers: 0,
                emails: Vec::new(),
            },
        };
        add_region(&mut result, &country, region, None);
    }
    for (name, count) in &year.technology_summary {
        add_technology(&mut result, name, crate::transform::count(count));
    }
    result.vulnerabilities = year_vulnerabilities(&year.vulnerabilities);
    result
}

fn from_repository(entry: RepositoryYear) -> AggregateResult {
    let repository = entry.repository.unwrap_or_default();
    let repo = Some(repository.as_str()).filter(|r| !r.is_empty());
    let mut result = AggregateResult {
        reported_commits: entry.total_commits,
        ..Default::default()
    };
    if let Some(repo) = repo {
        result.repositories.insert(repo.to_string());
    }
    add_developers(&mut result, entry.developers, repo);
    for mut region in entry.regional_breakdown {
        if let Some(country) = region.country.take() {
            add_region(&mut result, &country, region, repo);
        }
    }
    for tech in entry.technologies {
        if let Some(name) = tech.name {
            add_technology(&mut result, &name, tech.count);
        }
    }
    result.vulnerabilities = year_vulnerabilities(&entry.vulnerabilities);
    result
}

/// Normalize one year file.
///
/// With a `project` filter, raw entries of other repositories are dropped and
/// a pre-aggregated file yields `None`: it cannot be attributed.
pub fn normalize_year(raw: &Value, project: Option<&str>) -> Result<Option<AggregateResult>, SourceFailure> {
    match decode::<YearArtifact>(raw)? {
        YearArtifact::PreAggregated(year) => {
            let recognized = raw
                .as_object()
                .is_some_and(|obj| PRE_AGGREGATED_KEYS.iter().any(|k| obj.contains_key(*k)));
            if !recognized {
                return Err(SourceFailure::Malformed("unrecognized year artifact".to_string()));
            }
            if project.is_some() {
                debug!("pre-aggregated year file skipped for project view");
                return Ok(None);
            }
            Ok(Some(from_pre_aggregated(year)))
        }
        YearArtifact::RawPerYear { repositories } => {
            let mut result = AggregateResult::default();
            for entry in repositories {
                let matches = match (project, entry.repository.as_deref()) {
                    (None, _) => true,
                    (Some(p), Some(r)) => p.eq_ignore_ascii_case(r),
                    (Some(_), None) => false,
                };
                if matches {
                    result.merge(&from_repository(entry));
                }
            }
            Ok(Some(result))
        }
    }
}

/// Technology usage derived from a project's raw commit records: each commit
/// counts once toward every technology its message or files indicate.
pub fn project_technology(raw: &Value) -> Result<TechnologyUsage, SourceFailure> {
    let doc: ProjectCommits = decode(raw)?;
    let mut tallies: BTreeMap<String, u64> = BTreeMap::new();
    for commit in &doc.commits {
        let message = commit.message.as_deref().unwrap_or_default();
        for tag in technologies_for_commit(message, commit.files.iter().map(String::as_str)) {
            *tallies.entry(tag.name).or_insert(0) += 1;
        }
    }
    let mut usage = TechnologyUsage::default();
    for (name, count) in tallies {
        usage.insert(usage_record(&name, count));
    }
    Ok(usage)
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Per-year results and their sum.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct YearlyAggregate {
    /// `None` for the combined view.
    pub project: Option<String>,
    pub per_year: BTreeMap<i32, AggregateResult>,
    pub combined: AggregateResult,
}

struct YearOutcome {
    year: i32,
    result: Option<AggregateResult>,
    failures: Vec<(String, SourceFailure)>,
}

async fn load_year(source: &dyn ArtifactSource, year: i32, project: Option<&str>) -> YearOutcome {
    let mut failures = Vec::new();
    let path = year_artifact_path(year);

    let mut result = match fetch_json(source, &path).await {
        Ok(raw) => match normalize_year(&raw, project) {
            Ok(result) => result,
            Err(failure) => {
                failures.push((path, failure));
                None
            }
        },
        Err(failure) => {
            failures.push((path, failure));
            None
        }
    };

    if let Some(project) = project {
        let path = project_artifact_path(year, project);
        let technology = match fetch_json(source, &path).await {
            Ok(raw) => project_technology(&raw).map_err(|f| (path, f)),
            Err(failure) => Err((path, failure)),
        };
        match technology {
            Ok(technology) => {
                result.get_or_insert_with(AggregateResult::default).technologies = technology;
            }
            Err(failure) => {
                if let Some(result) = result.as_mut() {
                    result.technologies = TechnologyUsage::default();
                }
                failures.push(failure);
            }
        }
    }

    YearOutcome {
        year,
        result: result.map(AggregateResult::finish),
        failures,
    }
}

/// Aggregate `years`, optionally restricted to one `project`. Years whose
/// artifacts are missing are skipped and reported in the partial result.
pub async fn aggregate_years(
    source: &dyn ArtifactSource,
    years: &[i32],
    project: Option<&str>,
) -> Partial<YearlyAggregate> {
    let outcomes = join_all(years.iter().map(|year| load_year(source, *year, project))).await;

    let mut partial = Partial::new(YearlyAggregate {
        project: project.map(str::to_string),
        ..Default::default()
    });
    let mut combined = AggregateResult::default();
    for outcome in outcomes {
        for (path, failure) in outcome.failures {
            partial.record(path, failure);
        }
        if let Some(result) = outcome.result {
            combined.merge(&result);
            partial.value.per_year.insert(outcome.year, result);
        }
    }
    partial.value.combined = combined.finish();

    info!(
        years = years.len(),
        loaded = partial.value.per_year.len(),
        project = project.unwrap_or("combined"),
        "yearly aggregate built"
    );
    partial
}

// ── Tests ─────────────────────────────────────────────────────────────────────
