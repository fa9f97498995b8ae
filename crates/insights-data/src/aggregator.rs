//! Cross-repository aggregation.
//!
//! Commit and vulnerability counts sum, developers merge by email, regions
//! sum commits and keep the highest developer count, technologies sum per
//! name. Every rule is commutative and associative, so any permutation of
//! the input serializes to the same bytes.

use std::collections::BTreeSet;

use serde::Serialize;

use insights_core::models::{
    CommitSummary, DeveloperSet, OverallSummary, RegionalBreakdown, RepositorySnapshot,
    TechnologyUsage, VulnerabilityCounts,
};

use crate::snapshot::summarize;

/// A merged view over any number of snapshots or yearly artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    pub repositories: BTreeSet<String>,
    pub totals: OverallSummary,
    pub commits: CommitSummary,
    pub developers: DeveloperSet,
    pub regions: RegionalBreakdown,
    pub technologies: TechnologyUsage,
    pub vulnerabilities: VulnerabilityCounts,
    /// Commits reported by sources without a commit log (rankings-only
    /// snapshots, yearly entries).
    #[serde(skip)]
    pub reported_commits: u64,
    #[serde(skip)]
    pub code_churn: Option<u64>,
}

impl AggregateResult {
    /// The single-repository view: the aggregate of one snapshot.
    pub fn from_snapshot(snapshot: &RepositorySnapshot) -> Self {
        let mut result = Self::default();
        result.add_snapshot(snapshot);
        result.finish()
    }

    fn add_snapshot(&mut self, snapshot: &RepositorySnapshot) {
        self.repositories.insert(snapshot.repository.clone());
        self.commits.merge(&snapshot.commits);
        self.developers.merge(&snapshot.developers);
        self.regions.merge(&snapshot.regional);
        self.technologies.merge(&snapshot.technology);
        self.vulnerabilities.merge(&snapshot.vulnerabilities);
        // Commits a snapshot counted from its rankings rather than its log.
        self.reported_commits += snapshot
            .overall_summary
            .total_commits
            .saturating_sub(snapshot.commits.total_commits);
        self.add_churn(snapshot.overall_summary.code_churn);
    }

    fn add_churn(&mut self, churn: Option<u64>) {
        self.code_churn = match (self.code_churn, churn) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }

    /// Fold `other` into `self`. Call [`AggregateResult::finish`] afterwards
    /// to refresh the totals.
    pub fn merge(&mut self, other: &AggregateResult) {
        self.repositories
            .extend(other.repositories.iter().cloned());
        self.commits.merge(&other.commits);
        self.developers.merge(&other.developers);
        self.regions.merge(&other.regions);
        self.technologies.merge(&other.technologies);
        self.vulnerabilities.merge(&other.vulnerabilities);
        self.reported_commits += other.reported_commits;
        self.add_churn(other.code_churn);
    }

    /// Recompute derived figures from the merged fields.
    pub fn finish(mut self) -> Self {
        self.commits.recompute_average();
        self.totals = summarize(
            &self.commits,
            &self.developers,
            &self.regions,
            &self.technologies,
            &self.vulnerabilities,
            self.code_churn,
        );
        self.totals.total_commits = self
            .totals
            .total_commits
            .max(self.commits.total_commits + self.reported_commits);
        self
    }
}

/// Merge `snapshots` into one combined view.
pub fn aggregate<'a>(snapshots: impl IntoIterator<Item = &'a RepositorySnapshot>) -> AggregateResult {
    let mut result = AggregateResult::default();
    for snapshot in snapshots {
        result.add_snapshot(snapshot);
    }
    result.finish()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::Partial;
    use crate::snapshot::{assemble, RawArtifacts};
    use crate::transform;
    use insights_core::models::{DeveloperRecord, RegionalBucket};
    use serde_json::{json, Value};

    /// A commit log with `per_dev` commits for each of `devs`.
    fn commit_log(devs: &[(&str, &str)], per_dev: &[u64], month: &str) -> Value {
        let mut commits = Vec::new();
        for ((name, email), n) in devs.iter().zip(per_dev) {
            for i in 0..*n {
                commits.push(json!({
                    "author_name": name,
                    "author_email": email,
                    "date": format!("{month}-{:02}T12:00:00+00:00", i % 28 + 1),
                    "message": if i % 2 == 0 { "fix issue" } else { "add endpoint" },
                    "files": ["src/main.rs"],
                }));
            }
        }
        json!({ "commits": commits })
    }

    fn snapshot(repository: &str, commits: Value, geo: Value, tech: Value, vulns: Value) -> RepositorySnapshot {
        let mut raw = RawArtifacts::default();
        raw.json.insert(transform::COMMITS.into(), commits);
        raw.json.insert(transform::GEOGRAPHIC_DISTRIBUTION.into(), geo);
        raw.json.insert(transform::TECH_STACK.into(), tech);
        raw.json.insert(transform::VULNERABILITIES.into(), vulns);
        assemble(repository, Partial::new(raw)).value
    }

    fn fixtures() -> Vec<RepositorySnapshot> {
        vec![
            snapshot(
                "api",
                commit_log(&[("Ada", "ada@x.io"), ("Lin", "lin@x.io")], &[3, 2], "2024-01"),
                json!({"geographic_distribution": [
                    {"likely_countries": ["UK"], "commit_count": 3, "unique_authors": 5,
                     "top_authors": [{"email": "ada@x.io", "commits": 3}]}]}),
                json!([{"Name": "Rust", "Count": 10}, {"Name": "Docker", "Count": 1}]),
                json!({"total": 2, "critical": 1, "high": 1, "medium": 0, "low": 0}),
            ),
            snapshot(
                "web",
                commit_log(&[("A. Lovelace", "ada@x.io"), ("Kim", "kim@x.io")], &[1, 4], "2024-02"),
                json!({"geographic_distribution": [
                    {"likely_countries": ["UK (London)", "India"], "commit_count": 5, "unique_authors": 8,
                     "top_authors": [{"email": "kim@x.io", "commits": 4}]}]}),
                json!({"languages": {"TypeScript": {"files": 7}, "Rust": {"files": 2}}}),
                json!({"scan_summary": {"total_vulnerabilities": 1, "severity_counts": {"LOW": 1}}}),
            ),
            snapshot(
                "tools",
                commit_log(&[("Lin", "lin@x.io")], &[6], "2024-01"),
                json!({"geographic_distribution": [
                    {"likely_countries": ["India"], "commit_count": 6, "unique_authors": 2}]}),
                json!([{"Name": "Python", "Count": 3}]),
                json!({}),
            ),
        ]
    }

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let snapshots = fixtures();
        let baseline = serde_json::to_string(&aggregate(&snapshots)).unwrap();
        let all = permutations(&snapshots);
        assert_eq!(all.len(), 6);
        for permuted in all {
            assert_eq!(serde_json::to_string(&aggregate(&permuted)).unwrap(), baseline);
        }
    }

    #[test]
    fn test_aggregate_is_associative() {
        let snapshots = fixtures();
        let flat = aggregate(&snapshots);

        let mut grouped = aggregate(&snapshots[..1]);
        grouped.merge(&aggregate(&snapshots[1..]));
        let grouped = grouped.finish();

        assert_eq!(
            serde_json::to_string(&grouped).unwrap(),
            serde_json::to_string(&flat).unwrap()
        );
    }

    #[test]
    fn test_aggregate_merge_rules() {
        let result = aggregate(&fixtures());

        assert_eq!(result.commits.total_commits, 16);
        assert_eq!(result.totals.total_commits, 16);
        assert_eq!(result.repositories.len(), 3);

        let ada = result.developers.get("ada@x.io").unwrap();
        assert_eq!(ada.total_commits, 4);
        assert_eq!(ada.repositories.len(), 2);
        let lin = result.developers.get("lin@x.io").unwrap();
        assert_eq!(lin.total_commits, 8);
        assert_eq!(lin.commits_by_repository.get("tools"), Some(&6));

        let uk = result.regions.get("UK").unwrap();
        assert_eq!(uk.commits, 8);
        assert_eq!(uk.developers, 8);
        let india = result.regions.get("India").unwrap();
        assert_eq!(india.commits, 11);
        assert_eq!(india.developers, 8);
        assert_eq!(india.repositories.len(), 2);

        assert_eq!(result.technologies.get("rust").unwrap().usage_count, 12);
        assert_eq!(result.vulnerabilities.total, 3);
        assert_eq!(result.vulnerabilities.critical, 1);
        assert!(result.totals.has_critical_vulnerabilities);
        // Months: 2024-01 has 5 + 6, 2024-02 has 5.
        assert_eq!(result.commits.by_month.get("2024-01"), Some(&11));
        assert!((result.commits.average_per_month - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rankings_only_repository_adds_to_commit_total() {
        let logged = snapshot(
            "one",
            commit_log(&[("Ada", "ada@x.io")], &[10], "2024-01"),
            json!({}),
            json!([]),
            json!({}),
        );
        let mut raw = RawArtifacts::default();
        raw.json.insert(
            transform::DEVELOPER_RANKINGS.into(),
            json!({"rankings": [
                {"rank": 1, "developer": "Lin", "email": "lin@x.io", "metrics": {"commits": 4}},
                {"rank": 2, "developer": "Kim", "email": "kim@x.io", "metrics": {"commits": 3}}
            ]}),
        );
        let ranked = assemble("two", Partial::new(raw)).value;
        assert_eq!(logged.overall_summary.total_commits, 10);
        assert_eq!(ranked.overall_summary.total_commits, 7);

        for order in [[&logged, &ranked], [&ranked, &logged]] {
            let result = aggregate(order);
            assert_eq!(result.totals.total_commits, 17);
            assert_eq!(result.totals.total_developers, 3);
        }
        assert_eq!(AggregateResult::from_snapshot(&ranked).totals.total_commits, 7);
    }

    #[test]
    fn test_developer_identity_merge() {
        let mut a = RepositorySnapshot {
            repository: "api".into(),
            ..Default::default()
        };
        a.developers
            .insert(DeveloperRecord::new("dev@x.io", "Dev", "api", 4));
        let mut b = RepositorySnapshot {
            repository: "web".into(),
            ..Default::default()
        };
        b.developers
            .insert(DeveloperRecord::new("dev@x.io", "Dev", "web", 6));

        let result = aggregate([&a, &b]);
        assert_eq!(result.developers.len(), 1);
        let dev = result.developers.get("dev@x.io").unwrap();
        assert_eq!(dev.total_commits, 10);
        assert_eq!(
            dev.repositories.iter().collect::<Vec<_>>(),
            vec!["api", "web"]
        );
    }

    #[test]
    fn test_regional_developer_count_takes_max() {
        let region = |commits, developers| {
            let mut bucket = RegionalBucket::new("X");
            bucket.commits = commits;
            bucket.developers = developers;
            let mut breakdown = RegionalBreakdown::default();
            breakdown.0.insert("X".into(), bucket);
            breakdown
        };
        let a = RepositorySnapshot {
            repository: "a".into(),
            regional: region(12, 5),
            ..Default::default()
        };
        let b = RepositorySnapshot {
            repository: "b".into(),
            regional: region(30, 8),
            ..Default::default()
        };

        let result = aggregate([&a, &b]);
        let x = result.regions.get("X").unwrap();
        assert_eq!(x.developers, 8);
        assert_eq!(x.commits, 42);
    }

    #[test]
    fn test_end_to_end_totals() {
        let first = snapshot(
            "one",
            commit_log(
                &[("A", "a@one.io"), ("B", "b@one.io"), ("C", "c@one.io")],
                &[5, 3, 2],
                "2024-04",
            ),
            json!(null),
            json!(null),
            json!(null),
        );
        let second = snapshot(
            "two",
            commit_log(&[("D", "d@two.io"), ("E", "e@two.io")], &[4, 3], "2024-05"),
            json!(null),
            json!(null),
            json!(null),
        );
        assert_eq!(first.overall_summary.total_commits, 10);
        assert_eq!(first.overall_summary.total_developers, 3);

        let result = aggregate([&first, &second]);
        assert_eq!(result.totals.total_commits, 17);
        assert_eq!(result.totals.total_developers, 5);
    }

    #[test]
    fn test_single_repository_view_equals_aggregate_of_one() {
        let snapshots = fixtures();
        assert_eq!(
            AggregateResult::from_snapshot(&snapshots[1]),
            aggregate(&snapshots[1..2])
        );
    }

    #[test]
    fn test_aggregate_of_nothing_is_empty() {
        let result = aggregate(&Vec::<RepositorySnapshot>::new());
        assert_eq!(result.totals, OverallSummary::default());
        assert!(result.developers.is_empty());
    }
}
