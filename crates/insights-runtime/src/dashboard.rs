//! Filter-scoped result service.
//!
//! [`Dashboard`] is constructed once at startup and owns discovery, the
//! snapshot loader and the result cache. Results are cached per
//! (filter, result kind); changing the filter or calling
//! [`Dashboard::refresh`] drops every cached result.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use insights_core::settings::Settings;
use insights_core::Result;
use insights_data::aggregator::{aggregate, AggregateResult};
use insights_data::error::SourceFailure;
use insights_data::partial::Partial;
use insights_data::source::ArtifactSource;
use insights_data::views::{View, ViewKind};
use insights_data::yearly::{aggregate_years, YearlyAggregate};

use crate::discovery::{Discovered, Discovery};
use crate::loader::SourceLoader;

// ── Filter ────────────────────────────────────────────────────────────────────

/// The active selection. `None` means the combined view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    pub repository: Option<String>,
    pub project: Option<String>,
    pub years: Vec<i32>,
}

impl Filter {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            repository: settings.repository_filter().map(str::to_string),
            project: settings.project_filter().map(str::to_string),
            years: settings.year_list()?,
        })
    }

    /// Label of the repository scope.
    pub fn scope(&self) -> &str {
        self.repository
            .as_deref()
            .unwrap_or(insights_core::settings::COMBINED)
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResultKind {
    Aggregate,
    View(ViewKind),
    Yearly,
}

#[derive(Debug, Clone)]
enum Cached {
    Aggregate(Arc<Partial<AggregateResult>>),
    View(Arc<Partial<View>>),
    Yearly(Arc<Partial<YearlyAggregate>>),
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

pub struct Dashboard {
    discovery: Discovery,
    loader: SourceLoader,
    year_source: Arc<dyn ArtifactSource>,
    overrides: Vec<String>,
    filter: Filter,
    discovered: Option<Discovered>,
    results: HashMap<(Filter, ResultKind), Cached>,
}

impl Dashboard {
    pub fn new(
        discovery: Discovery,
        loader: SourceLoader,
        year_source: Arc<dyn ArtifactSource>,
        overrides: Vec<String>,
        filter: Filter,
    ) -> Self {
        Self {
            discovery,
            loader,
            year_source,
            overrides,
            filter,
            discovered: None,
            results: HashMap::new(),
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Switch the active filter. Any change invalidates every cached result.
    pub fn set_filter(&mut self, filter: Filter) {
        if filter != self.filter {
            debug!(?filter, dropped = self.results.len(), "filter changed; results invalidated");
            self.results.clear();
            self.filter = filter;
        }
    }

    /// Drop cached results, snapshots and the discovered repository set.
    pub fn refresh(&mut self) {
        self.results.clear();
        self.loader.clear();
        self.discovered = None;
        info!("dashboard refreshed");
    }

    pub fn cached_results(&self) -> usize {
        self.results.len()
    }

    /// The discovered repositories, resolved once per session.
    pub async fn repositories(&mut self) -> &Discovered {
        let found = match self.discovered.take() {
            Some(found) => found,
            None => self.discovery.discover(&self.overrides).await,
        };
        self.discovered.insert(found)
    }

    /// The aggregate for the active repository scope, with failures keyed
    /// `{repository}/{artifact}`.
    pub async fn aggregate(&mut self) -> Arc<Partial<AggregateResult>> {
        let key = (self.filter.clone(), ResultKind::Aggregate);
        if let Some(Cached::Aggregate(hit)) = self.results.get(&key) {
            return Arc::clone(hit);
        }

        let ids: Vec<String> = match self.filter.repository.clone() {
            Some(id) => vec![id],
            None => self.repositories().await.repositories.iter().cloned().collect(),
        };
        let loaded = self.loader.load_all(&ids).await;

        let mut partial = Partial::new(aggregate(loaded.values().map(|s| &s.value)));
        for id in &ids {
            match loaded.get(id) {
                Some(snapshot) => {
                    for (artifact, failure) in &snapshot.failed {
                        partial.record(format!("{id}/{artifact}"), failure.clone());
                    }
                }
                None => partial.record(id.clone(), SourceFailure::NotFound),
            }
        }
        debug!(
            scope = self.filter.scope(),
            repositories = loaded.len(),
            "aggregate computed"
        );

        let result = Arc::new(partial);
        self.results.insert(key, Cached::Aggregate(Arc::clone(&result)));
        result
    }

    /// One presentation view for the active repository scope.
    pub async fn view(&mut self, kind: ViewKind) -> Arc<Partial<View>> {
        let key = (self.filter.clone(), ResultKind::View(kind));
        if let Some(Cached::View(hit)) = self.results.get(&key) {
            return Arc::clone(hit);
        }

        let aggregate = self.aggregate().await;
        let view = Partial {
            value: View::build(kind, self.filter.scope(), &aggregate.value),
            failed: aggregate.failed.clone(),
        };

        let result = Arc::new(view);
        self.results.insert(key, Cached::View(Arc::clone(&result)));
        result
    }

    /// The cross-year aggregate for the active project and years.
    pub async fn yearly(&mut self) -> Arc<Partial<YearlyAggregate>> {
        let key = (self.filter.clone(), ResultKind::Yearly);
        if let Some(Cached::Yearly(hit)) = self.results.get(&key) {
            return Arc::clone(hit);
        }

        let result = Arc::new(
            aggregate_years(
                self.year_source.as_ref(),
                &self.filter.years,
                self.filter.project.as_deref(),
            )
            .await,
        );
        self.results.insert(key, Cached::Yearly(Arc::clone(&result)));
        result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DEFAULT_CSV_TIMEOUT;
    use insights_core::store::MemoryStore;
    use insights_data::source::DirectorySource;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_repository(root: &Path, id: &str, authors: &[(&str, &str)]) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let commits: Vec<_> = authors
            .iter()
            .map(|(name, email)| {
                serde_json::json!({
                    "author_name": name,
                    "author_email": email,
                    "date": "2024-03-01T12:00:00+00:00",
                    "message": "add feature",
                })
            })
            .collect();
        fs::write(
            dir.join("commits.json"),
            serde_json::json!({ "commits": commits }).to_string(),
        )
        .unwrap();
    }

    fn write_year(root: &Path, year: i32, commits: u64) {
        let dir = root.join(year.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("aggregated_analysis.json"),
            serde_json::json!({
                "total_commits": commits,
                "developers": [],
                "regional_summary": {},
                "technology_summary": {"rust": 3},
            })
            .to_string(),
        )
        .unwrap();
    }

    fn dashboard(root: &Path, filter: Filter) -> Dashboard {
        let source: Arc<dyn ArtifactSource> = Arc::new(DirectorySource::new(root));
        let discovery = Discovery::new(Arc::clone(&source), Arc::new(MemoryStore::new()))
            .with_candidates(["api", "web"]);
        let loader = SourceLoader::new(Arc::clone(&source), DEFAULT_CSV_TIMEOUT);
        let years = Arc::new(DirectorySource::new(root.join("yearly")));
        Dashboard::new(discovery, loader, years, Vec::new(), filter)
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api", &[("Ada", "ada@x.io"), ("Lin", "lin@x.io")]);
        write_repository(dir.path(), "web", &[("Ada", "ada@x.io"), ("Kim", "kim@x.io")]);
        write_year(&dir.path().join("yearly"), 2023, 40);
        write_year(&dir.path().join("yearly"), 2024, 60);
        dir
    }

    #[tokio::test]
    async fn test_combined_and_single_repository_scopes() {
        let dir = fixture();
        let mut dash = dashboard(dir.path(), Filter::default());

        let combined = dash.aggregate().await;
        assert_eq!(combined.value.totals.total_commits, 4);
        assert_eq!(combined.value.totals.total_developers, 3);
        assert_eq!(combined.value.repositories.len(), 2);

        dash.set_filter(Filter {
            repository: Some("web".into()),
            ..Default::default()
        });
        let single = dash.aggregate().await;
        assert_eq!(single.value.totals.total_commits, 2);
        assert_eq!(single.value.repositories.len(), 1);
    }

    #[tokio::test]
    async fn test_results_are_cached_until_filter_changes() {
        let dir = fixture();
        let mut dash = dashboard(dir.path(), Filter::default());

        let first = dash.view(ViewKind::Developers).await;
        let second = dash.view(ViewKind::Developers).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dash.cached_results(), 2);

        dash.set_filter(Filter::default());
        assert_eq!(dash.cached_results(), 2);

        dash.set_filter(Filter {
            repository: Some("api".into()),
            ..Default::default()
        });
        assert_eq!(dash.cached_results(), 0);

        let third = dash.view(ViewKind::Developers).await;
        assert!(!Arc::ptr_eq(&first, &third));
        match &third.value {
            View::Developers(view) => assert_eq!(view.scope, "api"),
            other => panic!("unexpected view {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_refresh_drops_results() {
        let dir = fixture();
        let mut dash = dashboard(dir.path(), Filter::default());
        dash.view(ViewKind::Summary).await;
        assert!(dash.cached_results() > 0);

        dash.refresh();
        assert_eq!(dash.cached_results(), 0);

        write_repository(dir.path(), "api", &[("Ada", "ada@x.io")]);
        let refreshed = dash.aggregate().await;
        assert_eq!(refreshed.value.totals.total_commits, 3);
    }

    #[tokio::test]
    async fn test_missing_repository_recorded() {
        let dir = fixture();
        let mut dash = dashboard(
            dir.path(),
            Filter {
                repository: Some("ghost".into()),
                ..Default::default()
            },
        );
        let result = dash.aggregate().await;
        assert_eq!(result.failure("ghost"), Some(&SourceFailure::NotFound));
        assert_eq!(result.value.totals.total_commits, 0);
    }

    #[tokio::test]
    async fn test_yearly_uses_filter_years() {
        let dir = fixture();
        let mut dash = dashboard(
            dir.path(),
            Filter {
                years: vec![2023, 2024, 2025],
                ..Default::default()
            },
        );
        let yearly = dash.yearly().await;
        assert_eq!(yearly.value.per_year.len(), 2);
        assert_eq!(yearly.value.combined.totals.total_commits, 100);
        assert_eq!(
            yearly.failure("2025/aggregated_analysis.json"),
            Some(&SourceFailure::NotFound)
        );
    }
}
