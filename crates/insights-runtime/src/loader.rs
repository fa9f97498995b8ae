//! Per-repository source loader.
//!
//! The six JSON artifacts are fetched concurrently and settle
//! independently. The code-analysis tables are fetched as detached tasks and
//! raced against a fixed deadline; tables still in flight when it fires are
//! recorded as [`SourceFailure::Timeout`] and their tasks are left to finish
//! on their own. Assembled snapshots are cached per repository id for the
//! session, and concurrent loads of the same id share one fetch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use insights_core::models::{CodeTable, RepositorySnapshot};
use insights_data::error::SourceFailure;
use insights_data::partial::Partial;
use insights_data::snapshot::{assemble, RawArtifacts};
use insights_data::source::{fetch_json, fetch_text, ArtifactSource};
use insights_data::transform::JSON_ARTIFACTS;

/// Default deadline for the code-analysis tables.
pub const DEFAULT_CSV_TIMEOUT: Duration = Duration::from_millis(3000);

/// A loaded snapshot together with the artifacts that degraded.
pub type LoadedSnapshot = Arc<Partial<RepositorySnapshot>>;

type Slot = Arc<OnceCell<Option<LoadedSnapshot>>>;

pub struct SourceLoader {
    source: Arc<dyn ArtifactSource>,
    csv_timeout: Duration,
    cache: Mutex<HashMap<String, Slot>>,
}

impl SourceLoader {
    pub fn new(source: Arc<dyn ArtifactSource>, csv_timeout: Duration) -> Self {
        Self {
            source,
            csv_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn ArtifactSource> {
        &self.source
    }

    /// Load one repository. `None` when none of its JSON artifacts could be
    /// read. The outcome, including `None`, is cached for the session.
    pub async fn load(&self, repository: &str) -> Option<LoadedSnapshot> {
        let slot = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(cache.entry(repository.to_string()).or_default())
        };
        if slot.initialized() {
            debug!(repository, "snapshot served from cache");
        }
        slot.get_or_init(|| self.fetch_and_assemble(repository))
            .await
            .clone()
    }

    /// Load every repository concurrently. Repositories that yield nothing
    /// are left out; the result is ordered by id.
    pub async fn load_all<'a>(
        &self,
        repositories: impl IntoIterator<Item = &'a String>,
    ) -> BTreeMap<String, LoadedSnapshot> {
        let loads = repositories
            .into_iter()
            .map(|id| async move { (id.clone(), self.load(id).await) });
        join_all(loads)
            .await
            .into_iter()
            .filter_map(|(id, loaded)| loaded.map(|snapshot| (id, snapshot)))
            .collect()
    }

    /// Forget every cached snapshot.
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
        debug!("snapshot cache cleared");
    }

    async fn fetch_and_assemble(&self, repository: &str) -> Option<LoadedSnapshot> {
        let (json, (csv, csv_failed)) =
            tokio::join!(self.fetch_json_artifacts(repository), self.fetch_code_tables(repository));

        let mut raw = Partial::new(RawArtifacts::default());
        for (artifact, outcome) in json {
            match outcome {
                Ok(value) => {
                    raw.value.json.insert(artifact.to_string(), value);
                }
                Err(failure) => raw.record(artifact, failure),
            }
        }
        if raw.value.json.is_empty() {
            warn!(repository, "no artifacts could be read");
            return None;
        }
        raw.value.csv = csv;
        raw.failed.extend(csv_failed);

        let snapshot = assemble(repository, raw);
        for (artifact, failure) in snapshot.errors() {
            warn!(repository, artifact, %failure, "artifact degraded");
        }
        info!(
            repository,
            degraded = snapshot.failed.len(),
            tables = snapshot.value.code_analysis.len(),
            "repository loaded"
        );
        Some(Arc::new(snapshot))
    }

    async fn fetch_json_artifacts(
        &self,
        repository: &str,
    ) -> Vec<(&'static str, Result<serde_json::Value, SourceFailure>)> {
        let fetches = JSON_ARTIFACTS.into_iter().map(|artifact| async move {
            let path = format!("{repository}/{artifact}");
            (artifact, fetch_json(self.source.as_ref(), &path).await)
        });
        join_all(fetches).await
    }

    /// Fetch the code-analysis tables until they all settle or the deadline
    /// fires, whichever comes first.
    async fn fetch_code_tables(
        &self,
        repository: &str,
    ) -> (BTreeMap<CodeTable, String>, BTreeMap<String, SourceFailure>) {
        let mut pending: FuturesUnordered<_> = CodeTable::ALL
            .into_iter()
            .map(|table| {
                let source = Arc::clone(&self.source);
                let path = format!("{repository}/{}", table.file_name(repository));
                let task = tokio::spawn(async move { fetch_text(source.as_ref(), &path).await });
                async move { (table, task.await) }
            })
            .collect();

        let mut tables = BTreeMap::new();
        let mut failed = BTreeMap::new();
        let mut settled = BTreeSet::new();

        let deadline = tokio::time::sleep(self.csv_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((table, joined)) => {
                        settled.insert(table);
                        match joined {
                            Ok(Ok(text)) => {
                                tables.insert(table, text);
                            }
                            Ok(Err(failure)) => {
                                failed.insert(table.file_name(repository), failure);
                            }
                            Err(e) => {
                                warn!(repository, table = table.as_str(), error = %e, "table fetch task failed");
                                failed.insert(table.file_name(repository), SourceFailure::Transport(e.to_string()));
                            }
                        }
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        repository,
                        pending = CodeTable::ALL.len() - settled.len(),
                        timeout_ms = self.csv_timeout.as_millis() as u64,
                        "code-analysis tables timed out"
                    );
                    break;
                }
            }
        }

        for table in CodeTable::ALL {
            if !settled.contains(&table) {
                failed.insert(table.file_name(repository), SourceFailure::Timeout);
            }
        }
        (tables, failed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insights_data::error::FetchError;
    use insights_data::source::DirectorySource;
    use insights_data::transform::{COMMITS, TECH_STACK};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;

    /// Delays every CSV fetch.
    struct SlowTables<S> {
        inner: S,
        delay: Duration,
    }

    #[async_trait]
    impl<S: ArtifactSource> ArtifactSource for SlowTables<S> {
        async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
            if path.ends_with(".csv") {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.fetch(path).await
        }

        async fn exists(&self, path: &str) -> bool {
            self.inner.exists(path).await
        }

        fn describe(&self) -> String {
            format!("slow({})", self.inner.describe())
        }
    }

    /// Counts fetches.
    struct Counting<S> {
        inner: S,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl<S: ArtifactSource> ArtifactSource for Counting<S> {
        async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(path).await
        }

        async fn exists(&self, path: &str) -> bool {
            self.inner.exists(path).await
        }

        fn describe(&self) -> String {
            self.inner.describe()
        }
    }

    /// Panics while fetching the coupling table.
    struct PanickingTable<S> {
        inner: S,
    }

    #[async_trait]
    impl<S: ArtifactSource> ArtifactSource for PanickingTable<S> {
        async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
            if path.ends_with("_coupling.csv") {
                panic!("coupling table reader crashed");
            }
            self.inner.fetch(path).await
        }

        async fn exists(&self, path: &str) -> bool {
            self.inner.exists(path).await
        }

        fn describe(&self) -> String {
            self.inner.describe()
        }
    }

    fn write_repository(root: &Path, id: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(COMMITS),
            r#"{"commits": [
                {"author_name": "Ada", "author_email": "ada@x.io",
                 "date": "2024-01-05T10:00:00+00:00", "message": "add api"},
                {"author_name": "Lin", "author_email": "lin@x.io",
                 "date": "2024-02-05T10:00:00+00:00", "message": "fix api"}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.join(TECH_STACK), r#"[{"Name": "Rust", "Count": 4}]"#).unwrap();
        fs::write(
            dir.join(CodeTable::EntityChurn.file_name(id)),
            "entity,added,deleted,commits\nsrc/main.rs,10,4,2\n\"src/a,b.rs\",1,1,1\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_load_assembles_snapshot_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        let loader = SourceLoader::new(Arc::new(DirectorySource::new(dir.path())), DEFAULT_CSV_TIMEOUT);

        let loaded = loader.load("api").await.unwrap();
        let snapshot = &loaded.value;
        assert_eq!(snapshot.repository, "api");
        assert_eq!(snapshot.overall_summary.total_commits, 2);
        assert_eq!(snapshot.overall_summary.top_technology.as_deref(), Some("rust"));
        assert_eq!(snapshot.overall_summary.code_churn, Some(16));
        assert_eq!(snapshot.code_analysis[&CodeTable::EntityChurn].len(), 2);

        assert_eq!(
            loaded.failure("developer_rankings.json"),
            Some(&SourceFailure::NotFound)
        );
        assert_eq!(
            loaded.failure(&CodeTable::Coupling.file_name("api")),
            Some(&SourceFailure::NotFound)
        );
        assert_eq!(loaded.errors().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_repository_yields_none() {
        let dir = TempDir::new().unwrap();
        let loader = SourceLoader::new(Arc::new(DirectorySource::new(dir.path())), DEFAULT_CSV_TIMEOUT);
        assert!(loader.load("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_slow_tables_time_out_without_blocking() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        let source = SlowTables {
            inner: DirectorySource::new(dir.path()),
            delay: Duration::from_secs(5),
        };
        let loader = SourceLoader::new(Arc::new(source), Duration::from_millis(50));

        let started = Instant::now();
        let loaded = loader.load("api").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(loaded.value.code_analysis.is_empty());
        assert_eq!(loaded.value.overall_summary.code_churn, None);
        assert_eq!(loaded.value.overall_summary.total_commits, 2);
        for table in CodeTable::ALL {
            assert_eq!(
                loaded.failure(&table.file_name("api")),
                Some(&SourceFailure::Timeout)
            );
        }
    }

    #[tokio::test]
    async fn test_crashed_table_task_is_a_transport_failure() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        let source = PanickingTable {
            inner: DirectorySource::new(dir.path()),
        };
        let loader = SourceLoader::new(Arc::new(source), DEFAULT_CSV_TIMEOUT);

        let loaded = loader.load("api").await.unwrap();
        assert!(matches!(
            loaded.failure(&CodeTable::Coupling.file_name("api")),
            Some(SourceFailure::Transport(_))
        ));
        assert_eq!(loaded.value.overall_summary.code_churn, Some(16));
        assert!(!loaded
            .failed
            .values()
            .any(|failure| *failure == SourceFailure::Timeout));
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        let source = Arc::new(Counting {
            inner: DirectorySource::new(dir.path()),
            fetches: AtomicUsize::new(0),
        });
        let loader = SourceLoader::new(source.clone(), DEFAULT_CSV_TIMEOUT);

        let first = loader.load("api").await.unwrap();
        let after_first = source.fetches.load(Ordering::SeqCst);
        assert_eq!(after_first, JSON_ARTIFACTS.len() + CodeTable::ALL.len());

        let second = loader.load("api").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches.load(Ordering::SeqCst), after_first);

        loader.clear();
        loader.load("api").await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), after_first * 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        let source = Arc::new(Counting {
            inner: DirectorySource::new(dir.path()),
            fetches: AtomicUsize::new(0),
        });
        let loader = SourceLoader::new(source.clone(), DEFAULT_CSV_TIMEOUT);

        let (a, b) = tokio::join!(loader.load("api"), loader.load("api"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(
            source.fetches.load(Ordering::SeqCst),
            JSON_ARTIFACTS.len() + CodeTable::ALL.len()
        );
    }

    #[tokio::test]
    async fn test_load_all_skips_missing() {
        let dir = TempDir::new().unwrap();
        write_repository(dir.path(), "api");
        write_repository(dir.path(), "web");
        let loader = SourceLoader::new(Arc::new(DirectorySource::new(dir.path())), DEFAULT_CSV_TIMEOUT);

        let ids = vec!["web".to_string(), "ghost".to_string(), "api".to_string()];
        let loaded = loader.load_all(&ids).await;
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["api", "web"]);
    }
}
