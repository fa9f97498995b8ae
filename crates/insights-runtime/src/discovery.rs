//! Repository discovery.
//!
//! Resolution order: the persisted id list (re-verified), the
//! `.directories.json` listing, then the well-known candidates. The first
//! step that confirms at least one id wins. Explicit override ids are probed
//! as well and always union into the result. Every candidate is confirmed
//! with an existence probe on its `commits.json`.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use insights_core::store::{get_json, set_json, KeyValueStore};
use insights_data::source::{fetch_json, ArtifactSource};
use insights_data::transform::COMMITS;

/// Store key of the persisted discovery record.
pub const DISCOVERY_KEY: &str = "discovered_repositories";

/// Listing manifest written by the `index` command.
pub const DIRECTORY_LISTING: &str = ".directories.json";

/// Ids probed when neither the record nor the listing yields anything.
pub const WELL_KNOWN_REPOSITORIES: &[&str] = &[
    "backend",
    "frontend",
    "api",
    "web",
    "mobile",
    "infrastructure",
    "platform",
    "services",
];

const GUIDANCE: &str = "No repositories found. Generate a listing with `repo-insights index <dir>`, \
or pass ids explicitly with --repos <id,id,...>; each repository needs a commits.json.";

/// Which resolution step produced the repository set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOrigin {
    Persisted,
    Listing,
    Candidates,
    Override,
    Nothing,
}

/// Outcome of [`Discovery::discover`]. An empty set carries guidance rather
/// than an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovered {
    pub repositories: BTreeSet<String>,
    pub origin: DiscoveryOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

impl Discovered {
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryListing {
    #[serde(default)]
    directories: Vec<String>,
}

/// Path probed to confirm that `repository` exists.
pub fn manifest_path(repository: &str) -> String {
    format!("{repository}/{COMMITS}")
}

/// Discovery over one artifact source, persisting through an injected store.
pub struct Discovery {
    source: Arc<dyn ArtifactSource>,
    store: Arc<dyn KeyValueStore>,
    candidates: Vec<String>,
}

impl Discovery {
    pub fn new(source: Arc<dyn ArtifactSource>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            source,
            store,
            candidates: WELL_KNOWN_REPOSITORIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the well-known candidate list.
    pub fn with_candidates(mut self, candidates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Drop the persisted record so the next discovery starts from scratch.
    pub fn forget(&self) {
        if let Err(e) = self.store.remove(DISCOVERY_KEY) {
            warn!(error = %e, "failed to clear discovery record");
        }
    }

    /// Resolve the analyzable repositories. `overrides` are probed and
    /// unioned in regardless of which step won.
    pub async fn discover(&self, overrides: &[String]) -> Discovered {
        let (mut repositories, mut origin) = self.resolve().await;

        if !overrides.is_empty() {
            let confirmed = self.probe(overrides.iter().cloned()).await;
            if !confirmed.is_empty() && repositories.is_empty() {
                origin = DiscoveryOrigin::Override;
            }
            repositories.extend(confirmed);
        }

        if repositories.is_empty() {
            warn!(source = %self.source.describe(), "discovery found no repositories");
            return Discovered {
                repositories,
                origin: DiscoveryOrigin::Nothing,
                guidance: Some(GUIDANCE.to_string()),
            };
        }

        self.persist(&repositories);
        info!(count = repositories.len(), ?origin, "repositories discovered");
        Discovered {
            repositories,
            origin,
            guidance: None,
        }
    }

    async fn resolve(&self) -> (BTreeSet<String>, DiscoveryOrigin) {
        if let Some(persisted) = get_json::<Vec<String>>(self.store.as_ref(), DISCOVERY_KEY) {
            let confirmed = self.probe(persisted).await;
            if !confirmed.is_empty() {
                return (confirmed, DiscoveryOrigin::Persisted);
            }
            debug!("persisted repositories no longer respond");
        }

        match fetch_json(self.source.as_ref(), DIRECTORY_LISTING).await {
            Ok(raw) => match serde_json::from_value::<DirectoryListing>(raw) {
                Ok(listing) => {
                    let confirmed = self.probe(listing.directories).await;
                    if !confirmed.is_empty() {
                        return (confirmed, DiscoveryOrigin::Listing);
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed directory listing"),
            },
            Err(failure) => debug!(%failure, "no directory listing"),
        }

        let confirmed = self.probe(self.candidates.iter().cloned()).await;
        (confirmed, DiscoveryOrigin::Candidates)
    }

    /// Probe every id concurrently and keep the ones that exist.
    async fn probe(&self, ids: impl IntoIterator<Item = String>) -> BTreeSet<String> {
        let ids: BTreeSet<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        let probes = ids.into_iter().map(|id| async move {
            let exists = self.source.exists(&manifest_path(&id)).await;
            debug!(repository = %id, exists, "probed repository");
            (id, exists)
        });

        join_all(probes)
            .await
            .into_iter()
            .filter_map(|(id, exists)| exists.then_some(id))
            .collect()
    }

    fn persist(&self, repositories: &BTreeSet<String>) {
        let ids: Vec<&String> = repositories.iter().collect();
        if let Err(e) = set_json(self.store.as_ref(), DISCOVERY_KEY, &ids) {
            warn!(error = %e, "failed to persist discovered repositories");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
