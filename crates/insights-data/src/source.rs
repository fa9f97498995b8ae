//! Artifact sources.
//!
//! An [`ArtifactSource`] resolves artifact paths such as `api/commits.json`
//! against a base location. Absence is a value (`Ok(None)`), not an error;
//! only transport problems surface as [`FetchError`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{FetchError, SourceFailure};

/// Read access to published artifacts.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Body of the artifact at `path`, `None` when it does not exist.
    async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError>;

    /// Whether the artifact at `path` exists. Failures count as absent.
    async fn exists(&self, path: &str) -> bool;

    /// Base location, for log output.
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: ArtifactSource + ?Sized> ArtifactSource for Arc<S> {
    async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
        (**self).fetch(path).await
    }

    async fn exists(&self, path: &str) -> bool {
        (**self).exists(path).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Build the source for `base`: HTTP for `http(s)://` URLs, a local
/// directory otherwise.
pub fn source_from(base: &str, request_timeout: Duration) -> Result<Arc<dyn ArtifactSource>, FetchError> {
    if base.starts_with("http://") || base.starts_with("https://") {
        Ok(Arc::new(HttpSource::new(base, request_timeout)?))
    } else {
        Ok(Arc::new(DirectorySource::new(base)))
    }
}

/// Fetch and parse a JSON artifact, folding every outcome other than a
/// parsed document into a [`SourceFailure`].
pub async fn fetch_json(source: &dyn ArtifactSource, path: &str) -> Result<Value, SourceFailure> {
    let text = fetch_text(source, path).await?;
    serde_json::from_str(&text).map_err(|e| {
        debug!(path, error = %e, "artifact is not valid JSON");
        SourceFailure::Malformed(e.to_string())
    })
}

/// Fetch a text artifact, folding absence and transport errors into a
/// [`SourceFailure`].
pub async fn fetch_text(source: &dyn ArtifactSource, path: &str) -> Result<String, SourceFailure> {
    match source.fetch(path).await {
        Ok(Some(text)) => Ok(text),
        Ok(None) => Err(SourceFailure::NotFound),
        Err(e) => {
            debug!(path, error = %e, "artifact fetch failed");
            Err(SourceFailure::from(&e))
        }
    }
}

// ── HttpSource ────────────────────────────────────────────────────────────────

/// Artifacts served over HTTP(S) under a base URL.
pub struct HttpSource {
    http: reqwest::Client,
    base: String,
}

impl HttpSource {
    pub fn new(base: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("repo-insights/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
        let resp = self.http.get(self.url(path)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        Ok(Some(resp.text().await?))
    }

    async fn exists(&self, path: &str) -> bool {
        match self.http.head(self.url(path)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(path, error = %e, "existence probe failed");
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

// ── DirectorySource ───────────────────────────────────────────────────────────

/// Artifacts laid out on local disk, e.g. `AnalysisData/<repo>/commits.json`.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ArtifactSource for DirectorySource {
    async fn fetch(&self, path: &str) -> Result<Option<String>, FetchError> {
        match tokio::fs::read_to_string(self.resolve(path)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
