use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use insights_core::store::{FileStore, KeyValueStore, MemoryStore};
use insights_data::transform::COMMITS;
use insights_runtime::discovery::DIRECTORY_LISTING;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure `~/.repo-insights/` exists.
pub fn ensure_directories() -> anyhow::Result<()> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(home.join(".repo-insights"))?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber on stderr, leaving stdout for
/// the JSON result.
///
/// `log_level` takes the CLI names (`DEBUG`, `INFO`, `WARNING`, `ERROR`,
/// `CRITICAL`) and falls back to `"info"` if the level is not recognised.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let upper = log_level.to_uppercase();
    let normalised = match upper.as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        other => other,
    };

    let filter = EnvFilter::try_new(normalised).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .init();

    Ok(())
}

// ── Persistence ────────────────────────────────────────────────────────────────

/// The discovery store: `~/.repo-insights/state.json`, or memory only.
pub fn open_store(no_persist: bool) -> Arc<dyn KeyValueStore> {
    if no_persist {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new(FileStore::default_path()))
    }
}

// ── Directory listing ──────────────────────────────────────────────────────────

/// Repository ids under `dir`: immediate sub-directories holding a
/// `commits.json`, sorted.
pub fn scan_repositories(dir: &Path) -> Vec<String> {
    let mut repositories: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.path().join(COMMITS).is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    repositories.sort();
    repositories
}

/// Write `.directories.json` for `dir` and return the listed ids.
pub fn write_directory_listing(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.is_dir() {
        anyhow::bail!("results directory not found: {}", dir.display());
    }

    let repositories = scan_repositories(dir);
    if repositories.is_empty() {
        anyhow::bail!(
            "no repositories under {} (expected sub-directories with {COMMITS})",
            dir.display()
        );
    }

    let output = dir.join(DIRECTORY_LISTING);
    let body = serde_json::to_string_pretty(&serde_json::json!({ "directories": repositories }))?;
    std::fs::write(&output, body).with_context(|| format!("writing {}", output.display()))?;

    tracing::info!(count = repositories.len(), path = %output.display(), "directory listing written");
    Ok(repositories)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_repository(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).expect("create repository dir");
        std::fs::write(dir.join(COMMITS), r#"{"commits": []}"#).expect("write commits");
    }

    // ── test_ensure_directories ───────────────────────────────────────────────

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");

        // Override HOME so that dirs::home_dir() resolves to our temp dir.
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", tmp.path());

        let result = ensure_directories();

        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        result.expect("ensure_directories should succeed");
        assert!(tmp.path().join(".repo-insights").is_dir());
    }

    // ── test_write_directory_listing ──────────────────────────────────────────

    #[test]
    fn test_write_directory_listing() {
        let tmp = TempDir::new().expect("tempdir");
        add_repository(tmp.path(), "web");
        add_repository(tmp.path(), "api");
        std::fs::create_dir_all(tmp.path().join("yearly")).expect("create yearly");
        std::fs::write(tmp.path().join("notes.txt"), "x").expect("write stray file");

        let listed = write_directory_listing(tmp.path()).expect("listing written");
        assert_eq!(listed, vec!["api".to_string(), "web".to_string()]);

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(DIRECTORY_LISTING)).expect("read listing"),
        )
        .expect("valid json");
        assert_eq!(written, serde_json::json!({"directories": ["api", "web"]}));
    }

    #[test]
    fn test_write_directory_listing_requires_repositories() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("empty")).expect("create dir");

        assert!(write_directory_listing(tmp.path()).is_err());
        assert!(!tmp.path().join(DIRECTORY_LISTING).exists());
        assert!(write_directory_listing(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_open_store_in_memory() {
        let store = open_store(true);
        store.set("k", "v").expect("set");
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }
}
