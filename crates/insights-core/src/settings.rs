use chrono::Datelike;
use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{InsightsError, Result};

/// Repository filter value that selects the aggregated view.
pub const COMBINED: &str = "combined";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Multi-repository analysis dashboard data service
#[derive(Parser, Debug, Clone)]
#[command(
    name = "repo-insights",
    about = "Aggregate per-repository analysis artifacts into dashboard views",
    version
)]
pub struct Settings {
    /// Artifact base: an http(s) URL or a local results directory
    #[arg(long, default_value = "AnalysisData")]
    pub source: String,

    /// Base for per-year artifacts (defaults to <source>/yearly)
    #[arg(long)]
    pub year_source: Option<String>,

    /// Comma-separated repository ids to probe in addition to discovery
    #[arg(long)]
    pub repos: Option<String>,

    /// Repository filter: "combined" or a single repository id
    #[arg(long, default_value = COMBINED)]
    pub repository: String,

    /// Result to print
    #[arg(long, default_value = "summary", value_parser = [
        "developers", "regional", "technology", "commits", "vulnerabilities",
        "summary", "yearly", "discover",
    ])]
    pub view: String,

    /// Comma-separated years for the yearly view
    #[arg(long)]
    pub years: Option<String>,

    /// Project for the yearly view: "combined" or a repository id
    #[arg(long, default_value = COMBINED)]
    pub project: String,

    /// Deadline for the code-analysis CSV batch, in milliseconds
    #[arg(long, default_value = "3000")]
    pub csv_timeout_ms: u64,

    /// Per-request HTTP timeout in seconds (1-300)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..=300))]
    pub request_timeout_secs: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Forget the persisted discovery record before running
    #[arg(long)]
    pub refresh: bool,

    /// Keep discovery state in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write `.directories.json` for a local results directory
    Index {
        /// Directory holding one sub-directory per repository
        dir: PathBuf,
    },
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.repo-insights/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_timeout_ms: Option<u64>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.repo-insights/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".repo-insights").join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "could not clear saved configuration");
            }
            return Self::resolve_flags(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins. clap keys args by field name, not flag spelling.
        if !is_arg_explicitly_set(&matches, "source") {
            if let Some(v) = last.source {
                settings.source = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "year_source") && settings.year_source.is_none() {
            settings.year_source = last.year_source;
        }
        if !is_arg_explicitly_set(&matches, "repository") {
            if let Some(v) = last.repository {
                settings.repository = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "project") {
            if let Some(v) = last.project {
                settings.project = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "csv_timeout_ms") {
            if let Some(v) = last.csv_timeout_ms {
                settings.csv_timeout_ms = v;
            }
        }

        settings = Self::resolve_flags(settings);

        // Subcommands are one-off actions and leave the saved view alone.
        if settings.command.is_none() {
            let params = LastUsedParams::from(&settings);
            if let Err(e) = params.save_to(config_path) {
                tracing::warn!(error = %e, "could not persist last-used parameters");
            }
        }

        settings
    }

    /// `--debug` overrides the log level.
    fn resolve_flags(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The artifact base, rejecting a blank `--source`.
    pub fn source_base(&self) -> Result<&str> {
        let base = self.source.trim();
        if base.is_empty() {
            return Err(InsightsError::Config("--source must not be empty".to_string()));
        }
        Ok(base)
    }

    /// Base for per-year artifacts.
    pub fn year_base(&self) -> String {
        match &self.year_source {
            Some(base) => base.clone(),
            None => format!("{}/yearly", self.source.trim_end_matches('/')),
        }
    }

    /// Repository ids from `--repos`, trimmed, empties dropped.
    pub fn repo_overrides(&self) -> Vec<String> {
        split_list(self.repos.as_deref().unwrap_or_default())
    }

    /// Years from `--years`; the current and two previous calendar years
    /// when the flag is absent.
    pub fn year_list(&self) -> Result<Vec<i32>> {
        let Some(raw) = self.years.as_deref() else {
            let current = chrono::Utc::now().year();
            return Ok(vec![current - 2, current - 1, current]);
        };
        let mut years = split_list(raw)
            .into_iter()
            .map(|y| {
                y.parse::<i32>()
                    .ok()
                    .filter(|n| (1970..=9999).contains(n))
                    .ok_or(InsightsError::InvalidYear(y))
            })
            .collect::<Result<Vec<_>>>()?;
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }

    /// `None` for the combined view, otherwise the selected repository id.
    pub fn repository_filter(&self) -> Option<&str> {
        filter_value(&self.repository)
    }

    pub fn project_filter(&self) -> Option<&str> {
        filter_value(&self.project)
    }
}

fn filter_value(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(COMBINED) {
        None
    } else {
        Some(raw)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            source: Some(s.source.clone()),
            year_source: s.year_source.clone(),
            repository: Some(s.repository.clone()),
            view: Some(s.view.clone()),
            project: Some(s.project.clone()),
            csv_timeout_ms: Some(s.csv_timeout_ms),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
