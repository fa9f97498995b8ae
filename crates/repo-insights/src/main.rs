mod bootstrap;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use insights_core::settings::{Command, Settings};
use insights_data::source::source_from;
use insights_data::views::ViewKind;
use insights_runtime::dashboard::{Dashboard, Filter};
use insights_runtime::discovery::Discovery;
use insights_runtime::loader::SourceLoader;
use serde::Serialize;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("Repo Insights v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(Command::Index { dir }) = &settings.command {
        let repositories = bootstrap::write_directory_listing(dir)?;
        return print_json(&serde_json::json!({ "directories": repositories }));
    }

    tracing::info!(
        "Source: {}, View: {}, Repository: {}",
        settings.source,
        settings.view,
        settings.repository
    );

    let request_timeout = Duration::from_secs(settings.request_timeout_secs);
    let source = source_from(settings.source_base()?, request_timeout)?;
    let year_source = source_from(&settings.year_base(), request_timeout)?;

    let discovery = Discovery::new(Arc::clone(&source), bootstrap::open_store(settings.no_persist));
    if settings.refresh {
        discovery.forget();
    }
    let loader = SourceLoader::new(source, Duration::from_millis(settings.csv_timeout_ms));

    let mut dashboard = Dashboard::new(
        discovery,
        loader,
        year_source,
        settings.repo_overrides(),
        Filter::from_settings(&settings)?,
    );

    match settings.view.as_str() {
        "discover" => {
            let found = dashboard.repositories().await;
            print_json(found)?;
        }
        "yearly" => {
            let yearly = dashboard.yearly().await;
            print_json(yearly.as_ref())?;
        }
        name => {
            let Some(kind) = ViewKind::parse(name) else {
                anyhow::bail!("unknown view: {name}");
            };
            let view = dashboard.view(kind).await;
            print_json(view.as_ref())?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
