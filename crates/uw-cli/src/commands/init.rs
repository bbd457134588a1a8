use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use uw_config::{PROJECT_DIR, UwConfig};
use uw_db::service::UwService;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::InitArgs;
use crate::context::ensure_parent_dir;
use crate::output::output;

#[derive(Debug, Serialize)]
struct InitResponse {
    project_dir: String,
    config_path: String,
    config_written: bool,
    database: String,
}

/// Handle `uw init`.
///
/// Writes the defaults to `.underwrite/config.toml` unless it already
/// exists, then opens the database so its schema is in place.
pub async fn handle(args: &InitArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = init_in(&PathBuf::from(PROJECT_DIR), args.force).await?;
    output(&response, flags.format)
}

async fn init_in(project_dir: &std::path::Path, force: bool) -> anyhow::Result<InitResponse> {
    tokio::fs::create_dir_all(project_dir)
        .await
        .with_context(|| format!("failed to create {}", project_dir.display()))?;

    let config_path = project_dir.join("config.toml");
    let config_written = force || !config_path.exists();
    if config_written {
        let rendered =
            toml::to_string_pretty(&UwConfig::default()).context("failed to render default config")?;
        tokio::fs::write(&config_path, rendered)
            .await
            .with_context(|| format!("failed to write {}", config_path.display()))?;
    }

    let database = project_dir.join("underwrite.db").display().to_string();
    ensure_parent_dir(&database)?;
    UwService::new_local(&database)
        .await
        .with_context(|| format!("failed to open database at {database}"))?;

    Ok(InitResponse {
        project_dir: project_dir.display().to_string(),
        config_path: config_path.display().to_string(),
        config_written,
        database,
    })
}
