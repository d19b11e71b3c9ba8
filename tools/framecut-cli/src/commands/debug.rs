//! Dump the compiled command and processing state for a snapshot.

use std::path::PathBuf;

use framecut_common::config::AppConfig;
use framecut_export::ExportService;

pub async fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let project = super::load_project(&path)?;

    let mut service = ExportService::from_config(config);
    let data = service.debug_data(&project).await;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
