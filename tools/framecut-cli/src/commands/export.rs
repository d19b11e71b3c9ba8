//! Render a snapshot to a video file.

use std::io::Write;
use std::path::PathBuf;

use framecut_common::config::AppConfig;
use framecut_common::LogLevel;
use framecut_export::ExportService;
use framecut_timeline::ExportQuality;

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    quality: Option<String>,
) -> anyhow::Result<()> {
    let mut project = super::load_project(&path)?;

    if let Some(quality) = quality {
        project.settings.quality = quality.parse::<ExportQuality>()?;
    }

    let output_path = output.unwrap_or_else(|| {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(project.settings.format.output_file_name())
    });

    println!("Exporting: {}", path.display());
    println!(
        "  Canvas: {}x{} @ {} fps, {:.2}s",
        project.settings.width, project.settings.height, project.settings.fps, project.duration
    );
    println!("  Quality: {}", project.settings.quality.as_str());
    println!("  Output: {}", output_path.display());

    let mut service = ExportService::from_config(config);
    service.set_progress_callback(Box::new(|update| {
        print!("\r  Progress: {:5.1}% {:<40}", update.progress, update.message);
        let _ = std::io::stdout().flush();
    }));

    service.initialize().await?;
    let result = service.export(&project).await;
    println!();

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Export failed: {e}");
            let logs = service.get_logs();
            let tail = logs.len().saturating_sub(20);
            for line in &logs[tail..] {
                eprintln!("  {line}");
            }
            service.terminate().await;
            return Err(e.into());
        }
    };

    std::fs::write(&output_path, &artifact.data)?;
    service.terminate().await;
    tracing::info!(output = %output_path.display(), bytes = artifact.len(), "Export written");

    println!(
        "Export complete: {} ({} bytes, {})",
        output_path.display(),
        artifact.len(),
        artifact.mime_type
    );
    let warnings = service.logger().count_at_least(LogLevel::Warn);
    if warnings > 0 {
        println!("  {warnings} warning(s) logged; run `framecut debug` for details");
    }
    Ok(())
}
