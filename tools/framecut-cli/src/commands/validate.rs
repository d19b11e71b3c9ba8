//! Validate a timeline snapshot.

use std::path::PathBuf;

use framecut_common::ExportLogger;
use framecut_export::FilterValidator;
use framecut_timeline::TimelineElement;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project = super::load_project(&path)?;

    println!("Snapshot: {}", path.display());
    println!(
        "  Canvas: {}x{} @ {} fps",
        project.settings.width, project.settings.height, project.settings.fps
    );
    println!("  Duration: {:.2}s", project.duration);
    println!("  Tracks: {}", project.tracks.len());
    println!("  Elements: {}", project.element_count());
    println!("  Media items: {}", project.media_items.len());

    let mut issues = project.validate();
    let mut warnings = vec![];

    let validator = FilterValidator::new(ExportLogger::new());
    for track in project.audible_tracks() {
        for element in &track.elements {
            let timing = element.timing();
            let report = validator.validate_timing(
                timing.start_time,
                timing.effective_duration(),
                project.duration,
            );
            let kind = match element {
                TimelineElement::Media(_) => "media",
                TimelineElement::Text(_) => "text",
            };
            for error in report.errors {
                issues.push(format!("{kind} element \"{}\": {error}", element.label()));
            }
            for warning in report.warnings {
                warnings.push(format!("{kind} element \"{}\": {warning}", element.label()));
            }
        }
    }

    for warning in &warnings {
        println!("  [WARN] {warning}");
    }

    if issues.is_empty() {
        println!("\nSnapshot is valid.");
        Ok(())
    } else {
        println!("\nIssues found:");
        for issue in &issues {
            println!("  - {issue}");
        }
        anyhow::bail!("{} issue(s) found", issues.len())
    }
}
