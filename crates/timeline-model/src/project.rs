//! Export snapshot and settings.
//!
//! An [`ExportProject`] is the whole input of one export: tracks, media
//! items, canvas/encoding settings and the overall output duration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::media::MediaItem;
use crate::timeline::{TimelineElement, TimelineTrack};

/// Value snapshot of everything the export compiler needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProject {
    #[serde(default)]
    pub tracks: Vec<TimelineTrack>,

    #[serde(default)]
    pub media_items: Vec<MediaItem>,

    pub settings: ExportSettings,

    /// Overall output duration in seconds.
    pub duration: f64,
}

/// Canvas and encoding settings chosen in the export dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    #[serde(default)]
    pub quality: ExportQuality,

    #[serde(default)]
    pub format: ExportFormat,

    /// Canvas color, e.g. `#000000` or `black`.
    #[serde(default)]
    pub background_color: Option<String>,
}

/// Quality tier; maps to a fixed encoder preset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl ExportQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for ExportQuality {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ProjectError::ValidationError {
                message: format!("Unknown quality tier: {other}. Use: low, medium, high"),
            }),
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Mov,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
        }
    }

    /// Name of the rendered file inside the engine's input space.
    pub fn output_file_name(self) -> String {
        format!("output.{}", self.extension())
    }
}

impl ExportSettings {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            quality: ExportQuality::default(),
            format: ExportFormat::default(),
            background_color: None,
        }
    }
}

impl ExportProject {
    /// Create an empty project with the given canvas and duration.
    pub fn new(settings: ExportSettings, duration: f64) -> Self {
        Self {
            tracks: vec![],
            media_items: vec![],
            settings,
            duration,
        }
    }

    /// Load a snapshot from a JSON file and hydrate media payloads.
    ///
    /// Media paths are resolved relative to the file's directory. A missing
    /// media file leaves the payload empty; processing skips such elements.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut project: ExportProject =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        project.hydrate_payloads(&base)?;
        Ok(project)
    }

    fn hydrate_payloads(&mut self, base: &Path) -> Result<(), ProjectError> {
        for item in &mut self.media_items {
            let Some(relative) = &item.path else {
                continue;
            };
            let full = if relative.is_absolute() {
                relative.clone()
            } else {
                base.join(relative)
            };

            match std::fs::read(&full) {
                Ok(bytes) => item.payload = Some(Arc::from(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => item.payload = None,
                Err(e) => {
                    return Err(ProjectError::IoError {
                        path: full,
                        source: e,
                    })
                }
            }
        }
        Ok(())
    }

    pub fn media_item(&self, id: &str) -> Option<&MediaItem> {
        self.media_items.iter().find(|m| m.id == id)
    }

    /// Tracks that contribute to the output.
    pub fn audible_tracks(&self) -> impl Iterator<Item = &TimelineTrack> {
        self.tracks.iter().filter(|t| !t.muted)
    }

    pub fn element_count(&self) -> usize {
        self.tracks.iter().map(|t| t.elements.len()).sum()
    }

    /// Structural checks on the snapshot. Returns human-readable issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = vec![];

        if self.settings.width == 0 || self.settings.height == 0 {
            issues.push(format!(
                "Canvas size must be non-zero (got {}x{})",
                self.settings.width, self.settings.height
            ));
        }
        if self.settings.fps == 0 {
            issues.push("Frame rate must be non-zero".to_string());
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            issues.push(format!("Invalid project duration: {}", self.duration));
        }

        for track in &self.tracks {
            for element in &track.elements {
                if let TimelineElement::Media(media) = element {
                    match self.media_item(&media.media_id) {
                        None => issues.push(format!(
                            "Element '{}' on track '{}' references unknown media '{}'",
                            media.id, track.id, media.media_id
                        )),
                        Some(item) if item.payload.is_none() => issues.push(format!(
                            "Media '{}' has no payload (path: {})",
                            item.id,
                            item.path
                                .as_ref()
                                .map(|p| p.display().to_string())
                                .unwrap_or_else(|| "<none>".to_string())
                        )),
                        Some(_) => {}
                    }
                }
            }
        }

        issues
    }
}

/// Errors that can occur when loading an export snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::timeline::{ElementTiming, MediaElement, TrackType};

    fn sample_json() -> &'static str {
        r##"{
            "settings": { "width": 1280, "height": 720, "fps": 30, "quality": "high", "backgroundColor": "#101010" },
            "duration": 12.5,
            "mediaItems": [
                { "id": "clip", "type": "video", "hasAudio": true, "path": "clip.mp4" },
                { "id": "gone", "type": "audio", "path": "missing.wav" }
            ],
            "tracks": [
                { "id": "t1", "type": "media", "elements": [
                    { "type": "media", "id": "e1", "mediaId": "clip", "startTime": 0, "duration": 5 }
                ]}
            ]
        }"##
    }

    #[test]
    fn test_load_hydrates_payloads_relative_to_file() {
        let dir = std::env::temp_dir().join("framecut_test_project_load");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("clip.mp4"), b"fake-video").unwrap();
        std::fs::write(dir.join("project.json"), sample_json()).unwrap();

        let project = ExportProject::load(dir.join("project.json")).unwrap();
        assert_eq!(project.settings.quality, ExportQuality::High);
        assert_eq!(project.settings.format, ExportFormat::Mp4);
        assert_eq!(
            project.media_item("clip").unwrap().payload.as_deref(),
            Some(&b"fake-video"[..])
        );
        assert!(project.media_item("gone").unwrap().payload.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_reports_structural_issues() {
        let mut project = ExportProject::new(ExportSettings::new(0, 720, 0), f64::NAN);
        project.tracks.push(
            TimelineTrack::new("t1", TrackType::Media).with_element(TimelineElement::Media(
                MediaElement {
                    id: "e1".to_string(),
                    name: String::new(),
                    media_id: "nope".to_string(),
                    timing: ElementTiming::new(0.0, 1.0),
                },
            )),
        );
        project
            .media_items
            .push(MediaItem::new("empty", MediaType::Image));

        let issues = project.validate();
        assert_eq!(issues.len(), 4);
        assert!(issues.iter().any(|i| i.contains("unknown media 'nope'")));
    }

    #[test]
    fn test_quality_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ExportQuality>().unwrap(), ExportQuality::High);
        assert!("ultra".parse::<ExportQuality>().is_err());
    }

    #[test]
    fn test_format_output_names() {
        assert_eq!(ExportFormat::Mp4.output_file_name(), "output.mp4");
        assert_eq!(ExportFormat::Mov.mime_type(), "video/quicktime");
    }
}
