//! Media pass: turns media elements into video layers and audio stages.

use serde::Serialize;

use framecut_common::ExportLogger;
use framecut_timeline::{ExportProject, MediaElement, MediaItem, MediaType};

use crate::stage::{
    audio_label, between_expr, canvas_color, format_time, scaled_label, Filter, LayerCursor,
    Stage, StageKind,
};
use crate::validator::FilterValidator;

/// One `-i` input of the engine command. Index 0 is the background canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDeclaration {
    pub index: usize,
    pub file_name: String,
    pub media_type: MediaType,
}

impl InputDeclaration {
    /// Command tokens declaring this input. Still images are looped so they
    /// last as long as their overlay window.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![];
        if self.media_type == MediaType::Image {
            args.extend(["-loop".to_string(), "1".to_string()]);
        }
        args.extend(["-i".to_string(), self.file_name.clone()]);
        args
    }
}

/// Everything the media pass produced.
#[derive(Debug, Clone, Default)]
pub struct MediaPassOutput {
    pub video_stages: Vec<Stage>,
    pub audio_stages: Vec<Stage>,
    pub inputs: Vec<InputDeclaration>,
    /// Composition position the text pass resumes from.
    pub layers: LayerCursor,
}

/// Builds scale/overlay and audio stages for every usable media element.
#[derive(Debug, Clone)]
pub struct MediaProcessor {
    logger: ExportLogger,
    validator: FilterValidator,
}

impl MediaProcessor {
    pub fn new(logger: ExportLogger) -> Self {
        Self {
            validator: FilterValidator::new(logger.clone()),
            logger,
        }
    }

    /// Walk unmuted tracks in order. Bad elements are logged and skipped.
    pub fn process(&self, project: &ExportProject) -> MediaPassOutput {
        let mut out = MediaPassOutput::default();
        let pad_color = self.pad_color(project);

        for track in project.audible_tracks() {
            for element in track.media_elements() {
                let Some(item) = project.media_item(&element.media_id) else {
                    self.logger.warn(format!(
                        "Media item not found for element: {}",
                        display_name(element)
                    ));
                    continue;
                };
                if item.payload.is_none() {
                    self.logger.warn(format!(
                        "Media item '{}' has no payload, skipping element: {}",
                        item.id,
                        display_name(element)
                    ));
                    continue;
                }

                self.process_element(project, element, item, &pad_color, &mut out);
            }
        }

        self.logger.log(format!(
            "Media pass: {} video layers, {} audio stages, {} inputs",
            out.layers.count(),
            out.audio_stages.len(),
            out.inputs.len()
        ));
        out
    }

    fn process_element(
        &self,
        project: &ExportProject,
        element: &MediaElement,
        item: &MediaItem,
        pad_color: &str,
        out: &mut MediaPassOutput,
    ) {
        let timing = &element.timing;
        let report = self.validator.validate_timing(
            timing.start_time,
            timing.effective_duration(),
            project.duration,
        );
        for warning in &report.warnings {
            self.logger.warn(format!(
                "Timing warning for media element \"{}\": {warning}",
                display_name(element)
            ));
        }
        if !report.is_valid() {
            self.logger.error(format!(
                "Invalid timing for media element \"{}\": {}",
                display_name(element),
                report.errors.join(", ")
            ));
            return;
        }

        let input_index = out.inputs.len() + 1;

        let video = if item.media_type.is_visual() {
            let stages = self.video_stages(project, element, input_index, out.layers, pad_color);
            if stages.is_none() {
                return;
            }
            stages
        } else {
            None
        };

        let audio = if item.contributes_audio() {
            let stage = self.audio_stage(element, input_index);
            if stage.is_none() && video.is_none() {
                return;
            }
            stage
        } else {
            None
        };

        if video.is_none() && audio.is_none() {
            self.logger.warn(format!(
                "Media element \"{}\" produces neither picture nor sound, skipping",
                display_name(element)
            ));
            return;
        }

        out.inputs.push(InputDeclaration {
            index: input_index,
            file_name: item.input_file_name(),
            media_type: item.media_type,
        });
        if let Some((scale, overlay)) = video {
            out.video_stages.push(scale);
            out.video_stages.push(overlay);
            out.layers = out.layers.advance();
        }
        if let Some(stage) = audio {
            out.audio_stages.push(stage);
        }
    }

    fn video_stages(
        &self,
        project: &ExportProject,
        element: &MediaElement,
        input_index: usize,
        layers: LayerCursor,
        pad_color: &str,
    ) -> Option<(Stage, Stage)> {
        let timing = &element.timing;
        let (width, height) = (project.settings.width, project.settings.height);
        let layer = layers.count();

        let mut scale = Stage::new(StageKind::VideoScale, scaled_label(layer))
            .input(format!("{input_index}:v"));
        if timing.is_trimmed() {
            scale = scale
                .filter(
                    Filter::new("trim")
                        .named("start", format_time(timing.trim_start))
                        .named("end", format_time(timing.source_end())),
                )
                .filter(Filter::new("setpts").arg("PTS-STARTPTS"));
        }
        let scale = scale
            .filter(
                Filter::new("scale")
                    .arg(width)
                    .arg(height)
                    .named("force_original_aspect_ratio", "decrease"),
            )
            .filter(
                Filter::new("pad")
                    .arg(width)
                    .arg(height)
                    .arg("(ow-iw)/2")
                    .arg("(oh-ih)/2")
                    .arg(pad_color),
            );

        let overlay = Stage::new(StageKind::VideoOverlay, layers.next_label())
            .input(layers.base_label())
            .input(scaled_label(layer))
            .filter(
                Filter::new("overlay")
                    .arg(0)
                    .arg(0)
                    .named("enable", between_expr(timing.start_time, timing.end_time())),
            );

        if !self
            .validator
            .validate_stage(&scale.to_string(), StageKind::VideoScale)
            || !self
                .validator
                .validate_stage(&overlay.to_string(), StageKind::VideoOverlay)
        {
            self.logger.error(format!(
                "Invalid video stage generated for \"{}\"",
                display_name(element)
            ));
            return None;
        }

        self.logger.log(format!(
            "Added media overlay: \"{}\" ({}s - {}s)",
            display_name(element),
            format_time(timing.start_time),
            format_time(timing.end_time())
        ));
        Some((scale, overlay))
    }

    fn audio_stage(&self, element: &MediaElement, input_index: usize) -> Option<Stage> {
        let timing = &element.timing;
        let mut stage = Stage::new(StageKind::Audio, audio_label(input_index))
            .input(format!("{input_index}:a"));

        if timing.is_trimmed() {
            stage = stage
                .filter(
                    Filter::new("atrim")
                        .named("start", format_time(timing.trim_start))
                        .named("end", format_time(timing.source_end())),
                )
                .filter(Filter::new("asetpts").arg("PTS-STARTPTS"));
        }

        let delay_ms = (timing.start_time * 1000.0).round();
        if delay_ms > 0.0 {
            stage = stage.filter(
                Filter::new("adelay")
                    .named("delays", delay_ms as u64)
                    .named("all", 1),
            );
        }

        if stage.filters.is_empty() {
            stage = stage.filter(Filter::new("anull"));
        }

        let text = stage.to_string();
        if !self.validator.validate_stage(&text, StageKind::Audio) {
            self.logger.error(format!(
                "Invalid audio stage generated for \"{}\"",
                display_name(element)
            ));
            return None;
        }

        self.logger.log(format!("Added audio stage: {text}"));
        Some(stage)
    }

    fn pad_color(&self, project: &ExportProject) -> String {
        let raw = project.settings.background_color.as_deref();
        canvas_color(raw).unwrap_or_else(|| {
            self.logger.warn(format!(
                "Unsupported background color {:?}, using black",
                raw.unwrap_or_default()
            ));
            "black".to_string()
        })
    }
}

fn display_name(element: &MediaElement) -> &str {
    if element.name.is_empty() {
        &element.id
    } else {
        &element.name
    }
}
