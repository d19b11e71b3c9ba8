//! Engine command assembly.
//!
//! The engine is positional, so tokens are emitted in a fixed order:
//! background input, media inputs, filter graph, output maps, encoder
//! settings, duration and output file.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use framecut_common::ExportLogger;
use framecut_timeline::{ExportProject, ExportQuality};

use crate::media::InputDeclaration;
use crate::stage::{
    canvas_color, format_time, Filter, LayerCursor, Stage, StageKind, AUDIO_MIX_LABEL,
    BACKGROUND_LABEL,
};
use crate::validator::{clean_joined_stages, FilterValidator};

/// Shortest background input ever emitted, in seconds.
pub const MIN_OUTPUT_DURATION_SECS: f64 = 0.1;

const VIDEO_CODEC: &str = "libx264";
const AUDIO_CODEC: &str = "aac";
const PIXEL_FORMAT: &str = "yuv420p";

/// x264 settings for one quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncoderPreset {
    pub crf: u8,
    pub preset: &'static str,
}

impl EncoderPreset {
    pub fn for_quality(quality: ExportQuality) -> Self {
        match quality {
            ExportQuality::Low => Self {
                crf: 28,
                preset: "fast",
            },
            ExportQuality::Medium => Self {
                crf: 23,
                preset: "medium",
            },
            ExportQuality::High => Self {
                crf: 18,
                preset: "slower",
            },
        }
    }
}

/// A fully assembled engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltCommand {
    pub args: Vec<String>,
    /// Cleaned `-filter_complex` value; `None` when nothing survived.
    pub filter_graph: Option<String>,
    pub video_map: String,
    pub audio_map: Option<String>,
    pub output_name: String,
    pub duration_secs: f64,
}

impl BuiltCommand {
    /// Space-joined form for logs and debug output.
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }

    pub fn has_audio(&self) -> bool {
        self.audio_map.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    logger: ExportLogger,
    validator: FilterValidator,
}

impl CommandBuilder {
    pub fn new(logger: ExportLogger) -> Self {
        Self {
            validator: FilterValidator::new(logger.clone()),
            logger,
        }
    }

    /// Assemble the engine command.
    ///
    /// `video_stages` is the full composition chain (media layers then text
    /// layers); `layers` is the cursor after the last of them.
    pub fn build(
        &self,
        project: &ExportProject,
        video_stages: &[Stage],
        audio_stages: &[Stage],
        inputs: &[InputDeclaration],
        layers: LayerCursor,
    ) -> BuiltCommand {
        let settings = &project.settings;
        let duration_secs = project.duration.max(MIN_OUTPUT_DURATION_SECS);
        let mut args = vec![];

        let color = canvas_color(settings.background_color.as_deref()).unwrap_or_else(|| {
            self.logger.warn("Unsupported background color, using black");
            "black".to_string()
        });
        let background = Filter::new("color")
            .named("c", &color)
            .named("size", format!("{}x{}", settings.width, settings.height))
            .named("duration", format_time(duration_secs))
            .named("rate", settings.fps);
        args.extend(["-f".to_string(), "lavfi".to_string()]);
        args.extend(["-i".to_string(), background.to_string()]);
        self.logger.log(format!(
            "Background video: {}x{}, duration: {}s, fps: {}, color: {color}",
            settings.width,
            settings.height,
            format_time(duration_secs),
            settings.fps
        ));

        for input in inputs {
            args.extend(input.args());
        }

        let mut graph = StageGraph::default();
        self.logger
            .log(format!("Processing {} video stages", video_stages.len()));
        for stage in video_stages {
            self.admit(&mut graph, stage);
        }
        // Audio stages only read raw input streams, so they are checked as a
        // group instead of through the drop cascade.
        let first_audio = graph.kept.len();
        if !audio_stages.is_empty() {
            self.logger
                .log(format!("Processing {} audio stages", audio_stages.len()));
            let audio = self
                .validator
                .validate_stage_list(audio_stages, StageKind::Audio);
            for error in &audio.report.errors {
                self.logger.warn(format!("Skipped stage. {error}"));
            }
            for warning in &audio.report.warnings {
                self.logger.warn(warning.as_str());
            }
            graph.kept.extend(audio.valid);
        }

        let video_map = graph.resolve(&layers.terminal_label());
        let audio_outputs: Vec<String> = graph.kept[first_audio..]
            .iter()
            .map(|stage| stage.output.clone())
            .collect();
        let audio_map = match audio_outputs.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            many => {
                let mix = many
                    .iter()
                    .fold(Stage::new(StageKind::AudioMix, AUDIO_MIX_LABEL), |stage, label| {
                        stage.input(label.clone())
                    })
                    .filter(
                        Filter::new("amix")
                            .named("inputs", many.len())
                            .named("duration", "longest"),
                    );
                if self
                    .validator
                    .validate_stage(&mix.to_string(), StageKind::AudioMix)
                {
                    self.logger.log(format!("Added audio mix stage: {mix}"));
                    graph.kept.push(mix);
                    Some(AUDIO_MIX_LABEL.to_string())
                } else {
                    self.logger
                        .warn("Audio mix stage rejected, exporting without audio");
                    None
                }
            }
        };

        let mut outputs: Vec<&str> = vec![video_map.as_str()];
        outputs.extend(audio_map.as_deref());
        let stages = graph.prune_unconsumed(&outputs);
        let joined = stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";");
        let filter_graph = Some(clean_joined_stages(&joined)).filter(|g| !g.is_empty());

        match &filter_graph {
            Some(graph) => {
                args.extend(["-filter_complex".to_string(), graph.clone()]);
                self.logger.log(format!("Filter complex: {graph}"));
                self.logger.log(format!("Total stages: {}", stages.len()));
            }
            None => self
                .logger
                .log("No filter stages, rendering background only"),
        }

        args.extend(["-map".to_string(), map_arg(&video_map)]);
        if let Some(label) = &audio_map {
            args.extend(["-map".to_string(), map_arg(label)]);
        }

        let preset = EncoderPreset::for_quality(settings.quality);
        args.extend(["-c:v".to_string(), VIDEO_CODEC.to_string()]);
        if audio_map.is_some() {
            args.extend(["-c:a".to_string(), AUDIO_CODEC.to_string()]);
        }
        args.extend(["-pix_fmt".to_string(), PIXEL_FORMAT.to_string()]);
        args.extend(["-crf".to_string(), preset.crf.to_string()]);
        args.extend(["-preset".to_string(), preset.preset.to_string()]);

        let output_name = settings.format.output_file_name();
        args.extend([
            "-t".to_string(),
            format_time(duration_secs),
            "-y".to_string(),
            output_name.clone(),
        ]);

        BuiltCommand {
            args,
            filter_graph,
            video_map,
            audio_map,
            output_name,
            duration_secs,
        }
    }

    /// Rewrite `stage` through earlier drops and keep it if it still validates.
    fn admit(&self, graph: &mut StageGraph, stage: &Stage) {
        let mut rewritten = stage.clone();
        for input in &mut rewritten.inputs {
            *input = graph.resolve(input);
        }

        let text = rewritten.to_string();
        let consumes_dead = rewritten.inputs.iter().any(|i| graph.dead.contains(i));
        if !consumes_dead && self.validator.validate_stage(&text, stage.kind) {
            graph.kept.push(rewritten);
            return;
        }

        if consumes_dead {
            self.logger.warn(format!(
                "Skipped {} stage consuming a dropped label: \"{text}\"",
                stage.kind
            ));
        } else {
            self.logger
                .warn(format!("Skipped invalid {} stage: \"{text}\"", stage.kind));
        }

        match rewritten.base_input() {
            Some(base) if stage.kind.is_composition() && !graph.dead.contains(base) => {
                graph.aliases.insert(stage.output.clone(), base.to_string());
            }
            _ => {
                graph.dead.insert(stage.output.clone());
            }
        }
    }
}

/// Working state of the drop cascade.
#[derive(Debug, Default)]
struct StageGraph {
    kept: Vec<Stage>,
    /// Dropped composition outputs, standing in for their base input.
    aliases: HashMap<String, String>,
    /// Outputs of dropped stages with nothing to stand in for them.
    dead: HashSet<String>,
}

impl StageGraph {
    fn resolve(&self, label: &str) -> String {
        let mut current = label;
        while let Some(next) = self.aliases.get(current) {
            current = next.as_str();
        }
        current.to_string()
    }

    /// Drop stages whose output feeds nothing. Stages are in dependency
    /// order, so one backwards sweep settles it.
    fn prune_unconsumed(self, outputs: &[&str]) -> Vec<Stage> {
        let mut needed: HashSet<String> = outputs.iter().map(|s| s.to_string()).collect();
        let mut kept: Vec<Stage> = self
            .kept
            .into_iter()
            .rev()
            .filter(|stage| {
                if !needed.contains(&stage.output) {
                    return false;
                }
                needed.extend(stage.inputs.iter().cloned());
                true
            })
            .collect();
        kept.reverse();
        kept
    }
}

/// `-map` argument: stage outputs are bracketed, input streams are not.
fn map_arg(label: &str) -> String {
    if label == BACKGROUND_LABEL {
        label.to_string()
    } else {
        format!("[{label}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{audio_label, overlay_label, scaled_label};
    use framecut_timeline::{ExportFormat, ExportSettings, MediaType};

    fn project(duration: f64) -> ExportProject {
        ExportProject::new(ExportSettings::new(1920, 1080, 30), duration)
    }

    fn builder() -> CommandBuilder {
        CommandBuilder::new(ExportLogger::new())
    }

    fn input(index: usize) -> InputDeclaration {
        InputDeclaration {
            index,
            file_name: format!("media_{index}"),
            media_type: MediaType::Video,
        }
    }

    fn layer(cursor: LayerCursor, input_index: usize) -> (Stage, Stage) {
        let n = cursor.count();
        let scale = Stage::new(StageKind::VideoScale, scaled_label(n))
            .input(format!("{input_index}:v"))
            .filter(Filter::new("scale").arg(1920).arg(1080));
        let overlay = Stage::new(StageKind::VideoOverlay, cursor.next_label())
            .input(cursor.base_label())
            .input(scaled_label(n))
            .filter(Filter::new("overlay").arg(0).arg(0));
        (scale, overlay)
    }

    fn audio(input_index: usize) -> Stage {
        Stage::new(StageKind::Audio, audio_label(input_index))
            .input(format!("{input_index}:a"))
            .filter(Filter::new("anull"))
    }

    fn position(args: &[String], token: &str) -> Option<usize> {
        args.iter().position(|a| a == token)
    }

    #[test]
    fn test_empty_project_renders_background_only() {
        let cmd = builder().build(&project(0.0), &[], &[], &[], LayerCursor::new());

        assert_eq!(
            cmd.args,
            vec![
                "-f", "lavfi",
                "-i", "color=c=black:size=1920x1080:duration=0.100:rate=30",
                "-map", "0:v",
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-crf", "23",
                "-preset", "medium",
                "-t", "0.100",
                "-y", "output.mp4",
            ]
        );
        assert_eq!(cmd.filter_graph, None);
        assert!(!cmd.has_audio());
    }

    #[test]
    fn test_two_audio_stages_get_one_mix() {
        let cmd = builder().build(
            &project(5.0),
            &[],
            &[audio(1), audio(2)],
            &[input(1), input(2)],
            LayerCursor::new(),
        );

        assert_eq!(
            cmd.filter_graph.as_deref(),
            Some("[1:a]anull[audio_1];[2:a]anull[audio_2];[audio_1][audio_2]amix=inputs=2:duration=longest[audio_out]")
        );
        assert_eq!(cmd.audio_map.as_deref(), Some("audio_out"));
        assert!(cmd.args.windows(2).any(|w| w == ["-map", "[audio_out]"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[test]
    fn test_single_audio_stage_is_mapped_directly() {
        let cmd = builder().build(&project(5.0), &[], &[audio(1)], &[input(1)], LayerCursor::new());

        assert!(!cmd.filter_graph.as_deref().unwrap_or_default().contains("amix"));
        assert_eq!(cmd.audio_map.as_deref(), Some("audio_1"));
        assert!(cmd.args.windows(2).any(|w| w == ["-map", "[audio_1]"]));
    }

    #[test]
    fn test_positional_order() {
        let (scale, overlay) = layer(LayerCursor::new(), 1);
        let cmd = builder().build(
            &project(5.0),
            &[scale, overlay],
            &[audio(1)],
            &[input(1)],
            LayerCursor::at(1),
        );

        let args = &cmd.args;
        let bg = position(args, "lavfi").unwrap();
        let media = position(args, "media_1").unwrap();
        let graph = position(args, "-filter_complex").unwrap();
        let map = position(args, "-map").unwrap();
        let codec = position(args, "-c:v").unwrap();
        let out = position(args, "output.mp4").unwrap();
        assert!(bg < media && media < graph && graph < map && map < codec && codec < out);
        assert_eq!(cmd.video_map, "overlay_0");
        assert_eq!(args[map + 1], "[overlay_0]");
    }

    #[test]
    fn test_dropped_scale_takes_its_overlay_with_it() {
        let (scale0, overlay0) = layer(LayerCursor::new(), 1);
        let (mut scale1, overlay1) = layer(LayerCursor::at(1), 2);
        scale1.filters = vec![Filter::new("scale").arg("undefined").arg(1080)];
        let (scale2, overlay2) = layer(LayerCursor::at(2), 3);

        let logger = ExportLogger::new();
        let cmd = CommandBuilder::new(logger.clone()).build(
            &project(5.0),
            &[scale0, overlay0, scale1, overlay1, scale2, overlay2],
            &[],
            &[input(1), input(2), input(3)],
            LayerCursor::at(3),
        );

        let graph = cmd.filter_graph.unwrap();
        assert!(!graph.contains("scaled_1"));
        assert!(!graph.contains("[overlay_1]"));
        assert!(graph.contains("[overlay_0][scaled_2]overlay=0:0[overlay_2]"));
        assert_eq!(cmd.video_map, overlay_label(2));
        assert!(logger.lines().iter().any(|l| l.contains("consuming a dropped label")));
    }

    #[test]
    fn test_dropped_terminal_text_falls_back_to_previous_layer() {
        let (scale, overlay) = layer(LayerCursor::new(), 1);
        let text = Stage::new(StageKind::Text, overlay_label(1))
            .input(overlay_label(0))
            .filter(Filter::new("drawtext").named("fontsize", "NaN"));

        let cmd = builder().build(
            &project(5.0),
            &[scale, overlay, text],
            &[],
            &[input(1)],
            LayerCursor::at(2),
        );

        assert_eq!(cmd.video_map, "overlay_0");
        assert!(!cmd.filter_graph.unwrap().contains("drawtext"));
    }

    #[test]
    fn test_dropped_overlay_prunes_orphaned_scale() {
        let (scale, mut overlay) = layer(LayerCursor::new(), 1);
        overlay.filters = vec![Filter::new("overlay").arg("NaN").arg(0)];

        let cmd = builder().build(&project(5.0), &[scale, overlay], &[], &[input(1)], LayerCursor::at(1));

        assert_eq!(cmd.video_map, "0:v");
        assert_eq!(cmd.filter_graph, None);
        assert!(cmd.args.windows(2).any(|w| w == ["-map", "0:v"]));
    }

    #[test]
    fn test_dropped_audio_leaves_single_survivor_unmixed() {
        let mut broken = audio(2);
        broken.filters = vec![Filter::new("adelay").named("delays", "NaN")];

        let cmd = builder().build(
            &project(5.0),
            &[],
            &[audio(1), broken],
            &[input(1), input(2)],
            LayerCursor::new(),
        );
        assert_eq!(cmd.audio_map.as_deref(), Some("audio_1"));
        assert!(!cmd.filter_graph.unwrap().contains("amix"));
    }

    #[test]
    fn test_quality_table_is_fixed() {
        for (quality, crf, preset) in [
            (ExportQuality::Low, "28", "fast"),
            (ExportQuality::Medium, "23", "medium"),
            (ExportQuality::High, "18", "slower"),
        ] {
            for (w, h, duration) in [(640, 360, 1.0), (3840, 2160, 600.0)] {
                let mut p = ExportProject::new(ExportSettings::new(w, h, 60), duration);
                p.settings.quality = quality;
                let args = builder().build(&p, &[], &[], &[], LayerCursor::new()).args;
                assert!(args.windows(2).any(|win| win == ["-crf", crf]));
                assert!(args.windows(2).any(|win| win == ["-preset", preset]));
            }
        }
    }

    #[test]
    fn test_background_color_and_format() {
        let mut p = project(2.5);
        p.settings.background_color = Some("#ff8800".to_string());
        p.settings.format = ExportFormat::Mov;

        let cmd = builder().build(&p, &[], &[], &[], LayerCursor::new());
        assert_eq!(cmd.args[3], "color=c=0xFF8800:size=1920x1080:duration=2.500:rate=30");
        assert_eq!(cmd.output_name, "output.mov");
        assert_eq!(cmd.args.last().map(String::as_str), Some("output.mov"));
    }
}
