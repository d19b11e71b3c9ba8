//! Text pass: stacks `drawtext` layers on top of the media composition.

use framecut_common::ExportLogger;
use framecut_timeline::{ExportProject, TextElement};

use crate::fonts::FontManager;
use crate::stage::{between_expr, engine_color, format_time, Filter, LayerCursor, Stage, StageKind};
use crate::validator::FilterValidator;

/// Everything the text pass produced.
#[derive(Debug, Clone, Default)]
pub struct TextPassOutput {
    pub text_stages: Vec<Stage>,
    /// Final composition position; its terminal label is the video output.
    pub layers: LayerCursor,
}

#[derive(Debug, Clone)]
pub struct TextProcessor {
    logger: ExportLogger,
    validator: FilterValidator,
}

impl TextProcessor {
    pub fn new(logger: ExportLogger) -> Self {
        Self {
            validator: FilterValidator::new(logger.clone()),
            logger,
        }
    }

    /// Build one text stage per usable text element, in ascending start order,
    /// continuing the composition chain from `start`.
    pub async fn process(
        &self,
        project: &ExportProject,
        fonts: &mut FontManager,
        start: LayerCursor,
    ) -> TextPassOutput {
        let mut out = TextPassOutput {
            text_stages: vec![],
            layers: start,
        };

        let mut elements: Vec<&TextElement> = project
            .audible_tracks()
            .flat_map(|track| track.text_elements())
            .collect();
        if elements.is_empty() {
            return out;
        }
        // Stable: equal start times keep track order.
        elements.sort_by(|a, b| a.timing.start_time.total_cmp(&b.timing.start_time));

        if !fonts.is_ready() {
            self.logger.warn(format!(
                "No font loaded, skipping {} text element(s)",
                elements.len()
            ));
            return out;
        }

        for element in elements {
            if let Some(stage) = self.process_element(project, element, fonts, out.layers).await {
                out.text_stages.push(stage);
                out.layers = out.layers.advance();
            }
        }

        out
    }

    async fn process_element(
        &self,
        project: &ExportProject,
        element: &TextElement,
        fonts: &mut FontManager,
        layers: LayerCursor,
    ) -> Option<Stage> {
        self.logger
            .log(format!("Processing text element: \"{}\"", element.content));

        let timing = &element.timing;
        let report = self.validator.validate_timing(
            timing.start_time,
            timing.effective_duration(),
            project.duration,
        );
        for warning in &report.warnings {
            self.logger.warn(format!(
                "Timing warning for text element \"{}\": {warning}",
                element.content
            ));
        }
        if !report.is_valid() {
            self.logger.error(format!(
                "Invalid timing for text element \"{}\": {}",
                element.content,
                report.errors.join(", ")
            ));
            return None;
        }

        let text = sanitize_text(&element.content);
        if text.is_empty() {
            self.logger.warn(format!(
                "Text element \"{}\" is empty after sanitising, skipping",
                element.content
            ));
            return None;
        }

        let font = match fonts.resolve(&element.font_family).await {
            Ok(font) => font,
            Err(err) => {
                self.logger.error(format!(
                    "No usable font for text element \"{}\": {err}",
                    element.content
                ));
                return None;
            }
        };

        let color = engine_color(&element.color).unwrap_or_else(|| {
            self.logger.warn(format!(
                "Unsupported text color {:?}, using white",
                element.color
            ));
            "white".to_string()
        });

        let stage = Stage::new(StageKind::Text, layers.next_label())
            .input(layers.base_label())
            .filter(
                Filter::new("drawtext")
                    .named("text", format!("'{text}'"))
                    .named("fontfile", &font.file_name)
                    .named("fontsize", element.font_size)
                    .named("fontcolor", color)
                    .named("x", format!("(w-text_w)/2{}", signed_offset(element.x)))
                    .named("y", format!("(h-text_h)/2{}", signed_offset(element.y)))
                    .named("enable", between_expr(timing.start_time, timing.end_time())),
            );

        if !self
            .validator
            .validate_stage(&stage.to_string(), StageKind::Text)
        {
            self.logger.error(format!(
                "Invalid text stage generated for \"{}\"",
                element.content
            ));
            return None;
        }

        let preview: String = text.chars().take(20).collect();
        self.logger.log(format!(
            "Added text overlay: \"{preview}\" ({}s - {}s)",
            format_time(timing.start_time),
            format_time(timing.end_time().min(project.duration))
        ));
        Some(stage)
    }
}

/// Reduce caption text to characters that are inert inside a `drawtext`
/// argument.
///
/// Structural characters are dropped or turned into spaces, anything outside
/// ASCII word characters, whitespace, `.` and `-` is removed, and whitespace
/// runs are collapsed. The result is lossy.
pub fn sanitize_text(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter_map(|c| match c {
            ':' | '=' | ';' | ',' | '\n' | '\r' | '\t' => Some(' '),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' => Some(c),
            c if c.is_whitespace() => Some(' '),
            _ => None,
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `+N` / `-N` suffix for a centered position expression.
fn signed_offset(value: f64) -> String {
    if value < 0.0 {
        format!("-{}", -value)
    } else {
        format!("+{}", value.abs())
    }
}
