//! Typed filter-graph stages.
//!
//! A [`Stage`] is one `[inputs]filter,filter[output]` unit of the engine's
//! filter graph. Stages are built as structured records and serialized only
//! when the command is assembled.

use std::fmt;

use serde::Serialize;

/// Label of the synthetic background canvas (input 0).
pub const BACKGROUND_LABEL: &str = "0:v";

/// Label of the synthesized audio mix.
pub const AUDIO_MIX_LABEL: &str = "audio_out";

/// What a stage contributes; doubles as the validator's "kind".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    VideoScale,
    VideoOverlay,
    Text,
    Audio,
    AudioMix,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VideoScale => "video-scale",
            Self::VideoOverlay => "video-overlay",
            Self::Text => "text",
            Self::Audio => "audio",
            Self::AudioMix => "audio-mix",
        }
    }

    /// Composition stages pass their first input through when dropped.
    pub fn is_composition(self) -> bool {
        matches!(self, Self::VideoOverlay | Self::Text)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    Positional(String),
    Named(String, String),
}

/// A single filter invocation inside a stage, e.g. `scale=1920:1080`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    pub fn named(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args
            .push(FilterArg::Named(key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            f.write_str(if idx == 0 { "=" } else { ":" })?;
            match arg {
                FilterArg::Positional(v) => f.write_str(v)?,
                FilterArg::Named(k, v) => write!(f, "{k}={v}")?,
            }
        }
        Ok(())
    }
}

/// One named unit of the filter graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub kind: StageKind,
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub output: String,
}

impl Stage {
    pub fn new(kind: StageKind, output: impl Into<String>) -> Self {
        Self {
            kind,
            inputs: vec![],
            filters: vec![],
            output: output.into(),
        }
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// The chain input a composition stage draws on.
    pub fn base_input(&self) -> Option<&str> {
        self.inputs.first().map(String::as_str)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        for (idx, filter) in self.filters.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        write!(f, "[{}]", self.output)
    }
}

/// Running position in the video composition chain.
///
/// Media processing returns it and text processing resumes from it, so the
/// stacking order is fixed by construction rather than by a shared counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerCursor {
    count: usize,
}

impl LayerCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(count: usize) -> Self {
        Self { count }
    }

    pub fn count(self) -> usize {
        self.count
    }

    /// Label the next layer composes onto.
    pub fn base_label(self) -> String {
        match self.count {
            0 => BACKGROUND_LABEL.to_string(),
            n => overlay_label(n - 1),
        }
    }

    /// Output label of the next layer.
    pub fn next_label(self) -> String {
        overlay_label(self.count)
    }

    /// Cursor after one more layer has been accepted.
    #[must_use]
    pub fn advance(self) -> Self {
        Self {
            count: self.count + 1,
        }
    }

    /// Label carrying the finished composition.
    pub fn terminal_label(self) -> String {
        self.base_label()
    }
}

pub fn overlay_label(layer: usize) -> String {
    format!("overlay_{layer}")
}

pub fn scaled_label(layer: usize) -> String {
    format!("scaled_{layer}")
}

pub fn audio_label(input_index: usize) -> String {
    format!("audio_{input_index}")
}

/// Format seconds the way every stage expects: three decimals, never negative.
pub fn format_time(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// `enable` expression gating a layer to `[start, end]`.
pub fn between_expr(start: f64, end: f64) -> String {
    format!("'between(t,{},{})'", format_time(start), format_time(end))
}

/// Normalize a user color into engine syntax.
///
/// Hex colors (`#rrggbb`, `#rrggbbaa`, bare hex, `0x...`) become `0x...`;
/// alphabetic names pass through lowercased. Returns `None` for anything else.
pub fn engine_color(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(format!("0x{}", hex.to_ascii_uppercase()));
    }

    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(trimmed.to_ascii_lowercase());
    }

    None
}

/// Canvas color for the background and pad areas; unset means black.
pub fn canvas_color(raw: Option<&str>) -> Option<String> {
    match raw {
        None => Some("black".to_string()),
        Some(raw) => engine_color(raw),
    }
}
