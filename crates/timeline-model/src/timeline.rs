//! Tracks and timeline elements.

use serde::{Deserialize, Serialize};

/// Minimum on-timeline length (seconds) for an element to be renderable.
pub const MIN_ELEMENT_DURATION_SECS: f64 = 0.01;

/// An ordered container of timeline elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineTrack {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub track_type: TrackType,

    #[serde(default)]
    pub elements: Vec<TimelineElement>,

    /// Muted tracks contribute nothing to the output.
    #[serde(default)]
    pub muted: bool,
}

/// What a track is allowed to hold in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    #[default]
    Media,
    Text,
    Audio,
}

/// Placement and trim data shared by every element kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTiming {
    /// Placement on the output timeline.
    pub start_time: f64,

    /// Nominal source-relative length.
    pub duration: f64,

    #[serde(default)]
    pub trim_start: f64,

    #[serde(default)]
    pub trim_end: f64,
}

impl ElementTiming {
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
        }
    }

    pub fn with_trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    /// On-timeline length after trimming.
    pub fn effective_duration(&self) -> f64 {
        self.duration - self.trim_start - self.trim_end
    }

    /// Output time at which the element disappears.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.effective_duration()
    }

    pub fn is_trimmed(&self) -> bool {
        self.trim_start > 0.0 || self.trim_end > 0.0
    }

    /// Source time at which the trimmed region ends.
    pub fn source_end(&self) -> f64 {
        self.duration - self.trim_end
    }
}

/// A clip placed on the timeline referencing a [`crate::MediaItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaElement {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub media_id: String,

    #[serde(flatten)]
    pub timing: ElementTiming,
}

/// A text overlay drawn on top of all media layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Display text.
    pub content: String,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default = "default_font_size")]
    pub font_size: f64,

    #[serde(default = "default_text_color")]
    pub color: String,

    /// Horizontal offset from canvas center, in pixels.
    #[serde(default)]
    pub x: f64,

    /// Vertical offset from canvas center, in pixels.
    #[serde(default)]
    pub y: f64,

    #[serde(flatten)]
    pub timing: ElementTiming,
}

fn default_font_family() -> String {
    "Inter".to_string()
}

fn default_font_size() -> f64 {
    48.0
}

fn default_text_color() -> String {
    "#ffffff".to_string()
}

/// One element on a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineElement {
    Media(MediaElement),
    Text(TextElement),
}

impl TimelineElement {
    pub fn timing(&self) -> &ElementTiming {
        match self {
            Self::Media(m) => &m.timing,
            Self::Text(t) => &t.timing,
        }
    }

    /// Short human-readable label for log lines.
    pub fn label(&self) -> &str {
        match self {
            Self::Media(m) if !m.name.is_empty() => &m.name,
            Self::Media(m) => &m.id,
            Self::Text(t) => &t.content,
        }
    }
}

impl TimelineTrack {
    pub fn new(id: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            track_type,
            elements: vec![],
            muted: false,
        }
    }

    pub fn with_element(mut self, element: TimelineElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    pub fn media_elements(&self) -> impl Iterator<Item = &MediaElement> {
        self.elements.iter().filter_map(|e| match e {
            TimelineElement::Media(m) => Some(m),
            TimelineElement::Text(_) => None,
        })
    }

    pub fn text_elements(&self) -> impl Iterator<Item = &TextElement> {
        self.elements.iter().filter_map(|e| match e {
            TimelineElement::Text(t) => Some(t),
            TimelineElement::Media(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_duration_subtracts_both_trims() {
        let timing = ElementTiming::new(2.0, 10.0).with_trim(1.5, 2.5);
        assert!((timing.effective_duration() - 6.0).abs() < 1e-9);
        assert!((timing.end_time() - 8.0).abs() < 1e-9);
        assert!((timing.source_end() - 7.5).abs() < 1e-9);
        assert!(timing.is_trimmed());
    }

    #[test]
    fn test_element_deserializes_from_tagged_json() {
        let json = r#"[
            {"type":"media","id":"e1","mediaId":"m1","startTime":0,"duration":5,"trimStart":0,"trimEnd":1},
            {"type":"text","id":"e2","content":"Hello","startTime":1,"duration":2,"fontSize":32}
        ]"#;
        let elements: Vec<TimelineElement> = serde_json::from_str(json).unwrap();

        match &elements[0] {
            TimelineElement::Media(m) => {
                assert_eq!(m.media_id, "m1");
                assert!((m.timing.trim_end - 1.0).abs() < 1e-9);
            }
            other => panic!("expected media element, got {other:?}"),
        }
        match &elements[1] {
            TimelineElement::Text(t) => {
                assert_eq!(t.font_family, "Inter");
                assert!((t.font_size - 32.0).abs() < 1e-9);
                assert_eq!(t.color, "#ffffff");
            }
            other => panic!("expected text element, got {other:?}"),
        }
    }

    #[test]
    fn test_track_filters_elements_by_kind() {
        let track = TimelineTrack::new("t1", TrackType::Media)
            .with_element(TimelineElement::Media(MediaElement {
                id: "a".to_string(),
                name: String::new(),
                media_id: "m".to_string(),
                timing: ElementTiming::new(0.0, 1.0),
            }))
            .with_element(TimelineElement::Text(TextElement {
                id: "b".to_string(),
                name: String::new(),
                content: "hi".to_string(),
                font_family: "Inter".to_string(),
                font_size: 24.0,
                color: "white".to_string(),
                x: 0.0,
                y: 0.0,
                timing: ElementTiming::new(0.0, 1.0),
            }));

        assert_eq!(track.media_elements().count(), 1);
        assert_eq!(track.text_elements().count(), 1);
        assert_eq!(track.elements[1].label(), "hi");
    }
}
