//! Source media assets referenced by timeline elements.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of decoded source asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
    Audio,
}

impl MediaType {
    /// Whether the asset contributes a picture layer.
    pub fn is_visual(self) -> bool {
        matches!(self, Self::Video | Self::Image)
    }
}

/// A decoded source asset. Immutable for the duration of an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub media_type: MediaType,

    /// On-disk location used to hydrate the payload when loading a snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Raw bytes written into the engine's input space.
    #[serde(skip)]
    pub payload: Option<Arc<[u8]>>,

    /// Whether a video asset carries an audio stream.
    #[serde(default)]
    pub has_audio: Option<bool>,

    /// Intrinsic duration in seconds, when known.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            media_type,
            path: None,
            payload: None,
            has_audio: None,
            duration: None,
        }
    }

    pub fn with_payload(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.payload = Some(bytes.into());
        self
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = Some(has_audio);
        self
    }

    /// Whether this item feeds an audio stage.
    pub fn contributes_audio(&self) -> bool {
        match self.media_type {
            MediaType::Audio => true,
            MediaType::Video => self.has_audio.unwrap_or(false),
            MediaType::Image => false,
        }
    }

    /// Name under which the payload is stored in the engine's input space.
    /// Distinct ids always get distinct names.
    pub fn input_file_name(&self) -> String {
        format!("media_{}", safe_file_stem(&self.id))
    }
}

/// Render `raw` as a file stem that is safe both on disk and inside a
/// filter argument.
///
/// Lowercase ASCII letters, digits and `-` pass through, `_` is doubled and
/// every other byte becomes `_` followed by two hex digits. The mapping is
/// injective.
pub fn safe_file_stem(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => out.push(char::from(byte)),
            b'_' => out.push_str("__"),
            other => out.push_str(&format!("_{other:02x}")),
        }
    }
    out
}
