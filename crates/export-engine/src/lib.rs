//! Framecut Export Engine
//!
//! Compiles an editor timeline snapshot into a single ffmpeg invocation
//! and drives it to a finished video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! media items ──► write inputs ──┐
//!                                │
//! media tracks ──► MediaProcessor ── scale/pad + overlay chain, audio stages
//!                                │         │ LayerCursor
//! text tracks ───► TextProcessor ─── drawtext layers (by start time)
//!                       ▲        │         │
//!                  FontManager   │         ▼
//!                                └── CommandBuilder (validate, drop, mix)
//!                                          │
//!                                          ▼
//!                                   MediaEngine::exec
//!                                          │
//!                                          ▼
//!                                     output.mp4
//! ```

pub mod command;
pub mod engine;
pub mod fonts;
pub mod media;
pub mod service;
pub mod stage;
pub mod text;
pub mod validator;

pub use command::{BuiltCommand, CommandBuilder, EncoderPreset};
pub use engine::{EngineFactory, ExecOutcome, FfmpegEngine, MediaEngine};
pub use fonts::{DirectoryFontSource, FontHandle, FontManager, FontSource, InMemoryFontSource};
pub use media::{InputDeclaration, MediaPassOutput, MediaProcessor};
pub use service::*;
pub use stage::{LayerCursor, Stage, StageKind};
pub use text::{sanitize_text, TextPassOutput, TextProcessor};
pub use validator::{clean_joined_stages, FilterValidator, StageListValidation, ValidationReport};
