//! Error types shared across Framecut crates.

use std::path::PathBuf;

/// Top-level error type for Framecut operations.
#[derive(Debug, thiserror::Error)]
pub enum FramecutError {
    #[error("Engine initialization failed: {message}")]
    EngineInit { message: String },

    #[error("Failed to write input '{name}': {message}")]
    InputWrite { name: String, message: String },

    #[error("Font '{family}' could not be resolved: {message}")]
    Font { family: String, message: String },

    #[error("Engine execution failed: {message}")]
    Execution { message: String, stderr: String },

    #[error("Export service is not initialized")]
    NotInitialized,

    #[error("Export was terminated")]
    Terminated,

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecutError.
pub type FramecutResult<T> = Result<T, FramecutError>;

/// Coarse classification used by callers to choose between retry, report and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Engine, input space or default font unavailable.
    Resource,
    /// The engine rejected or crashed on the assembled command.
    Execution,
    /// Service used outside its init/terminate lifecycle.
    Lifecycle,
    /// Malformed caller input (project file, configuration).
    Input,
}

impl FramecutError {
    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::EngineInit {
            message: msg.into(),
        }
    }

    pub fn input_write(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InputWrite {
            name: name.into(),
            message: msg.into(),
        }
    }

    pub fn font(family: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Font {
            family: family.into(),
            message: msg.into(),
        }
    }

    pub fn execution(msg: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            stderr: stderr.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EngineInit { .. }
            | Self::InputWrite { .. }
            | Self::Font { .. }
            | Self::FileNotFound { .. }
            | Self::Io(_) => ErrorClass::Resource,
            Self::Execution { .. } | Self::Other(_) => ErrorClass::Execution,
            Self::NotInitialized | Self::Terminated => ErrorClass::Lifecycle,
            Self::Project { .. } | Self::Config { .. } | Self::Json(_) => ErrorClass::Input,
        }
    }
}
