pub mod check;
pub mod debug;
pub mod export;
pub mod validate;

use std::path::Path;

use framecut_common::error::{FramecutError, FramecutResult};
use framecut_timeline::ExportProject;

/// Load a snapshot, reporting failures as project errors.
pub fn load_project(path: &Path) -> FramecutResult<ExportProject> {
    ExportProject::load(path).map_err(|e| FramecutError::project(e.to_string()))
}
