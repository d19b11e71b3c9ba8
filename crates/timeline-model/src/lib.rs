//! Framecut Timeline Model
//!
//! Defines the value snapshot handed to the export compiler:
//! - **Timeline:** Tracks holding media and text elements with trim data
//! - **Media:** Decoded source assets referenced by media elements
//! - **Project:** Export settings, overall duration, and JSON loading
//!
//! All times are seconds on the output timeline. The compiler never mutates
//! a snapshot; it is built fresh for every export.

pub mod media;
pub mod project;
pub mod timeline;

pub use media::*;
pub use project::*;
pub use timeline::*;
