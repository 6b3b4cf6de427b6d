/// Handles argument parsing and the command-line workflow.
pub mod cli;

/// Settings loading and defaults.
pub mod config;

/// Constants used throughout templar.
pub mod constants;

/// Render context and computed fields.
pub mod context;

/// Defines custom error types.
pub mod error;

/// A set of helpers for working with the file system.
pub mod ioutils;

/// Engine resolution and the render entry point.
pub mod pipeline;

/// Host/port normalization, token substitution and output persistence.
pub mod postprocess;

/// Template engines.
pub mod renderer;

/// Import whitelisting for legacy templates.
pub mod security;

pub use pipeline::{RenderRequest, RenderResult, Templar};
