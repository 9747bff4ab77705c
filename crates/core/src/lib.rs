//! luabox-core: project manifest, host APIs and script runner for luabox
//!
//! This crate turns a `Project.yml` command into a sandboxed script run and maps the outcome to a
//! process exit code.

mod api;
mod error;
pub mod manifest;
mod script;

pub use error::CoreError;
pub use manifest::Project;
pub use script::run_script;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
