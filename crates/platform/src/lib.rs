//! Platform detection for luabox
//!
//! This crate provides the OS and architecture names exposed to scripts as `os.kind` and
//! `os.arch`.

mod platform;

pub use platform::{Arch, Os, Platform};
