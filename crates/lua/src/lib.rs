//! luabox-lua: embedding adapter over the Lua 5.4 C API
//!
//! This crate provides:
//! - `Engine`: single-owner handle of a `lua_State`, closed on drop
//! - `State`: stack operations (load, protected call, push/pop, tables, userdata)
//! - `SandboxConfig`: the allow-list of standard libraries and the `os` policy
//! - Rust functions callable from Lua via `State::push_fn`

mod engine;
mod error;
mod sandbox;
mod state;
mod types;

pub use engine::Engine;
pub use error::{CallbackError, EngineError, Result, render_chain};
pub use sandbox::{DEFAULT_LIBRARIES, Library, OsPolicy, REMOVED_OS_FUNCTIONS, SandboxConfig};
pub use state::{State, upvalue_index};
pub use types::Type;

/// Raw Lua C API, re-exported for hosts that need entry points this crate does not wrap.
pub use mlua::ffi;
