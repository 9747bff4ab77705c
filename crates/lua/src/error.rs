//! Error types for luabox-lua

use std::ffi::c_int;
use std::fmt::{self, Display, Formatter, Write};
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the adapter itself.
///
/// Script compile and runtime errors are not represented here: those follow the engine convention
/// of a `false` return with the error value left on the Lua stack.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `luaL_newstate` could not allocate a state. Treat as fatal.
    #[error("not enough memory to create Lua state")]
    OutOfMemory,

    /// The Lua stack cannot grow by the number of slots an operation needs.
    #[error("out of Lua stack (need {required} more slots)")]
    OutOfStack { required: c_int },

    #[error("failed to read {}", path.display())]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Returns `true` for conditions a host must not attempt to recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory)
    }
}

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error returned from a Rust function registered with [`State::push_fn`](crate::State::push_fn).
///
/// It is raised as a Lua error once the callback has returned.
#[derive(Debug)]
pub struct CallbackError {
    msg: String,
    src: Option<Box<dyn std::error::Error>>,
}

impl CallbackError {
    /// `msg` is typically a concise lowercase sentence without trailing punctuation (e.g. `failed
    /// to open 'foo'`).
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            src: None,
        }
    }

    pub fn with_source(msg: impl Into<String>, src: impl std::error::Error + 'static) -> Self {
        Self {
            msg: msg.into(),
            src: Some(Box::new(src)),
        }
    }

    /// Error for an argument at position `arg` (1-based, matching Lua's own messages).
    pub fn argument(arg: c_int, msg: impl Display) -> Self {
        Self::new(format!("bad argument #{arg} ({msg})"))
    }
}

impl Display for CallbackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)?;

        let mut src = self.src.as_deref();

        while let Some(e) = src {
            write!(f, " -> {e}")?;
            src = e.source();
        }

        Ok(())
    }
}

impl std::error::Error for CallbackError {}

impl From<EngineError> for CallbackError {
    fn from(value: EngineError) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for CallbackError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CallbackError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Renders `e` and its whole source chain the same way [`CallbackError`] does.
pub fn render_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut src = e.source();

    while let Some(v) = src {
        // Writing into a String cannot fail.
        let _ = write!(out, " -> {v}");
        src = v.source();
    }

    out
}
