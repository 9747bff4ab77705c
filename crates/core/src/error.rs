//! Error types for luabox-core

use std::path::PathBuf;

use luabox_lua::EngineError;
use thiserror::Error;

/// Errors that can occur while running a project command or script
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to open {}", path.display())]
    OpenProject {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load {}", path.display())]
    LoadProject {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no action is configured for command '{0}'")]
    NoCommandAction(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Compile error reported by Lua. The message already names the chunk.
    #[error("{0}")]
    LoadScript(String),

    /// Runtime error reported by Lua. The message already names the chunk.
    #[error("{0}")]
    RunScript(String),

    #[error("expect script to return an integer, got {0}")]
    InvalidResult(&'static str),

    #[error("expect script to return either nil or integer between 0 - 99, got {0}")]
    ResultOutOfRange(i64),
}

impl CoreError {
    /// Process exit code for this error.
    ///
    /// Codes 0 - 99 are reserved for the script result and 101 is a Rust panic.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RunScript(_) => 100,
            Self::OpenProject { .. } => 102,
            Self::LoadProject { .. } => 103,
            Self::NoCommandAction(_) => 104,
            Self::Engine(EngineError::ReadScript { .. }) => 105,
            Self::LoadScript(_) => 106,
            Self::InvalidResult(_) => 107,
            Self::ResultOutOfRange(_) => 108,
            Self::Engine(_) => 110,
        }
    }
}
