//! `Project.yml` manifest.
//!
//! A project declares commands, each backed by a Lua script, and the sandbox those scripts run
//! in:
//!
//! ```yaml
//! sandbox:
//!   os: hardened
//! commands:
//!   build:
//!     description: Build the project
//!     script: scripts/build.lua
//!     args:
//!       release:
//!         description: Build with optimizations
//!         type: bool
//!         long: release
//! ```

pub use self::arg::{ArgName, ArgType, ArgValue, ArgValues, CommandArg};
pub use self::script::ScriptPath;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use luabox_lua::SandboxConfig;
use serde::Deserialize;
use tracing::debug;

use crate::error::CoreError;

mod arg;
mod script;

/// Contains data deserialized from `Project.yml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Project {
    pub sandbox: SandboxConfig,
    pub commands: BTreeMap<String, Command>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path).map_err(|source| CoreError::OpenProject {
            path: path.to_owned(),
            source,
        })?;

        let project: Self =
            serde_yaml::from_reader(file).map_err(|source| CoreError::LoadProject {
                path: path.to_owned(),
                source,
            })?;

        debug!(
            path = %path.display(),
            commands = project.commands.len(),
            "project loaded"
        );

        Ok(project)
    }
}

/// Project command.
#[derive(Debug, Deserialize)]
pub struct Command {
    pub description: String,
    #[serde(default)]
    pub args: BTreeMap<ArgName, CommandArg>,
    pub script: Option<ScriptPath>,
}
