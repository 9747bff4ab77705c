use std::path::Path;

use luabox_core::manifest::ArgValues;
use luabox_core::{CoreError, run_script};
use luabox_lua::{OsPolicy, SandboxConfig};

pub fn cmd_run(script: &Path, os: OsPolicy) -> Result<u8, CoreError> {
    let sandbox = SandboxConfig::default().with_os(os);

    run_script(script, &sandbox, &ArgValues::new())
}
