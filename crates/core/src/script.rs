use std::path::Path;

use luabox_lua::{Engine, SandboxConfig, Type};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::manifest::ArgValues;

/// Runs `script` in a new engine and returns the exit code it asked for.
///
/// The script may return `nil` (or nothing) for success, or an integer between 0 and 99. A code
/// passed to `exit()` takes precedence over both the result and a later error.
pub fn run_script(
    script: &Path,
    sandbox: &SandboxConfig,
    args: &ArgValues,
) -> Result<u8, CoreError> {
    let mut en = Engine::with_sandbox(sandbox)?;

    let exit = crate::api::register(&mut en, args)?;

    info!(script = %script.display(), "loading script");

    if !en.load_file(script)? {
        return Err(CoreError::LoadScript(unsafe { en.pop_error() }));
    }

    let ok = unsafe { en.pcall(0, 1, 0)? };

    if let Some(code) = exit.code() {
        debug!(code, "script exited");
        return Ok(code);
    }

    if !ok {
        return Err(CoreError::RunScript(unsafe { en.pop_error() }));
    }

    // Only integers are accepted but Lua converts integral floats and numeric strings too.
    let code = match unsafe { en.type_of(-1) } {
        Type::Nil => 0,
        ty @ (Type::Number | Type::String) => match unsafe { en.pop_int() } {
            Some(v) => v,
            None => return Err(CoreError::InvalidResult(ty.name())),
        },
        ty => return Err(CoreError::InvalidResult(ty.name())),
    };

    debug!(code, "script finished");

    match code {
        0..=99 => Ok(code as u8),
        v => Err(CoreError::ResultOutOfRange(v)),
    }
}
