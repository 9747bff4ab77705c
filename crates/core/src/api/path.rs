use std::ffi::c_int;
use std::path::PathBuf;

use luabox_lua::{CallbackError, EngineError, State};

use super::path_components;

/// Registers the `path` global.
pub fn register(state: &mut State) -> Result<(), EngineError> {
    state.push_table(0, 1)?;
    state.push_fn(join)?;

    unsafe {
        state.set_field(-2, c"join");
        state.set_global(c"path");
    }

    Ok(())
}

/// `path.join(...)`
fn join(state: &mut State) -> Result<c_int, CallbackError> {
    let path: PathBuf = path_components(state)?.into_iter().collect();

    // All components are UTF-8 so the result is too.
    state.push_str(path.to_string_lossy().as_bytes())?;

    Ok(1)
}
