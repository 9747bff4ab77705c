use std::ffi::{CStr, c_int};
use std::io::ErrorKind;
use std::path::PathBuf;

use luabox_lua::{CallbackError, EngineError, State, Type};
use luabox_platform::{Arch, Os, Platform};
use tracing::debug;

use super::{HostFn, path_components};

mod copy;
mod process;

const FUNCTIONS: [(&CStr, HostFn); 6] = [
    (c"capture", process::capture),
    (c"copyfile", copy::copyfile),
    (c"copyfileas", copy::copyfileas),
    (c"createdir", createdir),
    (c"removedir", removedir),
    (c"run", process::run),
];

/// Adds host functions to the `os` table. Nothing is added when the sandbox does not expose `os`.
pub fn register(state: &mut State) -> Result<(), EngineError> {
    if state.get_global(c"os")? != Type::Table {
        unsafe { state.pop(1) };
        debug!("os library is disabled, skipping host os APIs");
        return Ok(());
    }

    match Platform::current() {
        Some(p) => debug!(platform = %p, "registering host os APIs"),
        None => debug!("registering host os APIs on an unnamed platform"),
    }

    if let Some(v) = Arch::current() {
        state.push_str(v.as_str())?;
        unsafe { state.set_field(-2, c"arch") };
    }

    if let Some(v) = Os::current() {
        state.push_str(v.as_str())?;
        unsafe { state.set_field(-2, c"kind") };
    }

    for (name, f) in FUNCTIONS {
        state.push_fn(f)?;
        unsafe { state.set_field(-2, name) };
    }

    unsafe { state.pop(1) };

    Ok(())
}

/// `os.createdir(...)`: creates every directory along the joined path.
///
/// Returns a table with one boolean per component, `false` when it already existed.
fn createdir(state: &mut State) -> Result<c_int, CallbackError> {
    let components = path_components(state)?;
    let mut path = PathBuf::new();

    state.push_table(components.len().try_into().unwrap_or(0), 0)?;

    for (i, c) in components.iter().enumerate() {
        path.push(c);

        let created = match std::fs::create_dir(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => {
                return Err(CallbackError::with_source(
                    format!("failed to create {}", path.display()),
                    e,
                ));
            }
        };

        state.push_bool(created)?;
        unsafe { state.set_index(-2, i as i64 + 1) };
    }

    Ok(1)
}

/// `os.removedir(...)`: removes the joined path recursively. A missing directory is not an error.
fn removedir(state: &mut State) -> Result<c_int, CallbackError> {
    let path: PathBuf = path_components(state)?.into_iter().collect();

    if let Err(e) = std::fs::remove_dir_all(&path)
        && e.kind() != ErrorKind::NotFound
    {
        return Err(CallbackError::with_source(
            format!("failed to remove {}", path.display()),
            e,
        ));
    }

    Ok(0)
}
