//! Host APIs exposed to scripts on top of the sandboxed standard libraries.
//!
//! - `os.arch`, `os.kind` and the process/filesystem helpers in [`os`]
//! - `path.join()`
//! - `string.capitalize()`
//! - `json.parse()`
//! - `exit()`, see [`ExitRequest`]
//! - `args`, the parsed arguments of the invoked command

use std::ffi::c_int;

use luabox_lua::{CallbackError, EngineError, State};

use crate::manifest::ArgValues;

pub use self::global::ExitRequest;

mod args;
mod global;
mod json;
mod os;
mod path;
mod string;

/// Rust function callable from Lua.
type HostFn = fn(&mut State) -> Result<c_int, CallbackError>;

/// Registers every host API into `state`. The stack is left as it was.
///
/// The returned [`ExitRequest`] is set once the script calls `exit()`.
pub fn register(state: &mut State, args: &ArgValues) -> Result<ExitRequest, EngineError> {
    self::os::register(state)?;
    self::path::register(state)?;
    self::string::register(state)?;
    self::json::register(state)?;
    self::args::register(state, args)?;

    self::global::register(state)
}

/// Collects the arguments of the running function as path components.
///
/// At least one component is required. Each one must be a UTF-8 string or a number.
fn path_components(state: &State) -> Result<Vec<String>, CallbackError> {
    let mut components = vec![state.arg_to_str(1)?.to_owned()];

    for i in 2..=state.arg_count() {
        components.push(state.arg_to_str(i)?.to_owned());
    }

    Ok(components)
}
