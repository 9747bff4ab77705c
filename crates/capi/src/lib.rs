//! luabox-capi: flat C interface over luabox-lua
//!
//! C hosts include `include/luabox.h`, which must be kept in sync with this file.
//!
//! Every function takes the `lua_State *` returned by [`luabox_new()`]. Stack indices are not
//! validated; passing an invalid one is undefined behavior the same as in the Lua C API.
//!
//! Failures Lua itself would turn into a process abort (stack overflow on push) are reported as
//! [`LuaboxStatus::OutOfStack`] or a NULL return instead.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::{NonNull, null, null_mut};

use luabox_lua::ffi::{self, lua_CFunction, lua_State};
use luabox_lua::{Engine, EngineError, OsPolicy, SandboxConfig, State};
use tracing::warn;

/// Do not register the `os` library.
pub const LUABOX_OS_DISABLED: c_int = 0;
/// Register `os` without `os.exit` and `os.setlocale`.
pub const LUABOX_OS_HARDENED: c_int = 1;
/// Register `os` unchanged.
pub const LUABOX_OS_FULL: c_int = 2;

/// Outcome of an operation that can fail without aborting.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaboxStatus {
    /// Success.
    Ok = 0,
    /// Script error. The error object is on the top of the stack.
    Error = 1,
    /// Not enough stack space. Nothing was pushed.
    OutOfStack = 2,
}

impl From<luabox_lua::Result<bool>> for LuaboxStatus {
    fn from(value: luabox_lua::Result<bool>) -> Self {
        match value {
            Ok(true) => Self::Ok,
            Ok(false) => Self::Error,
            Err(e) => Self::from(e),
        }
    }
}

impl From<luabox_lua::Result<()>> for LuaboxStatus {
    fn from(value: luabox_lua::Result<()>) -> Self {
        match value {
            Ok(_) => Self::Ok,
            Err(e) => Self::from(e),
        }
    }
}

impl From<EngineError> for LuaboxStatus {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::OutOfStack { .. } => Self::OutOfStack,
            e => {
                warn!(error = %e, "unexpected engine error");
                Self::Error
            }
        }
    }
}

/// # Safety
/// `L` must be a live state created by [`luabox_new()`].
#[allow(non_snake_case)]
unsafe fn state(L: *mut lua_State) -> State {
    unsafe { State::from_raw(NonNull::new_unchecked(L)) }
}

/// Creates a state with the standard library allow-list registered and `os` exposed according to
/// `os_policy` (one of the `LUABOX_OS_*` constants).
///
/// Returns NULL when the state cannot be allocated or `os_policy` is unknown. An allocation
/// failure is fatal; the host should not retry.
#[unsafe(no_mangle)]
pub extern "C" fn luabox_new(os_policy: c_int) -> *mut lua_State {
    let os = match os_policy {
        LUABOX_OS_DISABLED => OsPolicy::Disabled,
        LUABOX_OS_HARDENED => OsPolicy::Hardened,
        LUABOX_OS_FULL => OsPolicy::Full,
        v => {
            warn!(policy = v, "unknown os policy");
            return null_mut();
        }
    };

    match Engine::with_sandbox(&SandboxConfig::default().with_os(os)) {
        Ok(en) => en.into_raw().as_ptr(),
        Err(e) => {
            warn!(error = %e, "failed to create Lua state");
            null_mut()
        }
    }
}

/// Closes a state created by [`luabox_new()`]. NULL is ignored.
///
/// # Safety
/// `L` must not be used after this call, including a second call to this function.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_free(L: *mut lua_State) {
    if let Some(L) = NonNull::new(L) {
        drop(unsafe { Engine::from_raw(L) });
    }
}

/// Registers the `os` library and leaves its table on the stack.
///
/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_require_os(L: *mut lua_State) -> LuaboxStatus {
    unsafe { state(L) }.require_os().into()
}

/// Compiles `len` bytes of source text at `script` as a chunk named `name`.
///
/// On [`LuaboxStatus::Ok`] the chunk is on the stack; on [`LuaboxStatus::Error`] the compile error
/// is.
///
/// # Safety
/// `L` must be a live state, `name` a NUL-terminated string and `script` valid for `len` bytes.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_load(
    L: *mut lua_State,
    name: *const c_char,
    script: *const c_char,
    len: usize,
) -> LuaboxStatus {
    let name = unsafe { CStr::from_ptr(name) };
    let script: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(script.cast::<u8>(), len) }
    };

    unsafe { state(L) }.load(name, script).into()
}

/// Calls the value below `nargs` arguments in protected mode.
///
/// # Safety
/// Same as `lua_pcall`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_pcall(
    L: *mut lua_State,
    nargs: c_int,
    nresults: c_int,
    msgh: c_int,
) -> LuaboxStatus {
    unsafe { state(L).pcall(nargs, nresults, msgh) }.into()
}

/// Returns `true` if the stack can grow by `n` slots.
///
/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_checkstack(L: *mut lua_State, n: c_int) -> bool {
    unsafe { state(L) }.check_stack(n).is_ok()
}

/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_gettop(L: *mut lua_State) -> c_int {
    unsafe { state(L) }.top()
}

/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_pushnil(L: *mut lua_State) -> LuaboxStatus {
    unsafe { state(L) }.push_nil().into()
}

/// Pushes a copy of `s` and returns Lua's internal copy, or NULL if the stack is full.
///
/// # Safety
/// `L` must be a live state and `s` a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_pushstring(L: *mut lua_State, s: *const c_char) -> *const c_char {
    if unsafe { state(L) }.check_stack(1).is_err() {
        return null();
    }

    unsafe { ffi::lua_pushstring(L, s) }
}

/// # Safety
/// Same as `lua_pushcclosure`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_pushcclosure(
    L: *mut lua_State,
    f: lua_CFunction,
    n: c_int,
) -> LuaboxStatus {
    unsafe { state(L).push_cfn(f, n) }.into()
}

/// # Safety
/// `L` must be a live state and `index` valid.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_isnil(L: *mut lua_State, index: c_int) -> bool {
    unsafe { state(L).is_nil(index) }
}

/// Converts the value at `index` to an integer. `isnum`, when not NULL, receives whether the
/// conversion succeeded.
///
/// # Safety
/// `L` must be a live state and `index` valid.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_tointegerx(
    L: *mut lua_State,
    index: c_int,
    isnum: *mut c_int,
) -> i64 {
    unsafe { ffi::lua_tointegerx(L, index, isnum) }
}

/// Returns the string at `index` (converting a number in place), or NULL for other types.
///
/// The pointer is owned by Lua and valid until the slot is popped or replaced.
///
/// # Safety
/// `L` must be a live state and `index` valid.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_tostring(L: *mut lua_State, index: c_int) -> *const c_char {
    unsafe { ffi::lua_tolstring(L, index, null_mut()) }
}

/// Returns the name of the type of the value at `index`. The string is static.
///
/// # Safety
/// `L` must be a live state and `index` valid.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_typename(L: *mut lua_State, index: c_int) -> *const c_char {
    unsafe { ffi::lua_typename(L, ffi::lua_type(L, index)) }
}

/// # Safety
/// The stack must have at least `n` values.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_pop(L: *mut lua_State, n: c_int) {
    unsafe { state(L).pop(n) };
}

/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_createtable(
    L: *mut lua_State,
    narr: c_int,
    nrec: c_int,
) -> LuaboxStatus {
    unsafe { state(L) }.push_table(narr, nrec).into()
}

/// Pops a value and assigns it to `t[k]` where `t` is the value at `index`.
///
/// # Safety
/// Same as `lua_setfield`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_setfield(L: *mut lua_State, index: c_int, k: *const c_char) {
    unsafe { state(L).set_field(index, CStr::from_ptr(k)) };
}

/// Pushes a userdata of `size` bytes with `nuv` user values and returns its block, or NULL if the
/// stack is full.
///
/// # Safety
/// `L` must be a live state.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_newuserdatauv(
    L: *mut lua_State,
    size: usize,
    nuv: c_int,
) -> *mut c_void {
    match unsafe { state(L) }.new_userdata(size, nuv) {
        Ok(v) => v.as_ptr(),
        Err(_) => null_mut(),
    }
}

/// Pops a table (or nil) and sets it as the metatable of the value at `index`.
///
/// # Safety
/// Same as `lua_setmetatable`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn luabox_setmetatable(L: *mut lua_State, index: c_int) {
    unsafe { state(L).set_metatable(index) };
}

/// Pseudo-index of upvalue `i` of the running C function.
#[unsafe(no_mangle)]
pub extern "C" fn luabox_upvalueindex(i: c_int) -> c_int {
    luabox_lua::upvalue_index(i)
}
