//! Capability sandbox for new Lua states.
//!
//! Scripts only see the standard libraries listed in [`SandboxConfig::libraries`], registered in
//! order by a single loop. The `os` library is controlled separately by [`OsPolicy`] since it is
//! the one that can terminate the host process or change process-wide locale.
//!
//! Lua does not verify precompiled chunks so the base library's `load`, `loadfile` and `dofile`
//! are replaced with text-only versions unless [`SandboxConfig::binary_chunks`] is set.

use std::ffi::{CStr, c_int};
use std::ptr::{null, null_mut};

use mlua::ffi::{self, lua_CFunction, lua_State};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::{State, upvalue_index};

/// Entries of the `os` library that are removed under [`OsPolicy::Hardened`].
pub const REMOVED_OS_FUNCTIONS: [&CStr; 2] = [c"exit", c"setlocale"];

/// Standard libraries registered when no explicit list is configured.
pub const DEFAULT_LIBRARIES: [Library; 7] = [
    Library::Base,
    Library::Coroutine,
    Library::Table,
    Library::Io,
    Library::String,
    Library::Math,
    Library::Utf8,
];

/// Standard library that can be put on the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Library {
    Base,
    Coroutine,
    Table,
    Io,
    String,
    Math,
    Utf8,
}

impl Library {
    /// Name of the global the library is stored in.
    pub const fn global(self) -> &'static CStr {
        match self {
            Self::Base => c"_G",
            Self::Coroutine => c"coroutine",
            Self::Table => c"table",
            Self::Io => c"io",
            Self::String => c"string",
            Self::Math => c"math",
            Self::Utf8 => c"utf8",
        }
    }

    fn opener(self) -> lua_CFunction {
        match self {
            Self::Base => ffi::luaopen_base,
            Self::Coroutine => ffi::luaopen_coroutine,
            Self::Table => ffi::luaopen_table,
            Self::Io => ffi::luaopen_io,
            Self::String => ffi::luaopen_string,
            Self::Math => ffi::luaopen_math,
            Self::Utf8 => ffi::luaopen_utf8,
        }
    }
}

/// How the `os` library is exposed to scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsPolicy {
    /// `os` is not registered at all.
    Disabled,
    /// `os` is registered without [`REMOVED_OS_FUNCTIONS`].
    #[default]
    Hardened,
    /// `os` is registered as shipped with Lua.
    Full,
}

impl OsPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Hardened => "hardened",
            Self::Full => "full",
        }
    }
}

impl std::str::FromStr for OsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "hardened" => Ok(Self::Hardened),
            "full" => Ok(Self::Full),
            v => Err(format!("unknown os policy '{v}'")),
        }
    }
}

/// Sandbox applied to a state right after it is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SandboxConfig {
    pub libraries: Vec<Library>,
    pub os: OsPolicy,
    /// Allow scripts to load precompiled chunks.
    pub binary_chunks: bool,
}

impl SandboxConfig {
    pub fn with_os(mut self, os: OsPolicy) -> Self {
        self.os = os;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            libraries: DEFAULT_LIBRARIES.to_vec(),
            os: OsPolicy::default(),
            binary_chunks: false,
        }
    }
}

/// Registers the libraries `config` allows. The stack is left as it was.
pub(crate) fn apply(state: &State, config: &SandboxConfig) -> Result<()> {
    // luaL_requiref pushes the module and the opener needs a couple of slots on its own.
    state.check_stack(3)?;

    for lib in &config.libraries {
        unsafe { ffi::luaL_requiref(state.as_ptr(), lib.global().as_ptr(), lib.opener(), 1) };
        unsafe { ffi::lua_pop(state.as_ptr(), 1) };
    }

    if !config.binary_chunks && config.libraries.contains(&Library::Base) {
        text_only_chunks(state);
    }

    match config.os {
        OsPolicy::Disabled => (),
        OsPolicy::Full => {
            state.require_os()?;
            unsafe { ffi::lua_pop(state.as_ptr(), 1) };
        }
        OsPolicy::Hardened => {
            state.require_os()?;
            harden_os(state)?;
            unsafe { ffi::lua_pop(state.as_ptr(), 1) };
        }
    }

    debug!(
        libraries = config.libraries.len(),
        os = config.os.as_str(),
        binary_chunks = config.binary_chunks,
        "sandbox applied"
    );

    Ok(())
}

/// Removes [`REMOVED_OS_FUNCTIONS`] from the `os` table on the top of the stack.
pub(crate) fn harden_os(state: &State) -> Result<()> {
    for name in REMOVED_OS_FUNCTIONS {
        state.push_nil()?;
        unsafe { ffi::lua_setfield(state.as_ptr(), -2, name.as_ptr()) };
    }

    Ok(())
}

/// Replaces the chunk loaders of the base library. Requires two free slots.
#[allow(non_snake_case)]
fn text_only_chunks(state: &State) {
    let L = state.as_ptr();
    let wrapped: [(&CStr, lua_CFunction); 2] = [
        (c"load", text_mode::<3>),
        (c"loadfile", text_mode::<2>),
    ];

    for (name, f) in wrapped {
        unsafe {
            ffi::lua_getglobal(L, name.as_ptr());
            ffi::lua_pushcclosure(L, f, 1);
            ffi::lua_setglobal(L, name.as_ptr());
        }
    }

    unsafe {
        ffi::lua_pushcclosure(L, dofile_text, 0);
        ffi::lua_setglobal(L, c"dofile".as_ptr());
    }
}

/// Calls upvalue 1 with argument `MODE` forced to `"t"`. Arguments after it are kept as given
/// since `load` treats a missing `env` differently from `nil`.
#[allow(non_snake_case)]
unsafe extern "C-unwind" fn text_mode<const MODE: c_int>(L: *mut lua_State) -> c_int {
    unsafe {
        if ffi::lua_gettop(L) < MODE {
            ffi::lua_settop(L, MODE);
        }

        ffi::lua_pushstring(L, c"t".as_ptr());
        ffi::lua_replace(L, MODE);
        ffi::lua_pushvalue(L, upvalue_index(1));
        ffi::lua_insert(L, 1);
        ffi::lua_call(L, ffi::lua_gettop(L) - 1, ffi::LUA_MULTRET);
        ffi::lua_gettop(L)
    }
}

/// `dofile` that only accepts source text.
#[allow(non_snake_case)]
unsafe extern "C-unwind" fn dofile_text(L: *mut lua_State) -> c_int {
    unsafe {
        let name = ffi::luaL_optlstring(L, 1, null(), null_mut());

        ffi::lua_settop(L, 1);

        if ffi::luaL_loadfilex(L, name, c"t".as_ptr()) != ffi::LUA_OK {
            return ffi::lua_error(L);
        }

        ffi::lua_call(L, 0, ffi::LUA_MULTRET);
        ffi::lua_gettop(L) - 1
    }
}
