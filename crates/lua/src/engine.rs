use std::ffi::c_void;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use mlua::ffi::{self, lua_State};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::sandbox::{self, SandboxConfig};
use crate::state::State;

/// Encapsulates a `lua_State` owned by the host.
///
/// The state is closed exactly once when this value is dropped. It cannot be cloned and it does
/// not implement `Send` since Lua states are not thread-safe; create one engine per thread
/// instead.
pub struct Engine {
    state: State,
}

impl Engine {
    /// Creates a state with no libraries registered.
    ///
    /// Most hosts want [`Engine::with_sandbox()`] instead.
    pub fn new() -> Result<Self> {
        Self::from_new(unsafe { ffi::luaL_newstate() })
    }

    /// Creates a state and registers the libraries allowed by `config`.
    pub fn with_sandbox(config: &SandboxConfig) -> Result<Self> {
        let en = Self::new()?;

        sandbox::apply(&en, config)?;

        Ok(en)
    }

    /// Same as [`Engine::with_sandbox()`] but every allocation of the state goes through `alloc`.
    ///
    /// # Safety
    /// `alloc` must follow the `lua_Alloc` contract and `ud` must stay valid until the engine is
    /// dropped.
    pub unsafe fn with_allocator(
        alloc: ffi::lua_Alloc,
        ud: *mut c_void,
        config: &SandboxConfig,
    ) -> Result<Self> {
        let en = Self::from_new(unsafe { ffi::lua_newstate(alloc, ud) })?;

        sandbox::apply(&en, config)?;

        Ok(en)
    }

    fn from_new(state: *mut lua_State) -> Result<Self> {
        let state = NonNull::new(state).ok_or(EngineError::OutOfMemory)?;

        debug!(state = ?state, "Lua state created");

        Ok(Self {
            state: unsafe { State::from_raw(state) },
        })
    }

    /// Gives up ownership of the state without closing it.
    pub fn into_raw(self) -> NonNull<lua_State> {
        let state = self.state.as_ptr();

        std::mem::forget(self);

        // The pointer came from a NonNull in Engine::new().
        unsafe { NonNull::new_unchecked(state) }
    }

    /// # Safety
    /// `state` must come from [`Engine::into_raw()`] and must not be owned by anything else.
    pub unsafe fn from_raw(state: NonNull<lua_State>) -> Self {
        Self {
            state: unsafe { State::from_raw(state) },
        }
    }
}

impl Deref for Engine {
    type Target = State;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for Engine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        unsafe { ffi::lua_close(self.state.as_ptr()) };

        debug!(state = ?self.state.as_ptr(), "Lua state closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty() {
        let mut en = Engine::new().unwrap();

        assert_eq!(en.top(), 0);
        assert_eq!(en.get_global(c"print").unwrap(), crate::Type::Nil);

        unsafe { en.pop(1) };
    }

    #[test]
    fn raw_round_trip_keeps_state_alive() {
        let en = Engine::new().unwrap();

        en.push_int(5).unwrap();

        let raw = en.into_raw();
        let mut en = unsafe { Engine::from_raw(raw) };

        assert_eq!(unsafe { en.pop_int() }, Some(5));
    }
}
