use std::any::Any;
use std::ffi::{CStr, c_int, c_void};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::ptr::NonNull;

use mlua::ffi::{self, lua_CFunction, lua_State};
use tracing::trace;

use crate::Type;
use crate::error::{CallbackError, EngineError, Result};

/// Stack operations on a `lua_State` that this value does not own.
///
/// [`Engine`](crate::Engine) dereferences to this type and Rust functions pushed with
/// [`State::push_fn()`] receive one for the state that called them.
///
/// Any method that requires a mutable borrow indicates it is going to pop the Lua stack. This
/// keeps borrowed values like the result of [`State::to_string()`] from outliving their slot.
///
/// Methods taking a stack index are `unsafe`: the index must refer to an existing slot (or be a
/// valid pseudo-index) the same way the Lua C API requires.
pub struct State(NonNull<lua_State>);

impl State {
    /// # Safety
    /// `L` must be a valid `lua_State` that outlives the returned value.
    #[allow(non_snake_case)]
    pub unsafe fn from_raw(L: NonNull<lua_State>) -> Self {
        Self(L)
    }

    pub fn as_ptr(&self) -> *mut lua_State {
        self.0.as_ptr()
    }

    /// Ensures the stack can grow by `n` slots.
    ///
    /// Lua aborts the process when a push overflows the stack so every push in this type goes
    /// through here first.
    pub fn check_stack(&self, n: c_int) -> Result<()> {
        if n <= 0 || unsafe { ffi::lua_checkstack(self.as_ptr(), n) } != 0 {
            Ok(())
        } else {
            Err(EngineError::OutOfStack { required: n })
        }
    }

    pub fn top(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }

    /// Registers the `os` library as a global and leaves its table on the stack.
    pub fn require_os(&self) -> Result<()> {
        self.check_stack(3)?;

        unsafe { ffi::luaL_requiref(self.as_ptr(), c"os".as_ptr(), ffi::luaopen_os, 1) };

        Ok(())
    }

    /// Compiles `script` as a text chunk named `name`.
    ///
    /// On `Ok(true)` the chunk is on the top of the stack. On `Ok(false)` the compile error is
    /// there instead.
    pub fn load(&self, name: &CStr, script: &[u8]) -> Result<bool> {
        self.check_stack(1)?;

        let r = unsafe {
            ffi::luaL_loadbufferx(
                self.as_ptr(),
                script.as_ptr().cast(),
                script.len(),
                name.as_ptr(),
                c"t".as_ptr(),
            )
        };

        trace!(name = %name.to_string_lossy(), ok = r == ffi::LUA_OK, "chunk loaded");

        Ok(r == ffi::LUA_OK)
    }

    /// Reads the whole content of `file` into memory and loads it the same as [`State::load()`].
    ///
    /// The chunk name is `@` followed by the path so Lua reports errors against the file.
    pub fn load_file(&self, file: impl AsRef<Path>) -> Result<bool> {
        let path = file.as_ref();
        let script = std::fs::read(path).map_err(|source| EngineError::ReadScript {
            path: path.to_owned(),
            source,
        })?;

        // Chunk name.
        let file = path.to_string_lossy();
        let mut name = Vec::with_capacity(1 + file.len() + 1);

        name.push(b'@');
        name.extend(file.bytes().filter(|&b| b != 0));
        name.push(0);

        let name = CStr::from_bytes_with_nul(&name).map_err(|_| EngineError::ReadScript {
            path: path.to_owned(),
            source: std::io::Error::other("path cannot be used as a chunk name"),
        })?;

        self.load(name, &script)
    }

    /// Calls the function below `nargs` arguments in protected mode.
    ///
    /// On `Ok(true)` the function and its arguments are replaced with `nresults` values. On
    /// `Ok(false)` they are replaced with the error object.
    ///
    /// # Safety
    /// The stack must have a value to call followed by `nargs` arguments. `msgh` must be either
    /// zero or a valid index of a message handler.
    pub unsafe fn pcall(&mut self, nargs: c_int, nresults: c_int, msgh: c_int) -> Result<bool> {
        if nresults != ffi::LUA_MULTRET {
            self.check_stack(nresults)?;
        }

        Ok(unsafe { ffi::lua_pcall(self.as_ptr(), nargs, nresults, msgh) } == ffi::LUA_OK)
    }

    pub fn push_nil(&self) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushnil(self.as_ptr()) };
        Ok(())
    }

    pub fn push_bool(&self, v: bool) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushboolean(self.as_ptr(), v.into()) };
        Ok(())
    }

    pub fn push_int(&self, v: i64) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushinteger(self.as_ptr(), v) };
        Ok(())
    }

    pub fn push_number(&self, v: f64) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushnumber(self.as_ptr(), v) };
        Ok(())
    }

    pub fn push_string(&self, s: impl AsRef<CStr>) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushstring(self.as_ptr(), s.as_ref().as_ptr()) };
        Ok(())
    }

    /// Same as [`State::push_string()`] but `s` may contain NUL.
    pub fn push_str(&self, s: impl AsRef<[u8]>) -> Result<()> {
        let s = s.as_ref();

        self.check_stack(1)?;
        unsafe { ffi::lua_pushlstring(self.as_ptr(), s.as_ptr().cast(), s.len()) };
        Ok(())
    }

    pub fn push_table(&self, narr: c_int, nrec: c_int) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_createtable(self.as_ptr(), narr, nrec) };
        Ok(())
    }

    /// Pushes a C closure that captures the top `nup` values as its upvalues.
    ///
    /// # Safety
    /// The stack must have at least `nup` values.
    pub unsafe fn push_cfn(&mut self, f: lua_CFunction, nup: c_int) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushcclosure(self.as_ptr(), f, nup) };
        Ok(())
    }

    /// Pushes a Lua function that invokes `f`.
    ///
    /// `f` is moved into a userdata owned by the returned function and dropped when Lua collects
    /// it (or when the state is closed). Returning an error from `f`, or panicking inside it,
    /// raises a Lua error in the calling script.
    pub fn push_fn<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&mut State) -> std::result::Result<c_int, CallbackError> + 'static,
    {
        // Userdata, metatable and finalizer.
        self.check_stack(3)?;

        // Move the boxed function into a userdata so Lua controls its lifetime.
        let f = Box::into_raw(Box::new(f));

        unsafe {
            let slot = ffi::lua_newuserdatauv(self.as_ptr(), size_of::<*mut F>(), 0);

            slot.cast::<*mut F>().write_unaligned(f);

            ffi::lua_createtable(self.as_ptr(), 0, 1);
            ffi::lua_pushcclosure(self.as_ptr(), finalizer::<F>, 0);
            ffi::lua_setfield(self.as_ptr(), -2, c"__gc".as_ptr());
            ffi::lua_setmetatable(self.as_ptr(), -2);
            ffi::lua_pushcclosure(self.as_ptr(), invoker::<F>, 1);
        }

        Ok(())
    }

    /// Pushes a new userdata block of `size` bytes with `nuv` user values and returns its address.
    ///
    /// The block is owned by Lua and lives until the userdata is collected.
    pub fn new_userdata(&self, size: usize, nuv: c_int) -> Result<NonNull<c_void>> {
        self.check_stack(1)?;

        let ptr = unsafe { ffi::lua_newuserdatauv(self.as_ptr(), size, nuv) };

        // Lua raises a memory error instead of returning NULL.
        NonNull::new(ptr).ok_or(EngineError::OutOfMemory)
    }

    /// Pops a table and sets it as the metatable of the value at `index`.
    ///
    /// # Safety
    /// `index` must be valid and the top of the stack must be a table or nil.
    pub unsafe fn set_metatable(&mut self, index: c_int) {
        unsafe { ffi::lua_setmetatable(self.as_ptr(), index) };
    }

    /// Pushes `t[key]` where `t` is the value at `table` and returns its type.
    ///
    /// # Safety
    /// `table` must be valid.
    pub unsafe fn get_field(&self, table: c_int, key: impl AsRef<CStr>) -> Result<Type> {
        self.check_stack(1)?;

        let ty = unsafe { ffi::lua_getfield(self.as_ptr(), table, key.as_ref().as_ptr()) };

        Ok(Type::from_raw(ty))
    }

    /// Pushes `t[index]` where `t` is the value at `table` and returns its type.
    ///
    /// # Safety
    /// `table` must be valid.
    pub unsafe fn get_index(&self, table: c_int, index: i64) -> Result<Type> {
        self.check_stack(1)?;

        let ty = unsafe { ffi::lua_geti(self.as_ptr(), table, index) };

        Ok(Type::from_raw(ty))
    }

    /// Pops a value and assigns it to `t[key]` where `t` is the value at `table`.
    ///
    /// # Safety
    /// - `table` must be valid.
    /// - Top of the stack must have a value for this field.
    pub unsafe fn set_field(&mut self, table: c_int, key: impl AsRef<CStr>) {
        unsafe { ffi::lua_setfield(self.as_ptr(), table, key.as_ref().as_ptr()) };
    }

    /// Pops a value and assigns it to `t[index]` where `t` is the value at `table`.
    ///
    /// # Safety
    /// - `table` must be valid.
    /// - Top of the stack must have a value for this index.
    pub unsafe fn set_index(&mut self, table: c_int, index: i64) {
        unsafe { ffi::lua_seti(self.as_ptr(), table, index) };
    }

    /// Pops a value and assigns it to `t[key]` where `t` is the value at `table`.
    ///
    /// Unlike [`State::set_field()`] the key is not required to be NUL-terminated.
    ///
    /// # Safety
    /// - `table` must be valid.
    /// - Top of the stack must have a value for this key.
    pub unsafe fn set_str_key(&mut self, table: c_int, key: impl AsRef<[u8]>) -> Result<()> {
        let table = unsafe { ffi::lua_absindex(self.as_ptr(), table) };

        self.push_str(key)?;

        unsafe {
            ffi::lua_rotate(self.as_ptr(), -2, 1);
            ffi::lua_settable(self.as_ptr(), table);
        }

        Ok(())
    }

    pub fn get_global(&self, name: impl AsRef<CStr>) -> Result<Type> {
        self.check_stack(1)?;

        let ty = unsafe { ffi::lua_getglobal(self.as_ptr(), name.as_ref().as_ptr()) };

        Ok(Type::from_raw(ty))
    }

    /// Pops a value and assigns it to the global `name`.
    ///
    /// # Safety
    /// Lua stack must have at least one item.
    pub unsafe fn set_global(&mut self, name: impl AsRef<CStr>) {
        unsafe { ffi::lua_setglobal(self.as_ptr(), name.as_ref().as_ptr()) };
    }

    /// # Safety
    /// `index` must be valid.
    pub unsafe fn is_nil(&self, index: c_int) -> bool {
        unsafe { ffi::lua_type(self.as_ptr(), index) == ffi::LUA_TNIL }
    }

    /// # Safety
    /// `index` must be valid.
    pub unsafe fn is_table(&self, index: c_int) -> bool {
        unsafe { ffi::lua_type(self.as_ptr(), index) == ffi::LUA_TTABLE }
    }

    /// Returns [`None`] if the value cannot be converted to an integer.
    ///
    /// # Safety
    /// `index` must be valid.
    pub unsafe fn to_int(&self, index: c_int) -> Option<i64> {
        let mut ok = 0;
        let val = unsafe { ffi::lua_tointegerx(self.as_ptr(), index, &mut ok) };

        if ok == 0 { None } else { Some(val) }
    }

    /// Returns [`None`] if the value is neither a string nor a number. A number is converted to a
    /// string in place.
    ///
    /// The returned string is owned by Lua and valid until its slot is popped or replaced.
    ///
    /// # Safety
    /// `index` must be valid and not a key from `lua_next`.
    pub unsafe fn to_string(&self, index: c_int) -> Option<&CStr> {
        let v = unsafe { ffi::lua_tolstring(self.as_ptr(), index, std::ptr::null_mut()) };

        if v.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(v) })
        }
    }

    /// # Safety
    /// `index` must be valid.
    pub unsafe fn type_of(&self, index: c_int) -> Type {
        Type::from_raw(unsafe { ffi::lua_type(self.as_ptr(), index) })
    }

    /// Name of the type of the value at `index`, e.g. `nil` or `table`.
    ///
    /// # Safety
    /// `index` must be valid.
    pub unsafe fn type_name(&self, index: c_int) -> &'static str {
        unsafe { self.type_of(index) }.name()
    }

    /// # Safety
    /// Lua stack must have at least `n` items.
    pub unsafe fn pop(&mut self, n: c_int) {
        unsafe { ffi::lua_pop(self.as_ptr(), n) };
    }

    /// # Safety
    /// Lua stack must have at least one item.
    pub unsafe fn pop_int(&mut self) -> Option<i64> {
        let v = unsafe { self.to_int(-1)? };
        unsafe { self.pop(1) };
        Some(v)
    }

    /// Pops a string (or a number). A value of any other type is left on the stack.
    ///
    /// # Safety
    /// Lua stack must have at least one item.
    pub unsafe fn pop_string_lossy(&mut self) -> Option<String> {
        let v = unsafe { self.to_string(-1)?.to_string_lossy().into_owned() };

        // The borrowed CStr was already copied.
        unsafe { self.pop(1) };

        Some(v)
    }

    /// Pops the error object left by a failed [`State::load()`] or [`State::pcall()`] and turns it
    /// into a message.
    ///
    /// # Safety
    /// Lua stack must have at least one item.
    pub unsafe fn pop_error(&mut self) -> String {
        if let Some(v) = unsafe { self.pop_string_lossy() } {
            return v;
        }

        let ty = unsafe { self.type_name(-1) };

        unsafe { self.pop(1) };

        format!("(error object is a {ty} value)")
    }

    /// Number of arguments passed to the running Rust function.
    pub fn arg_count(&self) -> c_int {
        self.top()
    }

    /// Gets argument `n` of the running Rust function as a UTF-8 string.
    pub fn arg_str(&self, n: c_int) -> std::result::Result<&str, CallbackError> {
        self.arg_opt_str(n)?.ok_or_else(|| {
            CallbackError::argument(n, format_args!("expect string, got {}", self.arg_type(n)))
        })
    }

    /// Same as [`State::arg_str()`] but `nil` and missing arguments are [`None`].
    pub fn arg_opt_str(&self, n: c_int) -> std::result::Result<Option<&str>, CallbackError> {
        self.arg_lstr(n, false)
    }

    /// Same as [`State::arg_str()`] but a number is accepted and converted in place, the same as
    /// `luaL_checklstring`.
    pub fn arg_to_str(&self, n: c_int) -> std::result::Result<&str, CallbackError> {
        self.arg_opt_to_str(n)?.ok_or_else(|| {
            CallbackError::argument(n, format_args!("expect string, got {}", self.arg_type(n)))
        })
    }

    /// Same as [`State::arg_to_str()`] but `nil` and missing arguments are [`None`].
    pub fn arg_opt_to_str(&self, n: c_int) -> std::result::Result<Option<&str>, CallbackError> {
        self.arg_lstr(n, true)
    }

    /// Gets argument `n` as an integer. Floats with an exact integer value and numeric strings
    /// are converted.
    pub fn arg_int(&self, n: c_int) -> std::result::Result<i64, CallbackError> {
        let ty = self.arg_type(n);
        let v = match ty {
            Type::Number | Type::String => unsafe { self.to_int(n) },
            _ => None,
        };

        v.ok_or_else(|| CallbackError::argument(n, format_args!("expect integer, got {ty}")))
    }

    /// Type of argument `n` of the running Rust function. Missing arguments are [`Type::None`].
    pub fn arg_type(&self, n: c_int) -> Type {
        if n < 1 || n > self.top() {
            Type::None
        } else {
            unsafe { self.type_of(n) }
        }
    }

    fn arg_lstr(&self, n: c_int, number: bool) -> std::result::Result<Option<&str>, CallbackError> {
        match self.arg_type(n) {
            Type::None | Type::Nil => return Ok(None),
            Type::String => (),
            Type::Number if number => (),
            t => {
                return Err(CallbackError::argument(
                    n,
                    format_args!("expect string, got {t}"),
                ));
            }
        }

        // Only a number is converted in place. The slot keeps the string afterward so a slice
        // of it stays valid.
        let mut len = 0;
        let ptr = unsafe { ffi::lua_tolstring(self.as_ptr(), n, &mut len) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };

        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| CallbackError::argument(n, "expect UTF-8 string"))
    }
}

/// Pseudo-index of upvalue `i` (1-based) of the running C function.
pub const fn upvalue_index(i: c_int) -> c_int {
    ffi::LUA_REGISTRYINDEX - i
}

#[allow(non_snake_case)]
unsafe extern "C-unwind" fn finalizer<F>(L: *mut lua_State) -> c_int {
    let f = unsafe { ffi::lua_touserdata(L, 1).cast::<*mut F>().read_unaligned() };

    // A panic here cannot be reported anywhere useful.
    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| drop(unsafe { Box::from_raw(f) })));

    0
}

#[allow(non_snake_case)]
unsafe extern "C-unwind" fn invoker<F>(L: *mut lua_State) -> c_int
where
    F: FnMut(&mut State) -> std::result::Result<c_int, CallbackError> + 'static,
{
    // Lua errors unwind with longjmp so nothing that needs dropping may be alive when we raise
    // one. Run the callback in its own scope and only keep the message.
    let msg = {
        let f = unsafe {
            ffi::lua_touserdata(L, upvalue_index(1))
                .cast::<*mut F>()
                .read_unaligned()
        };
        let mut state = unsafe { State::from_raw(NonNull::new_unchecked(L)) };

        match std::panic::catch_unwind(AssertUnwindSafe(|| unsafe { (*f)(&mut state) })) {
            Ok(Ok(n)) => return n,
            Ok(Err(e)) => e.to_string(),
            Err(p) => panic_message(p.as_ref()),
        }
    };

    unsafe { raise(L, msg) }
}

#[allow(non_snake_case)]
unsafe fn raise(L: *mut lua_State, msg: String) -> c_int {
    unsafe { ffi::lua_pushlstring(L, msg.as_ptr().cast(), msg.len()) };
    drop(msg);
    unsafe { ffi::lua_error(L) }
}

fn panic_message(p: &(dyn Any + Send)) -> String {
    let msg = if let Some(&v) = p.downcast_ref::<&str>() {
        v
    } else if let Some(v) = p.downcast_ref::<String>() {
        v.as_str()
    } else {
        "unknown panic"
    };

    format!("Rust function panicked: {msg}")
}
