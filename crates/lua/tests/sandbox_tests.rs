//! End-to-end behavior of sandboxed engines.

use std::alloc::{Layout, alloc, dealloc, realloc};
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr::null_mut;
use std::rc::Rc;

use luabox_lua::{Engine, EngineError, OsPolicy, SandboxConfig, Type};
use tempfile::TempDir;

fn hardened() -> Engine {
    Engine::with_sandbox(&SandboxConfig::default()).unwrap()
}

#[test]
fn one_plus_one_returns_two() {
    let mut en = hardened();

    assert!(en.load(c"=main", b"return 1+1").unwrap());
    assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
    assert_eq!(en.top(), 1);
    assert_eq!(unsafe { en.to_int(-1) }, Some(2));
}

#[test]
fn os_exit_is_a_call_error() {
    let mut en = hardened();

    assert!(en.load(c"=main", b"os.exit(1)").unwrap());
    assert!(!unsafe { en.pcall(0, 0, 0) }.unwrap());

    let msg = unsafe { en.pop_error() };

    assert!(msg.contains("attempt to call a nil value"), "{msg}");
    assert!(msg.contains("exit"), "{msg}");
}

#[test]
fn os_setlocale_is_a_call_error() {
    let mut en = hardened();

    assert!(en.load(c"=main", b"os.setlocale('C')").unwrap());
    assert!(!unsafe { en.pcall(0, 0, 0) }.unwrap());
    assert!(unsafe { en.pop_error() }.contains("attempt to call a nil value"));
}

#[test]
fn disabled_os_has_no_global() {
    let config = SandboxConfig::default().with_os(OsPolicy::Disabled);
    let mut en = Engine::with_sandbox(&config).unwrap();

    assert_eq!(en.get_global(c"os").unwrap(), Type::Nil);
    unsafe { en.pop(1) };

    // Opting in later is still possible.
    en.require_os().unwrap();
    assert!(unsafe { en.is_table(-1) });
    unsafe { en.pop(1) };
    assert_eq!(en.get_global(c"os").unwrap(), Type::Table);
}

#[test]
fn multiple_results_are_kept() {
    let mut en = hardened();

    assert!(en.load(c"=main", b"return 1, 'two', nil").unwrap());
    assert!(unsafe { en.pcall(0, 3, 0) }.unwrap());
    assert_eq!(en.top(), 3);

    unsafe {
        assert_eq!(en.type_of(1), Type::Number);
        assert_eq!(en.to_string(2).unwrap(), c"two");
        assert!(en.is_nil(3));
    }
}

#[test]
fn message_handler_rewrites_error() {
    let mut en = hardened();

    en.push_fn(|st| {
        let msg = st.arg_str(1)?.to_owned();
        st.push_str(format!("handled: {msg}"))?;
        Ok(1)
    })
    .unwrap();

    assert!(en.load(c"=main", b"error('bad', 0)").unwrap());
    assert!(!unsafe { en.pcall(0, 0, 1) }.unwrap());
    assert_eq!(unsafe { en.pop_error() }, "handled: bad");
}

#[test]
fn scripts_are_loaded_from_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("main.lua");

    std::fs::write(&path, "local x = 20\nreturn x * 2\n").unwrap();

    let mut en = hardened();

    assert!(en.load_file(&path).unwrap());
    assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
    assert_eq!(unsafe { en.pop_int() }, Some(40));

    std::fs::write(&path, "error('from file')").unwrap();

    assert!(en.load_file(&path).unwrap());
    assert!(!unsafe { en.pcall(0, 0, 0) }.unwrap());

    let msg = unsafe { en.pop_error() };

    assert!(msg.contains("main.lua:1: from file"), "{msg}");
}

#[test]
fn missing_file_is_a_read_error() {
    let temp = TempDir::new().unwrap();
    let en = hardened();

    match en.load_file(temp.path().join("missing.lua")) {
        Err(EngineError::ReadScript { path, .. }) => assert!(path.ends_with("missing.lua")),
        r => panic!("unexpected result: {r:?}"),
    }

    assert_eq!(en.top(), 0);
}

#[test]
fn stack_exhaustion_is_reported_not_fatal() {
    let en = hardened();

    match en.check_stack(i32::MAX) {
        Err(EngineError::OutOfStack { required }) => assert_eq!(required, i32::MAX),
        r => panic!("unexpected result: {r:?}"),
    }

    // The state is still usable.
    assert!(en.load(c"=main", b"return 1").unwrap());
}

/// Fills the stack until pushing fails twice in a row. Lua lets the first failure grow the stack
/// into its error reserve so one failure is not the limit yet.
fn fill_stack(en: &Engine) -> usize {
    let mut pushed = 0;

    loop {
        match en.push_nil() {
            Ok(_) => pushed += 1,
            Err(EngineError::OutOfStack { required: 1 }) => match en.push_nil() {
                Ok(_) => pushed += 1,
                Err(EngineError::OutOfStack { .. }) => break pushed,
                Err(e) => panic!("{e}"),
            },
            Err(e) => panic!("{e}"),
        }
    }
}

#[test]
fn operations_at_the_stack_limit() {
    let mut en = hardened();
    let pushed = fill_stack(&en);

    assert!(pushed >= 999_000, "{pushed}");
    assert_eq!(en.top() as usize, pushed);

    assert!(matches!(en.push_str("x"), Err(EngineError::OutOfStack { .. })));
    assert!(matches!(en.push_table(0, 0), Err(EngineError::OutOfStack { .. })));
    assert!(matches!(en.new_userdata(8, 0), Err(EngineError::OutOfStack { .. })));
    assert!(matches!(en.push_fn(|_| Ok(0)), Err(EngineError::OutOfStack { .. })));
    assert!(matches!(en.load(c"=main", b"return 1"), Err(EngineError::OutOfStack { .. })));
    assert_eq!(en.top() as usize, pushed);

    // Room for a chunk but not for its results.
    unsafe { en.pop(10) };
    assert!(en.load(c"=main", b"return 1").unwrap());

    match unsafe { en.pcall(0, 1000, 0) } {
        Err(EngineError::OutOfStack { required }) => assert_eq!(required, 1000),
        r => panic!("unexpected result: {r:?}"),
    }

    // Nothing was consumed and the state keeps working once there is room again.
    assert_eq!(unsafe { en.type_of(-1) }, Type::Function);
    unsafe {
        let n = en.top();
        en.pop(n)
    };

    assert!(en.load(c"=main", b"return 1+1").unwrap());
    assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
    assert_eq!(unsafe { en.pop_int() }, Some(2));
}

/// `lua_Alloc` that keeps the number of live bytes in the `Cell<usize>` behind `ud`.
unsafe extern "C" fn counting_alloc(
    ud: *mut c_void,
    ptr: *mut c_void,
    osize: usize,
    nsize: usize,
) -> *mut c_void {
    const ALIGN: usize = 16;

    let live = unsafe { &*ud.cast::<Cell<usize>>() };

    // osize is a type tag rather than a size when ptr is NULL.
    let old = if ptr.is_null() { 0 } else { osize };

    if nsize == 0 {
        if !ptr.is_null() {
            unsafe { dealloc(ptr.cast(), Layout::from_size_align_unchecked(osize, ALIGN)) };
            live.set(live.get() - osize);
        }

        return null_mut();
    }

    let new = unsafe {
        if ptr.is_null() {
            alloc(Layout::from_size_align_unchecked(nsize, ALIGN))
        } else {
            realloc(ptr.cast(), Layout::from_size_align_unchecked(osize, ALIGN), nsize)
        }
    };

    if !new.is_null() {
        live.set(live.get() - old + nsize);
    }

    new.cast()
}

#[test]
fn destroy_releases_every_allocation() {
    let live = Cell::new(0usize);
    let ud = std::ptr::from_ref(&live).cast_mut().cast::<c_void>();
    let dropped = Rc::new(Cell::new(0));

    for i in 0..64 {
        struct Capture(Rc<Cell<i32>>);

        impl Drop for Capture {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut en =
            unsafe { Engine::with_allocator(counting_alloc, ud, &SandboxConfig::default()) }
                .unwrap();

        assert!(live.get() > 0);

        let capture = Capture(dropped.clone());

        en.push_fn(move |st| {
            let _ = &capture;
            st.push_int(1)?;
            Ok(1)
        })
        .unwrap();
        unsafe { en.set_global(c"one") };

        let src = b"local t = {} for i = 1, 100 do t[i] = tostring(i) end return #t + one()";

        assert!(en.load(c"=main", src).unwrap());
        assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
        assert_eq!(unsafe { en.pop_int() }, Some(101));

        // Leave something on the stack too.
        en.push_table(4, 4).unwrap();

        drop(en);

        assert_eq!(live.get(), 0, "cycle {i}");
        assert_eq!(dropped.get(), i + 1);
    }
}

#[test]
fn file_loaders_are_text_only() {
    let temp = TempDir::new().unwrap();
    let text = temp.path().join("text.lua");
    let binary = temp.path().join("binary.luac");
    let mut en = hardened();

    std::fs::write(&text, "return 3").unwrap();

    // The chunk is written by the script itself through io.
    en.push_str(text.to_string_lossy().as_bytes()).unwrap();
    unsafe { en.set_global(c"text") };
    en.push_str(binary.to_string_lossy().as_bytes()).unwrap();
    unsafe { en.set_global(c"binary") };

    let src = b"local f = io.open(binary, 'wb') \
        f:write(string.dump(function() return 4 end)) \
        f:close() \
        local ok = pcall(dofile, binary) \
        local chunk = loadfile(binary, 'b') \
        return dofile(text) + loadfile(text)() + (ok and 10 or 0) + (chunk and 100 or 0)";

    assert!(en.load(c"=main", src).unwrap());
    assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
    assert_eq!(unsafe { en.pop_int() }, Some(6));
}

#[test]
fn engines_on_separate_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let mut en = hardened();
                let src = format!("return {i} * 10");

                assert!(en.load(c"=main", src.as_bytes()).unwrap());
                assert!(unsafe { en.pcall(0, 1, 0) }.unwrap());
                unsafe { en.pop_int() }
            })
        })
        .collect();

    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), Some(i as i64 * 10));
    }
}
