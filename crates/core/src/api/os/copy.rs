use std::ffi::c_int;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use luabox_lua::{CallbackError, State};
use tracing::info;

/// `os.copyfile(src, dir[, mode])`: copies `src` into `dir` under the same file name and returns
/// the number of bytes copied.
pub(super) fn copyfile(state: &mut State) -> Result<c_int, CallbackError> {
    let src = Path::new(state.arg_to_str(1)?);
    let name = src
        .file_name()
        .ok_or_else(|| CallbackError::argument(1, "path does not refer to a file"))?;
    let dst = Path::new(state.arg_to_str(2)?).join(name);
    let mode = copy_mode(state, 3)?;
    let n = copy(src, &dst, mode)?;

    state.push_int(n.try_into().unwrap_or(i64::MAX))?;

    Ok(1)
}

/// `os.copyfileas(src, dst[, mode])`: copies `src` to exactly `dst` and returns the number of
/// bytes copied.
pub(super) fn copyfileas(state: &mut State) -> Result<c_int, CallbackError> {
    let src = Path::new(state.arg_to_str(1)?);
    let dst = Path::new(state.arg_to_str(2)?);
    let mode = copy_mode(state, 3)?;
    let n = copy(src, dst, mode)?;

    state.push_int(n.try_into().unwrap_or(i64::MAX))?;

    Ok(1)
}

fn copy_mode(state: &State, n: c_int) -> Result<CopyMode, CallbackError> {
    match state.arg_opt_str(n)? {
        Some(v) => v.parse().map_err(|e| CallbackError::argument(n, e)),
        None => Ok(CopyMode::default()),
    }
}

fn copy(src: &Path, dst: &Path, mode: CopyMode) -> Result<u64, CallbackError> {
    info!(src = %src.display(), dst = %dst.display(), ?mode, "copying");

    let failed = |e: std::io::Error| {
        CallbackError::with_source(
            format!("failed to copy {} to {}", src.display(), dst.display()),
            e,
        )
    };

    match mode {
        CopyMode::Content => {
            let mut from = File::open(src).map_err(|e| {
                CallbackError::with_source(format!("failed to open {}", src.display()), e)
            })?;
            let mut to = File::create(dst).map_err(|e| {
                CallbackError::with_source(format!("failed to open {}", dst.display()), e)
            })?;

            std::io::copy(&mut from, &mut to).map_err(failed)
        }
        CopyMode::All => std::fs::copy(src, dst).map_err(failed),
    }
}

/// What `os.copyfile` and `os.copyfileas` carry over from the source file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    /// File content only. The destination gets default permissions.
    #[default]
    Content,
    /// Content and permissions.
    All,
}

impl FromStr for CopyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "all" => Ok(Self::All),
            v => Err(format!("unknown mode '{v}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::api::testutil::{engine, eval, lua_path};

    #[test]
    fn copyfile_keeps_the_name() {
        let temp = TempDir::new().unwrap();
        let mut en = engine();
        let src = temp.path().join("data.txt");
        let dir = temp.path().join("out");

        std::fs::write(&src, "hello").unwrap();
        std::fs::create_dir(&dir).unwrap();

        let code = format!(
            "return os.copyfile('{}', '{}')",
            lua_path(&src),
            lua_path(&dir)
        );

        assert_eq!(eval(&mut en, &code).unwrap().as_deref(), Some("5"));
        assert_eq!(std::fs::read_to_string(dir.join("data.txt")).unwrap(), "hello");
    }

    #[test]
    fn copyfileas_uses_the_exact_destination() {
        let temp = TempDir::new().unwrap();
        let mut en = engine();
        let src = temp.path().join("a.txt");
        let dst = temp.path().join("b.txt");

        std::fs::write(&src, "abc").unwrap();

        let code = format!(
            "return os.copyfileas('{}', '{}', 'all')",
            lua_path(&src),
            lua_path(&dst)
        );

        assert_eq!(eval(&mut en, &code).unwrap().as_deref(), Some("3"));
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "abc");
    }

    #[test]
    #[cfg(unix)]
    fn all_mode_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let mut en = engine();
        let src = temp.path().join("tool.sh");

        std::fs::write(&src, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o755)).unwrap();

        let all = temp.path().join("all.sh");
        let content = temp.path().join("content.sh");
        let code = format!(
            "os.copyfileas('{0}', '{1}', 'all') os.copyfileas('{0}', '{2}')",
            lua_path(&src),
            lua_path(&all),
            lua_path(&content)
        );

        assert_eq!(eval(&mut en, &code), Ok(None));

        let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o111;

        assert_eq!(mode(&all), 0o111);
        assert_eq!(mode(&content), 0);
    }

    #[test]
    fn copy_errors_are_reported() {
        let temp = TempDir::new().unwrap();
        let mut en = engine();
        let missing = temp.path().join("missing.txt");
        let code = format!(
            "os.copyfileas('{}', '{}')",
            lua_path(&missing),
            lua_path(&temp.path().join("x"))
        );
        let e = eval(&mut en, &code).unwrap_err();

        assert!(e.starts_with("failed to open "), "{e}");

        let e = eval(&mut en, "os.copyfile('/', 'dir')").unwrap_err();

        assert_eq!(e, "bad argument #1 (path does not refer to a file)");

        let e = eval(&mut en, "os.copyfileas('a', 'b', 'fast')").unwrap_err();

        assert_eq!(e, "bad argument #3 (unknown mode 'fast')");
    }
}
