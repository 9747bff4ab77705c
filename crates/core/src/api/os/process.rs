use std::ffi::c_int;
use std::process::{Command, Stdio};
use std::str::FromStr;

use luabox_lua::{CallbackError, State, Type};
use tracing::info;

/// `os.run(prog, ...)`: runs `prog` with stdin closed and waits for it. `nil` arguments are
/// skipped so scripts can pass optional flags inline.
pub(super) fn run(state: &mut State) -> Result<c_int, CallbackError> {
    let prog = state.arg_str(1)?.to_owned();
    let mut cmd = command(state, &prog)?;

    info!(program = prog, "running");

    let status = cmd
        .status()
        .map_err(|e| CallbackError::with_source(format!("failed to run '{prog}'"), e))?;

    if !status.success() {
        return Err(format!("'{prog}' exited with an error ({status})").into());
    }

    Ok(0)
}

/// `os.capture(prog, ...)` or `os.capture({prog, from = ...}, ...)`: same as `os.run` but returns
/// the captured output without the trailing line break.
///
/// With `from = "both"` the result is a table with `stdout` and `stderr` fields.
pub(super) fn capture(state: &mut State) -> Result<c_int, CallbackError> {
    let (prog, from) = match state.arg_type(1) {
        Type::String => (state.arg_str(1)?.to_owned(), Output::default()),
        Type::Table => capture_options(state)?,
        t => return Err(CallbackError::argument(1, format_args!("expect string or table, got {t}"))),
    };

    let mut cmd = command(state, &prog)?;

    match from {
        Output::Stdout => cmd.stdout(Stdio::piped()).stderr(Stdio::inherit()),
        Output::Stderr => cmd.stdout(Stdio::inherit()).stderr(Stdio::piped()),
        Output::Both => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
    };

    info!(program = prog, from = from.as_str(), "capturing");

    let mut r = cmd
        .output()
        .map_err(|e| CallbackError::with_source(format!("failed to run '{prog}'"), e))?;

    if !r.status.success() {
        return Err(format!("'{prog}' exited with an error ({})", r.status).into());
    }

    match from {
        Output::Stdout => state.push_str(trim_line_break(&mut r.stdout))?,
        Output::Stderr => state.push_str(trim_line_break(&mut r.stderr))?,
        Output::Both => {
            state.push_table(0, 2)?;
            state.push_str(trim_line_break(&mut r.stdout))?;
            unsafe { state.set_field(-2, c"stdout") };
            state.push_str(trim_line_break(&mut r.stderr))?;
            unsafe { state.set_field(-2, c"stderr") };
        }
    }

    Ok(1)
}

/// Reads `{prog, from = ...}` from argument 1.
///
/// Nothing that needs dropping may be alive here since a metamethod error unwinds past this frame.
fn capture_options(state: &mut State) -> Result<(String, Output), CallbackError> {
    let from = match unsafe { state.get_field(1, c"from")? } {
        Type::Nil => {
            unsafe { state.pop(1) };
            Output::default()
        }
        Type::String => unsafe { pop_str(state) }?
            .parse()
            .map_err(|e| CallbackError::argument(1, e))?,
        t => {
            return Err(CallbackError::argument(
                1,
                format_args!("expect string on 'from', got {t}"),
            ));
        }
    };

    let prog = match unsafe { state.get_index(1, 1)? } {
        Type::String => unsafe { pop_str(state) }?,
        t => {
            return Err(CallbackError::argument(
                1,
                format_args!("expect string at index 1, got {t}"),
            ));
        }
    };

    Ok((prog, from))
}

/// Pops the string on the top of the stack.
///
/// # Safety
/// Top of the stack must be a string.
unsafe fn pop_str(state: &mut State) -> Result<String, CallbackError> {
    let v = unsafe { state.to_string(-1) }.map(|v| v.to_str().map(str::to_owned));

    unsafe { state.pop(1) };

    match v {
        Some(Ok(v)) => Ok(v),
        _ => Err(CallbackError::argument(1, "expect UTF-8 string")),
    }
}

/// Builds the process for `prog` with the remaining arguments of the running function.
fn command(state: &State, prog: &str) -> Result<Command, CallbackError> {
    let mut cmd = Command::new(prog);

    for i in 2..=state.arg_count() {
        if let Some(v) = state.arg_opt_to_str(i)? {
            cmd.arg(v);
        }
    }

    cmd.stdin(Stdio::null());

    Ok(cmd)
}

fn trim_line_break(data: &mut Vec<u8>) -> &[u8] {
    if data.last() == Some(&b'\n') {
        data.pop();
    }

    if data.last() == Some(&b'\r') {
        data.pop();
    }

    data
}

/// Stream captured by `os.capture`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Output {
    #[default]
    Stdout,
    Stderr,
    Both,
}

impl Output {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Both => "both",
        }
    }
}

impl FromStr for Output {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "both" => Ok(Self::Both),
            v => Err(format!("unknown output '{v}'")),
        }
    }
}
