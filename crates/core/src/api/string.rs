use std::ffi::c_int;
use std::str::FromStr;

use luabox_lua::{CallbackError, EngineError, State, Type};

/// Adds `capitalize` to the `string` table when the sandbox exposes it.
pub fn register(state: &mut State) -> Result<(), EngineError> {
    if state.get_global(c"string")? == Type::Table {
        state.push_fn(capitalize)?;
        unsafe { state.set_field(-2, c"capitalize") };
    }

    unsafe { state.pop(1) };

    Ok(())
}

/// `string.capitalize(s[, mode])`: upper-cases the first character of `s`. The only mode is
/// `"first"`.
fn capitalize(state: &mut State) -> Result<c_int, CallbackError> {
    let s = state.arg_to_str(1)?;
    let mode: Mode = match state.arg_opt_str(2)? {
        Some(v) => v.parse().map_err(|e| CallbackError::argument(2, e))?,
        None => Mode::default(),
    };

    let mut chars = s.chars();
    let mut r = String::with_capacity(s.len());

    match mode {
        Mode::First => {
            if let Some(first) = chars.next() {
                r.extend(first.to_uppercase());
                r.push_str(chars.as_str());
            }
        }
    }

    state.push_str(r)?;

    Ok(1)
}

#[derive(Debug, Default, Clone, Copy)]
enum Mode {
    #[default]
    First,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            v => Err(format!("unknown mode '{v}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::testutil::{engine, eval};

    #[test]
    fn capitalize_first_character() {
        let mut en = engine();

        assert_eq!(
            eval(&mut en, "return string.capitalize('hello world')").unwrap().as_deref(),
            Some("Hello world")
        );
        assert_eq!(eval(&mut en, "return ('ßa'):capitalize()").unwrap().as_deref(), Some("SSa"));
        assert_eq!(eval(&mut en, "return string.capitalize('')").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn capitalize_mode() {
        let mut en = engine();

        assert_eq!(
            eval(&mut en, "return string.capitalize('abc', 'first')").unwrap().as_deref(),
            Some("Abc")
        );

        let e = eval(&mut en, "return string.capitalize('abc', 'all')").unwrap_err();

        assert_eq!(e, "bad argument #2 (unknown mode 'all')");
    }

    #[test]
    fn capitalize_converts_numbers() {
        let mut en = engine();

        assert_eq!(eval(&mut en, "return string.capitalize(12)").unwrap().as_deref(), Some("12"));

        let e = eval(&mut en, "return string.capitalize(true)").unwrap_err();

        assert_eq!(e, "bad argument #1 (expect string, got boolean)");
    }
}
