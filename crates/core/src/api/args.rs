use luabox_lua::{EngineError, State};

use crate::manifest::{ArgValue, ArgValues};

/// Registers the `args` global. Undeclared and unset arguments read as `nil`.
pub fn register(state: &mut State, args: &ArgValues) -> Result<(), EngineError> {
    state.push_table(0, args.len().try_into().unwrap_or(0))?;

    for (name, value) in args {
        match value {
            ArgValue::Bool(v) => state.push_bool(*v)?,
            ArgValue::String(Some(v)) => state.push_str(v)?,
            ArgValue::String(None) => continue,
        }

        unsafe { state.set_str_key(-2, name)? };
    }

    unsafe { state.set_global(c"args") };

    Ok(())
}

#[cfg(test)]
mod tests {
    use luabox_lua::{Engine, SandboxConfig};

    use super::*;
    use crate::api::testutil::eval;

    #[test]
    fn values_are_visible_to_scripts() {
        let mut en = Engine::with_sandbox(&SandboxConfig::default()).unwrap();
        let mut args = ArgValues::new();

        args.insert("release".into(), ArgValue::Bool(true));
        args.insert("target".into(), ArgValue::String(Some("x86_64".into())));
        args.insert("profile".into(), ArgValue::String(None));

        register(&mut en, &args).unwrap();

        assert_eq!(en.top(), 0);
        assert_eq!(
            eval(&mut en, "return tostring(args.release) .. args.target").unwrap().as_deref(),
            Some("truex86_64")
        );
        assert_eq!(
            eval(&mut en, "return type(args.profile) .. type(args.unknown)").unwrap().as_deref(),
            Some("nilnil")
        );
    }
}
