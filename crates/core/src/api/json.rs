use std::ffi::c_int;

use luabox_lua::{CallbackError, EngineError, State};
use serde_json::Value;

/// Registers the `json` global.
pub fn register(state: &mut State) -> Result<(), EngineError> {
    state.push_table(0, 1)?;
    state.push_fn(parse)?;

    unsafe {
        state.set_field(-2, c"parse");
        state.set_global(c"json");
    }

    Ok(())
}

/// `json.parse(s)`: converts a JSON document to Lua values.
///
/// `null` becomes `nil`, so it leaves a hole in arrays and drops the key in objects.
fn parse(state: &mut State) -> Result<c_int, CallbackError> {
    let value: Value = serde_json::from_str(state.arg_to_str(1)?)
        .map_err(|e| CallbackError::with_source("failed to parse JSON", e))?;

    push_value(state, &value)?;

    Ok(1)
}

fn push_value(state: &mut State, value: &Value) -> Result<(), EngineError> {
    match value {
        Value::Null => state.push_nil(),
        Value::Bool(v) => state.push_bool(*v),
        Value::Number(v) => match (v.as_i64(), v.as_f64()) {
            (Some(v), _) => state.push_int(v),
            (None, Some(v)) => state.push_number(v),
            (None, None) => state.push_nil(),
        },
        Value::String(v) => state.push_str(v),
        Value::Array(items) => {
            state.push_table(items.len().try_into().unwrap_or(0), 0)?;

            for (i, v) in items.iter().enumerate() {
                push_value(state, v)?;
                unsafe { state.set_index(-2, i as i64 + 1) };
            }

            Ok(())
        }
        Value::Object(fields) => {
            state.push_table(0, fields.len().try_into().unwrap_or(0))?;

            for (k, v) in fields {
                push_value(state, v)?;
                unsafe { state.set_str_key(-2, k)? };
            }

            Ok(())
        }
    }
}
