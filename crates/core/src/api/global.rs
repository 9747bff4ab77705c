use std::cell::Cell;
use std::rc::Rc;

use luabox_lua::{CallbackError, EngineError, State};
use tracing::debug;

/// Exit code requested by a script through `exit(code)`.
///
/// `exit()` raises an error to stop the script so the code must be checked whether the script
/// succeeded or not.
#[derive(Debug, Default, Clone)]
pub struct ExitRequest(Rc<Cell<Option<u8>>>);

impl ExitRequest {
    pub fn code(&self) -> Option<u8> {
        self.0.get()
    }
}

/// Registers the `exit` global.
pub fn register(state: &mut State) -> Result<ExitRequest, EngineError> {
    let req = ExitRequest::default();
    let slot = req.0.clone();

    state.push_fn(move |state| {
        let code = state.arg_int(1)?;
        let code = u8::try_from(code)
            .ok()
            .filter(|v| *v <= 99)
            .ok_or_else(|| CallbackError::argument(1, "value out of range"))?;

        debug!(code, "script requested exit");

        slot.set(Some(code));

        Err(format!("exit({code})").into())
    })?;

    unsafe { state.set_global(c"exit") };

    Ok(req)
}
