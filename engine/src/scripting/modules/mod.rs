//! Rhai modules exposing the engine to scripts

pub mod math;
pub mod msg;
pub mod object;

use crate::core::hash::{resolve_path, Hash64};
use crate::scripting::commands::{CallFrame, SharedScriptState};
use rhai::{Engine, EvalAltResult};
use tracing::debug;

/// Register all modules with the Rhai engine
pub fn register_all_modules(engine: &mut Engine, state: &SharedScriptState) {
    debug!("Registering scripting modules");

    math::register_math_types(engine);
    msg::register_msg_api(engine, state);
    object::register_object_api(engine, state);

    debug!("All scripting modules registered");
}

/// Run `f` against the frame of the callback currently executing
pub(crate) fn with_frame<R>(
    state: &SharedScriptState,
    f: impl FnOnce(&mut CallFrame) -> Result<R, String>,
) -> Result<R, Box<EvalAltResult>> {
    let mut state = state
        .write()
        .map_err(|_| "script state lock poisoned".to_string())?;
    if state.load.is_some() {
        return Err("instance functions cannot be called while a script loads".into());
    }
    let frame = state
        .frame
        .as_mut()
        .ok_or_else(|| "instance functions can only be called from a script callback".to_string())?;
    f(frame).map_err(Into::into)
}

/// Identifier of `path` as seen from the caller; empty means the caller
pub(crate) fn resolve_target(frame: &CallFrame, path: &str) -> Hash64 {
    if path.is_empty() {
        frame.caller.id
    } else {
        resolve_path(&frame.caller.path, path)
    }
}
