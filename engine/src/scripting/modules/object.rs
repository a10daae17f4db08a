//! `object::*`: the calling instance and its neighbours

use super::{resolve_target, with_frame};
use crate::core::hash::Hash64;
use crate::core::property::{PropertyDefinition, PropertyValue};
use crate::scripting::commands::{CallFrame, ScriptCommand, SharedScriptState, TransformSnapshot};
use glam::{Quat, Vec3};
use rhai::{Dynamic, Engine, EvalAltResult, Module};
use std::sync::PoisonError;
use tracing::{debug, trace};

/// Register the `object` module
pub fn register_object_api(engine: &mut Engine, state: &SharedScriptState) {
    debug!("Registering object API");
    engine.register_static_module("object", create_object_module(state).into());
}

pub fn create_object_module(state: &SharedScriptState) -> Module {
    let mut module = Module::new();

    register_getter(&mut module, state, "get_position", |t| t.position);
    register_getter(&mut module, state, "get_rotation", |t| t.rotation);
    register_getter(&mut module, state, "get_world_position", |t| t.world_position);
    register_getter(&mut module, state, "get_world_rotation", |t| t.world_rotation);

    register_setter::<Vec3>(&mut module, state, "set_position", |frame, target, position| {
        cached(frame, target, |t| t.position = position);
        ScriptCommand::SetPosition { target, position }
    });
    register_setter::<Quat>(&mut module, state, "set_rotation", |frame, target, rotation| {
        cached(frame, target, |t| t.rotation = rotation);
        ScriptCommand::SetRotation { target, rotation }
    });

    let s = state.clone();
    module.set_native_fn("get_id", move || with_frame(&s, |frame| Ok(frame.caller.id)));
    let s = state.clone();
    module.set_native_fn("get_id", move |path: &str| {
        with_frame(&s, |frame| Ok(resolve_target(frame, path)))
    });

    let s = state.clone();
    module.set_native_fn("delete", move || {
        with_frame(&s, |frame| {
            let target = frame.caller.id;
            frame.push(ScriptCommand::Delete { target });
            Ok(())
        })
    });
    let s = state.clone();
    module.set_native_fn("delete", move |target: Hash64| {
        with_frame(&s, |frame| queue_delete(frame, target))
    });
    let s = state.clone();
    module.set_native_fn("delete", move |path: &str| {
        with_frame(&s, |frame| {
            let target = resolve_target(frame, path);
            queue_delete(frame, target)
        })
    });

    let s = state.clone();
    module.set_native_fn(
        "property",
        move |name: &str, default: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let mut state = s.write().unwrap_or_else(PoisonError::into_inner);
            let Some(definitions) = state.load.as_mut() else {
                return Err(format!(
                    "object::property(\"{name}\") can only be called outside the functions"
                )
                .into());
            };
            let value = PropertyValue::from_dynamic(&default).ok_or_else(|| {
                format!(
                    "property '{name}' has unsupported type {}",
                    default.type_name()
                )
            })?;
            trace!(property = name, value = %value, "Declared property");
            definitions.push(PropertyDefinition::new(name, value));
            Ok(())
        },
    );

    module
}

fn register_getter<T: Clone + Send + Sync + 'static>(
    module: &mut Module,
    state: &SharedScriptState,
    name: &str,
    read: fn(&TransformSnapshot) -> T,
) {
    let s = state.clone();
    module.set_native_fn(name, move || {
        with_frame(&s, |frame| Ok(read(&frame.snapshot(frame.caller.id)?)))
    });
    let s = state.clone();
    module.set_native_fn(name, move |target: Hash64| {
        with_frame(&s, |frame| Ok(read(&frame.snapshot(target)?)))
    });
    let s = state.clone();
    module.set_native_fn(name, move |path: &str| {
        with_frame(&s, |frame| {
            let target = resolve_target(frame, path);
            Ok(read(&frame.snapshot(target)?))
        })
    });
}

fn register_setter<T: Clone + Send + Sync + 'static>(
    module: &mut Module,
    state: &SharedScriptState,
    name: &str,
    command: fn(&CallFrame, Hash64, T) -> ScriptCommand,
) {
    let s = state.clone();
    module.set_native_fn(name, move |value: T| {
        with_frame(&s, |frame| {
            let target = frame.caller.id;
            let queued = command(frame, target, value);
            frame.push(queued);
            Ok(())
        })
    });
    let s = state.clone();
    module.set_native_fn(name, move |value: T, target: Hash64| {
        with_frame(&s, |frame| queue_set(frame, target, value, command))
    });
    let s = state.clone();
    module.set_native_fn(name, move |value: T, path: &str| {
        with_frame(&s, |frame| {
            let target = resolve_target(frame, path);
            queue_set(frame, target, value, command)
        })
    });
}

fn queue_set<T>(
    frame: &mut CallFrame,
    target: Hash64,
    value: T,
    command: fn(&CallFrame, Hash64, T) -> ScriptCommand,
) -> Result<(), String> {
    if !frame.has_instance(target) {
        return Err(format!("instance {target} not found"));
    }
    let queued = command(frame, target, value);
    frame.push(queued);
    Ok(())
}

fn queue_delete(frame: &mut CallFrame, target: Hash64) -> Result<(), String> {
    if !frame.has_instance(target) {
        return Err(format!("instance {target} not found"));
    }
    frame.push(ScriptCommand::Delete { target });
    Ok(())
}

// Later reads in the same callback see the new local value
fn cached(frame: &CallFrame, target: Hash64, f: impl FnOnce(&mut TransformSnapshot)) {
    if let Some(snapshot) = frame
        .transforms
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_mut(&target)
    {
        f(snapshot);
    }
}
