//! Scripting system using Rhai
//!
//! Scripts attach to instances through the `script` component type. A script
//! declares properties at its top level and reacts through the lifecycle
//! callbacks `init`, `update(dt)`, `on_message(id, message, sender)`,
//! `on_input(action_id, action)`, `on_reload` and `final`. Inside callbacks
//! the component's state is `this`, and the engine is reached through the
//! `object`, `msg` and `vmath` modules.

pub mod commands;
pub mod component;
pub mod engine;
pub mod modules;
pub mod property_types;
pub mod script;

pub use commands::{CallFrame, Caller, ScriptCommand, SharedTransformCache, TransformSnapshot};
pub use component::{script_component_type, ScriptInstance, ScriptKey, ScriptWorld, SCRIPT_COMPONENT};
pub use engine::{ScriptEngine, ScriptError, SCRIPT_RESOURCE};
pub use property_types::ScriptProperties;
pub use script::{Callback, CompiledScript, ScriptCallbacks};

// Re-export commonly used types
pub use rhai::{Dynamic, EvalAltResult, Map};

#[cfg(test)]
mod tests;
