//! `msg::*`: urls and message posting

use super::with_frame;
use crate::core::hash::{hash_string64, Hash64};
use crate::message::{SocketId, Url};
use crate::scripting::commands::{CallFrame, ScriptCommand, SharedScriptState};
use crate::scripting::property_types::map_to_json;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module};
use std::sync::PoisonError;
use tracing::debug;

/// Register the `url` type and the `msg` module
pub fn register_msg_api(engine: &mut Engine, state: &SharedScriptState) {
    debug!("Registering msg API");

    engine
        .register_type_with_name::<Url>("url")
        .register_get("path", |u: &mut Url| u.path.map_or(Dynamic::UNIT, Dynamic::from))
        .register_get("fragment", |u: &mut Url| {
            u.fragment.map_or(Dynamic::UNIT, Dynamic::from)
        })
        .register_fn("==", |a: &mut Url, b: Url| *a == b)
        .register_fn("!=", |a: &mut Url, b: Url| *a != b)
        .register_fn("to_string", |u: &mut Url| format!("url({u})"));

    engine.register_static_module("msg", create_msg_module(state).into());
}

pub fn create_msg_module(state: &SharedScriptState) -> Module {
    let mut module = Module::new();

    let s = state.clone();
    module.set_native_fn("url", move || with_frame(&s, |frame| Ok(frame.caller.url())));

    // Also usable at the top level, where relative paths start at the root
    let s = state.clone();
    module.set_native_fn("url", move |text: &str| -> Result<Url, Box<EvalAltResult>> {
        let state = s.read().unwrap_or_else(PoisonError::into_inner);
        let base = state.frame.as_ref().map(|frame| frame.caller.path.as_str());
        Ok(Url::parse(text, base))
    });

    let s = state.clone();
    module.set_native_fn(
        "url",
        move |socket: &str, path: &str, fragment: &str| -> Result<Url, Box<EvalAltResult>> {
            let state = s.read().unwrap_or_else(PoisonError::into_inner);
            let base = state.frame.as_ref().map(|frame| frame.caller.path.as_str());
            let path = (!path.is_empty()).then(|| Url::parse(path, base).path).flatten();
            Ok(Url {
                socket: (!socket.is_empty()).then(|| SocketId::from_name(socket)),
                path,
                fragment: (!fragment.is_empty()).then(|| hash_string64(fragment)),
            })
        },
    );

    let s = state.clone();
    module.set_native_fn("post", move |receiver: Dynamic, message_id: Dynamic| {
        with_frame(&s, |frame| queue_post(frame, &receiver, &message_id, None))
    });
    let s = state.clone();
    module.set_native_fn(
        "post",
        move |receiver: Dynamic, message_id: Dynamic, message: Map| {
            with_frame(&s, |frame| queue_post(frame, &receiver, &message_id, Some(&message)))
        },
    );

    module
}

fn queue_post(
    frame: &mut CallFrame,
    receiver: &Dynamic,
    message_id: &Dynamic,
    message: Option<&Map>,
) -> Result<(), String> {
    let receiver = match receiver.clone().try_cast::<Url>() {
        Some(url) => url,
        None => {
            let text = receiver
                .clone()
                .into_string()
                .map_err(|_| format!("receiver must be a url or a string, got {}", receiver.type_name()))?;
            Url::parse(&text, Some(&frame.caller.path))
        }
    };
    let message_id = match message_id.clone().try_cast::<Hash64>() {
        Some(id) => id,
        None => message_id
            .clone()
            .into_string()
            .map(|name| hash_string64(&name))
            .map_err(|_| format!("message id must be a hash or a string, got {}", message_id.type_name()))?,
    };
    let table = message.map(map_to_json).transpose()?;
    frame.push(ScriptCommand::Post {
        receiver,
        message_id,
        table,
    });
    Ok(())
}
