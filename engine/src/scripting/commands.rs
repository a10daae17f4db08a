//! Deferred effects of script callbacks
//!
//! Script functions never touch the collection directly. They read from a
//! transform cache and queue commands on the current [`CallFrame`]; the
//! commands are applied once the callback returns.

use crate::collection::instance::{InstanceHandle, InstancePool};
use crate::component::ComponentContext;
use crate::core::hash::Hash64;
use crate::core::property::PropertyDefinition;
use crate::message::{Address, SocketId, Url, WHOLE_INSTANCE};
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Local and world transform of one instance, as seen by scripts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSnapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub world_position: Vec3,
    pub world_rotation: Quat,
}

impl TransformSnapshot {
    pub fn capture(pool: &InstancePool, instance: InstanceHandle) -> Option<Self> {
        let transform = pool.transform(instance)?;
        Some(Self {
            position: transform.position,
            rotation: transform.rotation,
            world_position: pool.world_position(instance)?,
            world_rotation: pool.world_rotation(instance)?,
        })
    }
}

/// Transforms of every instance in a collection, keyed by identifier
pub type TransformCache = HashMap<Hash64, TransformSnapshot>;
pub type SharedTransformCache = Arc<RwLock<TransformCache>>;

/// Rebuild the cache from the pool
pub fn refresh_transform_cache(cache: &SharedTransformCache, pool: &InstancePool) {
    let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
    cache.clear();
    for instance in pool.handles() {
        if let (Some(id), Some(snapshot)) = (
            pool.identifier(instance),
            TransformSnapshot::capture(pool, instance),
        ) {
            cache.insert(id, snapshot);
        }
    }
}

/// Refresh a single entry
pub fn update_transform_cache(cache: &SharedTransformCache, pool: &InstancePool, instance: InstanceHandle) {
    let Some(id) = pool.identifier(instance) else {
        return;
    };
    let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
    match TransformSnapshot::capture(pool, instance) {
        Some(snapshot) => {
            cache.insert(id, snapshot);
        }
        None => {
            cache.remove(&id);
        }
    }
}

/// The script component a callback runs for
#[derive(Debug, Clone, Default)]
pub struct Caller {
    /// Identifier of the owning instance
    pub id: Hash64,
    /// Absolute path of the owning instance
    pub path: String,
    pub socket: SocketId,
    pub component_id: Hash64,
    pub component_index: u8,
}

impl Caller {
    /// Address of the calling component, used as the sender of its posts
    pub fn address(&self) -> Address {
        Address::new(self.socket, self.id).with_fragment(self.component_index)
    }

    /// Url naming the calling component
    pub fn url(&self) -> Url {
        Url {
            socket: Some(self.socket),
            path: Some(self.id),
            fragment: Some(self.component_id),
        }
    }
}

/// Context of the callback currently executing
#[derive(Debug, Default)]
pub struct CallFrame {
    pub caller: Caller,
    pub transforms: SharedTransformCache,
    pub commands: Vec<ScriptCommand>,
}

impl CallFrame {
    pub fn new(caller: Caller, transforms: SharedTransformCache) -> Self {
        Self {
            caller,
            transforms,
            commands: Vec::new(),
        }
    }

    /// Cached transform of an instance, or an error naming it
    pub fn snapshot(&self, id: Hash64) -> Result<TransformSnapshot, String> {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .ok_or_else(|| format!("instance {id} not found"))
    }

    /// Whether an instance with this identifier exists in the collection
    pub fn has_instance(&self, id: Hash64) -> bool {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn push(&mut self, command: ScriptCommand) {
        self.commands.push(command);
    }
}

/// State shared between the script engine and its native functions
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Property definitions collected while a script's top level runs
    pub load: Option<Vec<PropertyDefinition>>,
    /// Set for the duration of one callback
    pub frame: Option<CallFrame>,
}

pub type SharedScriptState = Arc<RwLock<ScriptState>>;

/// Effect queued by a script
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    SetPosition { target: Hash64, position: Vec3 },
    SetRotation { target: Hash64, rotation: Quat },
    Delete { target: Hash64 },
    Post {
        receiver: Url,
        message_id: Hash64,
        table: Option<serde_json::Value>,
    },
}

impl ScriptCommand {
    /// Apply the command to the caller's collection
    pub fn apply(self, caller: &Caller, ctx: &mut ComponentContext<'_>, cache: &SharedTransformCache) {
        match self {
            ScriptCommand::SetPosition { target, position } => {
                let Some(instance) = ctx.instances.from_identifier(target) else {
                    warn!(instance = %target, "set_position target vanished");
                    return;
                };
                if ctx.instances.set_position(instance, position).is_ok() {
                    update_transform_cache(cache, ctx.instances, instance);
                }
            }
            ScriptCommand::SetRotation { target, rotation } => {
                let Some(instance) = ctx.instances.from_identifier(target) else {
                    warn!(instance = %target, "set_rotation target vanished");
                    return;
                };
                if ctx.instances.set_rotation(instance, rotation).is_ok() {
                    update_transform_cache(cache, ctx.instances, instance);
                }
            }
            ScriptCommand::Delete { target } => match ctx.instances.from_identifier(target) {
                Some(instance) => {
                    if ctx.delete(instance) {
                        debug!(instance = %target, caller = %caller.path, "Script deleted instance");
                    }
                }
                None => warn!(instance = %target, "delete target vanished"),
            },
            ScriptCommand::Post {
                receiver,
                message_id,
                table,
            } => {
                let Some(address) = resolve_url(&receiver, caller, ctx.instances, ctx.socket) else {
                    warn!(receiver = %receiver, message_id = %message_id, "Could not resolve receiver");
                    return;
                };
                let result = match &table {
                    Some(table) => ctx.bus.post_table(caller.address(), address, message_id, table),
                    None => ctx.bus.post_lightweight(caller.address(), address, message_id),
                };
                if let Err(err) = result {
                    warn!(receiver = %receiver, message_id = %message_id, error = %err, "Script post failed");
                }
            }
        }
    }
}

/// Turn a symbolic url into an address
///
/// Missing socket and path default to the caller. A component fragment is
/// looked up on the target instance, which must live in the caller's own
/// collection.
pub fn resolve_url(url: &Url, caller: &Caller, pool: &InstancePool, socket: SocketId) -> Option<Address> {
    let target_socket = url.socket.unwrap_or(caller.socket);
    let path = url.path.unwrap_or(caller.id);
    let address = Address::new(target_socket, path);
    let Some(component_id) = url.fragment else {
        return Some(address);
    };
    if target_socket != socket {
        return None;
    }
    let instance = pool.from_identifier(path)?;
    let index = pool.attachment_index(instance, component_id)?;
    debug_assert_ne!(index, WHOLE_INSTANCE);
    Some(address.with_fragment(index))
}
