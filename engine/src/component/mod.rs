//! Component types plug into instances through a fixed table of hooks
//!
//! A component type owns one world per collection. The collection owns the
//! instances and calls the hooks at the right points of the frame; the world
//! keeps whatever per-component state the type needs, keyed by the opaque
//! [`ComponentData`] value returned from its create hook.

pub mod registry;

pub use registry::{
    ComponentRegistry, ComponentType, ComponentTypeBuilder, ComponentTypeDescriptor, ComponentWorld,
    RegistryError,
};

use crate::collection::instance::{InstanceHandle, InstancePool};
use crate::collection::prototype::{Prototype, SpawnParams};
use crate::core::hash::Hash64;
use crate::core::property::PropertySet;
use crate::core::resource::{ResourceError, ResourceHandle};
use crate::message::{Address, MessageBus, MessageError, MessageKind, SocketId};
use std::sync::Arc;
use tracing::debug;

/// Opaque per-component value owned by the component type's world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentData(pub u64);

/// Parameters handed to `create_world`
#[derive(Debug, Clone)]
pub struct WorldParams {
    /// Name of the owning collection
    pub collection: String,
    /// Socket of the owning collection
    pub socket: SocketId,
    /// Maximum number of components of this type in the collection
    pub max_instances: usize,
}

/// Parameters handed to `create_component`
#[derive(Debug, Clone, Copy)]
pub struct ComponentParams<'a> {
    pub instance: InstanceHandle,
    /// Identifier of the instance
    pub identifier: Hash64,
    /// Prototype component id
    pub component_id: Hash64,
    /// Slot index on the instance, used as the message fragment
    pub component_index: u8,
    pub resource: Option<ResourceHandle>,
    /// Prototype property overrides
    pub properties: &'a PropertySet,
}

/// Instance creation requested from inside a hook
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub prototype: Arc<Prototype>,
    pub params: SpawnParams,
    /// Optional parent for the new instance
    pub parent: Option<InstanceHandle>,
}

/// What a hook may touch while it runs
///
/// Instances of the hook's own collection, the message bus, and deferred
/// operations. Deletions only flag; spawns are performed once the update
/// phase ends.
pub struct ComponentContext<'a> {
    pub instances: &'a mut InstancePool,
    pub bus: &'a mut MessageBus,
    /// Socket of the collection being processed
    pub socket: SocketId,
    spawns: &'a mut Vec<SpawnRequest>,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(
        instances: &'a mut InstancePool,
        bus: &'a mut MessageBus,
        socket: SocketId,
        spawns: &'a mut Vec<SpawnRequest>,
    ) -> Self {
        Self {
            instances,
            bus,
            socket,
            spawns,
        }
    }

    /// Address of an instance in this collection
    pub fn address_of(&self, instance: InstanceHandle) -> Option<Address> {
        self.instances
            .identifier(instance)
            .map(|id| Address::new(self.socket, id))
    }

    /// Post a message
    pub fn post(
        &mut self,
        sender: Address,
        receiver: Address,
        message_id: Hash64,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), MessageError> {
        self.bus.post(sender, receiver, message_id, kind, payload)
    }

    /// Flag an instance and its subtree for deletion at the next flush
    pub fn delete(&mut self, instance: InstanceHandle) -> bool {
        self.instances.flag_delete(instance)
    }

    /// Request a new instance, created at the end of the update phase
    pub fn spawn(&mut self, request: SpawnRequest) {
        debug!(
            components = request.prototype.components.len(),
            id = ?request.params.id,
            "Queued spawn request"
        );
        self.spawns.push(request);
    }
}

/// Errors a component hook can report
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Component type '{0}' requires a resource")]
    MissingResource(String),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("World of component type '{0}' has an unexpected type")]
    WorldMismatch(String),

    #[error("Component world is full ({0} components)")]
    WorldFull(usize),

    #[error("{0}")]
    Failed(String),
}
