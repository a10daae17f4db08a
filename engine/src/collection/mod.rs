//! Collections own a forest of instances, one world per component type and
//! one socket, and run the six frame phases over them.

pub mod hierarchy;
pub mod instance;
pub mod prototype;

pub use instance::{Attachment, InstanceHandle, InstancePool};
pub use prototype::{ComponentDesc, Prototype, SpawnParams};

use crate::component::{
    ComponentContext, ComponentError, ComponentParams, ComponentRegistry, ComponentWorld,
    SpawnRequest, WorldParams,
};
use crate::config::EngineConfig;
use crate::core::hash::Hash64;
use crate::core::resource::ResourceHandle;
use crate::core::transform::Transform;
use crate::input::{InputBuffer, InputResult};
use crate::message::{Address, Message, MessageBus, MessageError, SocketId, WHOLE_INSTANCE};
use crate::pipeline::{FramePhase, PhaseTracker};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Errors raised while creating an instance
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error("Instance pool is full ({0} instances)")]
    PoolFull(usize),

    #[error("Identifier already in use: {0}")]
    DuplicateIdentifier(String),

    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("Too many components on one instance: {0}")]
    TooManyComponents(usize),

    #[error("Component limit reached for type '{0}'")]
    ComponentLimitReached(String),

    #[error("Failed to create component of type '{type_name}': {source}")]
    Component {
        type_name: String,
        #[source]
        source: ComponentError,
    },
}

/// Errors raised by hierarchy edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("Invalid instance handle")]
    InvalidInstance,

    #[error("Operation would create a cycle in the hierarchy")]
    CycleRejected,
}

/// A named container of instances
pub struct Collection {
    name: String,
    socket: SocketId,
    registry: Arc<ComponentRegistry>,
    instances: InstancePool,
    // Indexed by component type index
    worlds: Vec<ComponentWorld>,
    component_counts: Vec<usize>,
    spawns: Vec<SpawnRequest>,
    deleted: Vec<InstanceHandle>,
    phases: PhaseTracker,
    active: bool,
}

impl Collection {
    /// Create the collection socket and one world per registered type
    pub fn new(
        name: &str,
        registry: Arc<ComponentRegistry>,
        bus: &mut MessageBus,
        config: &EngineConfig,
    ) -> Result<Self, MessageError> {
        let socket = bus.new_socket(name)?;
        let worlds = registry
            .iter()
            .map(|component_type| {
                (component_type.create_world)(&WorldParams {
                    collection: name.to_string(),
                    socket,
                    max_instances: component_type.max_instances,
                })
            })
            .collect();
        debug!(
            collection = name,
            component_types = registry.len(),
            max_instances = config.max_instances,
            "Created collection"
        );
        Ok(Self {
            name: name.to_string(),
            socket,
            component_counts: vec![0; registry.len()],
            registry,
            instances: InstancePool::new(config.max_instances),
            worlds,
            spawns: Vec::new(),
            deleted: Vec::new(),
            phases: PhaseTracker::new(),
            active: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// Inactive collections keep their instances and queued messages but
    /// do not run frames
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn instances(&self) -> &InstancePool {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstancePool {
        &mut self.instances
    }

    /// Last phase the collection ran
    pub fn phase(&self) -> Option<FramePhase> {
        self.phases.current()
    }

    /// Number of live components of a type
    pub fn component_count(&self, type_name: &str) -> usize {
        self.registry
            .index_of(type_name)
            .and_then(|i| self.component_counts.get(i).copied())
            .unwrap_or(0)
    }

    /// Typed access to the world of a component type
    pub fn world_mut<W: 'static>(&mut self, type_name: &str) -> Option<&mut W> {
        let index = self.registry.index_of(type_name)?;
        self.worlds.get_mut(index)?.downcast_mut::<W>()
    }

    /// Address of an instance in this collection
    pub fn address_of(&self, handle: InstanceHandle) -> Option<Address> {
        self.instances
            .identifier(handle)
            .map(|id| Address::new(self.socket, id))
    }

    pub fn instance_from_identifier(&self, id: Hash64) -> Option<InstanceHandle> {
        self.instances.from_identifier(id)
    }

    pub fn set_parent(
        &mut self,
        child: InstanceHandle,
        parent: Option<InstanceHandle>,
    ) -> Result<(), HierarchyError> {
        self.instances.set_parent(child, parent)
    }

    /// Create an instance from a prototype
    ///
    /// Components are created in prototype order. If any of them fails, the
    /// ones already created are destroyed in reverse order and the slot and
    /// identifier are released before the error is returned.
    pub fn create_instance(
        &mut self,
        bus: &mut MessageBus,
        prototype: &Prototype,
        params: SpawnParams,
    ) -> Result<InstanceHandle, CreationError> {
        if prototype.components.len() >= WHOLE_INSTANCE as usize {
            return Err(CreationError::TooManyComponents(prototype.components.len()));
        }
        let registry = Arc::clone(&self.registry);
        let type_indices = prototype
            .components
            .iter()
            .map(|desc| {
                registry
                    .index_of(&desc.type_name)
                    .ok_or_else(|| CreationError::UnknownComponentType(desc.type_name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let transform = Transform {
            position: params.position,
            rotation: params.rotation,
            scale: params.scale,
        };
        let handle = self.instances.allocate(params.id.as_deref(), transform)?;
        let identifier = self.instances.identifier(handle).unwrap_or_default();

        for (slot, (desc, &type_index)) in prototype.components.iter().zip(&type_indices).enumerate() {
            let Some(component_type) = registry.get(type_index) else {
                continue;
            };
            let result = if self.component_counts[type_index] >= component_type.max_instances {
                Err(CreationError::ComponentLimitReached(component_type.name.clone()))
            } else {
                let component_params = ComponentParams {
                    instance: handle,
                    identifier,
                    component_id: desc.id,
                    component_index: slot as u8,
                    resource: desc.resource,
                    properties: &desc.properties,
                };
                let mut ctx =
                    ComponentContext::new(&mut self.instances, bus, self.socket, &mut self.spawns);
                (component_type.create_component)(
                    &mut *self.worlds[type_index],
                    &mut ctx,
                    &component_params,
                )
                .map_err(|source| CreationError::Component {
                    type_name: component_type.name.clone(),
                    source,
                })
            };

            match result {
                Ok(data) => {
                    self.instances.push_attachment(
                        handle,
                        Attachment {
                            type_index,
                            component_id: desc.id,
                            resource: desc.resource,
                            data,
                            enabled: true,
                        },
                    );
                    self.component_counts[type_index] += 1;
                }
                Err(err) => {
                    warn!(
                        collection = self.name,
                        instance = %identifier,
                        error = %err,
                        "Instance creation failed, rolling back"
                    );
                    self.destroy_components(bus, handle);
                    self.instances.release(handle);
                    return Err(err);
                }
            }
        }

        debug!(
            collection = self.name,
            instance = %identifier,
            components = prototype.components.len(),
            "Created instance"
        );
        Ok(handle)
    }

    /// Destroy an instance's components in reverse attach order
    fn destroy_components(&mut self, bus: &mut MessageBus, handle: InstanceHandle) {
        let registry = Arc::clone(&self.registry);
        while let Some(attachment) = self.instances.pop_attachment(handle) {
            let Some(component_type) = registry.get(attachment.type_index) else {
                continue;
            };
            let mut ctx =
                ComponentContext::new(&mut self.instances, bus, self.socket, &mut self.spawns);
            (component_type.destroy_component)(
                &mut *self.worlds[attachment.type_index],
                &mut ctx,
                handle,
                attachment.data,
            );
            let count = &mut self.component_counts[attachment.type_index];
            *count = count.saturating_sub(1);
        }
    }

    /// Tear down a single instance: components, links, identifier, focus, slot
    fn teardown(&mut self, bus: &mut MessageBus, handle: InstanceHandle) {
        if !self.instances.contains(handle) {
            return;
        }
        self.destroy_components(bus, handle);
        for child in self.instances.children(handle) {
            self.instances.detach(child);
        }
        self.instances.detach(handle);
        self.instances.release(handle);
    }

    /// Flag an instance and its descendants for deletion at the next flush
    ///
    /// Deleting an instance that is already flagged is a no-op.
    pub fn delete_instance(&mut self, handle: InstanceHandle) -> bool {
        self.instances.flag_delete(handle)
    }

    /// Tear down an instance and its descendants right away
    ///
    /// Only safe outside the frame phases.
    pub fn delete_instance_immediate(&mut self, bus: &mut MessageBus, handle: InstanceHandle) {
        let mut subtree = vec![handle];
        let mut index = 0;
        while index < subtree.len() {
            let children = self.instances.children(subtree[index]);
            subtree.extend(children);
            index += 1;
        }
        for instance in subtree.into_iter().rev() {
            self.teardown(bus, instance);
        }
    }

    fn enter(&mut self, phase: FramePhase) -> bool {
        match self.phases.enter(phase) {
            Ok(()) => true,
            Err(err) => {
                error!(collection = self.name, error = %err, "Frame phase refused");
                false
            }
        }
    }

    /// Route buffered input actions through the focus stack
    ///
    /// Actions consumed here are marked in the buffer so later collections
    /// skip them. Returns the number of actions consumed.
    pub fn dispatch_input(&mut self, bus: &mut MessageBus, input: &mut InputBuffer) -> usize {
        if !self.enter(FramePhase::InputDispatch) {
            return 0;
        }
        let registry = Arc::clone(&self.registry);
        let focus = self.instances.focus_stack();
        let mut consumed_count = 0;

        for (action, consumed) in input.entries_mut().iter_mut() {
            if *consumed {
                continue;
            }
            'focus: for &instance in &focus {
                if !self.instances.is_alive(instance) {
                    continue;
                }
                for attachment in self.instances.attachments(instance) {
                    if !attachment.enabled {
                        continue;
                    }
                    let Some(component_type) = registry.get(attachment.type_index) else {
                        continue;
                    };
                    let Some(on_input) = component_type.on_input.as_ref().filter(|_| component_type.input) else {
                        continue;
                    };
                    let mut ctx = ComponentContext::new(
                        &mut self.instances,
                        bus,
                        self.socket,
                        &mut self.spawns,
                    );
                    let result = on_input(
                        &mut *self.worlds[attachment.type_index],
                        &mut ctx,
                        instance,
                        attachment.data,
                        action,
                    );
                    if result == InputResult::Consumed {
                        *consumed = true;
                        consumed_count += 1;
                        break 'focus;
                    }
                }
            }
        }
        consumed_count
    }

    /// Deliver every message queued on the collection socket before this call
    ///
    /// Returns the number of messages taken from the queue.
    pub fn dispatch_messages(&mut self, bus: &mut MessageBus) -> usize {
        if !self.enter(FramePhase::MessageDispatch) {
            return 0;
        }
        let socket = self.socket;
        match bus.dispatch(socket, |bus, message| self.route_message(bus, message)) {
            Ok(count) => count,
            Err(err) => {
                error!(collection = self.name, error = %err, "Message dispatch failed");
                0
            }
        }
    }

    fn route_message(&mut self, bus: &mut MessageBus, message: &Message) {
        let receiver = message.receiver;
        let Some(instance) = self.instances.from_identifier(receiver.path) else {
            warn!(
                receiver = %receiver,
                sender = %message.sender,
                message_id = %message.id,
                "Message dropped, no instance at address"
            );
            return;
        };
        if self.instances.is_pending_delete(instance) {
            warn!(
                receiver = %receiver,
                message_id = %message.id,
                "Message dropped, instance is being deleted"
            );
            return;
        }

        let targets: Vec<Attachment> = if receiver.is_whole_instance() {
            self.instances.attachments(instance)
        } else {
            match self.instances.attachment(instance, receiver.fragment) {
                Some(attachment) => vec![attachment],
                None => {
                    warn!(
                        receiver = %receiver,
                        message_id = %message.id,
                        "Message dropped, no component at fragment"
                    );
                    return;
                }
            }
        };

        let registry = Arc::clone(&self.registry);
        for attachment in targets {
            if !attachment.enabled {
                continue;
            }
            let Some(component_type) = registry.get(attachment.type_index) else {
                continue;
            };
            match component_type.on_message.as_ref() {
                Some(on_message) => {
                    let mut ctx = ComponentContext::new(
                        &mut self.instances,
                        bus,
                        self.socket,
                        &mut self.spawns,
                    );
                    on_message(
                        &mut *self.worlds[attachment.type_index],
                        &mut ctx,
                        instance,
                        attachment.data,
                        message,
                    );
                }
                None if !receiver.is_whole_instance() => {
                    warn!(
                        receiver = %receiver,
                        component_type = component_type.name,
                        "Message dropped, component does not handle messages"
                    );
                }
                None => {}
            }
        }
    }

    /// Run every type's update hook in registration order, then perform the
    /// spawns requested while updating
    pub fn update_components(&mut self, bus: &mut MessageBus, dt: f32) {
        if !self.enter(FramePhase::ComponentUpdate) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        for component_type in registry.iter() {
            let Some(update) = component_type.update.as_ref() else {
                continue;
            };
            let mut ctx =
                ComponentContext::new(&mut self.instances, bus, self.socket, &mut self.spawns);
            update(&mut *self.worlds[component_type.index], &mut ctx, dt);
        }

        for request in std::mem::take(&mut self.spawns) {
            match self.create_instance(bus, &request.prototype, request.params) {
                Ok(instance) => {
                    if let Some(parent) = request.parent {
                        if let Err(err) = self.instances.set_parent(instance, Some(parent)) {
                            warn!(collection = self.name, error = %err, "Spawned instance could not be parented");
                        }
                    }
                }
                Err(err) => {
                    warn!(collection = self.name, error = %err, "Spawn request failed");
                }
            }
        }
    }

    /// Recompute world transforms top-down
    pub fn propagate_transforms(&mut self) -> usize {
        if !self.enter(FramePhase::TransformPropagation) {
            return 0;
        }
        hierarchy::propagate_transforms(&mut self.instances)
    }

    /// Tear down every instance flagged for deletion, children first
    ///
    /// Returns the number of instances removed.
    pub fn flush_deletes(&mut self, bus: &mut MessageBus) -> usize {
        if !self.enter(FramePhase::DeferredDeleteFlush) {
            return 0;
        }
        let pending = self.instances.take_pending();
        for &instance in &pending {
            self.teardown(bus, instance);
        }
        if !pending.is_empty() {
            debug!(collection = self.name, count = pending.len(), "Flushed deleted instances");
        }
        let count = pending.len();
        self.deleted = pending;
        count
    }

    /// Let every type react to the instances removed by the last flush
    pub fn post_update(&mut self, bus: &mut MessageBus) {
        if !self.enter(FramePhase::PostUpdate) {
            return;
        }
        let deleted = std::mem::take(&mut self.deleted);
        let registry = Arc::clone(&self.registry);
        for component_type in registry.iter() {
            let Some(post_update) = component_type.post_update.as_ref() else {
                continue;
            };
            let mut ctx =
                ComponentContext::new(&mut self.instances, bus, self.socket, &mut self.spawns);
            post_update(&mut *self.worlds[component_type.index], &mut ctx, &deleted);
        }
    }

    /// Run the six phases of one frame
    pub fn run_frame(&mut self, bus: &mut MessageBus, input: &mut InputBuffer, dt: f32) -> FrameCounts {
        let consumed = self.dispatch_input(bus, input);
        let messages = self.dispatch_messages(bus);
        self.update_components(bus, dt);
        self.propagate_transforms();
        let deleted = self.flush_deletes(bus);
        self.post_update(bus);
        FrameCounts {
            inputs_consumed: consumed,
            messages_dispatched: messages,
            instances_deleted: deleted,
        }
    }

    /// Call `on_reload` for every attachment that uses one of `resources`
    pub fn reload_resources(&mut self, bus: &mut MessageBus, resources: &[ResourceHandle]) -> usize {
        let registry = Arc::clone(&self.registry);
        let mut reloaded = 0;
        for instance in self.instances.handles() {
            for attachment in self.instances.attachments(instance) {
                let uses_resource = attachment
                    .resource
                    .is_some_and(|resource| resources.contains(&resource));
                if !uses_resource {
                    continue;
                }
                let Some(on_reload) = registry
                    .get(attachment.type_index)
                    .and_then(|t| t.on_reload.as_ref())
                else {
                    continue;
                };
                let mut ctx =
                    ComponentContext::new(&mut self.instances, bus, self.socket, &mut self.spawns);
                on_reload(
                    &mut *self.worlds[attachment.type_index],
                    &mut ctx,
                    instance,
                    attachment.data,
                );
                reloaded += 1;
            }
        }
        reloaded
    }

    /// Delete every instance, destroy the worlds and remove the socket
    pub fn shutdown(mut self, bus: &mut MessageBus) {
        for instance in self.instances.handles() {
            if self.instances.contains(instance) && self.instances.parent(instance).is_none() {
                self.delete_instance_immediate(bus, instance);
            }
        }
        // Anything left is part of a broken chain
        for instance in self.instances.handles() {
            self.teardown(bus, instance);
        }

        let registry = Arc::clone(&self.registry);
        let worlds = std::mem::take(&mut self.worlds);
        for (component_type, world) in registry.iter().zip(worlds).rev() {
            (component_type.destroy_world)(world);
        }
        if let Err(err) = bus.delete_socket(self.socket) {
            warn!(collection = self.name, error = %err, "Failed to delete collection socket");
        }
        debug!(collection = self.name, "Collection shut down");
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("socket", &self.socket)
            .field("instances", &self.instances)
            .field("phase", &self.phases.current())
            .field("active", &self.active)
            .finish()
    }
}

/// Per-collection results of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounts {
    pub inputs_consumed: usize,
    pub messages_dispatched: usize,
    pub instances_deleted: usize,
}
