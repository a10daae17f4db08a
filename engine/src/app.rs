//! Engine facade: owns the registry, the message bus and the collections,
//! and drives the frame across every loaded collection.

use crate::collection::Collection;
use crate::component::ComponentRegistry;
use crate::config::{AssetConfig, EngineConfig};
use crate::core::hash::enable_reverse_lookup;
use crate::core::resource::ResourceHandle;
use crate::input::{InputAction, InputBuffer};
use crate::message::{Address, MessageBus, MessageError};
use crate::system::{CollectionCommand, CollectionId, SystemController, TimeStepMode, SYSTEM_SOCKET};
use slotmap::SlotMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Results of one engine frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Delta time after the time step factor was applied
    pub dt: f32,
    pub system_messages: usize,
    pub messages_dispatched: usize,
    pub inputs_consumed: usize,
    pub instances_deleted: usize,
}

/// The running engine
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ComponentRegistry>,
    bus: MessageBus,
    collections: SlotMap<CollectionId, Collection>,
    // Update order is load order
    order: Vec<CollectionId>,
    input: InputBuffer,
    system: SystemController,
    frame: u64,
}

impl Engine {
    /// Create an engine with the given configuration and component types
    pub fn new(config: EngineConfig, registry: ComponentRegistry) -> Result<Self, MessageError> {
        enable_reverse_lookup(config.reverse_hash_lookup);
        let mut bus = MessageBus::from_config(&config);
        let system_socket = bus.new_socket(SYSTEM_SOCKET)?;
        info!(
            component_types = registry.len(),
            max_instances = config.max_instances,
            "Engine created"
        );
        Ok(Self {
            config,
            registry: Arc::new(registry),
            bus,
            collections: SlotMap::with_key(),
            order: Vec::new(),
            input: InputBuffer::new(),
            system: SystemController::new(system_socket),
            frame: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MessageBus {
        &mut self.bus
    }

    /// Address of the engine-global controller
    pub fn system_address(&self) -> Address {
        self.system.address()
    }

    pub fn is_running(&self) -> bool {
        self.system.is_running()
    }

    pub fn exit_code(&self) -> i32 {
        self.system.exit_code()
    }

    pub fn time_step_factor(&self) -> f32 {
        self.system.time_step_factor()
    }

    pub fn time_step_mode(&self) -> TimeStepMode {
        self.system.time_step_mode()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Create an empty collection; it runs after every collection loaded before it
    pub fn load_collection(&mut self, name: &str) -> Result<CollectionId, MessageError> {
        let collection = Collection::new(name, Arc::clone(&self.registry), &mut self.bus, &self.config)?;
        let id = self.collections.insert(collection);
        self.order.push(id);
        info!(collection = name, "Loaded collection");
        Ok(id)
    }

    /// Start or stop running a collection's frames
    pub fn set_collection_active(&mut self, id: CollectionId, active: bool) -> bool {
        match self.collections.get_mut(id) {
            Some(collection) => {
                collection.set_active(active);
                debug!(collection = collection.name(), active, "Collection activity changed");
                true
            }
            None => false,
        }
    }

    /// Shut a collection down and drop it
    pub fn unload_collection(&mut self, id: CollectionId) -> bool {
        match self.collections.remove(id) {
            Some(collection) => {
                self.order.retain(|c| *c != id);
                info!(collection = collection.name(), "Unloading collection");
                collection.shutdown(&mut self.bus);
                true
            }
            None => false,
        }
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(id)
    }

    pub fn collection_mut(&mut self, id: CollectionId) -> Option<&mut Collection> {
        self.collections.get_mut(id)
    }

    /// A collection together with the bus, for creating and deleting instances
    pub fn collection_and_bus(&mut self, id: CollectionId) -> Option<(&mut Collection, &mut MessageBus)> {
        let collection = self.collections.get_mut(id)?;
        Some((collection, &mut self.bus))
    }

    pub fn collection_by_name(&self, name: &str) -> Option<CollectionId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.collections.get(*id).is_some_and(|c| c.name() == name))
    }

    /// Buffer an input action for the next frame
    pub fn push_input(&mut self, action: InputAction) {
        self.input.push(action);
    }

    /// Run one frame
    ///
    /// System commands are handled first, then every collection runs its six
    /// phases in load order with the scaled delta time.
    pub fn update(&mut self, dt: f32) -> FrameStats {
        self.frame += 1;
        let mut stats = FrameStats {
            frame: self.frame,
            ..Default::default()
        };

        let system = &mut self.system;
        let collections = &mut self.collections;
        stats.system_messages = match self
            .bus
            .dispatch(system.socket(), |bus, message| system.handle(collections, bus, message))
        {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "System socket dispatch failed");
                0
            }
        };

        for command in self.system.take_collection_commands() {
            self.apply_collection_command(command);
        }

        stats.dt = self.system.scale_dt(dt);
        for id in &self.order {
            let Some(collection) = self.collections.get_mut(*id) else {
                continue;
            };
            if !collection.is_active() {
                continue;
            }
            let counts = collection.run_frame(&mut self.bus, &mut self.input, stats.dt);
            stats.messages_dispatched += counts.messages_dispatched;
            stats.inputs_consumed += counts.inputs_consumed;
            stats.instances_deleted += counts.instances_deleted;
        }
        self.input.clear();

        trace!(
            frame = stats.frame,
            dt = stats.dt,
            messages = stats.messages_dispatched,
            deleted = stats.instances_deleted,
            "Frame complete"
        );
        stats
    }

    fn apply_collection_command(&mut self, command: CollectionCommand) {
        match command {
            CollectionCommand::Load(name) => {
                if self.collection_by_name(&name).is_some() {
                    warn!(collection = %name, "Collection already loaded");
                    return;
                }
                match self.load_collection(&name) {
                    Ok(id) => {
                        self.set_collection_active(id, false);
                    }
                    Err(err) => warn!(collection = %name, error = %err, "Failed to load collection"),
                }
            }
            CollectionCommand::Unload(name) => match self.collection_by_name(&name) {
                Some(id) => {
                    self.unload_collection(id);
                }
                None => warn!(collection = %name, "Cannot unload unknown collection"),
            },
            CollectionCommand::Activate(name) => match self.collection_by_name(&name) {
                Some(id) => {
                    self.set_collection_active(id, true);
                }
                None => warn!(collection = %name, "Cannot activate unknown collection"),
            },
        }
    }

    /// Notify every component using one of `resources` that it was reloaded
    pub fn reload_resources(&mut self, resources: &[ResourceHandle]) -> usize {
        let mut reloaded = 0;
        for id in &self.order {
            if let Some(collection) = self.collections.get_mut(*id) {
                reloaded += collection.reload_resources(&mut self.bus, resources);
            }
        }
        debug!(resources = resources.len(), components = reloaded, "Reloaded resources");
        reloaded
    }

    /// Unload every collection in reverse load order
    pub fn shutdown(mut self) {
        for id in std::mem::take(&mut self.order).into_iter().rev() {
            if let Some(collection) = self.collections.remove(id) {
                collection.shutdown(&mut self.bus);
            }
        }
        info!(frames = self.frame, exit_code = self.system.exit_code(), "Engine shut down");
    }
}

/// Builder for configuring and creating an [`Engine`]
pub struct EngineBuilder {
    config: EngineConfig,
    registry: ComponentRegistry,
}

impl EngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: ComponentRegistry::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the asset configuration
    pub fn asset_config(mut self, config: AssetConfig) -> Self {
        self.config.asset_config = config;
        self
    }

    /// Set the per-collection instance limit
    pub fn max_instances(mut self, max_instances: usize) -> Self {
        self.config.max_instances = max_instances;
        self
    }

    /// Use an already populated component registry
    pub fn registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the Engine
    pub fn build(self) -> Result<Engine, MessageError> {
        Engine::new(self.config, self.registry)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
