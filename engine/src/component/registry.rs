//! Registry of component types and their hook tables

use super::{ComponentContext, ComponentData, ComponentError, ComponentParams, WorldParams};
use crate::collection::instance::InstanceHandle;
use crate::input::{InputAction, InputResult};
use crate::message::Message;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

/// Type-erased per-collection world of a component type
pub type ComponentWorld = Box<dyn Any>;

/// Creates the world for one collection
pub type CreateWorldFn = Arc<dyn Fn(&WorldParams) -> ComponentWorld + Send + Sync>;

/// Destroys a world created by [`CreateWorldFn`]
pub type DestroyWorldFn = Arc<dyn Fn(ComponentWorld) + Send + Sync>;

/// Creates one component on an instance
pub type CreateComponentFn = Arc<
    dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, &ComponentParams<'_>) -> Result<ComponentData, ComponentError>
        + Send
        + Sync,
>;

/// Destroys one component
pub type DestroyComponentFn =
    Arc<dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData) + Send + Sync>;

/// Per-frame update over the whole world
pub type UpdateFn = Arc<dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, f32) + Send + Sync>;

/// Message delivered to one component
pub type OnMessageFn = Arc<
    dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &Message) + Send + Sync,
>;

/// Input action delivered to one component of a focused instance
pub type OnInputFn = Arc<
    dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &InputAction) -> InputResult
        + Send
        + Sync,
>;

/// The component's resource was reloaded
pub type OnReloadFn =
    Arc<dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData) + Send + Sync>;

/// Runs after the deferred-delete flush with the instances that were removed
pub type PostUpdateFn =
    Arc<dyn Fn(&mut dyn Any, &mut ComponentContext<'_>, &[InstanceHandle]) + Send + Sync>;

/// Hook table as supplied by a component type, before validation
pub struct ComponentTypeDescriptor {
    pub name: String,
    /// Maximum number of components of this type per collection
    pub max_instances: usize,
    /// Whether the type takes part in input dispatch
    pub input: bool,
    pub create_world: Option<CreateWorldFn>,
    pub destroy_world: Option<DestroyWorldFn>,
    pub create_component: Option<CreateComponentFn>,
    pub destroy_component: Option<DestroyComponentFn>,
    pub update: Option<UpdateFn>,
    pub on_message: Option<OnMessageFn>,
    pub on_input: Option<OnInputFn>,
    pub on_reload: Option<OnReloadFn>,
    pub post_update: Option<PostUpdateFn>,
}

impl ComponentTypeDescriptor {
    /// Start a descriptor whose world is of type `W`
    pub fn builder<W: 'static>(name: &str) -> ComponentTypeBuilder<W> {
        ComponentTypeBuilder {
            descriptor: ComponentTypeDescriptor {
                name: name.to_string(),
                max_instances: 1024,
                input: false,
                create_world: None,
                destroy_world: None,
                create_component: None,
                destroy_component: None,
                update: None,
                on_message: None,
                on_input: None,
                on_reload: None,
                post_update: None,
            },
            _world: PhantomData,
        }
    }
}

// Pin closure signatures to the erased hook types
fn create_component_fn(
    f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, &ComponentParams<'_>) -> Result<ComponentData, ComponentError>
        + Send
        + Sync
        + 'static,
) -> CreateComponentFn {
    Arc::new(f)
}

fn destroy_component_fn(
    f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData) + Send + Sync + 'static,
) -> DestroyComponentFn {
    Arc::new(f)
}

fn update_fn(f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, f32) + Send + Sync + 'static) -> UpdateFn {
    Arc::new(f)
}

fn on_message_fn(
    f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &Message)
        + Send
        + Sync
        + 'static,
) -> OnMessageFn {
    Arc::new(f)
}

fn on_input_fn(
    f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &InputAction) -> InputResult
        + Send
        + Sync
        + 'static,
) -> OnInputFn {
    Arc::new(f)
}

fn post_update_fn(
    f: impl Fn(&mut dyn Any, &mut ComponentContext<'_>, &[InstanceHandle]) + Send + Sync + 'static,
) -> PostUpdateFn {
    Arc::new(f)
}

fn world_mismatch(name: &str) {
    error!(component_type = name, "Component world has an unexpected type");
}

/// Typed builder for [`ComponentTypeDescriptor`]
///
/// Hooks receive `&mut W`; the builder downcasts the erased world before
/// calling them.
pub struct ComponentTypeBuilder<W> {
    descriptor: ComponentTypeDescriptor,
    _world: PhantomData<fn() -> W>,
}

impl<W: 'static> ComponentTypeBuilder<W> {
    pub fn max_instances(mut self, max_instances: usize) -> Self {
        self.descriptor.max_instances = max_instances;
        self
    }

    /// Take part in input dispatch; requires an `on_input` hook
    pub fn input(mut self, input: bool) -> Self {
        self.descriptor.input = input;
        self
    }

    pub fn create_world<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorldParams) -> W + Send + Sync + 'static,
    {
        self.descriptor.create_world = Some(Arc::new(move |params: &WorldParams| -> ComponentWorld {
            Box::new(f(params))
        }));
        self
    }

    pub fn destroy_world<F>(mut self, f: F) -> Self
    where
        F: Fn(W) + Send + Sync + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.destroy_world = Some(Arc::new(move |world: ComponentWorld| {
            match world.downcast::<W>() {
                Ok(world) => f(*world),
                Err(_) => world_mismatch(&name),
            }
        }));
        self
    }

    pub fn create_component<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, &ComponentParams<'_>) -> Result<ComponentData, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.create_component = Some(create_component_fn(move |world, ctx, params| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, params),
                None => Err(ComponentError::WorldMismatch(name.clone())),
            }
        }));
        self
    }

    pub fn destroy_component<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, InstanceHandle, ComponentData) + Send + Sync + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.destroy_component =
            Some(destroy_component_fn(move |world, ctx, instance, data| {
                match world.downcast_mut::<W>() {
                    Some(world) => f(world, ctx, instance, data),
                    None => world_mismatch(&name),
                }
            }));
        self
    }

    pub fn update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, f32) + Send + Sync + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.update = Some(update_fn(move |world, ctx, dt| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, dt),
                None => world_mismatch(&name),
            }
        }));
        self
    }

    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &Message)
            + Send
            + Sync
            + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.on_message = Some(on_message_fn(move |world, ctx, instance, data, message| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, instance, data, message),
                None => world_mismatch(&name),
            }
        }));
        self
    }

    pub fn on_input<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, InstanceHandle, ComponentData, &InputAction) -> InputResult
            + Send
            + Sync
            + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.on_input = Some(on_input_fn(move |world, ctx, instance, data, action| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, instance, data, action),
                None => {
                    world_mismatch(&name);
                    InputResult::Ignored
                }
            }
        }));
        self
    }

    pub fn on_reload<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, InstanceHandle, ComponentData) + Send + Sync + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.on_reload = Some(destroy_component_fn(move |world, ctx, instance, data| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, instance, data),
                None => world_mismatch(&name),
            }
        }));
        self
    }

    pub fn post_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut W, &mut ComponentContext<'_>, &[InstanceHandle]) + Send + Sync + 'static,
    {
        let name = self.descriptor.name.clone();
        self.descriptor.post_update = Some(post_update_fn(move |world, ctx, deleted| {
            match world.downcast_mut::<W>() {
                Some(world) => f(world, ctx, deleted),
                None => world_mismatch(&name),
            }
        }));
        self
    }

    pub fn build(self) -> ComponentTypeDescriptor {
        self.descriptor
    }
}

/// Errors raised while registering component types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Component type already registered: {0}")]
    DuplicateType(String),

    #[error("Component type '{type_name}' is missing required hook '{hook}'")]
    MissingHook {
        type_name: String,
        hook: &'static str,
    },
}

/// A validated component type
pub struct ComponentType {
    pub name: String,
    /// Registration index, which is also the update order
    pub index: usize,
    pub max_instances: usize,
    pub input: bool,
    pub create_world: CreateWorldFn,
    pub destroy_world: DestroyWorldFn,
    pub create_component: CreateComponentFn,
    pub destroy_component: DestroyComponentFn,
    pub update: Option<UpdateFn>,
    pub on_message: Option<OnMessageFn>,
    pub on_input: Option<OnInputFn>,
    pub on_reload: Option<OnReloadFn>,
    pub post_update: Option<PostUpdateFn>,
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("max_instances", &self.max_instances)
            .field("input", &self.input)
            .field("update", &self.update.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_input", &self.on_input.is_some())
            .field("on_reload", &self.on_reload.is_some())
            .field("post_update", &self.post_update.is_some())
            .finish()
    }
}

/// Registry of component types, in registration order
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: Vec<ComponentType>,
    by_name: HashMap<String, usize>,
}

fn required<T>(hook: Option<T>, type_name: &str, name: &'static str) -> Result<T, RegistryError> {
    hook.ok_or_else(|| RegistryError::MissingHook {
        type_name: type_name.to_string(),
        hook: name,
    })
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a component type, returning its index
    pub fn register(&mut self, descriptor: ComponentTypeDescriptor) -> Result<usize, RegistryError> {
        let name = descriptor.name;
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateType(name));
        }
        let create_world = required(descriptor.create_world, &name, "create_world")?;
        let destroy_world = required(descriptor.destroy_world, &name, "destroy_world")?;
        let create_component = required(descriptor.create_component, &name, "create_component")?;
        let destroy_component = required(descriptor.destroy_component, &name, "destroy_component")?;
        if descriptor.input && descriptor.on_input.is_none() {
            return Err(RegistryError::MissingHook {
                type_name: name,
                hook: "on_input",
            });
        }

        let index = self.types.len();
        debug!(
            component_type = name,
            index,
            max_instances = descriptor.max_instances,
            input = descriptor.input,
            "Registered component type"
        );
        self.by_name.insert(name.clone(), index);
        self.types.push(ComponentType {
            name,
            index,
            max_instances: descriptor.max_instances,
            input: descriptor.input,
            create_world,
            destroy_world,
            create_component,
            destroy_component,
            update: descriptor.update,
            on_message: descriptor.on_message,
            on_input: descriptor.on_input,
            on_reload: descriptor.on_reload,
            post_update: descriptor.post_update,
        });
        Ok(index)
    }

    /// Get a component type by registration index
    pub fn get(&self, index: usize) -> Option<&ComponentType> {
        self.types.get(index)
    }

    /// Get a component type by name
    pub fn get_by_name(&self, name: &str) -> Option<&ComponentType> {
        self.by_name.get(name).and_then(|&i| self.types.get(i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Iterate in registration order
    pub fn iter(&self) -> std::slice::Iter<'_, ComponentType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Get a list of all registered component names
    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        created: u64,
    }

    fn counter_type(name: &str) -> ComponentTypeBuilder<Counter> {
        ComponentTypeDescriptor::builder::<Counter>(name)
            .create_world(|_| Counter::default())
            .destroy_world(|_| {})
            .create_component(|world, _, _| {
                world.created += 1;
                Ok(ComponentData(world.created))
            })
            .destroy_component(|_, _, _, _| {})
    }

    #[test]
    fn test_register_in_order() {
        let mut registry = ComponentRegistry::new();
        assert_eq!(registry.register(counter_type("sprite").build()), Ok(0));
        assert_eq!(registry.register(counter_type("script").build()), Ok(1));
        assert_eq!(registry.type_names(), vec!["sprite", "script"]);
        assert_eq!(registry.index_of("script"), Some(1));
        assert_eq!(registry.get_by_name("sprite").map(|t| t.index), Some(0));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ComponentRegistry::new();
        registry.register(counter_type("sprite").build()).unwrap();
        assert_eq!(
            registry.register(counter_type("sprite").build()),
            Err(RegistryError::DuplicateType("sprite".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_missing_hooks() {
        let mut registry = ComponentRegistry::new();
        let descriptor = ComponentTypeDescriptor::builder::<Counter>("broken")
            .create_world(|_| Counter::default())
            .destroy_world(|_| {})
            .destroy_component(|_, _, _, _| {})
            .build();
        assert_eq!(
            registry.register(descriptor),
            Err(RegistryError::MissingHook {
                type_name: "broken".to_string(),
                hook: "create_component",
            })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_input_requires_on_input() {
        let mut registry = ComponentRegistry::new();
        assert!(matches!(
            registry.register(counter_type("pad").input(true).build()),
            Err(RegistryError::MissingHook { hook: "on_input", .. })
        ));

        let descriptor = counter_type("pad")
            .input(true)
            .on_input(|_, _, _, _, _| InputResult::Consumed)
            .build();
        assert!(registry.register(descriptor).is_ok());
        assert!(registry.get(0).map(|t| t.input).unwrap_or(false));
    }

    #[test]
    fn test_erased_world_round_trip() {
        let mut registry = ComponentRegistry::new();
        registry.register(counter_type("sprite").build()).unwrap();
        let component_type = registry.get(0).unwrap();

        let params = WorldParams {
            collection: "main".to_string(),
            socket: crate::message::SocketId::from_name("main"),
            max_instances: 4,
        };
        let mut world = (component_type.create_world)(&params);
        assert!(world.downcast_mut::<Counter>().is_some());
        (component_type.destroy_world)(world);
    }
}
