//! Game object runtime
//!
//! Collections of hierarchical game object instances, each carrying a list of
//! components whose behaviour is supplied by registered component types.
//! Instances talk through addressed, size-bounded messages; a fixed frame
//! pipeline drives input, messages, updates, transform propagation and
//! deferred deletion. Scripted behaviour is provided by the `script`
//! component type, backed by Rhai.

pub mod app;
pub mod collection;
pub mod component;
pub mod config;
pub mod core;
pub mod input;
pub mod message;
pub mod pipeline;
pub mod scripting;
pub mod system;

// Re-export commonly used types
pub mod prelude {
    // Engine
    pub use crate::app::{Engine, EngineBuilder, FrameStats};
    pub use crate::config::{AssetConfig, EngineConfig};
    pub use crate::system::{CollectionId, SYSTEM_SOCKET};

    // Collections and instances
    pub use crate::collection::{
        Collection, ComponentDesc, CreationError, HierarchyError, InstanceHandle, InstancePool,
        Prototype, SpawnParams,
    };

    // Component types
    pub use crate::component::{
        ComponentContext, ComponentData, ComponentError, ComponentParams, ComponentRegistry,
        ComponentTypeDescriptor, WorldParams,
    };

    // Core values
    pub use crate::core::hash::{hash_string32, hash_string64, Hash32, Hash64};
    pub use crate::core::property::{PropertySet, PropertyType, PropertyValue};
    pub use crate::core::resource::{ResourceFactory, ResourceHandle};
    pub use crate::core::transform::Transform;

    // Messaging and input
    pub use crate::input::{InputAction, InputResult};
    pub use crate::message::{Address, Message, MessageBus, SocketId, TypedMessage, Url};

    // Scripting
    pub use crate::scripting::{script_component_type, ScriptEngine, ScriptWorld};

    // Math types
    pub use glam::{Quat, Vec3, Vec4};
}

/// Initialize logging for the engine
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
