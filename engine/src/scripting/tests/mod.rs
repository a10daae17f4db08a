mod lifecycle_tests;
mod reload_tests;

use crate::app::{Engine, EngineBuilder};
use crate::collection::{ComponentDesc, InstanceHandle, Prototype, SpawnParams};
use crate::component::ComponentRegistry;
use crate::core::property::PropertySet;
use crate::core::resource::ResourceHandle;
use crate::scripting::{script_component_type, ScriptEngine, ScriptWorld, SCRIPT_COMPONENT};
use crate::system::CollectionId;
use rhai::Map;
use std::sync::Arc;

/// An engine with the script component registered and one collection loaded
struct Harness {
    engine: Engine,
    scripts: Arc<ScriptEngine>,
    collection: CollectionId,
}

impl Harness {
    fn new() -> Self {
        let scripts = Arc::new(ScriptEngine::new());
        let mut registry = ComponentRegistry::new();
        registry
            .register(script_component_type(Arc::clone(&scripts), 64))
            .unwrap();
        let mut engine = EngineBuilder::new().registry(registry).build().unwrap();
        let collection = engine.load_collection("main").unwrap();
        Self {
            engine,
            scripts,
            collection,
        }
    }

    fn load(&self, name: &str, source: &str) -> ResourceHandle {
        self.scripts.load_source(name, source).unwrap()
    }

    fn spawn(&mut self, script: ResourceHandle, id: &str, properties: PropertySet) -> InstanceHandle {
        let mut desc = ComponentDesc::new("script", SCRIPT_COMPONENT).with_resource(script);
        desc.properties = properties;
        let prototype = Prototype::new().with_component(desc);
        let (collection, bus) = self.engine.collection_and_bus(self.collection).unwrap();
        collection
            .create_instance(bus, &prototype, SpawnParams::with_id(id))
            .unwrap()
    }

    fn world(&mut self) -> &mut ScriptWorld {
        self.engine
            .collection_mut(self.collection)
            .unwrap()
            .world_mut::<ScriptWorld>(SCRIPT_COMPONENT)
            .unwrap()
    }

    fn this(&mut self, instance: InstanceHandle) -> Map {
        self.world().this(instance).unwrap()
    }
}
