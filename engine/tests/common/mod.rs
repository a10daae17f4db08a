//! Shared fixtures for the integration tests

#![allow(dead_code)]

use goengine::component::SpawnRequest;
use goengine::prelude::*;
use std::sync::{Arc, Mutex};

/// Hook calls seen by recorder components, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Created(Hash64),
    Destroyed(Hash64),
    Message { component: Hash64, id: Hash64 },
    Input { component: Hash64, action: Hash32 },
    Updated(usize),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub struct RecorderWorld {
    log: EventLog,
    components: Vec<Option<Hash64>>,
}

/// A component type that records every hook call
///
/// Creation fails when the prototype sets `fail`. Input is consumed when
/// `consume` is set. A `forward` message makes the component post `forwarded`
/// to its own instance while the dispatch is still running, and a `spawn`
/// message requests a `/spawned` child carrying one recorder.
/// `spawn_and_delete` does the same and then deletes the receiving instance.
pub fn recorder_type(name: &str, log: EventLog, max_instances: usize) -> ComponentTypeDescriptor {
    ComponentTypeDescriptor::builder::<RecorderWorld>(name)
        .max_instances(max_instances)
        .input(true)
        .create_world(move |_params| RecorderWorld {
            log: Arc::clone(&log),
            components: Vec::new(),
        })
        .destroy_world(|_world| {})
        .create_component(|world, _ctx, params| {
            if params.properties.get("fail").is_some() {
                return Err(ComponentError::Failed("recorder asked to fail".into()));
            }
            let consume = params.properties.get("consume").is_some();
            world.push(Event::Created(params.component_id));
            world.components.push(Some(params.component_id));
            let index = (world.components.len() - 1) as u64;
            Ok(ComponentData(index | (u64::from(consume) << 32)))
        })
        .destroy_component(|world, _ctx, _instance, data| {
            let slot = (data.0 & 0xFFFF_FFFF) as usize;
            if let Some(id) = world.components.get_mut(slot).and_then(Option::take) {
                world.push(Event::Destroyed(id));
            }
        })
        .update(|world, _ctx, _dt| {
            let live = world.components.iter().flatten().count();
            world.push(Event::Updated(live));
        })
        .on_message(|world, ctx, instance, data, message| {
            let component = world.component(data);
            world.push(Event::Message {
                component,
                id: message.id,
            });
            if message.id == hash_string64("forward") {
                if let Some(address) = ctx.address_of(instance) {
                    let _ = ctx
                        .bus
                        .post_lightweight(address, address, hash_string64("forwarded"));
                }
            }
            let spawn_and_delete = message.id == hash_string64("spawn_and_delete");
            if message.id == hash_string64("spawn") || spawn_and_delete {
                ctx.spawn(SpawnRequest {
                    prototype: Arc::new(Prototype::new().with_component(recorder("child"))),
                    params: SpawnParams::with_id("/spawned").at(Vec3::new(0.0, 2.0, 0.0)),
                    parent: Some(instance),
                });
            }
            if spawn_and_delete {
                ctx.delete(instance);
            }
        })
        .on_input(|world, _ctx, _instance, data, action| {
            let component = world.component(data);
            world.push(Event::Input {
                component,
                action: action.action_id,
            });
            if data.0 >> 32 == 1 {
                InputResult::Consumed
            } else {
                InputResult::Ignored
            }
        })
        .build()
}

impl RecorderWorld {
    fn push(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }

    fn component(&self, data: ComponentData) -> Hash64 {
        let slot = (data.0 & 0xFFFF_FFFF) as usize;
        self.components.get(slot).copied().flatten().unwrap_or_default()
    }
}

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take_events(log: &EventLog) -> Vec<Event> {
    std::mem::take(&mut *log.lock().unwrap())
}

/// Engine with one recorder type registered and one collection loaded
pub fn recorder_engine(log: &EventLog) -> (Engine, CollectionId) {
    let mut registry = ComponentRegistry::new();
    registry.register(recorder_type("recorder", Arc::clone(log), 64)).unwrap();
    let mut engine = EngineBuilder::new().registry(registry).build().unwrap();
    let collection = engine.load_collection("main").unwrap();
    (engine, collection)
}

pub fn recorder(id: &str) -> ComponentDesc {
    ComponentDesc::new(id, "recorder")
}

pub fn spawn(
    engine: &mut Engine,
    collection: CollectionId,
    prototype: &Prototype,
    params: SpawnParams,
) -> Result<InstanceHandle, CreationError> {
    let (collection, bus) = engine.collection_and_bus(collection).unwrap();
    collection.create_instance(bus, prototype, params)
}
