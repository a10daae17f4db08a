//! Engine-global commands on the `@system` socket and input focus

mod common;

use common::{new_log, recorder, recorder_type, spawn, take_events, Event, EventLog};
use goengine::prelude::*;
use goengine::system::{Exit, SetTimeStep, TimeStepMode, TransformResponse};
use serde_json::json;
use std::sync::Arc;

fn engine_with(log: &EventLog, names: &[&str]) -> (Engine, Vec<CollectionId>) {
    let mut registry = ComponentRegistry::new();
    registry.register(recorder_type("recorder", Arc::clone(log), 64)).unwrap();
    let mut engine = EngineBuilder::new().registry(registry).build().unwrap();
    let ids = names
        .iter()
        .map(|name| engine.load_collection(name).unwrap())
        .collect();
    (engine, ids)
}

fn post_to_system(engine: &mut Engine, sender: Address, name: &str) {
    let system = engine.system_address();
    engine
        .bus_mut()
        .post_lightweight(sender, system, hash_string64(name))
        .unwrap();
}

#[test]
fn test_exit_stops_the_engine() {
    let log = new_log();
    let (mut engine, _) = engine_with(&log, &["main"]);
    assert!(engine.is_running());

    let system = engine.system_address();
    engine
        .bus_mut()
        .post_typed(system, system, &Exit { code: 3 })
        .unwrap();
    let stats = engine.update(0.016);
    assert_eq!(stats.system_messages, 1);
    assert!(!engine.is_running());
    assert_eq!(engine.exit_code(), 3);
}

#[test]
fn test_exit_from_a_table() {
    let log = new_log();
    let (mut engine, _) = engine_with(&log, &["main"]);
    let system = engine.system_address();
    engine
        .bus_mut()
        .post_table(system, system, hash_string64("exit"), &json!({ "code": 7 }))
        .unwrap();
    engine.update(0.016);
    assert_eq!(engine.exit_code(), 7);
}

#[test]
fn test_time_step_scales_delta_time() {
    let log = new_log();
    let (mut engine, _) = engine_with(&log, &["main"]);
    let system = engine.system_address();

    engine
        .bus_mut()
        .post_typed(system, system, &SetTimeStep::new(0.5, TimeStepMode::Continuous))
        .unwrap();
    assert_eq!(engine.update(1.0).dt, 0.5);
    assert_eq!(engine.update(2.0).dt, 1.0);

    // negative factors are refused
    engine
        .bus_mut()
        .post_typed(system, system, &SetTimeStep::new(-1.0, TimeStepMode::Continuous))
        .unwrap();
    assert_eq!(engine.update(1.0).dt, 0.5);

    post_to_system(&mut engine, system, "reset_time_step");
    assert_eq!(engine.update(1.0).dt, 1.0);
    assert_eq!(engine.time_step_factor(), 1.0);
}

#[test]
fn test_discrete_time_step_hands_out_whole_frames() {
    let log = new_log();
    let (mut engine, _) = engine_with(&log, &["main"]);
    let system = engine.system_address();
    engine
        .bus_mut()
        .post_table(
            system,
            system,
            SetTimeStep::DESCRIPTOR.id(),
            &json!({ "factor": 0.5, "mode": "discrete" }),
        )
        .unwrap();

    // the first frame only applies the request and accumulates half a frame
    assert_eq!(engine.update(1.0).dt, 0.0);
    assert_eq!(engine.time_step_mode(), TimeStepMode::Discrete);
    assert_eq!(engine.update(1.0).dt, 1.0);
    assert_eq!(engine.update(1.0).dt, 0.0);
    assert_eq!(engine.update(1.0).dt, 1.0);

    post_to_system(&mut engine, system, "reset_time_step");
    assert_eq!(engine.update(1.0).dt, 1.0);
    assert_eq!(engine.time_step_mode(), TimeStepMode::Continuous);
}

#[test]
fn test_collections_are_managed_through_the_system_socket() {
    let log = new_log();
    let (mut engine, ids) = engine_with(&log, &["main"]);
    let system = engine.system_address();
    let load = hash_string64("load_collection");
    let activate = hash_string64("activate_collection");
    let unload = hash_string64("unload_collection");

    engine
        .bus_mut()
        .post_table(system, system, load, &json!({ "collection": "level" }))
        .unwrap();
    engine.update(0.016);
    let level = engine.collection_by_name("level").unwrap();
    assert!(!engine.collection(level).unwrap().is_active());
    assert!(engine.collection(ids[0]).unwrap().is_active());

    // an inactive collection does not run its frames; `main` still does
    spawn(
        &mut engine,
        level,
        &Prototype::new().with_component(recorder("r")),
        SpawnParams::with_id("/r"),
    )
    .unwrap();
    take_events(&log);
    engine.update(0.016);
    assert_eq!(take_events(&log), vec![Event::Updated(0)]);

    engine
        .bus_mut()
        .post_table(system, system, activate, &json!({ "collection": "level" }))
        .unwrap();
    engine.update(0.016);
    assert!(engine.collection(level).unwrap().is_active());
    assert_eq!(take_events(&log), vec![Event::Updated(0), Event::Updated(1)]);

    // loading a name twice keeps the existing collection
    engine
        .bus_mut()
        .post_table(system, system, load, &json!({ "collection": "level" }))
        .unwrap();
    engine.update(0.016);
    assert_eq!(engine.collection_by_name("level"), Some(level));

    let socket = engine.collection(level).unwrap().socket();
    engine
        .bus_mut()
        .post_table(system, system, unload, &json!({ "collection": "level" }))
        .unwrap();
    engine.update(0.016);
    assert!(engine.collection(level).is_none());
    assert!(engine.collection_by_name("level").is_none());
    assert!(!engine.bus().has_socket(socket));
    assert!(take_events(&log).contains(&Event::Destroyed(hash_string64("r"))));
}

#[test]
fn test_unknown_system_message_is_ignored() {
    let log = new_log();
    let (mut engine, _) = engine_with(&log, &["main"]);
    let system = engine.system_address();
    post_to_system(&mut engine, system, "make_coffee");
    let stats = engine.update(0.016);
    assert_eq!(stats.system_messages, 1);
    assert!(engine.is_running());
}

#[test]
fn test_transform_request_is_answered() {
    let log = new_log();
    let (mut engine, ids) = engine_with(&log, &["main"]);
    spawn(
        &mut engine,
        ids[0],
        &Prototype::new().with_component(recorder("p")),
        SpawnParams::with_id("/a").at(Vec3::new(1.0, 2.0, 3.0)),
    )
    .unwrap();
    let socket = engine.collection(ids[0]).unwrap().socket();
    let sender = Address::new(socket, hash_string64("/a"));
    post_to_system(&mut engine, sender, "request_transform");

    // the reply is queued before the collection dispatches its messages
    engine.update(0.016);
    let replies: Vec<Event> = take_events(&log)
        .into_iter()
        .filter(|e| matches!(e, Event::Message { .. }))
        .collect();
    assert_eq!(
        replies,
        vec![Event::Message {
            component: hash_string64("p"),
            id: TransformResponse::DESCRIPTOR.id(),
        }]
    );
}

#[test]
fn test_input_goes_to_the_newest_focus_across_collections() {
    let log = new_log();
    let (mut engine, ids) = engine_with(&log, &["first", "second"]);
    let consumer = Prototype::new()
        .with_component(recorder("consumer").with_property("consume", PropertyValue::Number(1.0)));
    let watcher = Prototype::new().with_component(recorder("watcher"));
    spawn(&mut engine, ids[0], &consumer, SpawnParams::with_id("/hero")).unwrap();
    spawn(&mut engine, ids[1], &watcher, SpawnParams::with_id("/hud")).unwrap();

    let first = Address::new(engine.collection(ids[0]).unwrap().socket(), hash_string64("/hero"));
    let second = Address::new(engine.collection(ids[1]).unwrap().socket(), hash_string64("/hud"));
    post_to_system(&mut engine, first, "acquire_input_focus");
    post_to_system(&mut engine, second, "acquire_input_focus");
    engine.update(0.016);
    take_events(&log);

    let jump = hash_string32("jump");
    engine.push_input(InputAction::pressed("jump"));
    let stats = engine.update(0.016);
    assert_eq!(stats.inputs_consumed, 1);
    let inputs: Vec<Event> = take_events(&log)
        .into_iter()
        .filter(|e| matches!(e, Event::Input { .. }))
        .collect();
    assert_eq!(
        inputs,
        vec![Event::Input {
            component: hash_string64("consumer"),
            action: jump,
        }]
    );

    // without the consumer the action falls through to the next collection
    post_to_system(&mut engine, first, "release_input_focus");
    engine.push_input(InputAction::pressed("jump"));
    let stats = engine.update(0.016);
    assert_eq!(stats.inputs_consumed, 0);
    let inputs: Vec<Event> = take_events(&log)
        .into_iter()
        .filter(|e| matches!(e, Event::Input { .. }))
        .collect();
    assert_eq!(
        inputs,
        vec![Event::Input {
            component: hash_string64("watcher"),
            action: jump,
        }]
    );

    // buffered input lasts one frame
    engine.update(0.016);
    assert!(take_events(&log)
        .iter()
        .all(|e| !matches!(e, Event::Input { .. })));
}

#[test]
fn test_focus_stack_orders_most_recent_first() {
    let log = new_log();
    let (mut engine, ids) = engine_with(&log, &["main"]);
    let empty = Prototype::new();
    let a = spawn(&mut engine, ids[0], &empty, SpawnParams::with_id("/a")).unwrap();
    let b = spawn(&mut engine, ids[0], &empty, SpawnParams::with_id("/b")).unwrap();

    let pool = engine.collection_mut(ids[0]).unwrap().instances_mut();
    assert!(pool.acquire_input_focus(a));
    assert!(pool.acquire_input_focus(b));
    assert_eq!(pool.focus_stack(), vec![b, a]);
    // re-acquiring moves to the top
    pool.acquire_input_focus(a);
    assert_eq!(pool.focus_stack(), vec![a, b]);
    pool.release_input_focus(a);
    assert_eq!(pool.focus_stack(), vec![b]);
}
