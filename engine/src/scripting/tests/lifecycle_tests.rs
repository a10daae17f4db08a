//! Script callbacks driven through the frame pipeline

use super::Harness;
use crate::core::hash::{hash_string64, Hash64};
use crate::core::property::PropertySet;
use crate::input::InputAction;
use crate::message::Address;
use glam::Vec3;

#[test]
fn test_init_once_then_update_every_frame() {
    let mut h = Harness::new();
    let script = h.load(
        "counter",
        r#"
        fn init() { this.inits = 1; this.updates = 0; }
        fn update(dt) { this.updates += 1; this.last_dt = dt; }
        "#,
    );
    let instance = h.spawn(script, "/counter", PropertySet::new());
    assert_eq!(h.this(instance)["inits"].as_int().unwrap(), 1);
    assert_eq!(h.this(instance)["updates"].as_int().unwrap(), 0);

    h.engine.update(0.5);
    h.engine.update(0.5);

    let this = h.this(instance);
    assert_eq!(this["inits"].as_int().unwrap(), 1);
    assert_eq!(this["updates"].as_int().unwrap(), 2);
    assert_eq!(this["last_dt"].as_float().unwrap(), 0.5);
}

#[test]
fn test_ping_is_answered_exactly_once() {
    let mut h = Harness::new();
    let ponger = h.load(
        "ponger",
        r#"
        fn init() { this.pings = 0; }
        fn on_message(id, message, sender) {
            if id == hash("ping") {
                this.pings += 1;
                msg::post(sender, "pong", #{ count: this.pings });
            }
        }
        "#,
    );
    let pinger = h.load(
        "pinger",
        r#"
        fn init() { this.pongs = 0; msg::post("/ponger", "ping"); }
        fn on_message(id, message, sender) {
            if id == hash("pong") {
                this.pongs += 1;
                this.last_count = message.count;
            }
        }
        "#,
    );
    let pong_instance = h.spawn(ponger, "/ponger", PropertySet::new());
    let ping_instance = h.spawn(pinger, "/pinger", PropertySet::new());

    // ping delivered, pong queued for the next pass
    h.engine.update(0.016);
    assert_eq!(h.this(pong_instance)["pings"].as_int().unwrap(), 1);
    assert_eq!(h.this(ping_instance)["pongs"].as_int().unwrap(), 0);

    h.engine.update(0.016);
    assert_eq!(h.this(ping_instance)["pongs"].as_int().unwrap(), 1);
    assert_eq!(h.this(ping_instance)["last_count"].as_int().unwrap(), 1);

    let stats = h.engine.update(0.016);
    assert_eq!(stats.messages_dispatched, 0);
    assert_eq!(h.this(pong_instance)["pings"].as_int().unwrap(), 1);
    assert_eq!(h.this(ping_instance)["pongs"].as_int().unwrap(), 1);
}

#[test]
fn test_self_delete_runs_final_once_and_drops_later_messages() {
    let mut h = Harness::new();
    let observer = h.load(
        "observer",
        r#"
        fn init() { this.hits = 0; this.gone = 0; }
        fn on_message(id, message, sender) {
            if id == hash("hit") { this.hits += 1; }
            if id == hash("gone") { this.gone += 1; }
        }
        "#,
    );
    let victim = h.load(
        "victim",
        r#"
        fn on_message(id, message, sender) {
            msg::post("/observer", "hit");
            if id == hash("die") { object::delete(); }
        }
        fn final() { msg::post("/observer", "gone"); }
        "#,
    );
    let observer_instance = h.spawn(observer, "/observer", PropertySet::new());
    h.spawn(victim, "/victim", PropertySet::new());

    let socket = h.engine.collection(h.collection).unwrap().socket();
    let victim_address = Address::new(socket, Hash64::new("/victim"));
    for _ in 0..2 {
        h.engine
            .bus_mut()
            .post_lightweight(Address::socket(socket), victim_address, hash_string64("die"))
            .unwrap();
    }

    let stats = h.engine.update(0.016);
    assert_eq!(stats.instances_deleted, 1);
    let collection = h.engine.collection(h.collection).unwrap();
    assert!(collection.instance_from_identifier(Hash64::new("/victim")).is_none());
    assert_eq!(collection.instances().len(), 1);

    h.engine.update(0.016);
    let this = h.this(observer_instance);
    assert_eq!(this["hits"].as_int().unwrap(), 1);
    assert_eq!(this["gone"].as_int().unwrap(), 1);
}

#[test]
fn test_set_position_is_visible_after_propagation() {
    let mut h = Harness::new();
    let mover = h.load(
        "mover",
        r#"
        fn update(dt) {
            let p = object::get_position();
            object::set_position(p + vmath::vector3(1.0, 0.0, 0.0));
            this.seen = object::get_position();
        }
        "#,
    );
    let instance = h.spawn(mover, "/mover", PropertySet::new());

    h.engine.update(0.016);
    h.engine.update(0.016);

    let pool = h.engine.collection(h.collection).unwrap().instances();
    assert_eq!(pool.position(instance), Some(Vec3::new(2.0, 0.0, 0.0)));
    assert_eq!(pool.world_position(instance), Some(Vec3::new(2.0, 0.0, 0.0)));
    assert_eq!(
        h.this(instance)["seen"].clone().cast::<Vec3>(),
        Vec3::new(2.0, 0.0, 0.0)
    );
}

#[test]
fn test_runtime_error_does_not_stop_the_frame() {
    let mut h = Harness::new();
    let broken = h.load("broken", "fn update(dt) { throw \"boom\"; }");
    let healthy = h.load(
        "healthy",
        "fn init() { this.ticks = 0; } fn update(dt) { this.ticks += 1; }",
    );
    h.spawn(broken, "/broken", PropertySet::new());
    let instance = h.spawn(healthy, "/healthy", PropertySet::new());

    h.engine.update(0.016);
    assert_eq!(h.this(instance)["ticks"].as_int().unwrap(), 1);
}

#[test]
fn test_unknown_instance_is_a_script_error() {
    let mut h = Harness::new();
    let script = h.load(
        "lookup",
        r#"
        fn init() { this.ok = false; }
        fn update(dt) {
            object::get_position("/nobody");
            this.ok = true;
        }
        "#,
    );
    let instance = h.spawn(script, "/lookup", PropertySet::new());
    h.engine.update(0.016);
    assert!(!h.this(instance)["ok"].as_bool().unwrap());
}

#[test]
fn test_input_focus_and_consumption() {
    let mut h = Harness::new();
    let script = h.load(
        "player",
        r#"
        fn init() {
            this.jumps = 0;
            msg::post("@system:", "acquire_input_focus");
        }
        fn on_input(action_id, action) {
            if action_id == hash32("jump") && action.pressed {
                this.jumps += 1;
                return true;
            }
            false
        }
        "#,
    );
    let instance = h.spawn(script, "/player", PropertySet::new());

    // focus request is handled at the start of the next frame
    h.engine.update(0.016);
    h.engine.push_input(InputAction::pressed("jump"));
    h.engine.push_input(InputAction::pressed("crouch"));
    let stats = h.engine.update(0.016);

    assert_eq!(stats.inputs_consumed, 1);
    assert_eq!(h.this(instance)["jumps"].as_int().unwrap(), 1);
}

#[test]
fn test_disabled_script_is_not_updated() {
    let mut h = Harness::new();
    let script = h.load(
        "ticker",
        r#"
        fn init() { this.updates = 0; }
        fn update(dt) { this.updates += 1; }
        "#,
    );
    let instance = h.spawn(script, "/ticker", PropertySet::new());
    let pool = h.engine.collection_mut(h.collection).unwrap().instances_mut();
    assert!(pool.set_attachment_enabled(instance, 0, false));

    h.engine.update(0.1);
    assert_eq!(h.this(instance)["updates"].as_int().unwrap(), 0);

    let pool = h.engine.collection_mut(h.collection).unwrap().instances_mut();
    pool.set_attachment_enabled(instance, 0, true);
    h.engine.update(0.1);
    assert_eq!(h.this(instance)["updates"].as_int().unwrap(), 1);
}
