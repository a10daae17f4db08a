//! Hot reload of script sources

use super::Harness;
use crate::config::AssetConfig;
use crate::core::hash::hash_string64;
use crate::core::property::{PropertySet, PropertyValue};
use crate::core::resource::{ResourceError, ResourceFactory};
use crate::scripting::{Callback, ScriptEngine, ScriptError, SCRIPT_RESOURCE};
use std::fs;
use tempfile::TempDir;

const V1: &str = r#"
    object::property("speed", 1.0);
    object::property("label", hash("one"));

    fn init() { this.version = 1; this.reloads = 0; }
    fn update(dt) { this.version = 1; }
"#;

#[test]
fn test_reload_keeps_matching_overrides() {
    let mut h = Harness::new();
    let script = h.load("mover", V1);
    let overrides = PropertySet::new().with("speed", PropertyValue::Number(7.0));
    let instance = h.spawn(script, "/mover", overrides);

    h.scripts
        .reload_source(
            script,
            r#"
            object::property("speed", 3.0);
            object::property("label", hash("two"));
            fn update(dt) { this.version = 2; }
            fn on_reload() { this.reloads += 1; }
            "#,
        )
        .unwrap();
    assert_eq!(h.engine.reload_resources(&[script]), 1);
    h.engine.update(0.016);

    let world = h.world();
    assert_eq!(world.property(instance, "speed"), Some(PropertyValue::Number(7.0)));
    let this = h.this(instance);
    assert_eq!(this["version"].as_int().unwrap(), 2);
    assert_eq!(this["reloads"].as_int().unwrap(), 1);
}

#[test]
fn test_reload_drops_removed_and_retyped_properties() {
    let mut h = Harness::new();
    let script = h.load("mover", V1);
    let overrides = PropertySet::new()
        .with("speed", PropertyValue::Number(7.0))
        .with("label", PropertyValue::Hash(hash_string64("custom")));
    let instance = h.spawn(script, "/mover", overrides);

    h.scripts
        .reload_source(
            script,
            r#"
            object::property("speed", vmath::vector3(1.0, 2.0, 3.0));
            object::property("health", 100.0);
            "#,
        )
        .unwrap();
    h.engine.reload_resources(&[script]);

    let world = h.world();
    assert_eq!(
        world.property(instance, "speed"),
        Some(PropertyValue::Vector3(glam::Vec3::new(1.0, 2.0, 3.0)))
    );
    assert_eq!(world.property(instance, "health"), Some(PropertyValue::Number(100.0)));
    assert_eq!(world.property(instance, "label"), None);
    assert!(!h.this(instance).contains_key("label"));
}

#[test]
fn test_removing_one_property_keeps_other_overrides() {
    let mut h = Harness::new();
    let script = h.load("mover", V1);
    let overrides = PropertySet::new()
        .with("speed", PropertyValue::Number(7.0))
        .with("label", PropertyValue::Hash(hash_string64("custom")));
    let instance = h.spawn(script, "/mover", overrides);

    h.scripts
        .reload_source(script, r#"object::property("speed", 2.0);"#)
        .unwrap();
    h.engine.reload_resources(&[script]);

    let world = h.world();
    assert_eq!(world.property(instance, "speed"), Some(PropertyValue::Number(7.0)));
    assert_eq!(world.property(instance, "label"), None);
    let this = h.this(instance);
    assert_eq!(this["speed"].as_float().unwrap(), 7.0);
    assert!(!this.contains_key("label"));
}

#[test]
fn test_failed_reload_keeps_previous_version() {
    let mut h = Harness::new();
    let script = h.load("mover", V1);
    let instance = h.spawn(script, "/mover", PropertySet::new());

    let err = h.scripts.reload_source(script, "fn update(dt) {").unwrap_err();
    assert!(matches!(err, ScriptError::Compile { .. }));
    let err = h
        .scripts
        .reload_source(script, r#"object::property("x", 1.0); object::property("x", 1.0);"#)
        .unwrap_err();
    assert!(matches!(err, ScriptError::DuplicateProperty { .. }));

    let current = h.scripts.script(script).unwrap();
    assert_eq!(current.source, V1);
    assert!(current.has(Callback::Init));
    assert_eq!(current.properties.len(), 2);

    h.engine.update(0.016);
    assert_eq!(h.this(instance)["version"].as_int().unwrap(), 1);
}

#[test]
fn test_reload_of_unknown_script() {
    let scripts = ScriptEngine::new();
    let handle = ScriptEngine::handle_for("missing");
    assert!(matches!(
        scripts.reload_source(handle, "fn init() { }"),
        Err(ScriptError::NotLoaded(_))
    ));
}

#[test]
fn test_factory_loads_and_reloads_files() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("scripts")).unwrap();
    let path = dir.path().join("scripts").join("door.rhai");
    fs::write(&path, r#"object::property("open", 0.0);"#).unwrap();

    let scripts = ScriptEngine::with_config(AssetConfig::new(
        dir.path().to_path_buf(),
        "scripts".to_string(),
    ));
    let handle = scripts.get("door").unwrap();
    assert_eq!(handle, ScriptEngine::handle_for("door"));
    assert_eq!(scripts.property_definitions(handle).unwrap().len(), 1);

    fs::write(
        &path,
        r#"object::property("open", 0.0); object::property("locked", 1.0);"#,
    )
    .unwrap();
    let reloaded = scripts.reload_type(hash_string64(SCRIPT_RESOURCE)).unwrap();
    assert_eq!(reloaded, vec![handle]);
    assert_eq!(scripts.property_definitions(handle).unwrap().len(), 2);

    // broken file keeps the loaded version
    fs::write(&path, "fn update(dt) {").unwrap();
    assert!(scripts
        .reload_type(hash_string64(SCRIPT_RESOURCE))
        .unwrap()
        .is_empty());
    assert_eq!(scripts.property_definitions(handle).unwrap().len(), 2);

    assert!(scripts.reload_type(hash_string64("mesh")).unwrap().is_empty());

    scripts.release(handle);
    assert!(!scripts.is_loaded(handle));
}

#[test]
fn test_factory_errors() {
    let dir = TempDir::new().unwrap();
    let scripts = ScriptEngine::with_config(AssetConfig::new(
        dir.path().to_path_buf(),
        "scripts".to_string(),
    ));
    assert!(matches!(scripts.get("absent"), Err(ResourceError::NotFound(_))));
    assert!(matches!(scripts.get("../escape"), Err(ResourceError::InvalidName(_))));
}
