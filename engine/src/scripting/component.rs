//! The `script` component type
//!
//! Every script component owns a `this` map holding its properties and any
//! state the script adds. Callbacks run in slot order within the collection's
//! script world; what they queue is applied as soon as each callback returns.

use crate::collection::instance::InstanceHandle;
use crate::component::{
    ComponentContext, ComponentData, ComponentError, ComponentParams, ComponentTypeDescriptor,
    WorldParams,
};
use crate::core::property::{PropertyType, PropertyValue};
use crate::core::resource::{ResourceError, ResourceHandle};
use crate::input::{InputAction, InputResult};
use crate::message::{Message, SocketId, Url};
use crate::scripting::commands::{
    refresh_transform_cache, update_transform_cache, CallFrame, Caller, SharedTransformCache,
};
use crate::scripting::engine::{ScriptEngine, ScriptError};
use crate::scripting::property_types::{json_to_map, ScriptProperties};
use crate::scripting::script::{Callback, CompiledScript};
use rhai::{Dynamic, FuncArgs, Map};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Registered name of the script component type
pub const SCRIPT_COMPONENT: &str = "script";

new_key_type! {
    /// Slot of a script component in its world
    pub struct ScriptKey;
}

impl From<ScriptKey> for ComponentData {
    fn from(key: ScriptKey) -> Self {
        ComponentData(key.data().as_ffi())
    }
}

impl From<ComponentData> for ScriptKey {
    fn from(data: ComponentData) -> Self {
        KeyData::from_ffi(data.0).into()
    }
}

/// One script component
#[derive(Debug)]
pub struct ScriptInstance {
    pub resource: ResourceHandle,
    pub instance: InstanceHandle,
    pub caller: Caller,
    /// Bound as `this` in every callback
    pub this: Dynamic,
    pub overrides: ScriptProperties,
    // Properties `this` was last seeded with
    synced: Vec<(String, PropertyType)>,
}

/// Per-collection world of the script component type
pub struct ScriptWorld {
    engine: Arc<ScriptEngine>,
    collection: String,
    socket: SocketId,
    max_instances: usize,
    instances: SlotMap<ScriptKey, ScriptInstance>,
    transforms: SharedTransformCache,
}

impl ScriptWorld {
    pub fn new(engine: Arc<ScriptEngine>, params: &WorldParams) -> Self {
        debug!(collection = %params.collection, "Creating script world");
        Self {
            engine,
            collection: params.collection.clone(),
            socket: params.socket,
            max_instances: params.max_instances,
            instances: SlotMap::with_capacity_and_key(params.max_instances.min(64)),
            transforms: SharedTransformCache::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// First script component on an instance
    pub fn find(&self, instance: InstanceHandle) -> Option<ScriptKey> {
        self.instances
            .iter()
            .find(|(_, entry)| entry.instance == instance)
            .map(|(key, _)| key)
    }

    pub fn get(&self, key: ScriptKey) -> Option<&ScriptInstance> {
        self.instances.get(key)
    }

    /// Current `this` map of the first script on an instance
    pub fn this(&self, instance: InstanceHandle) -> Option<Map> {
        let entry = self.instances.get(self.find(instance)?)?;
        entry.this.clone().try_cast::<Map>()
    }

    /// Current value of a declared property
    pub fn property(&self, instance: InstanceHandle, name: &str) -> Option<PropertyValue> {
        let entry = self.instances.get(self.find(instance)?)?;
        let script = self.engine.script(entry.resource)?;
        let definition = script.property(name)?;
        let map = entry.this.read_lock::<Map>()?;
        PropertyValue::from_dynamic_as(map.get(name)?, definition.property_type)
    }

    /// Override a property on one instance
    ///
    /// The value is type-checked against the declaration and kept across
    /// script reloads while the declaration keeps its name and type.
    pub fn set_property(
        &mut self,
        instance: InstanceHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), ScriptError> {
        let key = self
            .find(instance)
            .ok_or_else(|| ScriptError::NoInstance(instance.to_string()))?;
        let entry = self
            .instances
            .get_mut(key)
            .ok_or_else(|| ScriptError::NoInstance(instance.to_string()))?;
        let script = self
            .engine
            .script(entry.resource)
            .ok_or(ScriptError::NotLoaded(entry.resource))?;
        entry
            .overrides
            .set(&script.properties, name, value)
            .map_err(ScriptError::Property)?;
        if let Some(mut map) = entry.this.write_lock::<Map>() {
            map.insert(name.into(), value.to_dynamic());
        }
        Ok(())
    }

    fn create(
        &mut self,
        ctx: &mut ComponentContext<'_>,
        params: &ComponentParams<'_>,
    ) -> Result<ComponentData, ComponentError> {
        if self.instances.len() >= self.max_instances {
            return Err(ComponentError::WorldFull(self.max_instances));
        }
        let resource = params
            .resource
            .ok_or_else(|| ComponentError::MissingResource(SCRIPT_COMPONENT.to_string()))?;
        let script = self
            .engine
            .script(resource)
            .ok_or_else(|| ResourceError::NotFound(resource.to_string()))?;

        let overrides = ScriptProperties::from_overrides(&script.properties, params.properties);
        let this = Dynamic::from_map(overrides.to_rhai_map(&script.properties));
        let caller = Caller {
            id: params.identifier,
            path: ctx.instances.path(params.instance).unwrap_or_default(),
            socket: ctx.socket,
            component_id: params.component_id,
            component_index: params.component_index,
        };
        let key = self.instances.insert(ScriptInstance {
            resource,
            instance: params.instance,
            caller,
            this,
            overrides,
            synced: signature(&script),
        });
        trace!(
            collection = %self.collection,
            script = %script.name,
            instance = %params.identifier,
            "Created script component"
        );

        self.invoke(ctx, key, Callback::Init, ());
        Ok(key.into())
    }

    fn destroy(&mut self, ctx: &mut ComponentContext<'_>, data: ComponentData) {
        let key = ScriptKey::from(data);
        if !self.instances.contains_key(key) {
            warn!(collection = %self.collection, "Destroying unknown script component");
            return;
        }
        self.invoke(ctx, key, Callback::Final, ());
        self.instances.remove(key);
    }

    fn update(&mut self, ctx: &mut ComponentContext<'_>, dt: f32) {
        refresh_transform_cache(&self.transforms, ctx.instances);
        let keys: Vec<ScriptKey> = self.instances.keys().collect();
        for key in keys {
            let Some(entry) = self.instances.get(key) else {
                continue;
            };
            let enabled = ctx
                .instances
                .attachment(entry.instance, entry.caller.component_index)
                .is_some_and(|attachment| attachment.enabled);
            if enabled {
                self.invoke(ctx, key, Callback::Update, (dt as f64,));
            }
        }
    }

    fn on_message(&mut self, ctx: &mut ComponentContext<'_>, data: ComponentData, message: &Message) {
        let sender = message.sender;
        let sender_component = if sender.socket == ctx.socket && !sender.is_whole_instance() {
            ctx.instances
                .from_identifier(sender.path)
                .and_then(|instance| ctx.instances.attachment(instance, sender.fragment))
                .map(|attachment| attachment.component_id)
        } else {
            None
        };
        let table = message.table().map(|table| json_to_map(&table)).unwrap_or_default();
        let args = (message.id, table, Url::from_address(sender, sender_component));
        self.invoke(ctx, data.into(), Callback::OnMessage, args);
    }

    fn on_input(
        &mut self,
        ctx: &mut ComponentContext<'_>,
        data: ComponentData,
        action: &InputAction,
    ) -> InputResult {
        let args = (action.action_id, action_map(action));
        match self.invoke(ctx, data.into(), Callback::OnInput, args) {
            Some(consumed) if consumed.as_bool().unwrap_or(false) => InputResult::Consumed,
            _ => InputResult::Ignored,
        }
    }

    /// Bring `this` in line with the reloaded script, then call `on_reload`
    fn on_reload(&mut self, ctx: &mut ComponentContext<'_>, data: ComponentData) {
        let key = ScriptKey::from(data);
        let Some(entry) = self.instances.get_mut(key) else {
            return;
        };
        let Some(script) = self.engine.script(entry.resource) else {
            warn!(script = %entry.resource, "Reloaded script is no longer loaded");
            return;
        };

        let dropped = entry.overrides.retain_matching(&script.properties);
        if !dropped.is_empty() {
            debug!(script = %script.name, dropped = ?dropped, "Dropped property overrides");
        }
        if let Some(mut map) = entry.this.write_lock::<Map>() {
            for (name, _) in &entry.synced {
                if script.property(name).is_none() {
                    map.remove(name.as_str());
                }
            }
            for definition in &script.properties {
                let unchanged = entry
                    .synced
                    .iter()
                    .any(|(name, ty)| *name == definition.name && *ty == definition.property_type);
                let kept = entry.overrides.get(&definition.name);
                if !unchanged || kept.is_some() {
                    let value = entry.overrides.value_of(definition);
                    map.insert(definition.name.as_str().into(), value.to_dynamic());
                }
            }
        }
        entry.synced = signature(&script);

        self.invoke(ctx, key, Callback::OnReload, ());
    }

    fn post_update(&mut self, ctx: &mut ComponentContext<'_>) {
        refresh_transform_cache(&self.transforms, ctx.instances);
    }

    /// Run one callback and apply what it queued
    ///
    /// Errors are logged; the frame carries on.
    fn invoke(
        &mut self,
        ctx: &mut ComponentContext<'_>,
        key: ScriptKey,
        callback: Callback,
        args: impl FuncArgs,
    ) -> Option<Dynamic> {
        let entry = self.instances.get_mut(key)?;
        let script = self.engine.script(entry.resource)?;
        if !script.has(callback) {
            return None;
        }
        update_transform_cache(&self.transforms, ctx.instances, entry.instance);

        let mut frame = CallFrame::new(entry.caller.clone(), Arc::clone(&self.transforms));
        let result = self
            .engine
            .call(&script, callback, &mut entry.this, &mut frame, args);

        for command in std::mem::take(&mut frame.commands) {
            command.apply(&frame.caller, ctx, &self.transforms);
        }

        match result {
            Ok(value) => Some(value),
            Err(err) => {
                error!(
                    collection = %self.collection,
                    instance = %frame.caller.path,
                    callback = callback.name(),
                    error = %err,
                    "Script callback failed"
                );
                None
            }
        }
    }
}

fn signature(script: &CompiledScript) -> Vec<(String, PropertyType)> {
    script
        .properties
        .iter()
        .map(|p| (p.name.clone(), p.property_type))
        .collect()
}

fn action_map(action: &InputAction) -> Map {
    let mut map = Map::new();
    map.insert("value".into(), Dynamic::from_float(action.value as f64));
    map.insert("pressed".into(), Dynamic::from_bool(action.pressed));
    map.insert("released".into(), Dynamic::from_bool(action.released));
    map.insert("repeated".into(), Dynamic::from_bool(action.repeated));
    if let Some(pointer) = action.pointer {
        map.insert("x".into(), Dynamic::from_float(pointer.x as f64));
        map.insert("y".into(), Dynamic::from_float(pointer.y as f64));
        map.insert("dx".into(), Dynamic::from_float(pointer.dx as f64));
        map.insert("dy".into(), Dynamic::from_float(pointer.dy as f64));
    }
    map
}

/// Descriptor of the `script` component type backed by `engine`
pub fn script_component_type(engine: Arc<ScriptEngine>, max_instances: usize) -> ComponentTypeDescriptor {
    ComponentTypeDescriptor::builder::<ScriptWorld>(SCRIPT_COMPONENT)
        .max_instances(max_instances)
        .input(true)
        .create_world(move |params| ScriptWorld::new(Arc::clone(&engine), params))
        .destroy_world(|world| {
            debug!(
                collection = %world.collection,
                remaining = world.len(),
                "Destroying script world"
            );
        })
        .create_component(|world, ctx, params| world.create(ctx, params))
        .destroy_component(|world, ctx, _instance, data| world.destroy(ctx, data))
        .update(|world, ctx, dt| world.update(ctx, dt))
        .on_message(|world, ctx, _instance, data, message| world.on_message(ctx, data, message))
        .on_input(|world, ctx, _instance, data, action| world.on_input(ctx, data, action))
        .on_reload(|world, ctx, _instance, data| world.on_reload(ctx, data))
        .post_update(|world, ctx, _deleted| world.post_update(ctx))
        .build()
}
