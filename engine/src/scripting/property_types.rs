//! Conversions between engine values and rhai values

use crate::core::hash::{Hash32, Hash64};
use crate::core::property::{PropertyDefinition, PropertySet, PropertyType, PropertyValue};
use crate::message::Url;
use glam::{Quat, Vec3, Vec4};
use rhai::{Array, Dynamic, Map};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

impl PropertyValue {
    /// Convert to a rhai value
    pub fn to_dynamic(&self) -> Dynamic {
        match *self {
            PropertyValue::Number(v) => Dynamic::from_float(v),
            PropertyValue::Hash(v) => Dynamic::from(v),
            PropertyValue::Url(v) => Dynamic::from(v),
            PropertyValue::Vector3(v) => Dynamic::from(v),
            PropertyValue::Vector4(v) => Dynamic::from(v),
            PropertyValue::Quat(v) => Dynamic::from(v),
        }
    }

    /// Infer a property value from a rhai value
    pub fn from_dynamic(value: &Dynamic) -> Option<Self> {
        if let Some(number) = as_number(value) {
            Some(PropertyValue::Number(number))
        } else if let Some(v) = value.clone().try_cast::<Hash64>() {
            Some(PropertyValue::Hash(v))
        } else if let Some(v) = value.clone().try_cast::<Url>() {
            Some(PropertyValue::Url(v))
        } else if let Some(v) = value.clone().try_cast::<Vec3>() {
            Some(PropertyValue::Vector3(v))
        } else if let Some(v) = value.clone().try_cast::<Vec4>() {
            Some(PropertyValue::Vector4(v))
        } else {
            value.clone().try_cast::<Quat>().map(PropertyValue::Quat)
        }
    }

    /// Convert a rhai value into a property of a known type
    ///
    /// Strings are accepted for hash and url properties.
    pub fn from_dynamic_as(value: &Dynamic, property_type: PropertyType) -> Option<Self> {
        match property_type {
            PropertyType::Number => as_number(value).map(PropertyValue::Number),
            PropertyType::Hash => value
                .clone()
                .try_cast::<Hash64>()
                .or_else(|| value.clone().into_string().ok().map(|s| Hash64::new(&s)))
                .map(PropertyValue::Hash),
            PropertyType::Url => value
                .clone()
                .try_cast::<Url>()
                .or_else(|| value.clone().into_string().ok().map(|s| Url::parse(&s, None)))
                .map(PropertyValue::Url),
            PropertyType::Vector3 => value.clone().try_cast::<Vec3>().map(PropertyValue::Vector3),
            PropertyType::Vector4 => value.clone().try_cast::<Vec4>().map(PropertyValue::Vector4),
            PropertyType::Quat => value.clone().try_cast::<Quat>().map(PropertyValue::Quat),
        }
    }
}

fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

/// Per-instance property values that differ from the script's defaults
///
/// Overrides come from the prototype and from explicit sets. They survive a
/// script reload as long as a property with the same name and type remains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptProperties {
    values: HashMap<String, PropertyValue>,
}

impl ScriptProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the prototype overrides that match a definition
    pub fn from_overrides(definitions: &[PropertyDefinition], overrides: &PropertySet) -> Self {
        let mut properties = Self::new();
        for (name, value) in overrides.iter() {
            if let Err(err) = properties.set(definitions, name, *value) {
                warn!(property = name, error = %err, "Ignoring property override");
            }
        }
        properties
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store an override, checking it against the definitions
    pub fn set(
        &mut self,
        definitions: &[PropertyDefinition],
        name: &str,
        value: PropertyValue,
    ) -> Result<(), String> {
        let definition = definitions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| format!("unknown property '{name}'"))?;
        if definition.property_type != value.property_type() {
            return Err(format!(
                "property '{name}' is a {}, got a {}",
                definition.property_type,
                value.property_type()
            ));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Drop overrides with no definition of the same name and type
    ///
    /// Returns the names that were dropped.
    pub fn retain_matching(&mut self, definitions: &[PropertyDefinition]) -> Vec<String> {
        let mut dropped = Vec::new();
        self.values.retain(|name, value| {
            let keep = definitions
                .iter()
                .any(|d| d.name == *name && d.property_type == value.property_type());
            if !keep {
                dropped.push(name.clone());
            }
            keep
        });
        dropped.sort();
        dropped
    }

    /// Effective value of a definition for this instance
    pub fn value_of<'a>(&'a self, definition: &'a PropertyDefinition) -> &'a PropertyValue {
        self.values.get(&definition.name).unwrap_or(&definition.default_value)
    }

    /// Build the initial per-instance map seen by scripts as `this`
    pub fn to_rhai_map(&self, definitions: &[PropertyDefinition]) -> Map {
        let mut map = Map::new();
        for definition in definitions {
            map.insert(definition.name.as_str().into(), self.value_of(definition).to_dynamic());
        }
        map
    }
}

// Tagged single-key objects carry engine values through message tables
const TAG_HASH: &str = "hash";
const TAG_HASH32: &str = "hash32";
const TAG_URL: &str = "url";
const TAG_VECTOR3: &str = "vector3";
const TAG_VECTOR4: &str = "vector4";
const TAG_QUAT: &str = "quat";

/// Encode a rhai value as a message table value
pub fn dynamic_to_json(value: &Dynamic) -> Result<Value, String> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::from(f));
    }
    if value.is_string() {
        return Ok(Value::String(value.clone().into_string().unwrap_or_default()));
    }
    if let Some(array) = value.clone().try_cast::<Array>() {
        return array.iter().map(dynamic_to_json).collect::<Result<Vec<_>, _>>().map(Value::Array);
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        return map_to_json(&map);
    }
    if let Some(h) = value.clone().try_cast::<Hash64>() {
        return Ok(json!({ TAG_HASH: h.0 }));
    }
    if let Some(h) = value.clone().try_cast::<Hash32>() {
        return Ok(json!({ TAG_HASH32: h.0 }));
    }
    if let Some(url) = value.clone().try_cast::<Url>() {
        let url = serde_json::to_value(url).map_err(|e| e.to_string())?;
        return Ok(json!({ TAG_URL: url }));
    }
    if let Some(v) = value.clone().try_cast::<Vec3>() {
        return Ok(json!({ TAG_VECTOR3: v.to_array() }));
    }
    if let Some(v) = value.clone().try_cast::<Vec4>() {
        return Ok(json!({ TAG_VECTOR4: v.to_array() }));
    }
    if let Some(v) = value.clone().try_cast::<Quat>() {
        return Ok(json!({ TAG_QUAT: v.to_array() }));
    }
    Err(format!("cannot send a value of type {}", value.type_name()))
}

/// Encode a rhai map as a message table
pub fn map_to_json(map: &Map) -> Result<Value, String> {
    let mut object = serde_json::Map::with_capacity(map.len());
    for (key, value) in map {
        object.insert(key.to_string(), dynamic_to_json(value)?);
    }
    Ok(Value::Object(object))
}

/// Decode a message table value for scripts
pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i),
            None => Dynamic::from_float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(json_to_dynamic).collect()),
        Value::Object(object) => {
            if let Some(tagged) = decode_tagged(object) {
                return tagged;
            }
            let mut map = Map::new();
            for (key, value) in object {
                map.insert(key.as_str().into(), json_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

/// Decode a message table into the map handed to `on_message`
pub fn json_to_map(value: &Value) -> Map {
    match json_to_dynamic(value).try_cast::<Map>() {
        Some(map) => map,
        None => {
            let mut map = Map::new();
            map.insert("value".into(), json_to_dynamic(value));
            map
        }
    }
}

fn decode_tagged(object: &serde_json::Map<String, Value>) -> Option<Dynamic> {
    if object.len() != 1 {
        return None;
    }
    let (tag, value) = object.iter().next()?;
    match tag.as_str() {
        TAG_HASH => value.as_u64().map(|h| Dynamic::from(Hash64(h))),
        TAG_HASH32 => value
            .as_u64()
            .and_then(|h| u32::try_from(h).ok())
            .map(|h| Dynamic::from(Hash32(h))),
        TAG_URL => serde_json::from_value::<Url>(value.clone()).ok().map(Dynamic::from),
        TAG_VECTOR3 => floats::<3>(value).map(|v| Dynamic::from(Vec3::from_array(v))),
        TAG_VECTOR4 => floats::<4>(value).map(|v| Dynamic::from(Vec4::from_array(v))),
        TAG_QUAT => floats::<4>(value).map(|v| Dynamic::from(Quat::from_array(v))),
        _ => None,
    }
}

fn floats<const N: usize>(value: &Value) -> Option<[f32; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::new("speed", PropertyValue::Number(1.0)),
            PropertyDefinition::new("target", PropertyValue::Hash(Hash64::new("none"))),
        ]
    }

    #[test]
    fn test_overrides_are_type_checked() {
        let defs = definitions();
        let set = PropertySet::new()
            .with("speed", PropertyValue::Number(4.0))
            .with("target", PropertyValue::Number(2.0))
            .with("missing", PropertyValue::Number(0.0));
        let props = ScriptProperties::from_overrides(&defs, &set);
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("speed"), Some(&PropertyValue::Number(4.0)));
    }

    #[test]
    fn test_retain_matching_drops_changed_types() {
        let defs = definitions();
        let mut props = ScriptProperties::new();
        props.set(&defs, "speed", PropertyValue::Number(3.0)).unwrap();
        props.set(&defs, "target", PropertyValue::Hash(Hash64::new("enemy"))).unwrap();

        let changed = vec![
            PropertyDefinition::new("speed", PropertyValue::Vector3(Vec3::ZERO)),
            PropertyDefinition::new("target", PropertyValue::Hash(Hash64::new("none"))),
        ];
        assert_eq!(props.retain_matching(&changed), vec!["speed".to_string()]);
        assert_eq!(props.get("target"), Some(&PropertyValue::Hash(Hash64::new("enemy"))));
    }

    #[test]
    fn test_rhai_map_uses_overrides_then_defaults() {
        let defs = definitions();
        let mut props = ScriptProperties::new();
        props.set(&defs, "speed", PropertyValue::Number(9.0)).unwrap();
        let map = props.to_rhai_map(&defs);
        assert_eq!(map["speed"].as_float().unwrap(), 9.0);
        assert_eq!(map["target"].clone().cast::<Hash64>(), Hash64::new("none"));
    }

    #[test]
    fn test_table_keeps_engine_values() {
        let mut map = Map::new();
        map.insert("count".into(), Dynamic::from_int(3));
        map.insert("dir".into(), Dynamic::from(Vec3::new(1.0, 2.0, 3.0)));
        map.insert("who".into(), Dynamic::from(Hash64::new("player")));
        map.insert("name".into(), Dynamic::from("bob".to_string()));

        let table = map_to_json(&map).unwrap();
        assert_eq!(table["count"], json!(3));
        assert_eq!(table["dir"], json!({ "vector3": [1.0, 2.0, 3.0] }));

        let back = json_to_map(&table);
        assert_eq!(back["count"].as_int().unwrap(), 3);
        assert_eq!(back["dir"].clone().cast::<Vec3>(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(back["who"].clone().cast::<Hash64>(), Hash64::new("player"));
        assert_eq!(back["name"].clone().into_string().unwrap(), "bob");
    }

    #[test]
    fn test_unsupported_values_are_rejected() {
        let value = Dynamic::from(std::time::Duration::from_secs(1));
        assert!(dynamic_to_json(&value).is_err());
    }
}
