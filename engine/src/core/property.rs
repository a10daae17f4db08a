//! Property definitions declared by components and per-instance overrides

use crate::core::hash::Hash64;
use crate::message::Url;
use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Number,
    Hash,
    Url,
    Vector3,
    Vector4,
    Quat,
}

impl PropertyType {
    /// Parse a type name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "number" | "float" | "f64" => Some(PropertyType::Number),
            "hash" => Some(PropertyType::Hash),
            "url" => Some(PropertyType::Url),
            "vec3" | "vector3" => Some(PropertyType::Vector3),
            "vec4" | "vector4" => Some(PropertyType::Vector4),
            "quat" | "quaternion" => Some(PropertyType::Quat),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Number => "number",
            PropertyType::Hash => "hash",
            PropertyType::Url => "url",
            PropertyType::Vector3 => "vector3",
            PropertyType::Vector4 => "vector4",
            PropertyType::Quat => "quat",
        };
        f.write_str(name)
    }
}

/// A typed property value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Number(f64),
    Hash(Hash64),
    Url(Url),
    Vector3(Vec3),
    Vector4(Vec4),
    Quat(Quat),
}

impl PropertyValue {
    /// Type tag of this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Number(_) => PropertyType::Number,
            PropertyValue::Hash(_) => PropertyType::Hash,
            PropertyValue::Url(_) => PropertyType::Url,
            PropertyValue::Vector3(_) => PropertyType::Vector3,
            PropertyValue::Vector4(_) => PropertyType::Vector4,
            PropertyValue::Quat(_) => PropertyType::Quat,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(v) => write!(f, "{v}"),
            PropertyValue::Hash(v) => write!(f, "hash({v})"),
            PropertyValue::Url(v) => write!(f, "{v}"),
            PropertyValue::Vector3(v) => write!(f, "vector3({}, {}, {})", v.x, v.y, v.z),
            PropertyValue::Vector4(v) => {
                write!(f, "vector4({}, {}, {}, {})", v.x, v.y, v.z, v.w)
            }
            PropertyValue::Quat(v) => write!(f, "quat({}, {}, {}, {})", v.x, v.y, v.z, v.w),
        }
    }
}

/// Definition of a property, declared once per component resource
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    /// Name of the property
    pub name: String,
    /// Type of the property
    pub property_type: PropertyType,
    /// Default value
    pub default_value: PropertyValue,
}

impl PropertyDefinition {
    /// Create a definition whose type follows the default value
    pub fn new(name: impl Into<String>, default_value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            property_type: default_value.property_type(),
            default_value,
        }
    }
}

/// Ordered list of named property values, used for prototype overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    values: Vec<(String, PropertyValue)>,
}

impl PropertySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an existing one with the same name
    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Builder variant of [`PropertySet::set`]
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.set(name, value);
        self
    }

    /// Get a value by name
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_parsing() {
        assert_eq!(PropertyType::parse("number"), Some(PropertyType::Number));
        assert_eq!(PropertyType::parse("vec3"), Some(PropertyType::Vector3));
        assert_eq!(PropertyType::parse("Quaternion"), Some(PropertyType::Quat));
        assert_eq!(PropertyType::parse("color"), None);
    }

    #[test]
    fn test_definition_type_follows_default() {
        let def = PropertyDefinition::new("speed", PropertyValue::Vector3(Vec3::X));
        assert_eq!(def.property_type, PropertyType::Vector3);
    }

    #[test]
    fn test_property_set_replaces() {
        let mut set = PropertySet::new()
            .with("health", PropertyValue::Number(10.0))
            .with("speed", PropertyValue::Number(2.0));
        set.set("health", PropertyValue::Number(50.0));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("health"), Some(&PropertyValue::Number(50.0)));
        let names: Vec<_> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["health", "speed"]);
    }

    #[test]
    fn test_property_value_serialization() {
        let value = PropertyValue::Hash(Hash64(42));
        let json = serde_json::to_string(&value).unwrap();
        let decoded: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, decoded);
    }
}
