//! Prototypes describe the ordered components of a new instance

use crate::core::hash::{hash_string64, Hash64};
use crate::core::property::{PropertySet, PropertyValue};
use crate::core::resource::ResourceHandle;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One component entry of a prototype
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDesc {
    /// Component id, unique within the prototype
    pub id: Hash64,
    /// Registered component type name
    pub type_name: String,
    pub resource: Option<ResourceHandle>,
    #[serde(default)]
    pub properties: PropertySet,
}

impl ComponentDesc {
    pub fn new(id: &str, type_name: &str) -> Self {
        Self {
            id: hash_string64(id),
            type_name: type_name.to_string(),
            resource: None,
            properties: PropertySet::new(),
        }
    }

    pub fn with_resource(mut self, resource: ResourceHandle) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.set(name, value);
        self
    }
}

/// Static, ordered list of components used to create instances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prototype {
    pub components: Vec<ComponentDesc>,
}

impl Prototype {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, component: ComponentDesc) -> Self {
        self.components.push(component);
        self
    }
}

/// Where and under which path to create an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnParams {
    /// Absolute path; generated when absent
    pub id: Option<String>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for SpawnParams {
    fn default() -> Self {
        Self {
            id: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl SpawnParams {
    /// Spawn under an explicit absolute path
    pub fn with_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_serialization() {
        let prototype = Prototype::new().with_component(
            ComponentDesc::new("script", "script")
                .with_resource(ResourceHandle::new("script", "player"))
                .with_property("speed", PropertyValue::Number(4.0)),
        );

        let json = serde_json::to_string(&prototype).unwrap();
        let loaded: Prototype = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.components.len(), 1);
        assert_eq!(loaded.components[0].id, hash_string64("script"));
        assert_eq!(
            loaded.components[0].properties.get("speed"),
            Some(&PropertyValue::Number(4.0))
        );
    }
}
