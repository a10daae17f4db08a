//! Core data types shared by every module: identifiers, transforms,
//! properties and resource handles.

pub mod hash;
pub mod property;
pub mod resource;
pub mod transform;

pub use hash::{hash_string32, hash_string64, resolve_path, Hash32, Hash64};
pub use property::{PropertyDefinition, PropertySet, PropertyType, PropertyValue};
pub use resource::{ResourceError, ResourceFactory, ResourceHandle};
pub use transform::{GlobalTransform, Transform};
