//! Boundary with the resource subsystem
//!
//! The core never parses asset formats. Component types receive opaque
//! [`ResourceHandle`]s and resolve them through whatever factory owns them.

use crate::core::hash::{hash_string64, Hash64};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a loaded resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Resource type tag, e.g. hash of "script"
    pub kind: Hash64,
    /// Hash of the resource path
    pub id: Hash64,
}

impl ResourceHandle {
    /// Build the handle for a resource path of a given kind
    pub fn new(kind: &str, path: &str) -> Self {
        Self {
            kind: hash_string64(kind),
            id: hash_string64(path),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Errors reported by resource factories
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load resource '{path}': {message}")]
    Load { path: String, message: String },
}

/// Resource subsystem interface consumed by component types
pub trait ResourceFactory {
    /// Load (or add a reference to) the resource at `path`
    fn get(&self, path: &str) -> Result<ResourceHandle, ResourceError>;

    /// Drop a reference obtained from [`ResourceFactory::get`]
    fn release(&self, handle: ResourceHandle);

    /// Reload every resource of the given kind, returning the handles that changed
    fn reload_type(&self, kind: Hash64) -> Result<Vec<ResourceHandle>, ResourceError>;
}
