//! hecs-backed instance pool
//!
//! Every instance is a hecs entity carrying its identity, local and world
//! transforms, hierarchy links and component attachments. Entities are only
//! despawned at the deferred-delete flush, so a handle observed during a
//! frame never aliases a new instance in that same frame.

use super::{CreationError, HierarchyError};
use crate::component::ComponentData;
use crate::core::hash::{hash_string64, Hash64};
use crate::core::resource::ResourceHandle;
use crate::core::transform::{GlobalTransform, Transform};
use glam::{Mat4, Quat, Vec3};
use hecs::Entity;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

/// Handle to a live instance in one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub(crate) Entity);

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Absolute path and its hash
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Hash64,
    pub path: String,
}

/// Parent link
#[derive(Debug, Clone, Copy)]
pub struct Parent(pub Entity);

/// Ordered child links
#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<Entity>);

/// A component attached to an instance
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    /// Index of the component type in the registry
    pub type_index: usize,
    /// Prototype-level component id, e.g. hash of "script"
    pub component_id: Hash64,
    pub resource: Option<ResourceHandle>,
    /// Opaque value returned by the type's create hook
    pub data: ComponentData,
    pub enabled: bool,
}

/// Ordered component attachments
#[derive(Debug, Clone, Default)]
pub struct Attachments(pub Vec<Attachment>);

/// Marker for instances flagged for deferred deletion
#[derive(Debug, Clone, Copy)]
pub struct PendingDelete;

/// Arena of instances for one collection
pub struct InstancePool {
    world: hecs::World,
    by_id: HashMap<Hash64, Entity>,
    // Most recently acquired last
    focus: Vec<Entity>,
    // Flagged in parent-first order
    pending: Vec<Entity>,
    max_instances: usize,
    next_auto_id: u64,
}

impl InstancePool {
    pub fn new(max_instances: usize) -> Self {
        Self {
            world: hecs::World::new(),
            by_id: HashMap::new(),
            focus: Vec::new(),
            pending: Vec::new(),
            max_instances,
            next_auto_id: 0,
        }
    }

    /// Number of instances, including those pending deletion
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Reserve a slot and identifier for a new instance
    ///
    /// Without a path an id of the form `/instanceN` is generated.
    pub(crate) fn allocate(
        &mut self,
        path: Option<&str>,
        transform: Transform,
    ) -> Result<InstanceHandle, CreationError> {
        if self.by_id.len() >= self.max_instances {
            return Err(CreationError::PoolFull(self.max_instances));
        }

        let path = match path {
            Some(path) => path.to_string(),
            None => self.generate_path(),
        };
        let id = hash_string64(&path);
        if self.by_id.contains_key(&id) {
            return Err(CreationError::DuplicateIdentifier(path));
        }

        let entity = self.world.spawn((
            Identity {
                id,
                path: path.clone(),
            },
            transform,
            GlobalTransform::from_matrix(transform.to_matrix()),
            Attachments::default(),
        ));
        self.by_id.insert(id, entity);
        trace!(path = path, entity = ?entity, "Allocated instance");
        Ok(InstanceHandle(entity))
    }

    fn generate_path(&mut self) -> String {
        loop {
            let path = format!("/instance{}", self.next_auto_id);
            self.next_auto_id += 1;
            if !self.by_id.contains_key(&hash_string64(&path)) {
                return path;
            }
        }
    }

    /// Free a slot and its identifier
    ///
    /// Hierarchy links must already be detached.
    pub(crate) fn release(&mut self, handle: InstanceHandle) {
        if let Ok(identity) = self.world.get::<&Identity>(handle.0) {
            self.by_id.remove(&identity.id);
        }
        self.focus.retain(|e| *e != handle.0);
        self.pending.retain(|e| *e != handle.0);
        if self.world.despawn(handle.0).is_ok() {
            trace!(entity = ?handle.0, "Released instance");
        }
    }

    /// Whether the handle refers to an instance, pending deletion or not
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.world.contains(handle.0)
    }

    /// Whether the handle refers to an instance that is not pending deletion
    pub fn is_alive(&self, handle: InstanceHandle) -> bool {
        self.contains(handle) && !self.is_pending_delete(handle)
    }

    pub fn is_pending_delete(&self, handle: InstanceHandle) -> bool {
        self.world.get::<&PendingDelete>(handle.0).is_ok()
    }

    pub fn identifier(&self, handle: InstanceHandle) -> Option<Hash64> {
        self.world.get::<&Identity>(handle.0).ok().map(|i| i.id)
    }

    /// Absolute path of an instance
    pub fn path(&self, handle: InstanceHandle) -> Option<String> {
        self.world
            .get::<&Identity>(handle.0)
            .ok()
            .map(|i| i.path.clone())
    }

    pub fn from_identifier(&self, id: Hash64) -> Option<InstanceHandle> {
        self.by_id.get(&id).copied().map(InstanceHandle)
    }

    /// All instances in slot order
    pub fn handles(&self) -> Vec<InstanceHandle> {
        let mut handles: Vec<_> = self
            .world
            .iter()
            .filter(|entity| entity.has::<Identity>())
            .map(|entity| InstanceHandle(entity.entity()))
            .collect();
        handles.sort_by_key(|handle| handle.0.id());
        handles
    }

    fn transform_mut(&mut self, handle: InstanceHandle) -> Result<&mut Transform, HierarchyError> {
        self.world
            .query_one_mut::<&mut Transform>(handle.0)
            .map_err(|_| HierarchyError::InvalidInstance)
    }

    pub fn transform(&self, handle: InstanceHandle) -> Option<Transform> {
        self.world.get::<&Transform>(handle.0).ok().map(|t| *t)
    }

    pub fn position(&self, handle: InstanceHandle) -> Option<Vec3> {
        self.transform(handle).map(|t| t.position)
    }

    pub fn rotation(&self, handle: InstanceHandle) -> Option<Quat> {
        self.transform(handle).map(|t| t.rotation)
    }

    pub fn scale(&self, handle: InstanceHandle) -> Option<Vec3> {
        self.transform(handle).map(|t| t.scale)
    }

    pub fn set_position(&mut self, handle: InstanceHandle, position: Vec3) -> Result<(), HierarchyError> {
        self.transform_mut(handle)?.position = position;
        Ok(())
    }

    pub fn set_rotation(&mut self, handle: InstanceHandle, rotation: Quat) -> Result<(), HierarchyError> {
        self.transform_mut(handle)?.rotation = rotation;
        Ok(())
    }

    pub fn set_scale(&mut self, handle: InstanceHandle, scale: Vec3) -> Result<(), HierarchyError> {
        self.transform_mut(handle)?.scale = scale;
        Ok(())
    }

    /// World matrix as of the last transform propagation
    pub fn world_matrix(&self, handle: InstanceHandle) -> Option<Mat4> {
        self.world
            .get::<&GlobalTransform>(handle.0)
            .ok()
            .map(|g| g.matrix)
    }

    pub fn world_position(&self, handle: InstanceHandle) -> Option<Vec3> {
        self.world
            .get::<&GlobalTransform>(handle.0)
            .ok()
            .map(|g| g.position())
    }

    pub fn world_rotation(&self, handle: InstanceHandle) -> Option<Quat> {
        self.world
            .get::<&GlobalTransform>(handle.0)
            .ok()
            .map(|g| g.rotation())
    }

    pub fn parent(&self, handle: InstanceHandle) -> Option<InstanceHandle> {
        self.world
            .get::<&Parent>(handle.0)
            .ok()
            .map(|p| InstanceHandle(p.0))
    }

    pub fn children(&self, handle: InstanceHandle) -> Vec<InstanceHandle> {
        self.world
            .get::<&Children>(handle.0)
            .map(|c| c.0.iter().copied().map(InstanceHandle).collect())
            .unwrap_or_default()
    }

    /// Whether `candidate` is `ancestor` itself or lies below it
    pub fn is_descendant_or_self(&self, candidate: InstanceHandle, ancestor: InstanceHandle) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0;
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.by_id.len() {
                // Corrupt chain; treat as related so callers refuse the edit
                return true;
            }
            current = self.parent(handle);
        }
        false
    }

    /// Number of ancestors above an instance
    pub fn depth(&self, handle: InstanceHandle) -> usize {
        let mut depth = 0;
        let mut current = self.parent(handle);
        while let Some(parent) = current {
            depth += 1;
            if depth > self.by_id.len() {
                break;
            }
            current = self.parent(parent);
        }
        depth
    }

    /// Re-parent `child`, keeping its local transform
    ///
    /// A child attached under an instance that is pending deletion is flagged
    /// along with its own descendants.
    pub fn set_parent(
        &mut self,
        child: InstanceHandle,
        parent: Option<InstanceHandle>,
    ) -> Result<(), HierarchyError> {
        if !self.contains(child) {
            return Err(HierarchyError::InvalidInstance);
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(HierarchyError::InvalidInstance);
            }
            if self.is_descendant_or_self(parent, child) {
                return Err(HierarchyError::CycleRejected);
            }
        }

        self.detach(child);
        if let Some(parent) = parent {
            let _ = self.world.insert_one(child.0, Parent(parent.0));
            match self.world.query_one_mut::<&mut Children>(parent.0) {
                Ok(children) => children.0.push(child.0),
                Err(_) => {
                    let _ = self.world.insert_one(parent.0, Children(vec![child.0]));
                }
            }
            if self.is_pending_delete(parent) {
                self.flag_delete(child);
            }
        }
        debug!(child = %child, parent = ?parent, "Set parent");
        Ok(())
    }

    /// Remove the parent link of `child` and the matching child link
    pub(crate) fn detach(&mut self, child: InstanceHandle) {
        if let Ok(Parent(parent)) = self.world.remove_one::<Parent>(child.0) {
            if let Ok(children) = self.world.query_one_mut::<&mut Children>(parent) {
                children.0.retain(|e| *e != child.0);
            }
        }
    }

    /// Component attachments in attach order
    pub fn attachments(&self, handle: InstanceHandle) -> Vec<Attachment> {
        self.world
            .get::<&Attachments>(handle.0)
            .map(|a| a.0.clone())
            .unwrap_or_default()
    }

    /// Attachment at a slot index
    pub fn attachment(&self, handle: InstanceHandle, index: u8) -> Option<Attachment> {
        self.world
            .get::<&Attachments>(handle.0)
            .ok()
            .and_then(|a| a.0.get(index as usize).copied())
    }

    /// Slot index of the attachment with the given component id
    pub fn attachment_index(&self, handle: InstanceHandle, component_id: Hash64) -> Option<u8> {
        self.world.get::<&Attachments>(handle.0).ok().and_then(|a| {
            a.0.iter()
                .position(|att| att.component_id == component_id)
                .map(|i| i as u8)
        })
    }

    pub(crate) fn push_attachment(&mut self, handle: InstanceHandle, attachment: Attachment) {
        if let Ok(attachments) = self.world.query_one_mut::<&mut Attachments>(handle.0) {
            attachments.0.push(attachment);
        }
    }

    pub(crate) fn pop_attachment(&mut self, handle: InstanceHandle) -> Option<Attachment> {
        self.world
            .query_one_mut::<&mut Attachments>(handle.0)
            .ok()
            .and_then(|a| a.0.pop())
    }

    /// Enable or disable one attachment; disabled components get no update,
    /// message or input calls
    pub fn set_attachment_enabled(&mut self, handle: InstanceHandle, index: u8, enabled: bool) -> bool {
        match self.world.query_one_mut::<&mut Attachments>(handle.0) {
            Ok(attachments) => match attachments.0.get_mut(index as usize) {
                Some(att) => {
                    att.enabled = enabled;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Flag an instance and its descendants for deletion, parent first
    ///
    /// Returns false when the instance is gone or already flagged.
    pub fn flag_delete(&mut self, handle: InstanceHandle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let mut queue = vec![handle.0];
        let mut index = 0;
        while index < queue.len() {
            let entity = queue[index];
            index += 1;
            if self.world.get::<&PendingDelete>(entity).is_ok() {
                continue;
            }
            let _ = self.world.insert_one(entity, PendingDelete);
            self.pending.push(entity);
            if let Ok(children) = self.world.get::<&Children>(entity) {
                queue.extend(children.0.iter().copied());
            }
        }
        debug!(instance = %handle, count = index, "Flagged instance for deletion");
        true
    }

    /// Take every flagged instance, deepest first
    ///
    /// Instances can be flagged in separate calls, a child before its parent,
    /// so the order comes from the hierarchy rather than from flag order.
    pub(crate) fn take_pending(&mut self) -> Vec<InstanceHandle> {
        let mut pending: Vec<_> = self.pending.drain(..).rev().map(InstanceHandle).collect();
        pending.sort_by_key(|&handle| std::cmp::Reverse(self.depth(handle)));
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Push an instance on top of the focus stack
    pub fn acquire_input_focus(&mut self, handle: InstanceHandle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        self.focus.retain(|e| *e != handle.0);
        self.focus.push(handle.0);
        true
    }

    pub fn release_input_focus(&mut self, handle: InstanceHandle) {
        self.focus.retain(|e| *e != handle.0);
    }

    /// Focused instances, most recently acquired first
    pub fn focus_stack(&self) -> Vec<InstanceHandle> {
        self.focus.iter().rev().copied().map(InstanceHandle).collect()
    }

    pub(crate) fn inner(&self) -> &hecs::World {
        &self.world
    }

    pub(crate) fn inner_mut(&mut self) -> &mut hecs::World {
        &mut self.world
    }
}

impl fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstancePool")
            .field("len", &self.by_id.len())
            .field("pending", &self.pending.len())
            .field("max_instances", &self.max_instances)
            .finish()
    }
}
