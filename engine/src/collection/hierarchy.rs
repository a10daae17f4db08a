//! Transform propagation from local transforms through the parent chain

use super::instance::{Children, Identity, InstancePool, Parent};
use crate::core::transform::{GlobalTransform, Transform};
use glam::Mat4;
use hecs::Entity;
use std::collections::HashSet;
use tracing::{error, trace};

/// Recompute every world transform top-down using breadth-first traversal
///
/// Roots take their local matrix. Each child takes its parent's world matrix
/// composed with its own local matrix. Returns the number of instances updated.
pub fn propagate_transforms(pool: &mut InstancePool) -> usize {
    let mut visited = HashSet::with_capacity(pool.len());
    let mut queue: Vec<(Entity, Mat4)> = Vec::with_capacity(pool.len());
    let mut next_level = Vec::new();
    let mut updates: Vec<(Entity, Mat4)> = Vec::with_capacity(pool.len());

    {
        let world = pool.inner();

        for (entity, transform) in world
            .query::<(&Identity, &Transform)>()
            .without::<&Parent>()
            .iter()
            .map(|(e, (_, t))| (e, *t))
        {
            let matrix = transform.to_matrix();
            visited.insert(entity);
            updates.push((entity, matrix));
            queue.push((entity, matrix));
        }
        trace!(root_count = queue.len(), "Starting transform propagation");

        while !queue.is_empty() {
            for (parent, parent_matrix) in queue.drain(..) {
                let Ok(children) = world.get::<&Children>(parent) else {
                    continue;
                };
                for &child in children.0.iter() {
                    if !visited.insert(child) {
                        error!(
                            parent = ?parent,
                            child = ?child,
                            "Cyclic parent-child relationship detected"
                        );
                        continue;
                    }
                    let local = world
                        .get::<&Transform>(child)
                        .map(|t| t.to_matrix())
                        .unwrap_or(Mat4::IDENTITY);
                    let matrix = parent_matrix * local;
                    updates.push((child, matrix));
                    next_level.push((child, matrix));
                }
            }
            std::mem::swap(&mut queue, &mut next_level);
        }
    }

    let world = pool.inner_mut();
    let count = updates.len();
    for (entity, matrix) in updates {
        match world.query_one_mut::<&mut GlobalTransform>(entity) {
            Ok(global) => global.matrix = matrix,
            Err(_) => {
                let _ = world.insert_one(entity, GlobalTransform::from_matrix(matrix));
            }
        }
    }

    trace!(processed_count = count, "Transform propagation completed");
    count
}
