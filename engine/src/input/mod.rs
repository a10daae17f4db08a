//! Input actions delivered to focused instances

use crate::core::hash::{hash_string32, Hash32};
use serde::{Deserialize, Serialize};

/// Pointer state attached to an action
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pointer {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

/// One input action produced by the input layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputAction {
    /// Hash of the action name, e.g. "jump"
    pub action_id: Hash32,
    /// Analog value in [0, 1] for buttons, unbounded for axes
    pub value: f32,
    pub pressed: bool,
    pub released: bool,
    pub repeated: bool,
    pub pointer: Option<Pointer>,
}

impl InputAction {
    /// A button press with value 1
    pub fn pressed(action: &str) -> Self {
        Self {
            action_id: hash_string32(action),
            value: 1.0,
            pressed: true,
            released: false,
            repeated: false,
            pointer: None,
        }
    }

    /// A button release with value 0
    pub fn released(action: &str) -> Self {
        Self {
            action_id: hash_string32(action),
            value: 0.0,
            pressed: false,
            released: true,
            repeated: false,
            pointer: None,
        }
    }

    pub fn with_pointer(mut self, pointer: Pointer) -> Self {
        self.pointer = Some(pointer);
        self
    }
}

/// Outcome of an input hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResult {
    /// Stop propagating this action
    Consumed,
    /// Let the next focused instance see the action
    Ignored,
}

/// Actions buffered for the next frame, with their consumption state
#[derive(Debug, Default)]
pub struct InputBuffer {
    actions: Vec<(InputAction, bool)>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action for the next frame
    pub fn push(&mut self, action: InputAction) {
        self.actions.push((action, false));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions with their consumed flags, in arrival order
    pub fn entries_mut(&mut self) -> &mut [(InputAction, bool)] {
        &mut self.actions
    }

    pub fn consumed_count(&self) -> usize {
        self.actions.iter().filter(|(_, consumed)| *consumed).count()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
