//! Frame phases and the order they must run in

use std::fmt;

/// One phase of a collection's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePhase {
    InputDispatch,
    MessageDispatch,
    ComponentUpdate,
    TransformPropagation,
    DeferredDeleteFlush,
    PostUpdate,
}

impl FramePhase {
    /// Every phase in execution order
    pub const ORDER: [FramePhase; 6] = [
        FramePhase::InputDispatch,
        FramePhase::MessageDispatch,
        FramePhase::ComponentUpdate,
        FramePhase::TransformPropagation,
        FramePhase::DeferredDeleteFlush,
        FramePhase::PostUpdate,
    ];

    /// Phase that follows this one; post-update wraps to the next frame
    pub fn next(self) -> FramePhase {
        match self {
            FramePhase::InputDispatch => FramePhase::MessageDispatch,
            FramePhase::MessageDispatch => FramePhase::ComponentUpdate,
            FramePhase::ComponentUpdate => FramePhase::TransformPropagation,
            FramePhase::TransformPropagation => FramePhase::DeferredDeleteFlush,
            FramePhase::DeferredDeleteFlush => FramePhase::PostUpdate,
            FramePhase::PostUpdate => FramePhase::InputDispatch,
        }
    }
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::InputDispatch => "input_dispatch",
            FramePhase::MessageDispatch => "message_dispatch",
            FramePhase::ComponentUpdate => "component_update",
            FramePhase::TransformPropagation => "transform_propagation",
            FramePhase::DeferredDeleteFlush => "deferred_delete_flush",
            FramePhase::PostUpdate => "post_update",
        };
        f.write_str(name)
    }
}

/// Phase requested out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Phase {requested} requested, expected {expected}")]
pub struct PhaseError {
    pub requested: FramePhase,
    pub expected: FramePhase,
}

/// Records the last phase a collection ran and refuses out-of-order phases
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTracker {
    last: Option<FramePhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase that is allowed to run next
    pub fn expected(&self) -> FramePhase {
        self.last.map_or(FramePhase::InputDispatch, FramePhase::next)
    }

    /// Last phase that ran, if any
    pub fn current(&self) -> Option<FramePhase> {
        self.last
    }

    /// Move to `phase` if it is the expected one
    pub fn enter(&mut self, phase: FramePhase) -> Result<(), PhaseError> {
        let expected = self.expected();
        if phase != expected {
            return Err(PhaseError {
                requested: phase,
                expected,
            });
        }
        self.last = Some(phase);
        Ok(())
    }

    /// Whether the tracker sits between frames
    pub fn is_frame_boundary(&self) -> bool {
        matches!(self.last, None | Some(FramePhase::PostUpdate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_run_in_order() {
        let mut tracker = PhaseTracker::new();
        for _ in 0..2 {
            for phase in FramePhase::ORDER {
                tracker.enter(phase).unwrap();
            }
            assert!(tracker.is_frame_boundary());
        }
    }

    #[test]
    fn test_out_of_order_phase_is_refused() {
        let mut tracker = PhaseTracker::new();
        tracker.enter(FramePhase::InputDispatch).unwrap();
        assert_eq!(
            tracker.enter(FramePhase::ComponentUpdate),
            Err(PhaseError {
                requested: FramePhase::ComponentUpdate,
                expected: FramePhase::MessageDispatch,
            })
        );
        assert_eq!(tracker.current(), Some(FramePhase::InputDispatch));
        assert!(!tracker.is_frame_boundary());
    }
}
