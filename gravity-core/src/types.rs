use std::fmt;

/// Index of a slot in a [`crate::arena::PointArena`].
///
/// Slots are stable for as long as the point occupying them stays in the
/// simulation; a freed slot may be reused by a later insertion. Worker
/// units hold sets of these indices, never references to points.
pub type SlotIndex = usize;

/// Position of a worker unit inside the engine's worker pool.
pub type WorkerId = usize;

/// Stable identity of a point submitted to a simulation.
///
/// Ids are handed out by [`crate::engine::SimulationHandle::add_point`] and
/// stay attached to the point until it is removed or absorbed by a merge.
/// The survivor of a merge keeps its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
