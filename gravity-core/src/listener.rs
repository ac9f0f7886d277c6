use std::time::Duration;

use crate::{point::Point, types::PointId};

/// Callbacks invoked by the engine thread.
///
/// Both methods default to doing nothing. They run on the master thread
/// after the step's critical section has been released, so implementations
/// may call back into a [`crate::engine::SimulationHandle`], but should
/// return quickly: the next step does not start until they do.
pub trait SimulationListener: Send + Sync {
    /// Called once per executed (non-paused) step with its duration.
    fn on_step_complete(&self, _elapsed: Duration) {}

    /// Called exactly once for every point removed by a client or absorbed
    /// by a merge, after it left the simulation. Clearing the simulation
    /// (reset or load) does not report the discarded points.
    fn on_point_destroyed(&self, _id: PointId, _point: &Point) {}
}

/// A listener that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl SimulationListener for NoopListener {}
