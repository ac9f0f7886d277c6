use std::time::Duration;

use crate::error::{Error, Result};

/// Default gravitational constant.
///
/// Treat it as a speed/precision knob rather than a physical constant: the
/// closer it is to 0 the more precise (and slower) the simulation gets.
/// Values above 1 are not recommended; negative values make gravity
/// repulsive.
pub const G: f64 = 0.15;

/// Global configuration for a simulation engine.
///
/// ### Fields
/// - `gravity` - Gravitational constant applied once per accumulated
///   attraction vector.
/// - `max_steps_per_second` - Step-rate ceiling; `None` runs unthrottled.
/// - `load_balancing` - Whether points are periodically redistributed
///   across workers. When disabled, new points go to a random worker.
/// - `rebalance_skew` - Largest tolerated ratio between the most and least
///   loaded worker before a rebalance.
/// - `rebalance_min_points` - Balancing only kicks in once there are more
///   than `workers * rebalance_min_points` points.
/// - `workers` - Size of the worker pool; `None` uses twice the available
///   hardware parallelism.
/// - `pause_poll` - How long the master idles between checks while paused.
/// - `seed` - Seed for the worker-assignment RNG; `None` seeds from the OS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub gravity: f64,
    pub max_steps_per_second: Option<u32>,
    pub load_balancing: bool,
    pub rebalance_skew: f64,
    pub rebalance_min_points: usize,
    pub workers: Option<usize>,
    pub pause_poll: Duration,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gravity: G,
            max_steps_per_second: Some(100),
            load_balancing: true,
            rebalance_skew: 1.1,
            rebalance_min_points: 10,
            workers: None,
            pause_poll: Duration::from_millis(10),
            seed: None,
        }
    }
}

impl Config {
    /// Checks that every field is inside its valid domain.
    ///
    /// ### Returns
    /// - `Ok(())` if the configuration can be used to build an engine.
    /// - `Err(Error::InvalidParameter)` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(Error::InvalidParameter("gravity must be finite".into()));
        }
        if self.max_steps_per_second == Some(0) {
            return Err(Error::InvalidParameter(
                "max_steps_per_second must be >= 1 (use None for no limit)".into(),
            ));
        }
        if !(self.rebalance_skew >= 1.0) {
            return Err(Error::InvalidParameter(
                "rebalance_skew must be >= 1".into(),
            ));
        }
        if self.workers == Some(0) {
            return Err(Error::InvalidParameter("workers must be >= 1".into()));
        }
        Ok(())
    }

    /// Number of worker units the engine will spawn.
    ///
    /// Oversubscribing the cores (two workers per hardware thread) keeps
    /// them busy while others sit at the phase barrier.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(2)
        })
    }

    /// Minimum wall-clock duration of one step under the rate ceiling.
    pub fn step_budget(&self) -> Option<Duration> {
        self.max_steps_per_second
            .filter(|&sps| sps > 0)
            .map(|sps| Duration::from_nanos(1_000_000_000 / u64::from(sps)))
    }
}
