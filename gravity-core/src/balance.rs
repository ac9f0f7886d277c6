//! Load balancing across worker units.
//!
//! New points and merge survivors land on worker 0 when balancing is
//! enabled, so after topology changes the engine asks the [`LoadBalancer`]
//! whether the per-worker counts drifted too far apart. If they did, every
//! assignment is dropped and the global order is dealt out round-robin.

use log::debug;

use crate::{config::Config, error::Result, types::SlotIndex, worker::WorkerPool};

/// Decides when to redistribute points and performs the redistribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadBalancer {
    skew: f64,
    min_points_per_worker: usize,
}

impl LoadBalancer {
    pub fn new(skew: f64, min_points_per_worker: usize) -> Self {
        Self {
            skew,
            min_points_per_worker,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rebalance_skew, config.rebalance_min_points)
    }

    /// Returns `true` if the assignment should be redistributed.
    ///
    /// Nothing happens until there are more than
    /// `workers * min_points_per_worker` points. Past that, a worker with
    /// no points or a max/min count ratio above the skew threshold triggers
    /// a rebalance.
    ///
    /// ### Parameters
    /// - `counts` - Number of points assigned to each worker.
    /// - `total` - Number of live points.
    pub fn should_rebalance(&self, counts: &[usize], total: usize) -> bool {
        if counts.is_empty() || total <= counts.len() * self.min_points_per_worker {
            return false;
        }
        let min = counts.iter().copied().min().unwrap_or(0);
        let max = counts.iter().copied().max().unwrap_or(0);
        min == 0 || max as f64 / min as f64 > self.skew
    }

    /// Rebalances `pool` if [`LoadBalancer::should_rebalance`] says so.
    ///
    /// ### Parameters
    /// - `pool` - Workers to redistribute; all must be idle.
    /// - `order` - Global order of the live points.
    ///
    /// ### Returns
    /// Whether a redistribution happened.
    pub fn balance(&self, pool: &WorkerPool, order: &[SlotIndex]) -> Result<bool> {
        let counts = pool.counts()?;
        if !self.should_rebalance(&counts, order.len()) {
            return Ok(false);
        }
        debug!(
            "rebalancing {} points across {} workers (counts were {counts:?})",
            order.len(),
            pool.len()
        );
        pool.round_robin(order)?;
        Ok(true)
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
