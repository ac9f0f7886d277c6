//! The simulation engine: master loop, client handle and lifecycle.
//!
//! One step of the simulation, executed by [`Engine::step`]:
//! 1. Apply queued requests: a pending clear (reset or load), then queued
//!    additions, then queued removals.
//! 2. Unless paused: run collision detection on all workers and merge every
//!    collision group on the master thread.
//! 3. Run the gravity calculation phase, then the gravity application phase.
//! 4. If the step changed the point set, let the [`LoadBalancer`]
//!    redistribute points across workers.
//! 5. Notify the listener.
//!
//! [`Engine::run`] repeats steps until a stop is requested, throttling to
//! the configured step-rate ceiling and maintaining the steps-per-second
//! gauge. [`Simulation::start`] runs it on a dedicated master thread.
//!
//! Clients talk to the engine through a [`SimulationHandle`]. Requests are
//! queued and take effect at the next step boundary; reads wait for the
//! current step to finish.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::DVec2;
use log::{debug, error, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    arena::PointArena,
    atomic::AtomicF64,
    balance::LoadBalancer,
    collision::{self, CollisionReport},
    config::Config,
    error::{Error, Result},
    listener::{NoopListener, SimulationListener},
    phases::Phase,
    point::Point,
    types::{PointId, WorkerId},
    worker::WorkerPool,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Requests queued by clients until the next step boundary.
#[derive(Default)]
struct Pending {
    clear: bool,
    adds: Vec<(PointId, Point)>,
    removes: Vec<PointId>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.clear && self.adds.is_empty() && self.removes.is_empty()
    }
}

/// State shared between the engine and every handle.
struct Shared {
    config: Config,
    worker_count: usize,
    arena: Arc<RwLock<PointArena>>,
    pending: Mutex<Pending>,
    /// Held by the master for the whole critical part of a step, and by
    /// readers that need a consistent view between steps.
    step_lock: Mutex<()>,
    next_id: AtomicU64,
    steps_per_second: AtomicF64,
    point_count: AtomicUsize,
    paused: AtomicBool,
    stop: AtomicBool,
    idle: Mutex<()>,
    wake: Condvar,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
    listener: Arc<dyn SimulationListener>,
}

impl Shared {
    fn next_id(&self) -> PointId {
        PointId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_idle(&self) {
        let _guard = lock(&self.idle);
        self.wake.notify_all();
    }
}

/// What happened during one call to [`Engine::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Wall-clock time of the step, excluding any throttling sleep.
    pub elapsed: Duration,
    /// `true` if the step only applied queued requests.
    pub paused: bool,
    /// Number of collision groups merged.
    pub merged_groups: usize,
    /// Number of points removed or absorbed.
    pub destroyed: usize,
    /// Whether the load balancer redistributed points.
    pub rebalanced: bool,
}

/// The master side of a simulation.
///
/// Owns the worker pool and drives steps. Use [`Engine::step`] to advance
/// one step on the calling thread, or [`Simulation::start`] to run steps
/// continuously on a master thread.
pub struct Engine {
    shared: Arc<Shared>,
    pool: WorkerPool,
    balancer: LoadBalancer,
    rng: StdRng,
    steps: u64,
}

impl Engine {
    /// Builds an engine and spawns its workers.
    ///
    /// ### Parameters
    /// - `config` - Validated before anything is spawned.
    /// - `listener` - Receives step and destruction notifications.
    ///
    /// ### Returns
    /// - `Err(Error::InvalidParameter)` for an invalid configuration.
    /// - `Err(Error::Io)` if a worker thread could not be spawned.
    pub fn new(config: Config, listener: Arc<dyn SimulationListener>) -> Result<Self> {
        config.validate()?;
        let worker_count = config.worker_count();
        let arena = Arc::new(RwLock::new(PointArena::new()));
        let pool = WorkerPool::new(worker_count, Arc::clone(&arena), config.gravity)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            "engine ready: {worker_count} workers, G = {}, step limit {:?}",
            config.gravity, config.max_steps_per_second
        );

        let shared = Arc::new(Shared {
            config,
            worker_count,
            arena,
            pending: Mutex::new(Pending::default()),
            step_lock: Mutex::new(()),
            next_id: AtomicU64::new(0),
            steps_per_second: AtomicF64::new(0.0),
            point_count: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            idle: Mutex::new(()),
            wake: Condvar::new(),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
            listener,
        });
        Ok(Self {
            shared,
            pool,
            balancer: LoadBalancer::from_config(&config),
            rng,
            steps: 0,
        })
    }

    /// Same as [`Engine::new`] with a listener that ignores everything.
    pub fn with_config(config: Config) -> Result<Self> {
        Self::new(config, Arc::new(NoopListener))
    }

    /// Returns a new client handle to this engine.
    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Number of non-paused steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Number of points assigned to each worker, by worker id.
    pub fn worker_loads(&self) -> Result<Vec<usize>> {
        let _guard = lock(&self.shared.step_lock);
        self.pool.counts()
    }

    fn pick_worker(&mut self) -> WorkerId {
        if self.shared.config.load_balancing {
            0
        } else {
            self.rng.random_range(0..self.pool.len())
        }
    }

    /// Executes one simulation step on the calling thread.
    ///
    /// Destruction callbacks and the step-complete callback fire after the
    /// step's critical section has been released. A paused step applies
    /// queued requests only and does not fire the step-complete callback.
    pub fn step(&mut self) -> Result<StepReport> {
        if self.pool.is_shut_down() {
            return Err(Error::IllegalState("engine is shut down".into()));
        }
        let start = Instant::now();
        let mut destroyed = Vec::new();
        let outcome = {
            let shared = Arc::clone(&self.shared);
            let _guard = lock(&shared.step_lock);
            self.advance(&mut destroyed)
        };

        let listener = &self.shared.listener;
        for (id, point) in &destroyed {
            listener.on_point_destroyed(*id, point);
        }
        let mut report = outcome?;
        report.destroyed = destroyed.len();
        report.elapsed = start.elapsed();
        if !report.paused {
            self.steps += 1;
            trace!("step {} took {:?}", self.steps, report.elapsed);
            listener.on_step_complete(report.elapsed);
        }
        Ok(report)
    }

    fn advance(&mut self, destroyed: &mut Vec<(PointId, Point)>) -> Result<StepReport> {
        let mut topology_changed = self.apply_pending(destroyed)?;
        if self.shared.paused.load(Ordering::Relaxed) {
            return Ok(StepReport {
                paused: true,
                ..StepReport::default()
            });
        }

        self.pool.run_phase(Phase::DetectCollisions)?;
        let reports = self.pool.take_reports();
        let mut merged_groups = 0;
        if !reports.is_empty() {
            merged_groups = self.merge(&reports, destroyed)?;
            topology_changed = true;
        }

        self.pool.run_phase(Phase::CalculateGravity)?;
        self.pool.run_phase(Phase::ApplyGravity)?;

        let mut rebalanced = false;
        if self.shared.config.load_balancing && topology_changed {
            let arena = self.shared.arena.read().unwrap_or_else(PoisonError::into_inner);
            rebalanced = self.balancer.balance(&self.pool, arena.order())?;
        }

        Ok(StepReport {
            merged_groups,
            rebalanced,
            ..StepReport::default()
        })
    }

    /// Applies queued clear, additions and removals, in that order.
    ///
    /// ### Returns
    /// Whether anything was applied.
    fn apply_pending(&mut self, destroyed: &mut Vec<(PointId, Point)>) -> Result<bool> {
        let pending = mem::take(&mut *lock(&self.shared.pending));
        if pending.is_empty() {
            return Ok(false);
        }

        let arena_lock = Arc::clone(&self.shared.arena);
        let mut arena = arena_lock.write().unwrap_or_else(PoisonError::into_inner);
        if pending.clear {
            info!("clearing {} points", arena.len());
            arena.clear();
            self.pool.clear_all()?;
        }

        let added = pending.adds.len();
        for (id, point) in pending.adds {
            let slot = arena.insert(id, point);
            let worker = self.pick_worker();
            self.pool.assign(worker, slot)?;
        }

        let mut removed = 0;
        for id in pending.removes {
            let Some(slot) = arena.slot_of(id) else {
                continue;
            };
            self.pool.unassign_everywhere(slot)?;
            if let Some(entry) = arena.remove(slot) {
                destroyed.push(entry);
                removed += 1;
            }
        }

        if added > 0 || removed > 0 {
            debug!("applied {added} additions and {removed} removals");
        }
        self.shared.point_count.store(arena.len(), Ordering::Relaxed);
        Ok(pending.clear || added > 0 || removed > 0)
    }

    /// Resolves the detection reports and applies every merge.
    ///
    /// Absorbed points leave the arena and their workers; each survivor is
    /// overwritten with the merged value, moved to the back of the global
    /// order and handed to a freshly picked worker.
    fn merge(
        &mut self,
        reports: &[CollisionReport],
        destroyed: &mut Vec<(PointId, Point)>,
    ) -> Result<usize> {
        let arena_lock = Arc::clone(&self.shared.arena);
        let mut arena = arena_lock.write().unwrap_or_else(PoisonError::into_inner);
        let plan = collision::resolve(reports, &arena);
        let groups = plan.len();

        for group in plan {
            for &slot in &group.absorbed {
                self.pool.unassign_everywhere(slot)?;
                if let Some(entry) = arena.remove(slot) {
                    destroyed.push(entry);
                }
            }

            self.pool.unassign_everywhere(group.survivor)?;
            if let Some(point) = arena.get_mut(group.survivor) {
                *point = group.merged;
            }
            arena.move_to_back(group.survivor);
            let worker = self.pick_worker();
            self.pool.assign(worker, group.survivor)?;

            if let Some(id) = arena.id_of(group.survivor) {
                debug!("{} points merged into {id}", group.absorbed.len() + 1);
            }
        }

        self.shared.point_count.store(arena.len(), Ordering::Relaxed);
        Ok(groups)
    }

    /// Runs steps until a stop is requested, then shuts the workers down.
    ///
    /// While paused the loop keeps applying queued requests and idles for
    /// `pause_poll` between checks. Otherwise each step is followed by a
    /// sleep that keeps the rate under `max_steps_per_second`.
    ///
    /// ### Returns
    /// `Ok(())` after a requested stop, or the error that aborted a step.
    pub fn run(mut self) -> Result<()> {
        info!("simulation started");
        let budget = self.shared.config.step_budget();
        let result = loop {
            if self.shared.stop.load(Ordering::Relaxed) {
                break Ok(());
            }
            let start = Instant::now();
            let report = match self.step() {
                Ok(report) => report,
                Err(e) => {
                    error!("simulation aborted: {e}");
                    break Err(e);
                }
            };
            if report.paused {
                self.idle_while_paused();
                continue;
            }

            if let Some(budget) = budget {
                let spent = start.elapsed();
                if spent < budget {
                    thread::sleep(budget - spent);
                }
            }
            let total = start.elapsed().as_secs_f64();
            if total > 0.0 {
                self.shared.steps_per_second.store(1.0 / total);
            }
        };
        self.shutdown();
        result
    }

    fn idle_while_paused(&self) {
        let guard = lock(&self.shared.idle);
        if self.shared.paused.load(Ordering::Relaxed) && !self.shared.stop.load(Ordering::Relaxed) {
            let _ = self
                .shared
                .wake
                .wait_timeout(guard, self.shared.config.pause_poll)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops and joins every worker and marks the simulation as stopped.
    ///
    /// Called automatically by [`Engine::run`] and on drop; calling it more
    /// than once is harmless.
    pub fn shutdown(&mut self) {
        let mut stopped = lock(&self.shared.stopped);
        if *stopped {
            return;
        }
        self.pool.shutdown();
        *stopped = true;
        self.shared.stopped_cv.notify_all();
        info!("simulation stopped after {} steps", self.steps);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("workers", &self.pool.len())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Thread-safe client view of a running (or steppable) simulation.
///
/// Cloning is cheap; every clone talks to the same engine.
#[derive(Clone)]
pub struct SimulationHandle {
    shared: Arc<Shared>,
}

impl SimulationHandle {
    /// Queues `point` for insertion at the next step boundary.
    ///
    /// ### Returns
    /// The id the point will carry once it enters the simulation.
    pub fn add_point(&self, point: Point) -> PointId {
        let id = self.shared.next_id();
        lock(&self.shared.pending).adds.push((id, point));
        id
    }

    /// Queues the removal of `id`. Ids that are not live when the request
    /// is applied are ignored.
    pub fn remove_point(&self, id: PointId) {
        lock(&self.shared.pending).removes.push(id);
    }

    /// Copies of all live points with their ids, in global order.
    pub fn points_snapshot(&self) -> Vec<(PointId, Point)> {
        let _guard = lock(&self.shared.step_lock);
        let arena = self.shared.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena.iter().map(|(_, id, p)| (id, p.clone())).collect()
    }

    /// Independent copies of all live points, in global order.
    pub fn save_state(&self) -> Vec<Point> {
        let _guard = lock(&self.shared.step_lock);
        let arena = self.shared.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena.points().cloned().collect()
    }

    /// Replaces the whole simulation with `points` at the next step.
    ///
    /// Pending additions and removals are discarded. Points cleared this
    /// way are not reported to the listener.
    ///
    /// ### Returns
    /// The ids assigned to the loaded points, in order.
    pub fn load_state(&self, points: Vec<Point>) -> Vec<PointId> {
        let mut pending = lock(&self.shared.pending);
        let adds: Vec<(PointId, Point)> = points
            .into_iter()
            .map(|p| (self.shared.next_id(), p))
            .collect();
        let ids = adds.iter().map(|(id, _)| *id).collect();
        *pending = Pending {
            clear: true,
            adds,
            removes: Vec::new(),
        };
        info!("queued load of {} points", pending.adds.len());
        ids
    }

    /// Removes every point at the next step and discards pending requests.
    pub fn reset(&self) {
        *lock(&self.shared.pending) = Pending {
            clear: true,
            ..Pending::default()
        };
        info!("queued reset");
    }

    /// Returns the first point, in global order, whose disc contains `(x, y)`.
    pub fn point_at(&self, x: f64, y: f64) -> Option<(PointId, Point)> {
        let _guard = lock(&self.shared.step_lock);
        let arena = self.shared.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena
            .find_at(DVec2::new(x, y))
            .map(|(_, id, p)| (id, p.clone()))
    }

    /// Queues the removal of the point at `(x, y)`, if there is one.
    pub fn remove_at(&self, x: f64, y: f64) -> bool {
        match self.point_at(x, y) {
            Some((id, _)) => {
                self.remove_point(id);
                true
            }
            None => false,
        }
    }

    /// Steps per second measured over the last executed step, throttling
    /// included. Zero until a step ran under [`Engine::run`].
    pub fn steps_per_second(&self) -> f64 {
        self.shared.steps_per_second.load()
    }

    /// Number of live points as of the last step boundary.
    pub fn point_count(&self) -> usize {
        self.shared.point_count.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Pauses or resumes stepping. Queued requests are still applied while
    /// paused.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
        self.shared.notify_idle();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    /// Asks the master loop to stop at the next step boundary.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.notify_idle();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    /// Whether the engine has shut its workers down.
    pub fn is_stopped(&self) -> bool {
        *lock(&self.shared.stopped)
    }

    /// Blocks until the engine has shut its workers down.
    pub fn wait_stopped(&self) {
        let mut stopped = lock(&self.shared.stopped);
        while !*stopped {
            stopped = self
                .shared
                .stopped_cv
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl fmt::Debug for SimulationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationHandle")
            .field("point_count", &self.point_count())
            .field("workers", &self.worker_count())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

/// An engine running on its own master thread.
///
/// Dropping it requests a stop and joins the master thread.
pub struct Simulation {
    handle: SimulationHandle,
    master: Option<JoinHandle<Result<()>>>,
}

impl Simulation {
    /// Builds an engine and starts stepping it on a new thread.
    pub fn start(config: Config, listener: Arc<dyn SimulationListener>) -> Result<Self> {
        let engine = Engine::new(config, listener)?;
        let handle = engine.handle();
        let master = thread::Builder::new()
            .name("gravity-master".into())
            .spawn(move || engine.run())?;
        Ok(Self {
            handle,
            master: Some(master),
        })
    }

    pub fn handle(&self) -> &SimulationHandle {
        &self.handle
    }

    pub fn request_stop(&self) {
        self.handle.request_stop();
    }

    /// Requests a stop and waits for the master thread to finish.
    ///
    /// ### Returns
    /// The master loop's result.
    pub fn join(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.handle.request_stop();
        match self.master.take() {
            Some(master) => master
                .join()
                .unwrap_or_else(|_| Err(Error::IllegalState("master thread panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            error!("simulation ended with an error: {e}");
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("handle", &self.handle)
            .field("running", &self.master.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(workers: usize) -> Config {
        Config {
            workers: Some(workers),
            max_steps_per_second: None,
            seed: Some(7),
            ..Config::default()
        }
    }

    #[derive(Default)]
    struct Counter {
        steps: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl SimulationListener for Counter {
        fn on_step_complete(&self, _elapsed: Duration) {
            self.steps.fetch_add(1, Ordering::Relaxed);
        }

        fn on_point_destroyed(&self, _id: PointId, _point: &Point) {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn additions_take_effect_at_step_boundary() {
        let mut engine = Engine::with_config(test_config(2)).unwrap();
        let handle = engine.handle();
        let a = handle.add_point(Point::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        let b = handle.add_point(Point::new(50.0, 0.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        assert!(a < b);
        assert!(handle.points_snapshot().is_empty());

        engine.step().unwrap();
        let ids: Vec<PointId> = handle.points_snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(handle.point_count(), 2);
    }

    #[test]
    fn paused_step_applies_queue_without_moving_points() {
        let listener = Arc::new(Counter::default());
        let mut engine = Engine::new(test_config(2), listener.clone()).unwrap();
        let handle = engine.handle();
        handle.set_paused(true);
        handle.add_point(Point::new(0.0, 0.0, 0.0, 0.0, 10.0, 1.0).unwrap());
        handle.add_point(Point::new(100.0, 0.0, 0.0, 0.0, 10.0, 1.0).unwrap());

        let report = engine.step().unwrap();
        assert!(report.paused);
        assert_eq!(handle.point_count(), 2);
        assert!(handle.save_state().iter().all(|p| p.velocity() == DVec2::ZERO));
        assert_eq!(listener.steps.load(Ordering::Relaxed), 0);
        assert_eq!(engine.steps(), 0);

        handle.set_paused(false);
        assert!(!engine.step().unwrap().paused);
        assert_eq!(listener.steps.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn new_points_go_to_first_worker_then_get_rebalanced() {
        let cfg = Config {
            rebalance_min_points: 2,
            ..test_config(3)
        };
        let mut engine = Engine::with_config(cfg).unwrap();
        let handle = engine.handle();
        for i in 0..12 {
            handle.add_point(Point::new(i as f64 * 100.0, 0.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        }

        let report = engine.step().unwrap();
        assert!(report.rebalanced);
        assert_eq!(engine.worker_loads().unwrap(), vec![4, 4, 4]);
    }

    #[test]
    fn without_balancing_points_spread_randomly() {
        let cfg = Config {
            load_balancing: false,
            ..test_config(4)
        };
        let mut engine = Engine::with_config(cfg).unwrap();
        let handle = engine.handle();
        for i in 0..200 {
            handle.add_point(Point::new(i as f64 * 100.0, 0.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        }

        let report = engine.step().unwrap();
        assert!(!report.rebalanced);
        let loads = engine.worker_loads().unwrap();
        assert_eq!(loads.iter().sum::<usize>(), 200);
        assert!(loads.iter().all(|&n| n > 0), "loads {loads:?}");
    }

    #[test]
    fn removing_unknown_or_twice_is_ignored() {
        let listener = Arc::new(Counter::default());
        let mut engine = Engine::new(test_config(2), listener.clone()).unwrap();
        let handle = engine.handle();
        let id = handle.add_point(Point::default());
        engine.step().unwrap();

        handle.remove_point(id);
        handle.remove_point(id);
        handle.remove_point(PointId(999));
        let report = engine.step().unwrap();

        assert_eq!(report.destroyed, 1);
        assert_eq!(listener.destroyed.load(Ordering::Relaxed), 1);
        assert_eq!(handle.point_count(), 0);
    }

    #[test]
    fn reset_discards_pending_and_live_points_silently() {
        let listener = Arc::new(Counter::default());
        let mut engine = Engine::new(test_config(2), listener.clone()).unwrap();
        let handle = engine.handle();
        handle.add_point(Point::default());
        engine.step().unwrap();

        handle.add_point(Point::new(10.0, 0.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        handle.reset();
        engine.step().unwrap();

        assert_eq!(handle.point_count(), 0);
        assert_eq!(listener.destroyed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn remove_at_hits_the_point_under_the_cursor() {
        let mut engine = Engine::with_config(test_config(1)).unwrap();
        let handle = engine.handle();
        let id = handle.add_point(Point::new(20.0, 20.0, 0.0, 0.0, 1.0, 1.0).unwrap());
        engine.step().unwrap();

        let (found, _) = handle.point_at(20.2, 20.0).unwrap();
        assert_eq!(found, id);
        assert!(!handle.remove_at(-20.0, 0.0));
        assert!(handle.remove_at(20.0, 20.0));
        engine.step().unwrap();
        assert!(handle.points_snapshot().is_empty());
    }

    #[test]
    fn shutdown_marks_handle_stopped() {
        let mut engine = Engine::with_config(test_config(2)).unwrap();
        let handle = engine.handle();
        assert!(!handle.is_stopped());
        engine.shutdown();
        assert!(handle.is_stopped());
        handle.wait_stopped();
        engine.shutdown();
    }

    #[test]
    fn stepping_after_shutdown_is_rejected() {
        let mut engine = Engine::with_config(test_config(2)).unwrap();
        let handle = engine.handle();
        handle.add_point(Point::default());
        engine.shutdown();

        assert!(matches!(engine.step(), Err(Error::IllegalState(_))));
        // The queued point was never applied.
        assert_eq!(handle.point_count(), 0);
    }

    #[test]
    fn dead_removals_do_not_count_as_topology_changes() {
        let mut engine = Engine::with_config(test_config(2)).unwrap();
        let handle = engine.handle();
        let id = handle.add_point(Point::default());
        engine.step().unwrap();

        let mut destroyed = Vec::new();
        handle.remove_point(PointId(999));
        assert!(!engine.apply_pending(&mut destroyed).unwrap());

        handle.remove_point(id);
        assert!(engine.apply_pending(&mut destroyed).unwrap());
        assert_eq!(destroyed.len(), 1);

        // A clear counts even when there was nothing to clear.
        handle.reset();
        assert!(engine.apply_pending(&mut destroyed).unwrap());
        assert!(!engine.apply_pending(&mut destroyed).unwrap());
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let cfg = Config {
            workers: Some(0),
            ..Config::default()
        };
        assert!(matches!(Engine::with_config(cfg), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn simulation_runs_until_joined() {
        let listener = Arc::new(Counter::default());
        let cfg = Config {
            max_steps_per_second: Some(1000),
            ..test_config(2)
        };
        let sim = Simulation::start(cfg, listener.clone()).unwrap();
        sim.handle().add_point(Point::new(0.0, 0.0, 0.0, 0.0, 5.0, 1.0).unwrap());
        sim.handle().add_point(Point::new(400.0, 0.0, 0.0, 0.0, 5.0, 1.0).unwrap());

        while listener.steps.load(Ordering::Relaxed) < 5 {
            thread::sleep(Duration::from_millis(1));
        }
        let handle = sim.handle().clone();
        sim.join().unwrap();

        assert!(handle.is_stopped());
        assert!(handle.steps_per_second() > 0.0);
        assert_eq!(handle.point_count(), 2);
    }
}
