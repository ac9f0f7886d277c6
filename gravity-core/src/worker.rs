//! Worker units and the phase barrier.
//!
//! A [`WorkerUnit`] owns one OS thread and a set of arena slots. The engine
//! dispatches a [`Phase`] to every unit of a [`WorkerPool`], then blocks on
//! the [`PhaseBarrier`] until all of them are back to [`WorkerState::Idle`].
//! Idle units sleep on a condition variable and wake on dispatch.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::{
    arena::PointArena,
    collision::CollisionReport,
    error::{Error, Result},
    phases::{self, Phase},
    types::{SlotIndex, WorkerId},
};

/// What a worker unit is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WorkerState {
    #[default]
    Idle,
    CalculatingGravity,
    ApplyingGravity,
    DetectingCollisions,
}

impl WorkerState {
    fn running(phase: Phase) -> Self {
        match phase {
            Phase::DetectCollisions => WorkerState::DetectingCollisions,
            Phase::CalculateGravity => WorkerState::CalculatingGravity,
            Phase::ApplyGravity => WorkerState::ApplyingGravity,
        }
    }
}

/// Counts workers still running the current phase.
#[derive(Debug, Default)]
pub struct PhaseBarrier {
    remaining: Mutex<usize>,
    done: Condvar,
}

impl PhaseBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects `count` arrivals before [`PhaseBarrier::wait`] returns.
    pub fn arm(&self, count: usize) {
        let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
        *remaining = count;
    }

    /// Signals that one worker finished its phase.
    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.done.notify_all();
        }
    }

    /// Blocks until every armed worker has arrived.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
        while *remaining > 0 {
            remaining = self.done.wait(remaining).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// State shared by every unit of a pool.
#[derive(Debug)]
pub(crate) struct PhaseContext {
    pub(crate) arena: Arc<RwLock<PointArena>>,
    pub(crate) reports: Mutex<Vec<CollisionReport>>,
    pub(crate) barrier: PhaseBarrier,
    pub(crate) gravity: f64,
}

impl PhaseContext {
    pub(crate) fn new(arena: Arc<RwLock<PointArena>>, gravity: f64) -> Self {
        Self {
            arena,
            reports: Mutex::new(Vec::new()),
            barrier: PhaseBarrier::new(),
            gravity,
        }
    }
}

/// Mutable state of one unit, guarded by the unit's mutex.
///
/// Every transition is checked here, so the protocol can be exercised
/// without threads.
#[derive(Debug, Default)]
pub(crate) struct UnitState {
    state: WorkerState,
    assigned: Vec<SlotIndex>,
    pending: Option<Phase>,
    lost: bool,
    shutdown: bool,
}

impl UnitState {
    fn ensure_idle(&self, what: &str) -> Result<()> {
        if self.state == WorkerState::Idle {
            Ok(())
        } else {
            Err(Error::IllegalState(format!(
                "cannot {what} while {:?}",
                self.state
            )))
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn assigned(&self) -> &[SlotIndex] {
        &self.assigned
    }

    pub(crate) fn begin(&mut self, phase: Phase) -> Result<()> {
        if self.shutdown {
            return Err(Error::IllegalState("worker is shut down".into()));
        }
        self.ensure_idle("dispatch a phase")?;
        self.state = WorkerState::running(phase);
        self.pending = Some(phase);
        Ok(())
    }

    pub(crate) fn assign(&mut self, slot: SlotIndex) -> Result<()> {
        self.ensure_idle("assign a point")?;
        self.assigned.push(slot);
        Ok(())
    }

    pub(crate) fn unassign(&mut self, slot: SlotIndex) -> Result<bool> {
        self.ensure_idle("unassign a point")?;
        match self.assigned.iter().position(|&s| s == slot) {
            Some(pos) => {
                self.assigned.swap_remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.ensure_idle("clear the assignment")?;
        self.assigned.clear();
        Ok(())
    }

    /// Picks up a dispatched phase, moving the assignment out for the run.
    fn take_work(&mut self) -> Option<(Phase, Vec<SlotIndex>)> {
        let phase = self.pending.take()?;
        Some((phase, mem::take(&mut self.assigned)))
    }

    pub(crate) fn finish(&mut self, assigned: Vec<SlotIndex>) {
        self.assigned = assigned;
        self.state = WorkerState::Idle;
    }
}

#[derive(Debug, Default)]
struct UnitShared {
    inner: Mutex<UnitState>,
    wake: Condvar,
}

/// One execution unit of the worker pool.
///
/// The unit's thread sleeps while [`WorkerState::Idle`], runs a dispatched
/// phase over its assigned slots and goes back to `Idle` on its own.
/// Assignment changes and dispatches are rejected with
/// [`Error::IllegalState`] unless the unit is idle.
#[derive(Debug)]
pub struct WorkerUnit {
    id: WorkerId,
    shared: Arc<UnitShared>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerUnit {
    /// Spawns the unit's thread.
    pub(crate) fn spawn(id: WorkerId, ctx: Arc<PhaseContext>) -> Result<Self> {
        let shared = Arc::new(UnitShared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("gravity-worker-{id}"))
            .spawn(move || worker_loop(id, &thread_shared, &ctx))?;
        Ok(Self {
            id,
            shared,
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// `false` once [`WorkerUnit::shutdown`] has joined the thread.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn lock(&self) -> Result<MutexGuard<'_, UnitState>> {
        self.shared.inner.lock().map_err(|_| Error::WorkerLost(self.id))
    }

    pub fn state(&self) -> Result<WorkerState> {
        Ok(self.lock()?.state())
    }

    pub fn assigned_count(&self) -> Result<usize> {
        Ok(self.lock()?.assigned().len())
    }

    pub fn assign(&self, slot: SlotIndex) -> Result<()> {
        self.lock()?.assign(slot)
    }

    /// Removes `slot` from this unit. Returns whether it was assigned here.
    pub fn unassign(&self, slot: SlotIndex) -> Result<bool> {
        self.lock()?.unassign(slot)
    }

    pub fn clear_assignment(&self) -> Result<()> {
        self.lock()?.clear()
    }

    /// Starts `phase` on this unit. The caller must have armed the barrier.
    pub fn dispatch(&self, phase: Phase) -> Result<()> {
        self.lock()?.begin(phase)?;
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Returns (and resets) whether the last phase panicked on this unit.
    fn take_lost(&self) -> bool {
        match self.shared.inner.lock() {
            Ok(mut st) => mem::take(&mut st.lost),
            Err(_) => true,
        }
    }

    /// Asks the thread to exit and joins it. Calling it twice is harmless.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            {
                let mut st = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
                st.shutdown = true;
            }
            self.shared.wake.notify_one();
            if handle.join().is_err() {
                error!("worker {} panicked while shutting down", self.id);
            }
        }
    }
}

impl Drop for WorkerUnit {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: WorkerId, shared: &UnitShared, ctx: &PhaseContext) {
    debug!("worker {id} started");
    loop {
        let (phase, assigned) = {
            let Ok(mut st) = shared.inner.lock() else {
                return;
            };
            loop {
                if st.shutdown && st.pending.is_none() {
                    debug!("worker {id} exiting");
                    return;
                }
                if let Some(work) = st.take_work() {
                    break work;
                }
                st = match shared.wake.wait(st) {
                    Ok(st) => st,
                    Err(_) => return,
                };
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let arena = ctx.arena.read().unwrap_or_else(|e| e.into_inner());
            let hits = phases::run_phase(phase, &assigned, &arena, ctx.gravity);
            if !hits.is_empty() {
                let mut reports = ctx.reports.lock().unwrap_or_else(|e| e.into_inner());
                reports.extend(hits);
            }
        }));

        match shared.inner.lock() {
            Ok(mut st) => {
                if outcome.is_err() {
                    error!("worker {id} panicked during {phase}");
                    st.lost = true;
                }
                st.finish(assigned);
            }
            Err(_) => {
                ctx.barrier.arrive();
                return;
            }
        }
        ctx.barrier.arrive();
    }
}

/// The fixed set of worker units driven by one engine.
#[derive(Debug)]
pub struct WorkerPool {
    units: Vec<WorkerUnit>,
    ctx: Arc<PhaseContext>,
}

impl WorkerPool {
    /// Spawns `count` worker units reading from `arena`.
    pub fn new(count: usize, arena: Arc<RwLock<PointArena>>, gravity: f64) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidParameter("worker pool needs at least one worker".into()));
        }
        let ctx = Arc::new(PhaseContext::new(arena, gravity));
        let units = (0..count)
            .map(|id| WorkerUnit::spawn(id, Arc::clone(&ctx)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { units, ctx })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[WorkerUnit] {
        &self.units
    }

    /// Whether any unit has been shut down. Such a pool can no longer run
    /// phases.
    pub fn is_shut_down(&self) -> bool {
        self.units.iter().any(|unit| !unit.is_running())
    }

    fn unit(&self, worker: WorkerId) -> Result<&WorkerUnit> {
        self.units.get(worker).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "worker {worker} out of range (pool has {})",
                self.units.len()
            ))
        })
    }

    /// Runs `phase` on every unit and waits until all are idle again.
    ///
    /// The caller must not hold the arena write lock.
    pub fn run_phase(&self, phase: Phase) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::IllegalState("pool is shut down".into()));
        }
        self.ctx.barrier.arm(self.units.len());
        let mut failure = None;
        for unit in &self.units {
            if failure.is_some() {
                self.ctx.barrier.arrive();
                continue;
            }
            if let Err(e) = unit.dispatch(phase) {
                self.ctx.barrier.arrive();
                failure = Some(e);
            }
        }
        self.ctx.barrier.wait();

        if let Some(e) = failure {
            return Err(e);
        }
        for unit in &self.units {
            if unit.take_lost() {
                return Err(Error::WorkerLost(unit.id()));
            }
        }
        Ok(())
    }

    /// Drains the collision reports gathered by the last detection phase.
    pub fn take_reports(&self) -> Vec<CollisionReport> {
        let mut reports = self.ctx.reports.lock().unwrap_or_else(|e| e.into_inner());
        mem::take(&mut *reports)
    }

    pub fn assign(&self, worker: WorkerId, slot: SlotIndex) -> Result<()> {
        self.unit(worker)?.assign(slot)
    }

    /// Removes `slot` from whichever unit holds it.
    ///
    /// ### Returns
    /// The unit that held it, or `None` if no unit did.
    pub fn unassign_everywhere(&self, slot: SlotIndex) -> Result<Option<WorkerId>> {
        for unit in &self.units {
            if unit.unassign(slot)? {
                return Ok(Some(unit.id()));
            }
        }
        Ok(None)
    }

    /// Number of slots assigned to each unit, by worker id.
    pub fn counts(&self) -> Result<Vec<usize>> {
        self.units.iter().map(WorkerUnit::assigned_count).collect()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.units.iter().try_for_each(WorkerUnit::clear_assignment)
    }

    /// Clears every assignment, then deals `order` out one slot per unit in
    /// turn.
    pub fn round_robin(&self, order: &[SlotIndex]) -> Result<()> {
        self.clear_all()?;
        for (i, &slot) in order.iter().enumerate() {
            self.units[i % self.units.len()].assign(slot)?;
        }
        Ok(())
    }

    /// Stops and joins every unit.
    pub fn shutdown(&mut self) {
        for unit in &mut self.units {
            unit.shutdown();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
