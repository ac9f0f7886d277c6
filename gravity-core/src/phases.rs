//! Per-step simulation phases run by worker units.
//!
//! Each step dispatches the same phase to every worker; a worker runs it
//! over the slots assigned to it while reading the whole arena:
//! 1. [`detect_collisions_phase`] - finds every other point overlapping an
//!    assigned point and returns the pairs as [`CollisionReport`]s.
//! 2. [`calculate_gravity_phase`] - accumulates the attraction of the whole
//!    point set into each assigned point's scratch acceleration.
//! 3. [`apply_gravity_phase`] - integrates each assigned point with the
//!    acceleration computed in the previous phase.
//!
//! Phases only ever write to assigned points, so workers with disjoint
//! assignments can run the same phase concurrently.

use std::fmt;

use crate::{arena::PointArena, collision::CollisionReport, types::SlotIndex};

/// One of the three parallel operations of a simulation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    DetectCollisions,
    CalculateGravity,
    ApplyGravity,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::DetectCollisions => "detect-collisions",
            Phase::CalculateGravity => "calculate-gravity",
            Phase::ApplyGravity => "apply-gravity",
        };
        f.write_str(name)
    }
}

/// Tests every assigned point against every other point in the arena.
///
/// Both orientations of a pair are reported when both points are owned by
/// workers running this phase; the resolver consumes duplicates.
///
/// ### Parameters
/// - `assigned` - Slots owned by the calling worker.
/// - `arena` - The global point set; only read access is required.
///
/// ### Returns
/// The overlapping pairs found, owned point first. The caller appends them
/// to the shared report list in one go.
pub fn detect_collisions_phase(assigned: &[SlotIndex], arena: &PointArena) -> Vec<CollisionReport> {
    let mut hits = Vec::new();
    for &slot in assigned {
        let Some(p) = arena.get(slot) else {
            continue;
        };
        for (other, _, q) in arena.iter() {
            if other != slot && p.overlaps(q) {
                hits.push(CollisionReport::new(slot, other));
            }
        }
    }
    hits
}

/// Accumulates the attraction of the whole arena into each assigned point.
///
/// ### Parameters
/// - `assigned` - Slots owned by the calling worker.
/// - `arena` - The global point set.
/// - `g` - Gravitational constant.
pub fn calculate_gravity_phase(assigned: &[SlotIndex], arena: &PointArena, g: f64) {
    for p in assigned.iter().filter_map(|&slot| arena.get(slot)) {
        p.accumulate_attraction(arena.points(), g);
    }
}

/// Applies the previously accumulated acceleration to each assigned point.
pub fn apply_gravity_phase(assigned: &[SlotIndex], arena: &PointArena) {
    for p in assigned.iter().filter_map(|&slot| arena.get(slot)) {
        p.apply_attraction();
    }
}

/// Runs `phase` over `assigned`.
///
/// ### Returns
/// Collision reports for [`Phase::DetectCollisions`], an empty vector for
/// the gravity phases.
pub fn run_phase(
    phase: Phase,
    assigned: &[SlotIndex],
    arena: &PointArena,
    g: f64,
) -> Vec<CollisionReport> {
    match phase {
        Phase::DetectCollisions => detect_collisions_phase(assigned, arena),
        Phase::CalculateGravity => {
            calculate_gravity_phase(assigned, arena, g);
            Vec::new()
        }
        Phase::ApplyGravity => {
            apply_gravity_phase(assigned, arena);
            Vec::new()
        }
    }
}
