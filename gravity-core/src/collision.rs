//! Collision grouping and merge planning.
//!
//! Workers report overlapping pairs during the detection phase. This module
//! turns those pairs into collision groups (transitive closure: if A hits B
//! and B hits C, all three merge) and computes, for each group, the point
//! that survives and the values it takes. It does not modify anything; the
//! engine applies the resulting plan.
//!
//! The work is sequential and runs on the engine thread only. Groups can
//! chain through arbitrarily many reports, so there is no useful way to
//! split it across workers.

use std::collections::HashSet;

use crate::{arena::PointArena, point::Point, types::SlotIndex};

/// Two points observed overlapping during one detection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollisionReport {
    pub a: SlotIndex,
    pub b: SlotIndex,
}

impl CollisionReport {
    pub fn new(a: SlotIndex, b: SlotIndex) -> Self {
        Self { a, b }
    }

    /// Returns the other end of the pair if `slot` is one of its ends.
    #[inline]
    pub fn other(&self, slot: SlotIndex) -> Option<SlotIndex> {
        if self.a == slot {
            Some(self.b)
        } else if self.b == slot {
            Some(self.a)
        } else {
            None
        }
    }
}

/// One resolved collision group.
///
/// ### Fields
/// - `survivor` - Slot of the most massive member; it keeps its identity
///   and is overwritten with `merged`.
/// - `absorbed` - Every other member, to be destroyed.
/// - `merged` - The value the survivor takes: total mass, mass-weighted
///   position, velocity and density.
#[derive(Debug)]
pub struct MergeGroup {
    pub survivor: SlotIndex,
    pub absorbed: Vec<SlotIndex>,
    pub merged: Point,
}

/// Splits a list of collision reports into collision groups.
///
/// Reports are consumed front to back: the first remaining report seeds a
/// group, then the remaining reports are scanned repeatedly, each report
/// touching a member pulling its other end into the group, until a full
/// scan adds nothing. The group is then de-duplicated, keeping the order
/// in which members were first seen.
///
/// ### Returns
/// One vector of distinct slots per group, in discovery order.
pub fn collision_groups(reports: &[CollisionReport]) -> Vec<Vec<SlotIndex>> {
    let mut pending = reports.to_vec();
    let mut groups = Vec::new();

    while !pending.is_empty() {
        let first = pending.remove(0);
        let mut group = vec![first.a, first.b];

        loop {
            let before = group.len();
            let mut i = 0;
            while i < group.len() {
                let member = group[i];
                pending.retain(|r| match r.other(member) {
                    Some(other) => {
                        group.push(other);
                        false
                    }
                    None => true,
                });
                i += 1;
            }
            if group.len() == before {
                break;
            }
        }

        let mut seen = HashSet::with_capacity(group.len());
        group.retain(|slot| seen.insert(*slot));
        groups.push(group);
    }
    groups
}

/// Builds the merge plan for one step's collision reports.
///
/// For every group the survivor is the member with the greatest mass; on a
/// tie the first member in group order wins.
///
/// ### Parameters
/// - `reports` - All reports gathered during the detection phase.
/// - `arena` - The global point set the reports refer to.
///
/// ### Returns
/// One [`MergeGroup`] per collision group. Slots that no longer hold a
/// point are ignored; a group left with fewer than two members is dropped.
pub fn resolve(reports: &[CollisionReport], arena: &PointArena) -> Vec<MergeGroup> {
    let mut plan = Vec::new();
    for group in collision_groups(reports) {
        let members: Vec<(SlotIndex, &Point)> = group
            .iter()
            .filter_map(|&slot| arena.get(slot).map(|p| (slot, p)))
            .collect();
        if members.len() < 2 {
            continue;
        }

        let mut survivor = members[0];
        for &(slot, p) in &members[1..] {
            if p.mass() > survivor.1.mass() {
                survivor = (slot, p);
            }
        }

        let points: Vec<&Point> = members.iter().map(|&(_, p)| p).collect();
        let Some(merged) = Point::merge_group(&points) else {
            continue;
        };
        let absorbed = members
            .iter()
            .map(|&(slot, _)| slot)
            .filter(|&slot| slot != survivor.0)
            .collect();

        plan.push(MergeGroup {
            survivor: survivor.0,
            absorbed,
            merged,
        });
    }
    plan
}
