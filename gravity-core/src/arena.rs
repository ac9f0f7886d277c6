//! The engine-wide point collection.
//!
//! [`PointArena`] is the single source of truth for which points exist and
//! what values they hold. Points live in slots addressed by [`SlotIndex`];
//! worker units only store slot indices. The arena also keeps the global
//! order of points (insertion order, merge survivors move to the back),
//! which drives round-robin rebalancing, snapshots and saved states.

use std::collections::HashMap;

use glam::DVec2;

use crate::point::Point;
use crate::types::{PointId, SlotIndex};

#[derive(Debug)]
struct Slot {
    id: PointId,
    point: Point,
}

/// Slot storage for every live point, plus the global order.
#[derive(Debug, Default)]
pub struct PointArena {
    slots: Vec<Option<Slot>>,
    free: Vec<SlotIndex>,
    order: Vec<SlotIndex>,
    by_id: HashMap<PointId, SlotIndex>,
}

impl PointArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live points.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts a point at the end of the global order.
    ///
    /// ### Parameters
    /// - `id` - Identity of the point; must not already be live.
    /// - `point` - The point value.
    ///
    /// ### Returns
    /// The slot now holding the point.
    pub fn insert(&mut self, id: PointId, point: Point) -> SlotIndex {
        let slot = Slot { id, point };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.order.push(index);
        self.by_id.insert(id, index);
        index
    }

    /// Removes the point in `index` from the arena and the global order.
    ///
    /// ### Returns
    /// The id and value of the removed point, or `None` if the slot was empty.
    pub fn remove(&mut self, index: SlotIndex) -> Option<(PointId, Point)> {
        let slot = self.slots.get_mut(index)?.take()?;
        if let Some(pos) = self.order.iter().position(|&s| s == index) {
            self.order.remove(pos);
        }
        self.by_id.remove(&slot.id);
        self.free.push(index);
        Some((slot.id, slot.point))
    }

    /// Moves a live point to the end of the global order, keeping its slot.
    ///
    /// Returns `false` if `index` holds no point.
    pub fn move_to_back(&mut self, index: SlotIndex) -> bool {
        match self.order.iter().position(|&s| s == index) {
            Some(pos) => {
                self.order.remove(pos);
                self.order.push(index);
                true
            }
            None => false,
        }
    }

    /// Drops every point and resets slot bookkeeping.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
        self.by_id.clear();
    }

    #[inline]
    pub fn slot_of(&self, id: PointId) -> Option<SlotIndex> {
        self.by_id.get(&id).copied()
    }

    #[inline]
    pub fn id_of(&self, index: SlotIndex) -> Option<PointId> {
        self.slots.get(index)?.as_ref().map(|s| s.id)
    }

    #[inline]
    pub fn get(&self, index: SlotIndex) -> Option<&Point> {
        self.slots.get(index)?.as_ref().map(|s| &s.point)
    }

    #[inline]
    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut Point> {
        self.slots.get_mut(index)?.as_mut().map(|s| &mut s.point)
    }

    /// Slot indices of all live points, in global order.
    #[inline]
    pub fn order(&self) -> &[SlotIndex] {
        &self.order
    }

    /// Iterates `(slot, id, point)` over all live points in global order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, PointId, &Point)> + '_ {
        self.order.iter().filter_map(move |&index| {
            self.slots[index]
                .as_ref()
                .map(|slot| (index, slot.id, &slot.point))
        })
    }

    /// Iterates over all live points in global order.
    pub fn points(&self) -> impl Iterator<Item = &Point> + '_ {
        self.iter().map(|(_, _, p)| p)
    }

    /// Finds the first point, in global order, whose disc contains `at`.
    pub fn find_at(&self, at: DVec2) -> Option<(SlotIndex, PointId, &Point)> {
        self.iter().find(|(_, _, p)| p.contains(at))
    }
}
