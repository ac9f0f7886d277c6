//! Lock-free `f64` storage for point kinematics.
//!
//! During a phase every worker holds a shared borrow of the point arena,
//! yet each worker must update the points it owns. Positions, velocities
//! and the scratch acceleration therefore live in atomic cells. Every cell
//! is written by at most one worker per phase and the phase barrier orders
//! phases, so relaxed loads and stores are enough.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec2;

/// An `f64` stored as its bit pattern in an [`AtomicU64`].
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Non-atomic write through an exclusive borrow.
    #[inline]
    pub(crate) fn set(&mut self, v: f64) {
        *self.0.get_mut() = v.to_bits();
    }
}

/// A 2-D vector made of two [`AtomicF64`] components.
#[derive(Debug, Default)]
pub(crate) struct AtomicVec2 {
    x: AtomicF64,
    y: AtomicF64,
}

impl AtomicVec2 {
    pub(crate) fn new(v: DVec2) -> Self {
        Self {
            x: AtomicF64::new(v.x),
            y: AtomicF64::new(v.y),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> DVec2 {
        DVec2::new(self.x.load(), self.y.load())
    }

    #[inline]
    pub(crate) fn store(&self, v: DVec2) {
        self.x.store(v.x);
        self.y.store(v.y);
    }

    #[inline]
    pub(crate) fn set(&mut self, v: DVec2) {
        self.x.set(v.x);
        self.y.set(v.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f64_keeps_exact_bits() {
        let cell = AtomicF64::new(-0.0);
        assert!(cell.load().is_sign_negative());

        cell.store(f64::MIN_POSITIVE);
        assert_eq!(cell.load(), f64::MIN_POSITIVE);
    }

    #[test]
    fn atomic_vec2_store_and_set_agree() {
        let mut v = AtomicVec2::new(DVec2::new(1.0, 2.0));
        assert_eq!(v.load(), DVec2::new(1.0, 2.0));

        v.store(DVec2::new(3.0, -4.0));
        assert_eq!(v.load(), DVec2::new(3.0, -4.0));

        v.set(DVec2::ZERO);
        assert_eq!(v.load(), DVec2::ZERO);
    }
}
