//! Point masses and the physics primitives that act on them.

use std::f64::consts::PI;
use std::fmt;

use glam::DVec2;

use crate::atomic::AtomicVec2;
use crate::error::{Error, Result};

/// A point mass in the 2-D gravity simulation.
///
/// A point has a position, a velocity vector, a mass and a density. Its
/// radius is derived as `sqrt(PI * mass / density)` and recomputed every
/// time mass or density change.
///
/// Kinematic state (position, velocity and the scratch acceleration filled
/// by [`Point::accumulate_attraction`]) sits in atomic cells so that the
/// worker owning this point can integrate it through a shared reference
/// while other workers read its position.
///
/// Equality is structural over position, velocity, mass and density and
/// uses exact float comparison.
pub struct Point {
    position: AtomicVec2,
    velocity: AtomicVec2,
    acceleration: AtomicVec2,
    mass: f64,
    density: f64,
    radius: f64,
}

fn check_mass(mass: f64) -> Result<()> {
    if mass > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("mass must be > 0, got {mass}")))
    }
}

fn check_density(density: f64) -> Result<()> {
    if density > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "density must be > 0, got {density}"
        )))
    }
}

#[inline]
fn radius_for(mass: f64, density: f64) -> f64 {
    (PI * mass / density).sqrt()
}

impl Point {
    /// Creates a new point.
    ///
    /// ### Parameters
    /// - `x`, `y` - Position.
    /// - `vel_x`, `vel_y` - Velocity, in distance units per step.
    /// - `mass` - Mass, must be `> 0`.
    /// - `density` - Density, must be `> 0`.
    ///
    /// ### Returns
    /// - `Ok(Point)` with its radius computed.
    /// - `Err(Error::InvalidParameter)` if `mass` or `density` is not
    ///   strictly positive (NaN included).
    pub fn new(x: f64, y: f64, vel_x: f64, vel_y: f64, mass: f64, density: f64) -> Result<Self> {
        Self::from_vectors(DVec2::new(x, y), DVec2::new(vel_x, vel_y), mass, density)
    }

    /// Same as [`Point::new`], taking position and velocity as vectors.
    pub fn from_vectors(position: DVec2, velocity: DVec2, mass: f64, density: f64) -> Result<Self> {
        check_mass(mass)?;
        check_density(density)?;
        Ok(Self::from_parts(position, velocity, mass, density))
    }

    /// Builds a point from values already known to be valid.
    fn from_parts(position: DVec2, velocity: DVec2, mass: f64, density: f64) -> Self {
        Self {
            position: AtomicVec2::new(position),
            velocity: AtomicVec2::new(velocity),
            acceleration: AtomicVec2::default(),
            mass,
            density,
            radius: radius_for(mass, density),
        }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.position.load().x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position.load().y
    }

    #[inline]
    pub fn position(&self) -> DVec2 {
        self.position.load()
    }

    #[inline]
    pub fn vel_x(&self) -> f64 {
        self.velocity.load().x
    }

    #[inline]
    pub fn vel_y(&self) -> f64 {
        self.velocity.load().y
    }

    #[inline]
    pub fn velocity(&self) -> DVec2 {
        self.velocity.load()
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Radius derived from mass and density: `sqrt(PI * mass / density)`.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Acceleration accumulated by the last [`Point::accumulate_attraction`].
    ///
    /// Only meaningful between the calculate and apply phases of a step.
    #[inline]
    pub fn acceleration(&self) -> DVec2 {
        self.acceleration.load()
    }

    pub fn set_position(&mut self, position: DVec2) {
        self.position.set(position);
    }

    pub fn set_velocity(&mut self, velocity: DVec2) {
        self.velocity.set(velocity);
    }

    /// Sets the mass and recomputes the radius.
    ///
    /// Errors with `InvalidParameter` (leaving the point untouched) if
    /// `mass` is not strictly positive.
    pub fn set_mass(&mut self, mass: f64) -> Result<()> {
        check_mass(mass)?;
        self.mass = mass;
        self.radius = radius_for(self.mass, self.density);
        Ok(())
    }

    /// Sets the density and recomputes the radius.
    ///
    /// Errors with `InvalidParameter` (leaving the point untouched) if
    /// `density` is not strictly positive.
    pub fn set_density(&mut self, density: f64) -> Result<()> {
        check_density(density)?;
        self.density = density;
        self.radius = radius_for(self.mass, self.density);
        Ok(())
    }

    /// Computes how much every other point attracts this one and stores
    /// the result in this point's scratch acceleration.
    ///
    /// For each point `p` other than `self` (compared by address):
    /// `acc += p.mass * d / |d|^3` with `d = p.pos - self.pos`. The sum is
    /// scaled by `g` once at the end.
    ///
    /// Two distinct points at exactly the same position divide by zero and
    /// produce non-finite values. Collision merging normally removes such
    /// overlaps before this runs, so the case is left unguarded.
    ///
    /// ### Parameters
    /// - `points` - The full point set, `self` may be part of it.
    /// - `g` - Gravitational constant.
    pub fn accumulate_attraction<'a, I>(&self, points: I, g: f64)
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let pos = self.position.load();
        let mut acc = DVec2::ZERO;
        for p in points {
            if std::ptr::eq(p, self) {
                continue;
            }
            let diff = p.position.load() - pos;
            let distance = diff.length();
            let distance3 = distance * distance * distance;
            acc += diff * p.mass / distance3;
        }
        self.acceleration.store(acc * g);
    }

    /// Applies the accumulated acceleration with one forward Euler step:
    /// `vel += acc; pos += vel`.
    pub fn apply_attraction(&self) {
        let vel = self.velocity.load() + self.acceleration.load();
        self.velocity.store(vel);
        self.position.store(self.position.load() + vel);
    }

    /// Returns `true` if the two discs overlap or touch.
    ///
    /// Only overlap at the sampled instant is detected: small, fast points
    /// can pass through each other between two steps.
    pub fn overlaps(&self, other: &Point) -> bool {
        let rads = self.radius + other.radius;
        self.position.load().distance_squared(other.position.load()) <= rads * rads
    }

    /// Returns `true` if `at` lies inside (or on the edge of) this point's disc.
    pub fn contains(&self, at: DVec2) -> bool {
        self.position.load().distance(at) <= self.radius
    }

    /// Inelastically merges a group of points into a single value.
    ///
    /// The result carries the total mass of the group; position, velocity
    /// and density are mass-weighted averages with weights
    /// `member.mass / total_mass`.
    ///
    /// ### Returns
    /// `None` if `members` is empty.
    pub fn merge_group(members: &[&Point]) -> Option<Point> {
        if members.is_empty() {
            return None;
        }
        let total_mass: f64 = members.iter().map(|p| p.mass).sum();
        let mut position = DVec2::ZERO;
        let mut velocity = DVec2::ZERO;
        let mut density = 0.0;
        for p in members {
            let f = p.mass / total_mass;
            position += p.position.load() * f;
            velocity += p.velocity.load() * f;
            density += p.density * f;
        }
        Some(Self::from_parts(position, velocity, total_mass, density))
    }
}

impl Default for Point {
    /// A unit point at rest at the origin: mass 1, density 1.
    fn default() -> Self {
        Self::from_parts(DVec2::ZERO, DVec2::ZERO, 1.0, 1.0)
    }
}

impl Clone for Point {
    /// Copies position, velocity, mass and density. The scratch
    /// acceleration starts from zero on the copy.
    fn clone(&self) -> Self {
        Self::from_parts(self.position(), self.velocity(), self.mass, self.density)
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.position() == other.position()
            && self.velocity() == other.velocity()
            && self.mass == other.mass
            && self.density == other.density
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("position", &self.position())
            .field("velocity", &self.velocity())
            .field("mass", &self.mass)
            .field("density", &self.density)
            .field("radius", &self.radius)
            .finish()
    }
}
