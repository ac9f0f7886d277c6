//! Generators for initial point sets.
//!
//! These build plain `Vec<Point>`s; feed them to
//! [`crate::engine::SimulationHandle::add_point`] or
//! [`crate::engine::SimulationHandle::load_state`].

use std::f64::consts::TAU;

use glam::DVec2;
use rand::Rng;

use crate::{
    error::{Error, Result},
    point::Point,
};

/// Body presets with their densities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Planet,
    Star,
    Asteroid,
}

impl BodyKind {
    pub fn density(self) -> f64 {
        match self {
            BodyKind::Planet | BodyKind::Asteroid => 1.0,
            BodyKind::Star => 10.0,
        }
    }

    /// Creates a body of this kind.
    pub fn create(self, position: DVec2, velocity: DVec2, mass: f64) -> Result<Point> {
        Point::from_vectors(position, velocity, mass, self.density())
    }
}

/// One asteroid scattered around `center`.
///
/// The position is jittered by up to 32 units on each axis and the mass is
/// `density * (r + 0.2)` with `r` uniform in `[0, 1)`.
pub fn asteroid(center: DVec2, velocity: DVec2, rng: &mut impl Rng) -> Result<Point> {
    let density = BodyKind::Asteroid.density();
    let jitter = DVec2::new(rng.random_range(-32.0..32.0), rng.random_range(-32.0..32.0));
    let mass = density * (rng.random::<f64>() + 0.2);
    Point::from_vectors(center + jitter, velocity, mass, density)
}

fn check_mass_range(min_mass: f64, max_mass: f64) -> Result<()> {
    if min_mass > 0.0 && max_mass >= min_mass && max_mass.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "mass range must satisfy 0 < min <= max, got {min_mass}..={max_mass}"
        )))
    }
}

fn check_half_range(half_range: f64) -> Result<()> {
    if half_range >= 0.0 && half_range.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "half range must be finite and non-negative, got {half_range}"
        )))
    }
}

/// `count` planets at rest, uniformly spread over a square.
///
/// ### Parameters
/// - `half_range` - Half the side length of the square centred on the origin.
///   Must be finite and `>= 0`.
/// - `min_mass`, `max_mass` - Inclusive mass range, `0 < min <= max`.
pub fn random_in_square(
    count: usize,
    half_range: f64,
    min_mass: f64,
    max_mass: f64,
    rng: &mut impl Rng,
) -> Result<Vec<Point>> {
    check_half_range(half_range)?;
    check_mass_range(min_mass, max_mass)?;
    (0..count)
        .map(|_| {
            let x = rng.random_range(-half_range..=half_range);
            let y = rng.random_range(-half_range..=half_range);
            let mass = rng.random_range(min_mass..=max_mass);
            BodyKind::Planet.create(DVec2::new(x, y), DVec2::ZERO, mass)
        })
        .collect()
}

/// A star at the origin with `count` planets on circular orbits around it.
///
/// Planets are spread uniformly over the annulus between `inner` and
/// `outer`, all orbiting counter-clockwise with speed `sqrt(g * M / r)`.
/// Mutual attraction between planets is ignored when picking the speeds.
///
/// ### Returns
/// The star first, then the planets.
pub fn star_system(
    count: usize,
    star_mass: f64,
    inner: f64,
    outer: f64,
    planet_mass: f64,
    g: f64,
    rng: &mut impl Rng,
) -> Result<Vec<Point>> {
    if !(inner > 0.0 && outer >= inner && outer.is_finite()) {
        return Err(Error::InvalidParameter(format!(
            "orbit band must satisfy 0 < inner <= outer, got {inner}..{outer}"
        )));
    }
    let mut points = Vec::with_capacity(count + 1);
    points.push(BodyKind::Star.create(DVec2::ZERO, DVec2::ZERO, star_mass)?);
    for _ in 0..count {
        // sqrt keeps the density uniform over the annulus.
        let t: f64 = rng.random();
        let r = (inner * inner + t * (outer * outer - inner * inner)).sqrt();
        let angle = rng.random_range(0.0..TAU);
        let dir = DVec2::from_angle(angle);
        let speed = (g * star_mass / r).abs().sqrt();
        points.push(BodyKind::Planet.create(dir * r, dir.perp() * speed, planet_mass)?);
    }
    Ok(points)
}
