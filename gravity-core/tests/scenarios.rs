use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use gravity_core::{
    Config, Engine, Error, Point, PointId, Simulation, SimulationListener, scene,
};
use rand::{SeedableRng, rngs::StdRng};

fn config(workers: usize) -> Config {
    Config {
        workers: Some(workers),
        max_steps_per_second: None,
        seed: Some(42),
        ..Config::default()
    }
}

#[derive(Default)]
struct Recorder {
    steps: AtomicUsize,
    destroyed: AtomicUsize,
}

impl SimulationListener for Recorder {
    fn on_step_complete(&self, _elapsed: Duration) {
        self.steps.fetch_add(1, Ordering::SeqCst);
    }

    fn on_point_destroyed(&self, _id: PointId, _point: &Point) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Two equal masses at rest start falling toward each other.
#[test]
fn two_bodies_attract_symmetrically() -> gravity_core::Result<()> {
    let mut engine = Engine::with_config(config(2))?;
    let handle = engine.handle();
    let left = handle.add_point(Point::new(0.0, 0.0, 0.0, 0.0, 10.0, 1.0)?);
    let right = handle.add_point(Point::new(100.0, 0.0, 0.0, 0.0, 10.0, 1.0)?);

    engine.step()?;

    let snapshot = handle.points_snapshot();
    assert_eq!(snapshot.len(), 2);
    let (id_a, a) = &snapshot[0];
    let (id_b, b) = &snapshot[1];
    assert_eq!((*id_a, *id_b), (left, right));

    // G * m / d^2 = 0.15 * 10 / 100^2
    let expected = 1.5e-4;
    assert_relative_eq!(a.vel_x(), expected, max_relative = 1e-12);
    assert_relative_eq!(b.vel_x(), -expected, max_relative = 1e-12);
    assert_eq!(a.vel_y(), 0.0);
    assert_eq!(b.vel_y(), 0.0);
    assert_relative_eq!(a.x(), expected, max_relative = 1e-12);
    assert_relative_eq!(b.x(), 100.0 - expected, max_relative = 1e-12);
    Ok(())
}

/// Two coincident points merge into one carrying the summed mass.
#[test]
fn coincident_points_merge() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let mut engine = Engine::new(config(2), recorder.clone())?;
    let handle = engine.handle();
    handle.add_point(Point::new(5.0, 5.0, 1.0, 0.0, 2.0, 1.0)?);
    handle.add_point(Point::new(5.0, 5.0, -1.0, 0.0, 3.0, 1.0)?);

    let report = engine.step()?;
    assert_eq!(report.merged_groups, 1);
    assert_eq!(report.destroyed, 1);

    let points = handle.save_state();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].mass(), 5.0);
    // Momentum: (2 * 1 + 3 * -1) / 5
    assert_relative_eq!(points[0].vel_x(), -0.2, epsilon = 1e-12);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 1);
    Ok(())
}

/// A-B and B-C touch while A-C do not; all three end up in one body that
/// keeps the heaviest member's id.
#[test]
fn chained_overlaps_merge_transitively() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let mut engine = Engine::new(config(3), recorder.clone())?;
    let handle = engine.handle();
    // radius = sqrt(PI) ~ 1.77, so neighbours 3 apart overlap.
    handle.add_point(Point::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0)?);
    let heavy = handle.add_point(Point::new(3.0, 0.0, 0.0, 0.0, 1.5, 1.5)?);
    handle.add_point(Point::new(6.0, 0.0, 0.0, 0.0, 1.0, 1.0)?);
    handle.add_point(Point::new(500.0, 0.0, 0.0, 0.0, 1.0, 1.0)?);

    let report = engine.step()?;
    assert_eq!(report.merged_groups, 1);
    assert_eq!(report.destroyed, 2);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 2);

    let snapshot = handle.points_snapshot();
    assert_eq!(snapshot.len(), 2);
    // The survivor moved to the back of the global order.
    let (id, merged) = &snapshot[1];
    assert_eq!(*id, heavy);
    assert_relative_eq!(merged.mass(), 3.5, epsilon = 1e-12);
    Ok(())
}

/// Add five, remove two: three remain after one step.
#[test]
fn queued_add_and_remove() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let mut engine = Engine::new(config(2), recorder.clone())?;
    let handle = engine.handle();
    let ids: Vec<PointId> = (0..5)
        .map(|i| Point::new(i as f64 * 100.0, 0.0, 0.0, 0.0, 1.0, 1.0).map(|p| handle.add_point(p)))
        .collect::<gravity_core::Result<_>>()?;
    handle.remove_point(ids[1]);
    handle.remove_point(ids[3]);

    engine.step()?;

    let remaining: Vec<PointId> = handle.points_snapshot().into_iter().map(|(id, _)| id).collect();
    assert_eq!(remaining, vec![ids[0], ids[2], ids[4]]);
    assert_eq!(handle.point_count(), 3);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 2);
    Ok(())
}

/// Zero mass is rejected before anything reaches the engine.
#[test]
fn zero_mass_is_rejected() -> gravity_core::Result<()> {
    let mut engine = Engine::with_config(config(1))?;
    let handle = engine.handle();

    let err = Point::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));

    engine.step()?;
    assert!(handle.points_snapshot().is_empty());
    Ok(())
}

/// Mass survives any number of merges, and every point that disappears is
/// reported exactly once.
#[test]
fn crowded_scene_conserves_mass() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let mut engine = Engine::new(config(4), recorder.clone())?;
    let handle = engine.handle();

    let mut rng = StdRng::seed_from_u64(9);
    let points = scene::random_in_square(80, 40.0, 0.5, 2.0, &mut rng)?;
    let total: f64 = points.iter().map(Point::mass).sum();
    handle.load_state(points);

    for _ in 0..30 {
        engine.step()?;
    }

    let after = handle.save_state();
    let after_total: f64 = after.iter().map(Point::mass).sum();
    assert!(after.len() < 80, "expected some merges in a crowded square");
    assert_relative_eq!(after_total, total, max_relative = 1e-9);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst) + after.len(), 80);
    assert_eq!(recorder.steps.load(Ordering::SeqCst), 30);
    Ok(())
}

/// After rebalancing, per-worker loads differ by at most one.
#[test]
fn rebalanced_loads_are_even() -> gravity_core::Result<()> {
    let cfg = Config {
        rebalance_min_points: 2,
        ..config(4)
    };
    let mut engine = Engine::with_config(cfg)?;
    let handle = engine.handle();
    for i in 0..23 {
        handle.add_point(Point::new(i as f64 * 50.0, 0.0, 0.0, 0.0, 1.0, 1.0)?);
    }

    assert!(engine.step()?.rebalanced);

    let loads = engine.worker_loads()?;
    assert_eq!(loads.iter().sum::<usize>(), 23);
    let spread = loads.iter().max().unwrap() - loads.iter().min().unwrap();
    assert!(spread <= 1, "loads {loads:?}");
    Ok(())
}

/// The threaded runner keeps stepping until stopped, and joins its workers.
#[test]
fn simulation_thread_stops_on_request() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let cfg = Config {
        max_steps_per_second: Some(1000),
        ..config(2)
    };
    let sim = Simulation::start(cfg, recorder.clone())?;
    let handle = sim.handle().clone();
    // Far enough apart that they cannot meet before the stop.
    handle.add_point(Point::new(0.0, 0.0, 0.0, 0.0, 10.0, 1.0)?);
    handle.add_point(Point::new(0.0, 400.0, 0.0, 0.0, 10.0, 1.0)?);

    while recorder.steps.load(Ordering::SeqCst) < 10 {
        thread::sleep(Duration::from_millis(1));
    }

    handle.set_paused(true);
    assert!(handle.is_paused());
    handle.request_stop();
    handle.wait_stopped();
    sim.join()?;

    assert!(handle.is_stopped());
    assert_eq!(handle.point_count(), 2);
    Ok(())
}

/// Snapshots taken from another thread while the master steps never see a
/// half-applied merge: ids are unique and the total mass never changes.
#[test]
fn client_reads_stay_consistent_while_running() -> gravity_core::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let sim = Simulation::start(config(4), recorder.clone())?;
    let handle = sim.handle().clone();

    let mut rng = StdRng::seed_from_u64(21);
    let points = scene::random_in_square(80, 40.0, 0.5, 2.0, &mut rng)?;
    let total: f64 = points.iter().map(Point::mass).sum();
    handle.load_state(points);

    while recorder.steps.load(Ordering::SeqCst) < 1 {
        thread::sleep(Duration::from_millis(1));
    }

    let reader = {
        let handle = handle.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let snapshot = handle.points_snapshot();
                assert!(!snapshot.is_empty() && snapshot.len() <= 80);
                let ids: HashSet<PointId> = snapshot.iter().map(|(id, _)| *id).collect();
                assert_eq!(ids.len(), snapshot.len());
                let mass: f64 = snapshot.iter().map(|(_, p)| p.mass()).sum();
                assert_relative_eq!(mass, total, max_relative = 1e-9);

                let saved = handle.save_state();
                let mass: f64 = saved.iter().map(Point::mass).sum();
                assert_relative_eq!(mass, total, max_relative = 1e-9);
            }
        })
    };
    let reads = reader.join();

    handle.request_stop();
    sim.join()?;
    assert!(reads.is_ok(), "reader thread saw an inconsistent snapshot");
    assert!(recorder.steps.load(Ordering::SeqCst) >= 1);
    Ok(())
}
