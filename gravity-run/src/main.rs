//! Headless driver for the gravity simulation.
//!
//! Seeds a star system (or loads a saved simulation), runs the engine for
//! a fixed wall-clock time while logging telemetry once per second, then
//! optionally saves the final state.
//!
//! ```text
//! gravity-run [POINTS] [SECONDS] [--load PATH] [--save PATH] [--seed N]
//! ```
//!
//! Verbosity follows `RUST_LOG` (default `info`).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gravity_core::{Config, Error, Point, PointId, Result, Simulation, SimulationListener, scene};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

/// Command-line options.
#[derive(Clone, Debug, PartialEq)]
struct Args {
    points: usize,
    run_for: Duration,
    load: Option<PathBuf>,
    save: Option<PathBuf>,
    seed: Option<u64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            points: 500,
            run_for: Duration::from_secs(10),
            load: None,
            save: None,
            seed: None,
        }
    }
}

fn bad_arg(msg: impl Into<String>) -> Error {
    Error::InvalidParameter(msg.into())
}

/// Parses the arguments that follow the program name.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args::default();
    let mut positional = 0;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--load" | "--save" | "--seed" => {
                let value = iter
                    .next()
                    .ok_or_else(|| bad_arg(format!("{arg} needs a value")))?;
                match arg.as_str() {
                    "--load" => parsed.load = Some(value.into()),
                    "--save" => parsed.save = Some(value.into()),
                    _ => {
                        parsed.seed = Some(
                            value
                                .parse()
                                .map_err(|_| bad_arg(format!("bad seed: {value}")))?,
                        )
                    }
                }
            }
            flag if flag.starts_with("--") => return Err(bad_arg(format!("unknown flag {flag}"))),
            value => {
                match positional {
                    0 => {
                        parsed.points = value
                            .parse()
                            .map_err(|_| bad_arg(format!("bad point count: {value}")))?
                    }
                    1 => {
                        parsed.run_for = value
                            .parse::<f64>()
                            .ok()
                            .and_then(|s| Duration::try_from_secs_f64(s).ok())
                            .ok_or_else(|| bad_arg(format!("bad duration: {value}")))?
                    }
                    _ => return Err(bad_arg(format!("unexpected argument {value}"))),
                }
                positional += 1;
            }
        }
    }
    Ok(parsed)
}

/// Logs merges at debug level.
struct MergeLog;

impl SimulationListener for MergeLog {
    fn on_point_destroyed(&self, id: PointId, point: &Point) {
        debug!("{id} (mass {:.2}) left the simulation", point.mass());
    }
}

fn initial_points(args: &Args, config: &Config) -> Result<Vec<Point>> {
    if let Some(path) = &args.load {
        let mut reader = BufReader::new(File::open(path)?);
        let points = gravity_core::snapshot::read_state(&mut reader)?;
        info!("loaded {} points from {}", points.len(), path.display());
        return Ok(points);
    }
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    scene::star_system(args.points, 5000.0, 100.0, 1500.0, 1.0, config.gravity, &mut rng)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config {
        seed: args.seed,
        ..Config::default()
    };

    let sim = Simulation::start(config, Arc::new(MergeLog))?;
    let handle = sim.handle().clone();
    handle.load_state(initial_points(&args, &config)?);

    let run_for = args.run_for;
    let start = Instant::now();
    while start.elapsed() < run_for {
        thread::sleep(Duration::from_secs(1).min(run_for.saturating_sub(start.elapsed())));
        info!(
            "{} points | {} workers | {:.0} SPS",
            handle.point_count(),
            handle.worker_count(),
            handle.steps_per_second()
        );
    }

    handle.set_paused(true);
    if let Some(path) = &args.save {
        let mut writer = BufWriter::new(File::create(path)?);
        handle.save_to(&mut writer)?;
        writer.flush()?;
        info!("saved {} points to {}", handle.point_count(), path.display());
    }
    sim.join()
}
