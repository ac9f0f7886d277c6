//! Multithreaded 2-D N-body gravity simulation library.
//!
//! Main components:
//! - [`point`] - point masses and the physics primitives acting on them.
//! - [`arena`] - the engine-wide point collection and its global order.
//! - [`phases`] - the three per-step kernels run by worker units.
//! - [`worker`] - worker units, the worker pool and the phase barrier.
//! - [`collision`] - grouping of collision reports into merges.
//! - [`balance`] - redistribution of points across workers.
//! - [`engine`] - the master loop and the client handle.
//! - [`snapshot`] - binary persistence of points and saved simulations.
//! - [`scene`] - generators for initial point sets.
//! - [`config`] - engine configuration.
//! - [`listener`] - step and destruction notifications.
//! - [`error`] - the crate-wide error type.
//! - [`types`] - shared type aliases and ids.

mod atomic;

pub mod arena;
pub mod balance;
pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod phases;
pub mod point;
pub mod scene;
pub mod snapshot;
pub mod types;
pub mod worker;

pub use config::{Config, G};
pub use engine::{Engine, Simulation, SimulationHandle, StepReport};
pub use error::{Error, Result};
pub use listener::{NoopListener, SimulationListener};
pub use point::Point;
pub use types::PointId;
