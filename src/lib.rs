//! # Chaos Cubes
//!
//! A real-time 3D chaos-game viewer. A point starts somewhere in the unit
//! cube and repeatedly jumps a fixed fraction of the way toward a randomly
//! chosen attractor; every visited position is drawn as a small cube, and
//! the attractor's fractal takes shape as the points pile up.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chaos_cubes::prelude::*;
//!
//! let config = RuntimeConfig::load("config.json")?;
//! let mut session: Session<HostBatch> = Session::new(config)?;
//! let mut sink = HostSink::new();
//!
//! session.set_running(true);
//! let report = session.update(Duration::from_millis(16), &mut sink);
//! assert!(session.is_balanced());
//! ```
//!
//! ## Core Concepts
//!
//! ### Points and batches
//!
//! Freshly generated points are kept individually and drawn one cube each.
//! Once more than `BatchThreshold` of them have piled up they are baked:
//! every cube is transformed into scene space on the CPU and the whole lot
//! is uploaded as one immutable vertex buffer, drawn with a single call
//! from then on. Only a reset releases batches.
//!
//! A bake that the device cannot hold pauses the simulation instead of
//! failing; the unbaked points stay put.
//!
//! ### Renderers
//!
//! The core never talks to the GPU directly. Baking goes through
//! [`BatchSink`], drawing through [`Canvas`]. [`gpu::GpuState`] implements
//! both for wgpu; [`HostSink`] keeps batches in memory for headless runs
//! and tests.
//!
//! ### Configuration
//!
//! Configs are JSON files (see [`config`]) validated as a whole on load.
//! A reload swaps in a new config version wholesale; an invalid file is
//! rejected and the running config stays.

pub mod batch;
pub mod clock;
pub mod compose;
pub mod config;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod input;
pub mod iterator;
pub mod session;
pub mod window;

pub use batch::{bake_vertices, Accumulator, Batch, BatchSink, HostBatch, HostSink};
pub use compose::{compose, scene_rotation, Canvas};
pub use config::{ActiveConfig, ConfigSource, FileSource, RuntimeConfig};
pub use error::{AppError, BakeError, ConfigError, GpuError};
pub use geometry::{build_cube, point_model, CubeMesh, CubeVertex, MeshCache, Point3, Rgb};
pub use iterator::{IterationState, Mode, RandomTargets, ScriptedTargets, TargetSource};
pub use session::{Command, Session, TickReport};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use chaos_cubes::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{BatchSink, HostBatch, HostSink};
    pub use crate::compose::{compose, Canvas};
    pub use crate::config::{ConfigSource, FileSource, RuntimeConfig};
    pub use crate::geometry::{Point3, Rgb};
    pub use crate::iterator::{Mode, RandomTargets, ScriptedTargets, TargetSource};
    pub use crate::session::{Command, Session, TickReport};
    pub use glam::{Mat4, Vec3};
    pub use std::time::Duration;
}
