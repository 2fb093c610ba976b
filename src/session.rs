//! The running visualizer state.
//!
//! A [`Session`] owns everything the core mutates: the active config, the
//! iteration state, the point accumulator with its baked batches, the step
//! clock and the cube meshes. Once per frame the host calls
//! [`Session::apply`] for each input command and then [`Session::update`],
//! which runs the due steps and bakes whenever the live buffer grows past
//! the threshold. Rendering only reads from the session (see
//! [`crate::compose`]).
//!
//! Every generated point is accounted for at all times:
//! `iterations == live points + points in batches`.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::batch::{bake_vertices, Accumulator, Batch, BatchSink};
use crate::clock::StepClock;
use crate::config::{ActiveConfig, ConfigSource, RuntimeConfig};
use crate::error::{BakeError, ConfigError};
use crate::geometry::{MeshCache, Point3, SceneMeshes};
use crate::iterator::{IterationState, Mode, RandomTargets, TargetSource};

/// Smallest attractor count chosen by [`Command::RandomizeAttractors`].
pub const RANDOM_ATTRACTORS_MIN: usize = 3;
/// Largest attractor count chosen by [`Command::RandomizeAttractors`].
pub const RANDOM_ATTRACTORS_MAX: usize = 10;

/// Discrete, edge-triggered user commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Drop all points and batches, return to the start, stop running.
    Reset,
    /// Load the config again and swap it in.
    ReloadConfig,
    ToggleRunning,
    ToggleSpin,
    ResetRotationAngle,
    /// One step; ignored while running.
    ManualStep,
    /// Replace the attractors with 3 to 10 random points in the unit cube.
    RandomizeAttractors,
}

/// What happened during one [`Session::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Steps executed.
    pub steps: u64,
    /// Batches created.
    pub bakes: usize,
    /// Set when a bake failed and the session paused itself.
    pub stalled: Option<BakeError>,
}

/// The core simulation state, generic over the renderer's batch handle.
pub struct Session<H> {
    config: ActiveConfig,
    state: IterationState,
    points: Accumulator<Point3, H>,
    clock: StepClock,
    targets: Box<dyn TargetSource + Send>,
    rng: StdRng,
    mesh_cache: MeshCache,
    meshes: SceneMeshes,
}

impl<H> Session<H> {
    /// A session picking targets with an RNG seeded from `config.seed`.
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let targets = RandomTargets::from_seed(config.seed);
        Self::with_targets(config, targets)
    }

    /// A session with an explicit target source.
    ///
    /// Fails if `config` does not pass [`RuntimeConfig::validate`].
    pub fn with_targets(
        config: RuntimeConfig,
        targets: impl TargetSource + Send + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let mut mesh_cache = MeshCache::new();
        let meshes = SceneMeshes::new(&mut mesh_cache, config.point_color);

        log::info!(
            "session started: {} attractors, {}/s, fraction {}, bake threshold {}",
            config.attractors.len(),
            config.iterations_per_second,
            config.movement_fraction,
            config.batch_threshold
        );

        Ok(Self {
            state: IterationState::new(config.start),
            points: Accumulator::new(config.batch_threshold),
            clock: StepClock::new(),
            targets: Box::new(targets),
            rng,
            mesh_cache,
            meshes,
            config: ActiveConfig::new(config),
        })
    }

    // ========== Queries ==========

    pub fn config(&self) -> &RuntimeConfig {
        self.config.get()
    }

    /// Increases every time a config is swapped in.
    pub fn config_version(&self) -> u64 {
        self.config.version()
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_spinning(&self) -> bool {
        self.state.spinning
    }

    pub fn current(&self) -> Point3 {
        self.state.current
    }

    pub fn iterations(&self) -> u64 {
        self.state.iterations
    }

    pub fn angle(&self) -> f32 {
        self.state.angle
    }

    pub fn live_points(&self) -> &[Point3] {
        self.points.live()
    }

    pub fn batches(&self) -> &[Batch<H>] {
        self.points.batches()
    }

    pub fn baked_points(&self) -> usize {
        self.points.baked_len()
    }

    pub fn meshes(&self) -> &SceneMeshes {
        &self.meshes
    }

    /// Whether every generated point is either live or baked.
    pub fn is_balanced(&self) -> bool {
        self.points.total_len() as u64 == self.state.iterations
    }

    // ========== Commands ==========

    /// Handle one input command.
    ///
    /// Reload pulls a fresh config from `configs`; an invalid one is logged
    /// and the current config stays active.
    pub fn apply<S>(&mut self, command: Command, sink: &mut S, configs: &dyn ConfigSource)
    where
        S: BatchSink<Handle = H>,
    {
        match command {
            Command::Reset => self.reset(sink),
            Command::ReloadConfig => {
                if let Err(e) = configs.load().and_then(|config| self.replace_config(config)) {
                    log::warn!("config reload rejected, keeping current config: {}", e);
                }
            }
            Command::ToggleRunning => self.set_running(!self.state.running),
            Command::ToggleSpin => self.state.spinning = !self.state.spinning,
            Command::ResetRotationAngle => self.state.angle = 0.0,
            Command::ManualStep => {
                if self.state.running {
                    log::debug!("manual step ignored while running");
                } else {
                    self.step_and_bake(sink);
                }
            }
            Command::RandomizeAttractors => self.randomize_attractors(),
        }
        debug_assert!(self.is_balanced(), "point count out of sync after {:?}", command);
    }

    /// Start or stop the step clock.
    pub fn set_running(&mut self, running: bool) {
        if running && !self.state.running {
            self.clock.reset();
        }
        self.state.running = running;
    }

    /// Drop every point and batch and return to the configured start.
    ///
    /// This is the only path that disposes batches.
    pub fn reset<S>(&mut self, sink: &mut S)
    where
        S: BatchSink<Handle = H>,
    {
        let batches = self.points.clear();
        let disposed = batches.len();
        for batch in batches {
            sink.dispose_batch(batch.into_handle());
        }
        self.state.reset(self.config.get().start);
        self.clock.reset();
        log::info!("reset: disposed {} batches", disposed);
    }

    /// Swap in a new config wholesale.
    ///
    /// The current position moves to the new start; points, batches and the
    /// iteration count are kept. Existing batches keep the color and size
    /// they were baked with. An invalid config is returned as an error and
    /// nothing changes.
    pub fn replace_config(&mut self, config: RuntimeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.points.set_threshold(config.batch_threshold);
        self.meshes = SceneMeshes::new(&mut self.mesh_cache, config.point_color);
        self.state.current = config.start;
        if let Some(seed) = config.seed {
            self.targets = Box::new(RandomTargets::seeded(seed));
        }
        self.config.replace(config);
        log::info!(
            "config v{} active: {} attractors, {}/s",
            self.config.version(),
            self.config.get().attractors.len(),
            self.config.get().iterations_per_second
        );
        Ok(())
    }

    /// Replace the attractors with a random set inside the unit cube.
    ///
    /// Iteration count, current position, points and batches are untouched.
    pub fn randomize_attractors(&mut self) {
        let count = self.rng.gen_range(RANDOM_ATTRACTORS_MIN..=RANDOM_ATTRACTORS_MAX);
        let attractors: Vec<Point3> = (0..count)
            .map(|_| Point3::new(self.rng.gen(), self.rng.gen(), self.rng.gen()))
            .collect();
        match self.config.get().with_attractors(attractors) {
            Ok(next) => {
                self.config.replace(next);
                log::info!("randomized attractors: {} targets", count);
            }
            Err(e) => log::warn!("random attractors rejected: {}", e),
        }
    }

    // ========== Stepping ==========

    /// One step without any bake check.
    pub fn step(&mut self) -> Point3 {
        let visited = self.state.step(self.config.get(), self.targets.as_mut());
        self.points.push(visited);
        visited
    }

    /// Advance one frame: spin, run the steps the clock says are due, and
    /// bake whenever the live buffer passes the threshold.
    ///
    /// A failed bake pauses the session and stops the remaining steps of
    /// this frame; the live points are kept.
    pub fn update<S>(&mut self, elapsed: Duration, sink: &mut S) -> TickReport
    where
        S: BatchSink<Handle = H>,
    {
        let mut report = TickReport::default();

        if self.state.spinning {
            self.state.angle += self.config.get().rotation_speed * elapsed.as_secs_f32();
        }

        if self.state.running {
            let (rate, cap) = {
                let config = self.config.get();
                (config.iterations_per_second, config.max_steps_per_frame)
            };
            let due = self.clock.advance(elapsed, rate, cap);
            for _ in 0..due {
                self.step();
                report.steps += 1;
                match self.bake_if_due(sink) {
                    Ok(true) => report.bakes += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.stalled = Some(e);
                        break;
                    }
                }
            }
        }

        debug_assert!(self.is_balanced(), "point count out of sync after update");
        report
    }

    fn step_and_bake<S>(&mut self, sink: &mut S)
    where
        S: BatchSink<Handle = H>,
    {
        self.step();
        // Failure is already logged and has paused the session.
        let _ = self.bake_if_due(sink);
    }

    /// Bake when the live buffer is past the threshold. Returns whether a
    /// batch was created.
    fn bake_if_due<S>(&mut self, sink: &mut S) -> Result<bool, BakeError>
    where
        S: BatchSink<Handle = H>,
    {
        if !self.points.should_flush() {
            return Ok(false);
        }
        match self.bake(sink) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!(
                    "bake of {} points failed, pausing: {}",
                    self.points.live_len(),
                    e
                );
                self.set_running(false);
                Err(e)
            }
        }
    }

    /// Freeze every live point into a new batch right away.
    pub fn bake<S>(&mut self, sink: &mut S) -> Result<(), BakeError>
    where
        S: BatchSink<Handle = H>,
    {
        let mesh = &self.meshes.point;
        let point_size = self.config.get().point_size;
        let baked = self.points.flush_with(|live| {
            let vertices = bake_vertices(live, mesh, point_size);
            sink.create_batch(&vertices)
        })?;
        if let Some(batch) = baked {
            log::debug!("baked {} points", batch.len());
        }
        Ok(())
    }
}
