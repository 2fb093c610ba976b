//! The chaos-game step.
//!
//! Each step picks one attractor uniformly at random and moves the current
//! position the configured fraction of the way toward it. The position the
//! step started from is the point that gets recorded.
//!
//! Target selection goes through [`TargetSource`] so a trajectory can be
//! replayed exactly: [`RandomTargets`] wraps a seedable RNG,
//! [`ScriptedTargets`] replays a fixed list of indices.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RuntimeConfig;
use crate::geometry::Point3;

/// Chooses which attractor the next step jumps toward.
pub trait TargetSource {
    /// An index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform random choice from a seedable generator.
#[derive(Debug, Clone)]
pub struct RandomTargets {
    rng: StdRng,
}

impl RandomTargets {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is set, otherwise from entropy.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }
}

impl TargetSource for RandomTargets {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed sequence of indices, wrapping around at the end.
///
/// Indices past the attractor count wrap modulo the count.
#[derive(Debug, Clone)]
pub struct ScriptedTargets {
    indices: Vec<usize>,
    cursor: usize,
}

impl ScriptedTargets {
    /// # Panics
    ///
    /// Panics if `indices` is empty.
    pub fn new(indices: Vec<usize>) -> Self {
        assert!(!indices.is_empty(), "ScriptedTargets needs at least one index");
        Self { indices, cursor: 0 }
    }
}

impl TargetSource for ScriptedTargets {
    fn pick(&mut self, len: usize) -> usize {
        let index = self.indices[self.cursor % self.indices.len()];
        self.cursor += 1;
        index % len
    }
}

/// Whether the clock drives steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Steps only on manual trigger.
    Idle,
    /// The step clock calls `step` at the configured rate.
    Running,
}

/// Mutable per-run state.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    /// Where the next step starts from.
    pub current: Point3,
    /// Steps taken since the last reset.
    pub iterations: u64,
    pub running: bool,
    /// Shared scene rotation about the Y axis, radians.
    pub angle: f32,
    pub spinning: bool,
}

impl IterationState {
    pub fn new(start: Point3) -> Self {
        Self {
            current: start,
            iterations: 0,
            running: false,
            angle: 0.0,
            spinning: false,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.running {
            Mode::Running
        } else {
            Mode::Idle
        }
    }

    /// Advance one step and return the pre-step position for recording.
    ///
    /// `config.attractors` must be non-empty; validation guarantees this for
    /// any config a session accepts.
    pub fn step(&mut self, config: &RuntimeConfig, targets: &mut dyn TargetSource) -> Point3 {
        let visited = self.current;
        let target = config.attractors[targets.pick(config.attractors.len())];
        self.current = visited + (target - visited) * config.movement_fraction;
        self.iterations += 1;
        visited
    }

    /// Back to the start position with the counter at zero, stopped and
    /// unrotated. The spin toggle is left as is.
    pub fn reset(&mut self, start: Point3) {
        self.current = start;
        self.iterations = 0;
        self.running = false;
        self.angle = 0.0;
    }
}
