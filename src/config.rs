//! Runtime configuration.
//!
//! A config is loaded from a JSON file, validated as a whole, and only then
//! handed to a running session. The session never reads fields from the
//! file again; a reload builds a new [`RuntimeConfig`] and swaps it in.
//!
//! # File format
//!
//! ```json
//! {
//!   "IterationsPerSecond": 2000,
//!   "MovementSpeed": 0.5,
//!   "PointSize": 1.0,
//!   "Color": "#FF8000",
//!   "Attractors": [
//!     { "X": 0.0, "Y": 0.0, "Z": 0.0 },
//!     { "X": 1.0, "Y": 0.0, "Z": 0.0 },
//!     { "X": 0.5, "Y": 1.0, "Z": 0.5 }
//!   ],
//!   "Start": { "X": 0.5, "Y": 0.5, "Z": 0.5 },
//!
//!   "BatchThreshold": 12500,
//!   "RotationSpeed": 0.9,
//!   "MaxStepsPerFrame": 100000,
//!   "Seed": 42
//! }
//! ```
//!
//! The last four keys are optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{Point3, Rgb};

/// Live points allowed before a bake.
pub const DEFAULT_BATCH_THRESHOLD: usize = 12_500;

/// 0.015 rad per frame at 60 frames per second.
pub const DEFAULT_ROTATION_SPEED: f32 = 0.9;

fn default_batch_threshold() -> usize {
    DEFAULT_BATCH_THRESHOLD
}

fn default_rotation_speed() -> f32 {
    DEFAULT_ROTATION_SPEED
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct Coords {
    x: f32,
    y: f32,
    z: f32,
}

impl From<Coords> for Point3 {
    fn from(c: Coords) -> Self {
        Point3::new(c.x, c.y, c.z)
    }
}

impl From<Point3> for Coords {
    fn from(p: Point3) -> Self {
        Coords {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

/// On-disk layout of a config file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct ConfigFile {
    iterations_per_second: i64,
    movement_speed: f32,
    point_size: f32,
    color: String,
    attractors: Vec<Coords>,
    start: Coords,
    #[serde(default = "default_batch_threshold")]
    batch_threshold: usize,
    #[serde(default = "default_rotation_speed")]
    rotation_speed: f32,
    #[serde(default)]
    max_steps_per_frame: Option<u64>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Validated runtime parameters.
///
/// Construct through [`RuntimeConfig::from_json_str`], [`RuntimeConfig::load`]
/// or [`RuntimeConfig::new`] followed by [`RuntimeConfig::validate`]; a
/// session only ever receives values that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Steps per second while running.
    pub iterations_per_second: u32,
    /// Fraction of the remaining distance covered per step, in (0, 1].
    pub movement_fraction: f32,
    /// Size multiplier for generated points.
    pub point_size: f32,
    /// Color of generated points.
    pub point_color: Rgb,
    /// Targets to jump toward. Never empty.
    pub attractors: Vec<Point3>,
    /// Position after a reset.
    pub start: Point3,
    /// Live points allowed before a bake.
    pub batch_threshold: usize,
    /// Spin speed in radians per second.
    pub rotation_speed: f32,
    /// Optional cap on steps executed in one frame.
    pub max_steps_per_frame: Option<u64>,
    /// Seed for the target picker; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl RuntimeConfig {
    /// Config with the given core values and defaults for the rest.
    pub fn new(
        iterations_per_second: u32,
        movement_fraction: f32,
        point_size: f32,
        point_color: Rgb,
        attractors: Vec<Point3>,
        start: Point3,
    ) -> Self {
        Self {
            iterations_per_second,
            movement_fraction,
            point_size,
            point_color,
            attractors,
            start,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            rotation_speed: DEFAULT_ROTATION_SPEED,
            max_steps_per_frame: None,
            seed: None,
        }
    }

    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_steps_per_frame(mut self, max: u64) -> Self {
        self.max_steps_per_frame = Some(max);
        self
    }

    pub fn with_rotation_speed(mut self, speed: f32) -> Self {
        self.rotation_speed = speed;
        self
    }

    /// A copy with a different attractor list, validated.
    pub fn with_attractors(&self, attractors: Vec<Point3>) -> Result<Self, ConfigError> {
        let next = Self {
            attractors,
            ..self.clone()
        };
        next.validate()?;
        Ok(next)
    }

    /// Check every field. Called on every load path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations_per_second == 0 {
            return Err(ConfigError::NonPositiveRate);
        }
        if !self.movement_fraction.is_finite() {
            return Err(ConfigError::NonFinite("MovementSpeed"));
        }
        if self.movement_fraction <= 0.0 || self.movement_fraction > 1.0 {
            return Err(ConfigError::FractionOutOfRange(self.movement_fraction));
        }
        if !self.point_size.is_finite() {
            return Err(ConfigError::NonFinite("PointSize"));
        }
        if self.point_size <= 0.0 {
            return Err(ConfigError::NonPositivePointSize(self.point_size));
        }
        if self.attractors.is_empty() {
            return Err(ConfigError::EmptyAttractors);
        }
        if !self.attractors.iter().all(|a| a.is_finite()) {
            return Err(ConfigError::NonFinite("Attractors"));
        }
        if !self.start.is_finite() {
            return Err(ConfigError::NonFinite("Start"));
        }
        if !self.rotation_speed.is_finite() {
            return Err(ConfigError::NonFinite("RotationSpeed"));
        }
        if self.rotation_speed < 0.0 {
            return Err(ConfigError::NegativeRotationSpeed(self.rotation_speed));
        }
        if self.batch_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.max_steps_per_frame == Some(0) {
            return Err(ConfigError::ZeroStepCap);
        }
        Ok(())
    }

    /// Parse and validate a config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let iterations_per_second = u32::try_from(file.iterations_per_second)
            .ok()
            .filter(|&rate| rate > 0)
            .ok_or(ConfigError::NonPositiveRate)?;

        let config = Self {
            iterations_per_second,
            movement_fraction: file.movement_speed,
            point_size: file.point_size,
            point_color: Rgb::from_hex(&file.color)?,
            attractors: file.attractors.into_iter().map(Point3::from).collect(),
            start: file.start.into(),
            batch_threshold: file.batch_threshold,
            rotation_speed: file.rotation_speed,
            max_steps_per_frame: file.max_steps_per_frame,
            seed: file.seed,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Serialize back to the file layout.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            iterations_per_second: self.iterations_per_second as i64,
            movement_speed: self.movement_fraction,
            point_size: self.point_size,
            color: format!(
                "#{:02X}{:02X}{:02X}",
                self.point_color.r, self.point_color.g, self.point_color.b
            ),
            attractors: self.attractors.iter().copied().map(Coords::from).collect(),
            start: self.start.into(),
            batch_threshold: self.batch_threshold,
            rotation_speed: self.rotation_speed,
            max_steps_per_frame: self.max_steps_per_frame,
            seed: self.seed,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

impl Default for RuntimeConfig {
    /// Sierpinski tetrahedron inside the unit cube.
    fn default() -> Self {
        Self::new(
            1000,
            0.5,
            1.0,
            Rgb::new(0xFF, 0x80, 0x00),
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 1.0),
            ],
            Point3::splat(0.5),
        )
    }
}

/// Somewhere a fresh config can be loaded from on reload.
pub trait ConfigSource {
    fn load(&self) -> Result<RuntimeConfig, ConfigError>;
}

/// A JSON config file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        RuntimeConfig::load(&self.path)
    }
}

/// A fixed in-memory config; reload yields the same value every time.
impl ConfigSource for RuntimeConfig {
    fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// The config a session is currently running with.
///
/// Replaced wholesale on reload; `version` increases with every swap so
/// callers can tell which config a batch or frame was produced under.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    version: u64,
    values: Arc<RuntimeConfig>,
}

impl ActiveConfig {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            version: 1,
            values: Arc::new(config),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self) -> &RuntimeConfig {
        &self.values
    }

    /// Swap in a new config, returning the previous one.
    pub fn replace(&mut self, config: RuntimeConfig) -> Arc<RuntimeConfig> {
        self.version += 1;
        std::mem::replace(&mut self.values, Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "IterationsPerSecond": 2000,
        "MovementSpeed": 0.5,
        "PointSize": 1.5,
        "Color": "#FF8000",
        "Attractors": [
            { "X": 0.0, "Y": 0.0, "Z": 0.0 },
            { "X": 1.0, "Y": 0.0, "Z": 0.0 },
            { "X": 0.5, "Y": 1.0, "Z": 0.5 }
        ],
        "Start": { "X": 0.25, "Y": 0.5, "Z": 0.75 }
    }"##;

    #[test]
    fn test_parse_sample() {
        let config = RuntimeConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.iterations_per_second, 2000);
        assert_eq!(config.movement_fraction, 0.5);
        assert_eq!(config.point_size, 1.5);
        assert_eq!(config.point_color, Rgb::new(255, 128, 0));
        assert_eq!(config.attractors.len(), 3);
        assert_eq!(config.attractors[2], Point3::new(0.5, 1.0, 0.5));
        assert_eq!(config.start, Point3::new(0.25, 0.5, 0.75));
        assert_eq!(config.batch_threshold, DEFAULT_BATCH_THRESHOLD);
        assert_eq!(config.max_steps_per_frame, None);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_optional_keys() {
        let text = SAMPLE.replacen(
            "\"PointSize\"",
            "\"BatchThreshold\": 64, \"Seed\": 7, \"MaxStepsPerFrame\": 500, \"PointSize\"",
            1,
        );
        let config = RuntimeConfig::from_json_str(&text).unwrap();
        assert_eq!(config.batch_threshold, 64);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_steps_per_frame, Some(500));
    }

    #[test]
    fn test_rejects_empty_attractors() {
        let config = RuntimeConfig::default().with_attractors(Vec::new());
        assert!(matches!(config, Err(ConfigError::EmptyAttractors)));
    }

    #[test]
    fn test_rejects_bad_rate() {
        let text = SAMPLE.replace("2000", "0");
        assert!(matches!(
            RuntimeConfig::from_json_str(&text),
            Err(ConfigError::NonPositiveRate)
        ));
        let text = SAMPLE.replace("2000", "-5");
        assert!(matches!(
            RuntimeConfig::from_json_str(&text),
            Err(ConfigError::NonPositiveRate)
        ));
    }

    #[test]
    fn test_rejects_bad_fraction_and_size() {
        let mut config = RuntimeConfig::default();
        config.movement_fraction = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::FractionOutOfRange(_))));
        config.movement_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::FractionOutOfRange(_))));
        config.movement_fraction = 1.0;
        assert!(config.validate().is_ok());
        config.point_size = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::NonPositivePointSize(_))));
    }

    #[test]
    fn test_rejects_zero_step_cap() {
        let text = SAMPLE.replacen("\"PointSize\"", "\"MaxStepsPerFrame\": 0, \"PointSize\"", 1);
        assert!(matches!(
            RuntimeConfig::from_json_str(&text),
            Err(ConfigError::ZeroStepCap)
        ));
        let config = RuntimeConfig::default().with_max_steps_per_frame(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroStepCap)));
        let config = RuntimeConfig::default().with_max_steps_per_frame(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_rotation_speed() {
        let text = SAMPLE.replacen("\"PointSize\"", "\"RotationSpeed\": -0.5, \"PointSize\"", 1);
        assert!(matches!(
            RuntimeConfig::from_json_str(&text),
            Err(ConfigError::NegativeRotationSpeed(_))
        ));
        let mut config = RuntimeConfig::default();
        config.rotation_speed = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_color() {
        let text = SAMPLE.replace("#FF8000", "orange");
        assert!(matches!(
            RuntimeConfig::from_json_str(&text),
            Err(ConfigError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_values() {
        let config = RuntimeConfig::default().with_seed(3).with_batch_threshold(99);
        let text = config.to_json_string().unwrap();
        assert_eq!(RuntimeConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RuntimeConfig::load("does/not/exist.json").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }

    #[test]
    fn test_active_config_swap_bumps_version() {
        let mut active = ActiveConfig::new(RuntimeConfig::default());
        let old = active.replace(RuntimeConfig::default().with_seed(1));
        assert_eq!(active.version(), 2);
        assert_eq!(active.get().seed, Some(1));
        assert_eq!(old.seed, None);
    }
}
