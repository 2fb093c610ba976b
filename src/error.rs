//! Error types for chaos-cubes.
//!
//! Configuration problems are reported when a config is loaded, never from
//! inside the iteration loop. Bake failures are recoverable and only pause
//! the simulation. GPU and windowing errors are fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that make a configuration unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for the expected layout.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// At least one attractor is required to pick a target from.
    #[error("attractor list is empty")]
    EmptyAttractors,
    /// `IterationsPerSecond` must be at least 1.
    #[error("iterations per second must be positive")]
    NonPositiveRate,
    /// `MovementSpeed` must lie in (0, 1].
    #[error("movement fraction {0} is outside (0, 1]")]
    FractionOutOfRange(f32),
    /// `PointSize` must be positive.
    #[error("point size {0} must be positive")]
    NonPositivePointSize(f32),
    /// `Color` is not a `#RRGGBB` string.
    #[error("invalid color {0:?}, expected \"#RRGGBB\"")]
    InvalidColor(String),
    /// A numeric field is NaN or infinite.
    #[error("{0} contains a non-finite value")]
    NonFinite(&'static str),
    /// `BatchThreshold` must be at least 1.
    #[error("batch threshold must be positive")]
    ZeroThreshold,

    /// `MaxStepsPerFrame`, when present, must be at least 1.
    #[error("max steps per frame must be positive")]
    ZeroStepCap,

    /// `RotationSpeed` must not be negative.
    #[error("rotation speed must not be negative, got {0}")]
    NegativeRotationSpeed(f32),
}

/// Errors raised when turning live points into a batch.
///
/// These never stop the process: the triggering bake is abandoned, the
/// session pauses, and the live points stay where they were.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakeError {
    /// The batch would be larger than the device allows in one buffer.
    #[error("batch of {requested} bytes exceeds the device limit of {limit} bytes")]
    CapacityExceeded { requested: u64, limit: u64 },
    /// The device refused the allocation.
    #[error("device rejected batch allocation: {0}")]
    Device(String),
}

/// Errors that can occur during GPU initialization.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
}

/// Errors that can occur when running the viewer.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to create or run the event loop.
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// Failed to create the window.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// GPU initialization failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    /// The startup configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
