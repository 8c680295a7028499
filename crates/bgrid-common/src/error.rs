//! Error types for bilateral grid slicing.

use thiserror::Error;

/// Top-level error for every fallible operation in the workspace.
#[derive(Error, Debug)]
pub enum BilateralError {
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Forward or backward was called without a successful reshape.
    #[error("layer has no geometry: reshape must succeed before forward/backward")]
    NotReshaped,
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, BilateralError>;

/// Errors raised while validating guide/grid/output shapes.
///
/// All of these are detected at reshape time, before any forward or backward
/// call runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error(
        "grid depth {depth_dim} does not equal coefficient_len ({coefficient_len}) \
         * depth ({depth})"
    )]
    GridDepthMismatch { depth_dim: usize, coefficient_len: usize, depth: usize },

    #[error("grid depth {depth_dim} is not divisible by coefficient_len {coefficient_len}")]
    IndivisibleDepth { depth_dim: usize, coefficient_len: usize },

    #[error("batch size mismatch: guide has {guide}, grid has {grid}")]
    BatchMismatch { guide: usize, grid: usize },

    #[error("{tensor} must be {expected}-D, got shape {shape:?}")]
    Rank { tensor: &'static str, expected: &'static str, shape: Vec<usize> },

    #[error("guide must be single-channel, got {channels} channels")]
    GuideChannels { channels: usize },

    #[error("{tensor} has a zero-sized dimension: {shape:?}")]
    EmptyDimension { tensor: &'static str, shape: Vec<usize> },

    #[error("{tensor} element count overflows usize for shape {shape:?}")]
    TooLarge { tensor: &'static str, shape: Vec<usize> },

    #[error("{buffer} length {actual} does not match geometry (expected {expected})")]
    BufferLength { buffer: &'static str, expected: usize, actual: usize },
}

/// Errors raised by kernel providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("no available kernel provider")]
    NoProvider,

    #[error("invalid kernel arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("kernel execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config file extension: {0:?}")]
    UnsupportedFormat(Option<String>),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
