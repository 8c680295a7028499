//! Configuration types and utilities

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How guide intensity in `[0, 1]` maps onto the depth axis of a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMapping {
    /// `gz = g * (D - 1)`: a guide of 1.0 lands exactly on the last depth slab.
    #[default]
    EndpointAligned,
    /// `gz = g * D`: a guide of 1.0 lands one past the last slab and is
    /// zero-padded.
    CellCount,
}

impl DepthMapping {
    /// Scale that turns a guide value into a depth coordinate for `depth` slabs.
    pub fn depth_scale(self, depth: usize) -> f32 {
        match self {
            Self::EndpointAligned => depth.saturating_sub(1) as f32,
            Self::CellCount => depth as f32,
        }
    }
}

/// Memory layout of the sliced output (and of its gradient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `[N, H, W, S]`
    #[default]
    ChannelsLast,
    /// `[N, S, H, W]`
    ChannelsFirst,
}

/// Which kernel implementation the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRequest {
    /// Pick the best available provider.
    #[default]
    Auto,
    /// Scalar reference kernel.
    Reference,
    /// Multi-threaded CPU kernel.
    Parallel,
}

impl fmt::Display for BackendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendRequest::Auto => write!(f, "auto"),
            BackendRequest::Reference => write!(f, "reference"),
            BackendRequest::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for BackendRequest {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "reference" | "scalar" | "fallback" => Ok(Self::Reference),
            "parallel" | "cpu" => Ok(Self::Parallel),
            other => Err(ConfigError::InvalidValue {
                field: "backend",
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

impl FromStr for DepthMapping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "endpoint_aligned" | "endpoint" => Ok(Self::EndpointAligned),
            "cell_count" | "cells" => Ok(Self::CellCount),
            other => Err(ConfigError::InvalidValue {
                field: "depth_mapping",
                reason: format!("unknown depth mapping '{other}'"),
            }),
        }
    }
}

impl FromStr for OutputLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "channels_last" | "nhwc" => Ok(Self::ChannelsLast),
            "channels_first" | "nchw" => Ok(Self::ChannelsFirst),
            other => Err(ConfigError::InvalidValue {
                field: "output_layout",
                reason: format!("unknown output layout '{other}'"),
            }),
        }
    }
}

/// Parameters of a bilateral slicing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Number of output channels `S`, each owning its own depth slab.
    pub coefficient_len: usize,
    /// Depth resolution `D` per channel. Derived from the grid when absent.
    pub depth: Option<usize>,
    pub depth_mapping: DepthMapping,
    pub output_layout: OutputLayout,
    pub backend: BackendRequest,
    /// Size of a dedicated worker pool for the parallel kernel.
    pub num_threads: Option<usize>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            coefficient_len: 12,
            depth: None,
            depth_mapping: DepthMapping::default(),
            output_layout: OutputLayout::default(),
            backend: BackendRequest::default(),
            num_threads: None,
        }
    }
}

impl SliceConfig {
    pub fn builder() -> SliceConfigBuilder {
        SliceConfigBuilder::default()
    }

    /// Load configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }

    /// Load from file, apply `BGRID_*` environment overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `BGRID_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("BGRID_COEFFICIENT_LEN") {
            self.coefficient_len = parse_usize("coefficient_len", &v)?;
        }
        if let Ok(v) = env::var("BGRID_DEPTH") {
            self.depth = Some(parse_usize("depth", &v)?);
        }
        if let Ok(v) = env::var("BGRID_DEPTH_MAPPING") {
            self.depth_mapping = v.parse()?;
        }
        if let Ok(v) = env::var("BGRID_OUTPUT_LAYOUT") {
            self.output_layout = v.parse()?;
        }
        if let Ok(v) = env::var("BGRID_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Ok(v) = env::var("BGRID_NUM_THREADS") {
            self.num_threads = Some(parse_usize("num_threads", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coefficient_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coefficient_len",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.depth == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "depth",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.num_threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "num_threads",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_usize(field: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::InvalidValue {
        field,
        reason: format!("'{value}' is not a non-negative integer: {e}"),
    })
}

/// Builder for [`SliceConfig`].
#[derive(Debug, Default)]
pub struct SliceConfigBuilder {
    config: SliceConfig,
}

impl SliceConfigBuilder {
    pub fn coefficient_len(mut self, coefficient_len: usize) -> Self {
        self.config.coefficient_len = coefficient_len;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.config.depth = Some(depth);
        self
    }

    pub fn depth_mapping(mut self, mapping: DepthMapping) -> Self {
        self.config.depth_mapping = mapping;
        self
    }

    pub fn output_layout(mut self, layout: OutputLayout) -> Self {
        self.config.output_layout = layout;
        self
    }

    pub fn backend(mut self, backend: BackendRequest) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = Some(num_threads);
        self
    }

    pub fn build(self) -> Result<SliceConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
