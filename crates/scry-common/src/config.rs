//! Configuration structures for scry.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Evaluator runtime settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, caching, epochs)
//! - [`ExecutionConfig`]: Per-call execution limits (fuel, memory, timeout)
//! - [`LimitsConfig`]: Input bounds applied before any evaluator call
//! - [`RenderConfig`]: Raster ceiling and font set

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Evaluator runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the process-wide engine, which is built once at
/// startup and shared by every evaluation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for instance creation.
    ///
    /// When enabled, memory is pre-reserved for a pool of instances,
    /// so each request instantiates its own evaluator cheaply.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable wasmtime's on-disk cache of compiled code.
    #[serde(default)]
    pub cache_compiled_modules: bool,

    /// Path to a wasmtime cache configuration file.
    ///
    /// When unset and caching is enabled, wasmtime's default cache
    /// configuration is loaded.
    #[serde(default)]
    pub cache_config: Option<String>,

    /// Enable epoch-based interruption.
    ///
    /// This bounds the wall-clock time of a single guest call.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Interval between epoch ticks in milliseconds.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            cache_compiled_modules: false,
            cache_config: None,
            epoch_interruption: defaults::epoch_interruption(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick interval as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms.max(1))
    }
}

/// Per-call execution configuration.
///
/// These settings control resource limits for a single guest call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum fuel (instructions) per call.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Wall-clock deadline for one call in milliseconds.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum guest linear memory in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Enable fuel metering.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_mb: defaults::max_memory_mb(),
            fuel_metering: defaults::fuel_metering(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Maximum guest memory in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Bounds on caller input, checked before any evaluator call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum script size in bytes.
    #[serde(default = "defaults::max_code_bytes")]
    pub max_code_bytes: usize,

    /// Maximum board width or height.
    #[serde(default = "defaults::max_canvas_dimension")]
    pub max_canvas_dimension: u32,

    /// Maximum alt text length in characters.
    #[serde(default = "defaults::max_alt_chars")]
    pub max_alt_chars: usize,

    /// Width used for new boards when the caller gives none.
    #[serde(default = "defaults::default_width")]
    pub default_width: u32,

    /// Height used for new boards when the caller gives none.
    #[serde(default = "defaults::default_height")]
    pub default_height: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_code_bytes: defaults::max_code_bytes(),
            max_canvas_dimension: defaults::max_canvas_dimension(),
            max_alt_chars: defaults::max_alt_chars(),
            default_width: defaults::default_width(),
            default_height: defaults::default_height(),
        }
    }
}

/// Rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Inclusive per-axis ceiling for rasterization.
    #[serde(default = "defaults::max_raster_dimension")]
    pub max_raster_dimension: u32,

    /// Directories scanned for font files.
    #[serde(default)]
    pub font_dirs: Vec<String>,

    /// Individual font files.
    #[serde(default)]
    pub font_files: Vec<String>,

    /// Family used when an artifact names none.
    #[serde(default)]
    pub default_font_family: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_raster_dimension: defaults::max_raster_dimension(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            default_font_family: None,
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        64
    }

    pub const fn instance_memory_mb() -> u32 {
        128
    }

    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn epoch_tick_ms() -> u64 {
        10
    }

    pub const fn max_fuel() -> u64 {
        50_000_000
    }

    pub const fn timeout_ms() -> u64 {
        2_000
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn max_code_bytes() -> usize {
        1_000_000
    }

    pub const fn max_canvas_dimension() -> u32 {
        8192
    }

    pub const fn max_alt_chars() -> usize {
        1000
    }

    pub const fn default_width() -> u32 {
        800
    }

    pub const fn default_height() -> u32 {
        600
    }

    pub const fn max_raster_dimension() -> u32 {
        4096
    }
}
