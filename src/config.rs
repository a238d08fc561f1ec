//! Configuration structures for the engine.
//!
//! The tree deserializes from a JSON file; every field falls back to a
//! sensible default, so a missing or partial file still yields a
//! runnable setup. Nothing here is global: callers hand the config to
//! `PlmController` explicitly.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codes::{CODE_BITS, DEFAULT_CODES};
use crate::error::PlmError;
use crate::quantize::{DEFAULT_LUT, LEVELS, LUT_BREAKPOINTS};

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlmConfig {
    /// Output geometry and placement.
    pub geometry: GeometryConfig,
    /// Frame capacity and loop timing.
    pub playback: PlaybackConfig,
    /// GPU packing options.
    pub gpu: GpuConfig,
    /// Per-device calibration tables.
    pub calibration: CalibrationConfig,
}

/// Output geometry and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Logical frame width in pixels; the output surface is twice this.
    pub width: usize,
    /// Logical frame height in pixels; the output surface is twice this.
    pub height: usize,
    /// Monitor the output window lands on.
    pub monitor: usize,
    /// Present in a movable window instead of borderless fullscreen.
    pub windowed: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            width: 128, // Vendor demo's startup geometry
            height: 128,
            monitor: 0,
            windowed: false,
        }
    }
}

/// Frame capacity and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frame-store slots; also the upper bound on sequence length.
    pub capacity: usize,
    /// Display refresh rate the headless presenter paces to, in Hz.
    pub refresh_rate: f64,
    /// Grace delay after a sequence ends, before the loop idles on.
    pub sequence_end_delay_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            capacity: 48,
            refresh_rate: 60.0,
            sequence_end_delay_ms: 200,
        }
    }
}

/// GPU packing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Try the GPU packing backend first, falling back to the scalar
    /// path when no usable device exists.
    pub prefer_gpu: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        GpuConfig { prefer_gpu: true }
    }
}

/// Per-device calibration tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Quantization breakpoints, non-decreasing, nominally spanning
    /// [0, 1].
    pub lookup_table: [f32; LUT_BREAKPOINTS],
    /// Corner bits per level, each entry 0 or 1.
    pub code_table: [[u8; CODE_BITS]; LEVELS],
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            lookup_table: DEFAULT_LUT,
            code_table: DEFAULT_CODES,
        }
    }
}

impl PlmConfig {
    /// Loads a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Rejects configs the engine cannot run with. Table contents are
    /// validated separately when the tables are built.
    pub fn validate(&self) -> Result<(), PlmError> {
        if self.geometry.width == 0 || self.geometry.height == 0 {
            return Err(PlmError::InvalidConfig(
                "geometry must be at least 1x1".into(),
            ));
        }
        if self.playback.capacity == 0 {
            return Err(PlmError::InvalidConfig(
                "frame capacity must be at least 1".into(),
            ));
        }
        if !(self.playback.refresh_rate > 0.0) {
            return Err(PlmError::InvalidConfig(
                "refresh rate must be positive".into(),
            ));
        }
        Ok(())
    }
}
