// THEORY:
// The `pipeline` module is the top-level API for recording a heatmap. It bundles
// the tracked-object registry and the accumulator behind one struct so that a
// host loop only has to keep object positions current, call `update` once per
// frame, and call `finalize` (or just drop the pipeline) when the run ends.

use crate::core_modules::accumulator::Accumulator;
use crate::core_modules::tracked::TrackedObjects;
use crate::core_modules::utils::image_helper::image_helper::{ImageEncoder, PngImageEncoder};
use crate::error::{AccumulateError, ConfigError, FinalizeError};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

// Re-export key data structures for the public API.
pub use crate::core_modules::accumulator::EncodedImage;
pub use crate::core_modules::tracked::{Sample, TrackedId};

const MIN_RESOLUTION: u32 = 8;
const MIN_CHUNK_SIZE: usize = 10;
const MAX_CHUNK_SIZE: usize = 100_000;
/// Cell indices are stored as `i32` in chunk files.
const MAX_CELLS: u64 = i32::MAX as u64;

/// Configuration for a heatmap run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Names the chunk directory (`CHUNK_<run_name>`) and the output image.
    pub run_name: String,
    /// Parent directory of the run's chunk directory.
    pub storage_root: PathBuf,
    /// Directory the final image is written into.
    pub output_dir: PathBuf,
    /// Centre of the sampled volume in world space.
    pub volume_center: Vec3,
    /// Size of the sampled volume. Only x and z are used.
    pub volume_extent: Vec3,
    /// Grid columns, also the output image width. At least 8.
    pub grid_width: u32,
    /// Grid rows, also the output image height. At least 8.
    pub grid_height: u32,
    /// Splat radius in output pixels.
    pub pixel_radius: u32,
    /// Seconds between sampling ticks.
    pub update_interval: f32,
    /// Distinct cells a chunk may hold before it is flushed, within [10, 100000].
    pub chunk_size: usize,
    /// Weight added per sample for a tick that took exactly one interval.
    pub base_increment: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            run_name: "HEATMAP".to_string(),
            storage_root: std::env::temp_dir().join("occupancy_heatmap"),
            output_dir: PathBuf::from("."),
            volume_center: Vec3::ZERO,
            volume_extent: Vec3::new(10.0, 0.0, 10.0),
            grid_width: 256,
            grid_height: 256,
            pixel_radius: 10,
            update_interval: 1.0,
            chunk_size: 500,
            base_increment: 0.1,
        }
    }
}

impl HeatmapConfig {
    /// Clamps resolution and chunk size into range and rejects unusable values.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.run_name.is_empty() {
            return Err(ConfigError::RunName);
        }
        if !(self.update_interval.is_finite() && self.update_interval > 0.0) {
            return Err(ConfigError::UpdateInterval(self.update_interval));
        }
        let extent = self.volume_extent;
        if !(extent.x.is_finite() && extent.x > 0.0 && extent.z.is_finite() && extent.z > 0.0) {
            return Err(ConfigError::VolumeExtent {
                x: extent.x,
                z: extent.z,
            });
        }
        if self.pixel_radius == 0 {
            return Err(ConfigError::PixelRadius);
        }
        if !(self.base_increment.is_finite() && self.base_increment > 0.0) {
            return Err(ConfigError::BaseIncrement(self.base_increment));
        }

        self.grid_width = self.grid_width.max(MIN_RESOLUTION);
        self.grid_height = self.grid_height.max(MIN_RESOLUTION);
        if u64::from(self.grid_width) * u64::from(self.grid_height) > MAX_CELLS {
            return Err(ConfigError::Resolution {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        Ok(self)
    }

    /// Parses and validates a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Json(err.to_string()))?;
        config.validated()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&json)
    }
}

/// The main, top-level struct for recording a heatmap.
pub struct HeatmapPipeline {
    tracked: TrackedObjects,
    accumulator: Accumulator,
}

impl HeatmapPipeline {
    /// Starts a run that writes PNG output.
    pub fn new(config: HeatmapConfig) -> Result<Self, ConfigError> {
        Self::with_encoder(config, Box::new(PngImageEncoder))
    }

    pub fn with_encoder(
        config: HeatmapConfig,
        encoder: Box<dyn ImageEncoder>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            tracked: TrackedObjects::new(),
            accumulator: Accumulator::new(config, encoder)?,
        })
    }

    pub fn tracked(&self) -> &TrackedObjects {
        &self.tracked
    }

    pub fn tracked_mut(&mut self) -> &mut TrackedObjects {
        &mut self.tracked
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Re-centres the sampled volume, e.g. when the volume follows a moving owner.
    pub fn move_volume(&mut self, center: Vec3) {
        self.accumulator.move_volume(center);
    }

    /// Advances the run by one frame, sampling every registered object.
    pub fn update(&mut self, delta_time: f32) -> Result<(), AccumulateError> {
        self.accumulator.tick(delta_time, self.tracked.samples())
    }

    pub fn finalize(&mut self) -> Result<EncodedImage, FinalizeError> {
        self.accumulator.finalize()
    }

    pub async fn finalize_parallel(&mut self) -> Result<EncodedImage, FinalizeError> {
        self.accumulator.finalize_parallel().await
    }
}

impl Drop for HeatmapPipeline {
    fn drop(&mut self) {
        // Best effort finalize on drop
        if let Err(err) = self.accumulator.finalize() {
            error!(error = %err, run = %self.accumulator.config().run_name, "finalize on drop failed");
        }
    }
}
