// THEORY:
// The `Accumulator` is the live end of a run. It owns the one chunk currently
// being written, turns sampling ticks into weighted cell increments, and hands
// full chunks to the `ChunkStore`. At the end of the run it drives the merge and
// encode exactly once.
//
// Key architectural principles:
// 1.  **Tick-Driven**: Nothing happens between `tick` calls. Frame deltas are
//     summed until the sampling interval is reached; the increment is then
//     scaled by `elapsed / interval`, so a late tick counts for the time it
//     actually covered.
// 2.  **One Live Chunk**: Exactly one chunk is in the accumulating state at any
//     time. Once it holds `chunk_size` cells it is written to disk and replaced
//     by a fresh, empty chunk with the next index. Written chunks are never
//     touched again.
// 3.  **Flat Memory**: Because full chunks leave memory, the live footprint is
//     bounded by `chunk_size` no matter how long the run lasts.
// 4.  **Idempotent Finalize**: The first successful `finalize` caches the encoded
//     image. Every later call returns that cached image without any I/O, so all
//     shutdown paths may call it.

use crate::core_modules::chunk::chunk::Chunk;
use crate::core_modules::chunk_store::ChunkStore;
use crate::core_modules::grid_index::grid_index::{map_to_cell, volume_origin};
use crate::core_modules::merge::{Canvas, MergeParams, merge_chunks};
use crate::core_modules::tracked::Sample;
use crate::core_modules::utils::image_helper::image_helper::{self, ImageEncoder};
use crate::error::{AccumulateError, ConfigError, FinalizeError};
use crate::parallel_merge::merge_chunks_parallel;
use crate::pipeline::HeatmapConfig;
use glam::Vec3;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Encoded image bytes shared between repeated `finalize` calls.
pub type EncodedImage = Arc<[u8]>;

#[derive(Debug, Clone)]
enum RunState {
    Accumulating,
    Finalized(EncodedImage),
}

/// Converts position samples into chunked cell weights for one run.
pub struct Accumulator {
    config: HeatmapConfig,
    store: ChunkStore,
    encoder: Box<dyn ImageEncoder>,
    volume_origin: Vec3,
    chunk: Chunk,
    chunk_index: u32,
    elapsed: f32,
    state: RunState,
}

impl Accumulator {
    /// Starts a run. Chunk files left by an earlier run with the same name are discarded.
    ///
    /// `config` is run through [`HeatmapConfig::validated`] first.
    pub fn new(config: HeatmapConfig, encoder: Box<dyn ImageEncoder>) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let store = ChunkStore::new(&config.storage_root, &config.run_name);
        let stale = store.reset();
        info!(
            run = %config.run_name,
            storage = %store.directory().display(),
            stale_chunks = stale,
            "heatmap run started"
        );

        Ok(Self {
            volume_origin: volume_origin(config.volume_center, config.volume_extent),
            store,
            encoder,
            chunk: Chunk::new(),
            chunk_index: 0,
            elapsed: 0.0,
            state: RunState::Accumulating,
            config,
        })
    }

    /// Re-centres the sampled volume; later ticks map positions against the new origin.
    pub fn move_volume(&mut self, center: Vec3) {
        self.config.volume_center = center;
        self.volume_origin = volume_origin(center, self.config.volume_extent);
    }

    /// Advances the run clock by `delta_time` seconds and samples when the interval is reached.
    pub fn tick<I>(&mut self, delta_time: f32, samples: I) -> Result<(), AccumulateError>
    where
        I: IntoIterator<Item = Sample>,
    {
        if self.is_finalized() {
            return Ok(());
        }
        if delta_time.is_finite() && delta_time > 0.0 {
            self.elapsed += delta_time;
        }
        if self.elapsed < self.config.update_interval {
            return Ok(());
        }

        let scale = f64::from(self.elapsed / self.config.update_interval);
        let increment = self.config.base_increment * scale;
        let mut hits = 0usize;

        for sample in samples.into_iter().filter(|sample| sample.active) {
            if let Some(cell) = map_to_cell(
                sample.position,
                self.volume_origin,
                self.config.volume_extent,
                self.config.grid_width,
                self.config.grid_height,
            ) {
                self.chunk.accumulate(cell.index(self.config.grid_width), increment);
                hits += 1;
            }
        }
        debug!(elapsed = self.elapsed, increment, hits, cells = self.chunk.len(), "sampling tick");
        self.elapsed = 0.0;

        if self.chunk.len() >= self.config.chunk_size {
            self.flush_live()?;
        }
        Ok(())
    }

    /// Merges every chunk of the run into the final image. Runs once; later calls return the cached image.
    pub fn finalize(&mut self) -> Result<EncodedImage, FinalizeError> {
        if let RunState::Finalized(image) = &self.state {
            return Ok(image.clone());
        }

        let chunks = self.collect_chunks()?;
        let canvas = merge_chunks(&chunks, self.merge_params());
        self.complete(canvas, chunks.len())
    }

    /// Same as [`Accumulator::finalize`], splatting chunks on the blocking thread pool.
    pub async fn finalize_parallel(&mut self) -> Result<EncodedImage, FinalizeError> {
        if let RunState::Finalized(image) = &self.state {
            return Ok(image.clone());
        }

        let chunks = self.collect_chunks()?;
        let chunk_count = chunks.len();
        let canvas = merge_chunks_parallel(chunks, self.merge_params()).await?;
        self.complete(canvas, chunk_count)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, RunState::Finalized(_))
    }

    pub fn live_chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Index the live chunk will be written under.
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    pub fn output_path(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{}", self.config.run_name, self.encoder.extension()))
    }

    fn flush_live(&mut self) -> Result<(), AccumulateError> {
        let handle = self.store.flush(&self.chunk, self.chunk_index)?;
        info!(
            index = handle.index,
            cells = self.chunk.len(),
            max = self.chunk.max(),
            "chunk flushed"
        );
        self.chunk = Chunk::new();
        self.chunk_index += 1;
        Ok(())
    }

    fn merge_params(&self) -> MergeParams {
        MergeParams {
            width: self.config.grid_width,
            height: self.config.grid_height,
            radius: self.config.pixel_radius,
        }
    }

    fn collect_chunks(&mut self) -> Result<Vec<Chunk>, FinalizeError> {
        if !self.chunk.is_empty() {
            self.flush_live()?;
        }
        self.store
            .list_chunks()?
            .iter()
            .map(|handle| handle.load())
            .collect()
    }

    fn complete(&mut self, canvas: Canvas, chunk_count: usize) -> Result<EncodedImage, FinalizeError> {
        let raster = canvas.to_rgb8();
        let bytes = self.encoder.encode(canvas.width, canvas.height, &raster)?;
        let path = self.output_path();
        image_helper::save(&path, &bytes)?;

        let removed = self.store.delete_all();
        info!(
            path = %path.display(),
            chunks = chunk_count,
            removed,
            bytes = bytes.len(),
            "heatmap finalized"
        );

        let image: EncodedImage = bytes.into();
        self.state = RunState::Finalized(image.clone());
        Ok(image)
    }
}
