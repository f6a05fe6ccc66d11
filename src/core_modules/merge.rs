// THEORY:
// The `merge` module turns a set of persisted chunks into one density canvas and
// then into an RGB raster. It is the only place where chunks meet each other.
//
// Key architectural principles:
// 1.  **Per-Chunk Normalization**: Each cell weight is divided by its own chunk's
//     `max`, so every chunk contributes on a [0, 1] scale regardless of how dense
//     that stretch of the run was. No second pass over the data is needed to
//     find a global maximum.
// 2.  **Run-Length Neutral**: Every contribution is also divided by the number of
//     chunks, so a long run does not saturate the image just by having more
//     chunks.
// 3.  **Radial Splat**: A cell is spread over the pixels around it with a
//     quadratic falloff, `(1 - min(d / r, 1))²`, reaching zero at `r` pixels.
// 4.  **Saturating Canvas**: Accumulated density is capped at `DENSITY_CEILING`.
//     Contributions are never negative, so capping on every add and capping once
//     after summing give the same result; the parallel merge relies on that.

use crate::core_modules::chunk::chunk::Chunk;
use crate::core_modules::color::color::density_to_rgb8;
use crate::core_modules::grid_index::grid_index::CellCoordinate;
use tracing::warn;

/// Highest value a canvas pixel may reach.
pub const DENSITY_CEILING: f64 = 0.996;

/// Output resolution and splat radius for a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeParams {
    pub width: u32,
    pub height: u32,
    pub radius: u32,
}

/// Dense per-pixel density accumulator, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    values: Vec<f64>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Spreads every cell of `chunk` onto the canvas.
    ///
    /// `chunk_count` is the number of chunks in the whole merge. Each pixel is
    /// capped at `ceiling` after every addition.
    pub fn splat_chunk(&mut self, chunk: &Chunk, radius: u32, chunk_count: usize, ceiling: f64) {
        if chunk.max() <= 0.0 || !chunk.max().is_finite() {
            warn!(max = chunk.max(), cells = chunk.len(), "skipping chunk without a usable max");
            return;
        }

        let share = 1.0 / chunk_count.max(1) as f64;
        let r = radius.max(1) as i64;
        let width = self.width as i64;
        let height = self.height as i64;

        for (cell, weight) in chunk.iter() {
            let center = CellCoordinate::from_index(cell, self.width);
            let (px, py) = (center.x as i64, center.y as i64);
            let normalized = weight / chunk.max() * share;

            for y in (py - r).max(0)..(py + r).min(height) {
                for x in (px - r).max(0)..(px + r).min(width) {
                    let dx = (x - px) as f64;
                    let dy = (y - py) as f64;
                    let dist = dx.hypot(dy) / r as f64;
                    let falloff = (1.0 - dist.min(1.0)).powi(2);

                    let slot = &mut self.values[(y * width + x) as usize];
                    *slot = (*slot + normalized * falloff).min(ceiling);
                }
            }
        }
    }

    /// Adds another canvas of the same size pixel by pixel, then caps.
    pub fn absorb(&mut self, other: &Canvas, ceiling: f64) {
        for (slot, value) in self.values.iter_mut().zip(&other.values) {
            *slot = (*slot + value).min(ceiling);
        }
    }

    /// Color-maps the canvas into a packed RGB8 raster.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut raster = Vec::with_capacity(self.values.len() * 3);
        for &density in &self.values {
            raster.extend_from_slice(&density_to_rgb8(density));
        }
        raster
    }
}

/// Merges every chunk onto a fresh canvas, sequentially.
pub fn merge_chunks(chunks: &[Chunk], params: MergeParams) -> Canvas {
    let mut canvas = Canvas::new(params.width, params.height);
    for chunk in chunks {
        canvas.splat_chunk(chunk, params.radius, chunks.len(), DENSITY_CEILING);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: MergeParams = MergeParams {
        width: 16,
        height: 12,
        radius: 4,
    };

    fn single_cell(cell: u32, weight: f64) -> Chunk {
        let mut chunk = Chunk::new();
        chunk.accumulate(cell, weight);
        chunk
    }

    #[test]
    fn lone_cell_saturates_its_own_pixel() {
        let cell = CellCoordinate::new(5, 6).index(PARAMS.width);
        let canvas = merge_chunks(&[single_cell(cell, 3.7)], PARAMS);
        assert_eq!(canvas.get(5, 6), DENSITY_CEILING);

        let mut uncapped = Canvas::new(PARAMS.width, PARAMS.height);
        uncapped.splat_chunk(&single_cell(cell, 3.7), PARAMS.radius, 1, f64::INFINITY);
        assert_eq!(uncapped.get(5, 6), 1.0);
    }

    #[test]
    fn splat_falls_off_quadratically_and_vanishes_at_radius() {
        let cell = CellCoordinate::new(8, 6).index(PARAMS.width);
        let canvas = merge_chunks(&[single_cell(cell, 1.0)], PARAMS);

        // distance 2 of radius 4: (1 - 0.5)² = 0.25
        assert!((canvas.get(10, 6) - 0.25).abs() < 1e-12);
        assert!((canvas.get(8, 4) - 0.25).abs() < 1e-12);
        // distance 4 is on the radius
        assert_eq!(canvas.get(4, 6), 0.0);
        // outside the bounding box
        assert_eq!(canvas.get(13, 6), 0.0);
        assert_eq!(canvas.get(0, 0), 0.0);
    }

    #[test]
    fn splat_is_clipped_at_canvas_edges() {
        let cell = CellCoordinate::new(0, 0).index(PARAMS.width);
        let canvas = merge_chunks(&[single_cell(cell, 1.0)], PARAMS);
        assert_eq!(canvas.get(0, 0), DENSITY_CEILING);
        assert!(canvas.get(1, 1) > 0.0);
    }

    #[test]
    fn chunks_are_normalized_by_their_own_max() {
        let a = CellCoordinate::new(3, 3).index(PARAMS.width);
        let b = CellCoordinate::new(12, 8).index(PARAMS.width);

        let mut loud = Chunk::new();
        loud.accumulate(a, 100.0);
        loud.accumulate(b, 50.0);
        let quiet = single_cell(b, 0.01);

        let canvas = merge_chunks(&[loud, quiet], PARAMS);
        // loud contributes 1.0 / 2 at a; quiet contributes nothing there
        assert!((canvas.get(3, 3) - 0.5).abs() < 1e-12);
        // at b: loud gives 0.5 / 2, quiet gives 1.0 / 2
        assert!((canvas.get(12, 8) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn chunk_without_max_is_skipped() {
        let mut empty_max = Chunk::new();
        empty_max.accumulate(0, 0.0);
        let canvas = merge_chunks(&[empty_max], PARAMS);
        assert!(canvas.values().iter().all(|&value| value == 0.0));
    }

    #[test]
    fn no_chunks_gives_blank_canvas() {
        let canvas = merge_chunks(&[], PARAMS);
        assert_eq!(canvas.values().len(), 16 * 12);
        assert!(canvas.values().iter().all(|&value| value == 0.0));
    }

    #[test]
    fn cap_after_sum_matches_cap_on_every_add() {
        let cell = CellCoordinate::new(7, 5).index(PARAMS.width);
        let chunks = vec![single_cell(cell, 1.0), single_cell(cell + 1, 2.0), single_cell(cell, 0.3)];
        let sequential = merge_chunks(&chunks, PARAMS);

        let mut combined = Canvas::new(PARAMS.width, PARAMS.height);
        for chunk in &chunks {
            let mut partial = Canvas::new(PARAMS.width, PARAMS.height);
            partial.splat_chunk(chunk, PARAMS.radius, chunks.len(), f64::INFINITY);
            combined.absorb(&partial, f64::INFINITY);
        }
        let capped = {
            let mut blank = Canvas::new(PARAMS.width, PARAMS.height);
            blank.absorb(&combined, DENSITY_CEILING);
            blank
        };

        for (a, b) in sequential.values().iter().zip(capped.values()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn raster_has_three_bytes_per_pixel() {
        let canvas = merge_chunks(&[single_cell(0, 1.0)], PARAMS);
        let raster = canvas.to_rgb8();
        assert_eq!(raster.len(), 16 * 12 * 3);
        assert_ne!(&raster[0..3], &raster[raster.len() - 3..]);
    }
}
