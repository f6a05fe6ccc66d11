// THEORY:
// Parallel counterpart of `merge::merge_chunks`. Splatting is purely additive,
// so the chunk list can be cut into contiguous slices, each slice splatted onto
// its own uncapped partial canvas on tokio's blocking pool, and the partials
// summed afterwards. Capping once at the end equals capping on every add
// because no contribution is negative.

use crate::core_modules::chunk::chunk::Chunk;
use crate::core_modules::merge::{Canvas, DENSITY_CEILING, MergeParams};
use crate::error::FinalizeError;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

/// Merges `chunks` using up to one worker per logical CPU.
pub async fn merge_chunks_parallel(
    chunks: Vec<Chunk>,
    params: MergeParams,
) -> Result<Canvas, FinalizeError> {
    merge_chunks_with_workers(chunks, params, num_cpus::get()).await
}

/// Merges `chunks` using at most `workers` blocking tasks.
pub async fn merge_chunks_with_workers(
    chunks: Vec<Chunk>,
    params: MergeParams,
    workers: usize,
) -> Result<Canvas, FinalizeError> {
    let chunk_count = chunks.len();
    let workers = workers.clamp(1, chunk_count.max(1));
    let per_worker = chunk_count.div_ceil(workers).max(1);
    let chunks = Arc::new(chunks);

    debug!(chunk_count, workers, per_worker, "parallel merge started");

    let tasks = (0..chunk_count).step_by(per_worker).map(|start| {
        let chunks = Arc::clone(&chunks);
        let end = (start + per_worker).min(chunk_count);
        tokio::task::spawn_blocking(move || {
            let mut partial = Canvas::new(params.width, params.height);
            for chunk in &chunks[start..end] {
                partial.splat_chunk(chunk, params.radius, chunk_count, f64::INFINITY);
            }
            partial
        })
    });

    let partials = try_join_all(tasks)
        .await
        .map_err(|err| FinalizeError::Worker(err.to_string()))?;

    let mut canvas = Canvas::new(params.width, params.height);
    for partial in &partials {
        canvas.absorb(partial, DENSITY_CEILING);
    }
    Ok(canvas)
}
