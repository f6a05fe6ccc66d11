// THEORY:
// This file is the main entry point for the `occupancy_heatmap` library crate.
// It exposes the `HeatmapPipeline` and its configuration as the high-level
// interface: callers register tracked objects, advance the pipeline with frame
// deltas, and finalize once to receive an encoded heatmap image.
//
// The lower layers (`core_modules`) stay public for callers that want to drive
// the accumulator directly with their own sample source, or to read chunk files
// produced by an earlier run.

pub mod core_modules;
pub mod error;
pub mod parallel_merge;
pub mod pipeline;
