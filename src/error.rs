//! Error taxonomy for accumulation, storage, merge and encoding.

use std::path::PathBuf;
use thiserror::Error;

/// A chunk file whose contents cannot be a serialized chunk.
#[derive(Debug, Error, PartialEq)]
pub enum ChunkError {
    #[error("corrupt chunk: {len} bytes is not 8 + 12 * n")]
    Corrupt { len: usize },
    #[error("corrupt chunk: negative cell index {index}")]
    NegativeCell { index: i32 },
    #[error("corrupt chunk: cell index {index} appears more than once")]
    DuplicateCell { index: u32 },
}

/// Filesystem failures inside a run's storage area.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to list {}: {source}", path.display())]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failures reported by an image encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("image encoder error: {0}")]
    Image(#[from] image::ImageError),
    #[error("raster holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    RasterSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("update interval must be positive and finite, got {0}")]
    UpdateInterval(f32),
    #[error("volume extent must be positive on x and z, got ({x}, {z})")]
    VolumeExtent { x: f32, z: f32 },
    #[error("pixel radius must be at least 1")]
    PixelRadius,
    #[error("base increment must be positive and finite, got {0}")]
    BaseIncrement(f64),
    #[error("grid {width}x{height} has more cells than a chunk file can index")]
    Resolution { width: u32, height: u32 },
    #[error("run name must be non-empty")]
    RunName,
    #[error("invalid config json: {0}")]
    Json(String),
    #[error("failed to read config {}: {message}", path.display())]
    Read { path: PathBuf, message: String },
}

/// Failure of a sampling tick. Only flushing can fail.
#[derive(Debug, Error)]
pub enum AccumulateError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure of the one-shot merge-and-encode pass.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{}: {source}", path.display())]
    Corrupt { path: PathBuf, source: ChunkError },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("merge worker failed: {0}")]
    Worker(String),
}

impl From<AccumulateError> for FinalizeError {
    fn from(err: AccumulateError) -> Self {
        match err {
            AccumulateError::Storage(inner) => FinalizeError::Storage(inner),
        }
    }
}
