pub mod accumulator;
pub mod chunk;
pub mod chunk_store;
pub mod color;
pub mod grid_index;
pub mod merge;
pub mod tracked;
pub mod utils;
