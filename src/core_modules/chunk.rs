// THEORY:
// The `Chunk` module is the sparse, bounded unit of accumulated density. A chunk
// maps flattened cell indices to accumulated weight and remembers the highest
// weight ever written into it. That high-water mark travels with the chunk to
// disk and is what the merge stage normalizes each chunk by.
//
// Key architectural principles:
// 1.  **Sparse Storage**: Only visited cells are stored, so a chunk's size is set
//     by how many distinct cells were touched, not by the grid resolution.
// 2.  **High-Water Max**: `max` only ever grows. It is updated on every write and
//     survives `clear`, because it describes what was written, not what remains.
// 3.  **Fixed Wire Layout**: A chunk serializes to a little-endian byte buffer:
//
//     ```text
//     [0, 8)            max, f64
//     [8, 8 + 4n)       n cell indices, i32
//     [8 + 4n, 8 + 12n) n weights, f64, same order as the indices
//     ```
//
//     `n` is not stored; it is recovered from the buffer length.

pub mod chunk {
    use crate::error::ChunkError;
    use std::collections::BTreeMap;
    use std::collections::btree_map::Entry;

    const MAX_LEN: usize = size_of::<f64>();
    const INDEX_LEN: usize = size_of::<i32>();
    const WEIGHT_LEN: usize = size_of::<f64>();
    const ENTRY_LEN: usize = INDEX_LEN + WEIGHT_LEN;

    /// A sparse map of cell index to accumulated weight plus its high-water mark.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Chunk {
        cells: BTreeMap<u32, f64>,
        max: f64,
    }

    impl Chunk {
        pub fn new() -> Self {
            Self::default()
        }

        /// The weight stored for `cell`, or 0 when the cell was never written.
        pub fn get(&self, cell: u32) -> f64 {
            self.cells.get(&cell).copied().unwrap_or(0.0)
        }

        /// Adds `delta` to `cell` and raises `max` to the new value if needed.
        pub fn accumulate(&mut self, cell: u32, delta: f64) {
            let value = self.get(cell) + delta;
            self.max = self.max.max(value);
            self.cells.insert(cell, value);
        }

        /// Empties the map. `max` is kept.
        pub fn clear(&mut self) {
            self.cells.clear();
        }

        pub fn max(&self) -> f64 {
            self.max
        }

        /// Number of distinct cells stored.
        pub fn len(&self) -> usize {
            self.cells.len()
        }

        pub fn is_empty(&self) -> bool {
            self.cells.is_empty()
        }

        /// Cells in ascending index order.
        pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
            self.cells.iter().map(|(&cell, &weight)| (cell, weight))
        }

        pub fn serialize(&self) -> Vec<u8> {
            let mut bytes = Vec::with_capacity(MAX_LEN + self.len() * ENTRY_LEN);
            bytes.extend_from_slice(&self.max.to_le_bytes());
            for &cell in self.cells.keys() {
                bytes.extend_from_slice(&(cell as i32).to_le_bytes());
            }
            for &weight in self.cells.values() {
                bytes.extend_from_slice(&weight.to_le_bytes());
            }
            bytes
        }

        pub fn deserialize(bytes: &[u8]) -> Result<Self, ChunkError> {
            let len = bytes.len();
            if len < MAX_LEN || (len - MAX_LEN) % ENTRY_LEN != 0 {
                return Err(ChunkError::Corrupt { len });
            }

            let count = (len - MAX_LEN) / ENTRY_LEN;
            let (max_bytes, body) = bytes.split_at(MAX_LEN);
            let (index_bytes, weight_bytes) = body.split_at(count * INDEX_LEN);

            let max = f64::from_le_bytes(to_array(max_bytes));
            let mut cells = BTreeMap::new();

            for (raw_index, raw_weight) in index_bytes
                .chunks_exact(INDEX_LEN)
                .zip(weight_bytes.chunks_exact(WEIGHT_LEN))
            {
                let index = i32::from_le_bytes(to_array(raw_index));
                let cell = u32::try_from(index).map_err(|_| ChunkError::NegativeCell { index })?;
                let weight = f64::from_le_bytes(to_array(raw_weight));
                match cells.entry(cell) {
                    Entry::Vacant(slot) => {
                        slot.insert(weight);
                    }
                    Entry::Occupied(_) => return Err(ChunkError::DuplicateCell { index: cell }),
                }
            }

            Ok(Self { cells, max })
        }
    }

    // Callers only pass slices produced by `chunks_exact(N)` or `split_at(N)`.
    fn to_array<const N: usize>(slice: &[u8]) -> [u8; N] {
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        array
    }
}
