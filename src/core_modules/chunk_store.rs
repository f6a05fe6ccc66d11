// THEORY:
// The `ChunkStore` owns the on-disk side of one run: a directory named after the
// run holding `chunk<N>.bin` files. Files are create-once artifacts. They are
// written whole (temp file + rename), never modified, and only removed by an
// explicit reset before a run or by cleanup after a successful merge.
//
// Writes are fatal on failure and propagate to the caller. Deletes are
// best-effort: a file that cannot be removed is logged and skipped.

use crate::core_modules::chunk::chunk::Chunk;
use crate::error::{FinalizeError, StorageError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DIR_PREFIX: &str = "CHUNK_";
const FILE_PREFIX: &str = "chunk";
const FILE_EXTENSION: &str = ".bin";
const STAGING_SUFFIX: &str = ".tmp";

/// A persisted chunk file, identified by its sequential index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHandle {
    pub index: u32,
    pub path: PathBuf,
}

impl ChunkHandle {
    /// Reads and decodes the chunk file.
    pub fn load(&self) -> Result<Chunk, FinalizeError> {
        let bytes = fs::read(&self.path).map_err(|source| StorageError::Read {
            path: self.path.clone(),
            source,
        })?;
        Chunk::deserialize(&bytes).map_err(|source| FinalizeError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

/// The storage area of a single named run.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    directory: PathBuf,
}

impl ChunkStore {
    pub fn new(storage_root: &Path, run_name: &str) -> Self {
        Self {
            directory: storage_root.join(format!("{DIR_PREFIX}{run_name}")),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn chunk_path(&self, index: u32) -> PathBuf {
        self.directory
            .join(format!("{FILE_PREFIX}{index}{FILE_EXTENSION}"))
    }

    /// Discards every chunk file left behind by an earlier run with this name.
    pub fn reset(&self) -> usize {
        self.remove_all("reset")
    }

    /// Writes `chunk` as file `index`, creating the storage area if needed.
    pub fn flush(&self, chunk: &Chunk, index: u32) -> Result<ChunkHandle, StorageError> {
        fs::create_dir_all(&self.directory).map_err(|source| StorageError::CreateDir {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.chunk_path(index);
        let staging = self
            .directory
            .join(format!("{FILE_PREFIX}{index}{FILE_EXTENSION}{STAGING_SUFFIX}"));
        let bytes = chunk.serialize();

        fs::write(&staging, &bytes).map_err(|source| StorageError::Write {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(index, cells = chunk.len(), bytes = bytes.len(), path = %path.display(), "chunk written");
        Ok(ChunkHandle { index, path })
    }

    /// Every chunk file of this run, ordered by index. A missing storage area is an empty run.
    pub fn list_chunks(&self) -> Result<Vec<ChunkHandle>, StorageError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::List {
                    path: self.directory.clone(),
                    source,
                });
            }
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::List {
                path: self.directory.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_chunk_index) {
                handles.push(ChunkHandle {
                    index,
                    path: entry.path(),
                });
            }
        }

        handles.sort_by_key(|handle| handle.index);
        Ok(handles)
    }

    /// Removes every chunk file once the merge has consumed them.
    pub fn delete_all(&self) -> usize {
        self.remove_all("cleanup")
    }

    /// Removes chunk files and any staging files an interrupted flush left behind.
    fn remove_all(&self, reason: &'static str) -> usize {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(err) => {
                warn!(reason, path = %self.directory.display(), error = %err, "could not enumerate chunk files");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_str().is_some_and(is_chunk_artifact) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(reason, path = %path.display(), error = %err, "failed to delete chunk file")
                }
            }
        }
        removed
    }
}

fn parse_chunk_index(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .parse()
        .ok()
}

/// A finished chunk file or the staging file of one.
fn is_chunk_artifact(name: &str) -> bool {
    parse_chunk_index(name.strip_suffix(STAGING_SUFFIX).unwrap_or(name)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk_with(cells: &[(u32, f64)]) -> Chunk {
        let mut chunk = Chunk::new();
        for &(cell, weight) in cells {
            chunk.accumulate(cell, weight);
        }
        chunk
    }

    #[test]
    fn parses_only_chunk_file_names() {
        assert_eq!(parse_chunk_index("chunk0.bin"), Some(0));
        assert_eq!(parse_chunk_index("chunk12.bin"), Some(12));
        assert_eq!(parse_chunk_index("chunk3.bin.tmp"), None);
        assert!(is_chunk_artifact("chunk3.bin.tmp"));
        assert!(is_chunk_artifact("chunk3.bin"));
        assert!(!is_chunk_artifact("notes.tmp"));
        assert_eq!(parse_chunk_index("notes.txt"), None);
        assert_eq!(parse_chunk_index("chunk-1.bin"), None);
    }

    #[test]
    fn flush_creates_directory_and_file() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "RUN");
        let handle = store.flush(&chunk_with(&[(1, 0.5)]), 0).expect("flush");

        assert_eq!(handle.path, root.path().join("CHUNK_RUN").join("chunk0.bin"));
        assert!(handle.path.exists());
        let loaded = handle.load().expect("load");
        assert_eq!(loaded.get(1), 0.5);
    }

    #[test]
    fn list_is_ordered_by_numeric_index() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "RUN");
        for index in [10, 2, 0, 1] {
            store.flush(&chunk_with(&[(index, 1.0)]), index).expect("flush");
        }
        fs::write(store.directory().join("README"), b"ignored").expect("write");

        let indices: Vec<u32> = store
            .list_chunks()
            .expect("list")
            .into_iter()
            .map(|handle| handle.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "NEVER_WRITTEN");
        assert!(store.list_chunks().expect("list").is_empty());
        assert_eq!(store.reset(), 0);
    }

    #[test]
    fn reset_and_delete_all_remove_chunk_files_only() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "RUN");
        store.flush(&chunk_with(&[(0, 1.0)]), 0).expect("flush");
        store.flush(&chunk_with(&[(1, 1.0)]), 1).expect("flush");
        let other = store.directory().join("keep.txt");
        fs::write(&other, b"x").expect("write");

        assert_eq!(store.reset(), 2);
        assert!(store.list_chunks().expect("list").is_empty());
        assert!(other.exists());

        store.flush(&chunk_with(&[(0, 1.0)]), 0).expect("flush");
        assert_eq!(store.delete_all(), 1);
    }

    #[test]
    fn reset_removes_staging_files_from_an_interrupted_flush() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "RUN");
        store.flush(&chunk_with(&[(0, 1.0)]), 0).expect("flush");
        let staging = store.directory().join("chunk3.bin.tmp");
        fs::write(&staging, [0u8; 5]).expect("write");
        let other = store.directory().join("notes.tmp");
        fs::write(&other, b"x").expect("write");

        assert_eq!(store.list_chunks().expect("list").len(), 1);
        assert_eq!(store.reset(), 2);
        assert!(!staging.exists());
        assert!(other.exists());
        assert_eq!(fs::read_dir(store.directory()).expect("dir").count(), 1);
    }

    #[test]
    fn runs_do_not_share_storage() {
        let root = tempdir().expect("tempdir");
        let a = ChunkStore::new(root.path(), "A");
        let b = ChunkStore::new(root.path(), "B");
        a.flush(&chunk_with(&[(0, 1.0)]), 0).expect("flush");
        assert!(b.list_chunks().expect("list").is_empty());
        b.reset();
        assert_eq!(a.list_chunks().expect("list").len(), 1);
    }

    #[test]
    fn corrupt_file_fails_to_load() {
        let root = tempdir().expect("tempdir");
        let store = ChunkStore::new(root.path(), "RUN");
        fs::create_dir_all(store.directory()).expect("mkdir");
        fs::write(store.chunk_path(0), [0u8; 11]).expect("write");

        let handle = &store.list_chunks().expect("list")[0];
        assert!(matches!(handle.load(), Err(FinalizeError::Corrupt { .. })));
    }
}
