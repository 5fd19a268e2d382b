use rand::Rng;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use voxload_core::{AudioChunk, ChunkSelection, PoolError};

/// On-disk name of the chunk with the given index, e.g. `chunk_007.webm`.
pub fn chunk_filename(index: u32) -> String {
    format!("chunk_{index:03}.webm")
}

/// Result of a random range pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSelection {
    pub selection: ChunkSelection,
    /// Set when the pool held fewer than `min_count` chunks and the whole
    /// pool was returned instead.
    pub degraded: bool,
}

/// Immutable set of pre-recorded audio chunks, loaded once at startup and
/// shared read-only between all virtual users.
#[derive(Debug, Default)]
pub struct ChunkPool {
    chunks: Vec<Arc<AudioChunk>>,
}

impl ChunkPool {
    /// Scan `directory` for `chunk_<NNN>.webm` over the index window.
    /// Missing files are skipped; any other read error aborts the load.
    pub fn load(directory: &Path, window: RangeInclusive<u32>) -> Result<Self, PoolError> {
        if !directory.is_dir() {
            return Err(PoolError::Directory {
                path: directory.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut chunks = Vec::new();
        for index in window {
            let filename = chunk_filename(index);
            let path = directory.join(&filename);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    tracing::debug!(index, bytes = bytes.len(), "loaded {filename}");
                    chunks.push(Arc::new(AudioChunk {
                        index,
                        bytes,
                        filename,
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(PoolError::ChunkRead { path, source }),
            }
        }

        Ok(Self { chunks })
    }

    pub fn from_chunks(chunks: Vec<AudioChunk>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.bytes.len()).sum()
    }

    /// Pick a contiguous sub-range with `count` in `[min_count, min(max_count, len)]`.
    ///
    /// A pool smaller than `min_count` degrades to the full pool and flags
    /// the result so the caller can warn and proceed.
    pub fn select_random_range<R: Rng + ?Sized>(
        &self,
        min_count: usize,
        max_count: usize,
        rng: &mut R,
    ) -> RangeSelection {
        let size = self.chunks.len();
        if size < min_count {
            return RangeSelection {
                selection: ChunkSelection {
                    start_index: 0,
                    count: size,
                },
                degraded: true,
            };
        }

        let upper = max_count.min(size).max(min_count);
        let count = rng.gen_range(min_count..=upper);
        let start_index = rng.gen_range(0..=size - count);

        RangeSelection {
            selection: ChunkSelection { start_index, count },
            degraded: false,
        }
    }

    /// Every chunk of the pool, in index order.
    pub fn select_all(&self) -> ChunkSelection {
        ChunkSelection {
            start_index: 0,
            count: self.chunks.len(),
        }
    }

    /// The chunks covered by `selection`, clamped to the pool bounds.
    pub fn planned_chunks(&self, selection: ChunkSelection) -> Vec<Arc<AudioChunk>> {
        let start = selection.start_index.min(self.chunks.len());
        let end = selection.end().min(self.chunks.len());
        self.chunks[start..end].to_vec()
    }
}
