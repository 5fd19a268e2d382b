pub mod pool;

pub use pool::{chunk_filename, ChunkPool, RangeSelection};
