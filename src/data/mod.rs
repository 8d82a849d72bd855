/// Mini-batch feeding for CTC training
pub mod cursor;
pub mod device;
pub mod loader;
pub mod numpy_dataset;
pub mod packer;
pub mod shard;
pub mod source;
pub mod sparse;
pub mod stack;

pub use cursor::{BatchCursor, Selection};
pub use device::DeviceBatch;
pub use loader::{DatasetLoader, Feeder, OneEpoch, ShardedLoader};
pub use numpy_dataset::{DatasetMetadata, NpyCorpus};
pub use packer::{PackedBatch, SequencePacker};
pub use shard::ShardSplitter;
pub use source::{ExampleSource, InMemoryCorpus};
pub use sparse::SparseLabels;

/// Generic pull-based loader interface
pub trait BatchDataLoader {
    /// What one call yields: a batch, or one shard per device
    type Batch;

    /// Get the next batch; the feed is endless and wraps across epochs
    fn next_batch(&mut self, batch_size: Option<usize>) -> crate::Result<Self::Batch>;

    /// Restart the current epoch from a full pool
    fn reset(&mut self);

    /// Batches per epoch
    fn num_batches(&self) -> usize;
}
