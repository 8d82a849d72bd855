//! CTC mini-batch loader
//!
//! The data-feeding engine behind multi-task CTC speech recognition training:
//! it decides which utterances go into each mini-batch, pads the ragged
//! feature and label sequences into dense arrays, and optionally splits every
//! batch across several devices.
//!
//! # Pipeline
//!
//! - **BatchCursor**: epoch-cycling index selection, sorted or random
//! - **SequencePacker**: batch-local zero/sentinel padding
//! - **ShardSplitter**: per-device slicing with epoch-tail rebalancing
//!
//! # Example
//!
//! ```ignore
//! use ctc_loader::{LoaderConfig, data::{InMemoryCorpus, DatasetLoader}};
//!
//! let config = LoaderConfig { batch_size: 32, ..LoaderConfig::default() };
//! let mut loader = DatasetLoader::new(config, corpus.sorted_by_frames())?;
//! let batch = loader.next_batch(None)?;
//! ```

pub mod config;
pub mod data;
pub mod utils;

// Re-export commonly used items
pub use config::{DataType, LabelVariant, LoaderConfig};
pub use data::{DatasetLoader, Feeder, PackedBatch, ShardedLoader};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corpus inconsistency: {0}")]
    CorpusInconsistency(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;
