/// Utility functions for the loaders
use std::path::Path;

/// Utterance name for a feature file: its basename cut at the first `.`
///
/// `/data/train/fadg0_sa1.input.npy` becomes `fadg0_sa1`.
pub fn input_name<P: AsRef<Path>>(path: P) -> String {
    let base = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match base.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base,
    }
}

/// Number of `next_batch` calls covering one epoch
pub fn batches_per_epoch(data_num: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    data_num.div_ceil(batch_size)
}
