/// Shard splitter: divide a packed batch across devices
use ndarray::s;

use super::packer::PackedBatch;

#[derive(Debug, Clone)]
pub struct ShardSplitter {
    num_shards: usize,
}

impl ShardSplitter {
    pub fn new(num_shards: usize) -> crate::Result<Self> {
        if num_shards == 0 {
            return Err(crate::LoaderError::Configuration(
                "num_shards must be > 0".to_string(),
            ));
        }
        Ok(Self { num_shards })
    }

    /// Configured device count
    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// How many shards a batch of `batch_len` is split into
    ///
    /// The epoch's final batch uses the largest `k <= num_shards` dividing its
    /// size, so every device gets an equal, non-empty shard (`k = 1` always
    /// works). Other batches use the configured count.
    pub fn shard_count(&self, batch_len: usize, epoch_end: bool) -> usize {
        if epoch_end {
            (1..=self.num_shards)
                .rev()
                .find(|k| batch_len % k == 0)
                .unwrap_or(1)
        } else {
            self.num_shards.min(batch_len).max(1)
        }
    }

    /// Split along the batch axis using the rebalanced shard count
    pub fn split_batch(&self, batch: &PackedBatch, epoch_end: bool) -> Vec<PackedBatch> {
        let k = self.shard_count(batch.len(), epoch_end);
        if k != self.num_shards {
            log::debug!(
                "Rebalanced batch of {} across {} shards (configured {})",
                batch.len(),
                k,
                self.num_shards
            );
        }
        split(batch, k)
    }
}

/// Split every field of `batch` into `num_shards` contiguous, near-equal pieces
///
/// The first `len % num_shards` shards carry one extra row. Padded widths stay
/// those of the parent batch. The count is capped at the batch length, so no
/// shard comes out empty.
pub fn split(batch: &PackedBatch, num_shards: usize) -> Vec<PackedBatch> {
    let len = batch.len();
    let num_shards = num_shards.clamp(1, len.max(1));
    let base = len / num_shards;
    let extra = len % num_shards;

    let mut shards = Vec::with_capacity(num_shards);
    let mut start = 0;
    for shard in 0..num_shards {
        let end = start + base + usize::from(shard < extra);
        shards.push(PackedBatch {
            inputs: batch.inputs.slice(s![start..end, .., ..]).to_owned(),
            labels: batch
                .labels
                .iter()
                .map(|l| l.slice(s![start..end, ..]).to_owned())
                .collect(),
            inputs_seq_len: batch.inputs_seq_len.slice(s![start..end]).to_owned(),
            labels_seq_len: batch.labels_seq_len.as_ref().map(|streams| {
                streams
                    .iter()
                    .map(|l| l.slice(s![start..end]).to_owned())
                    .collect()
            }),
            input_names: batch.input_names[start..end].to_vec(),
        });
        start = end;
    }
    shards
}
