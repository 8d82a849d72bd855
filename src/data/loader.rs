/// Dataset loaders: cursor + packer (+ splitter) wired into a pull-based feed
use candle_core::Device;

use super::cursor::BatchCursor;
use super::device::DeviceBatch;
use super::packer::{PackedBatch, SequencePacker};
use super::shard::ShardSplitter;
use super::source::ExampleSource;
use super::BatchDataLoader;
use crate::config::LoaderConfig;
use crate::utils::batches_per_epoch;

/// Single-device loader over one dataset partition
///
/// Every call to `next_batch` advances the epoch cursor and returns one padded
/// batch. The feed never ends: after the last batch of an epoch the cursor
/// refills and the next call starts a new epoch.
pub struct DatasetLoader<S> {
    config: LoaderConfig,
    source: S,
    cursor: BatchCursor,
    packer: SequencePacker,
}

impl<S: ExampleSource> DatasetLoader<S> {
    /// Create a loader; `source` must already know its `input_size`
    pub fn new(config: LoaderConfig, source: S) -> crate::Result<Self> {
        config.validate()?;

        if source.input_size().is_none() {
            return Err(crate::LoaderError::Configuration(
                "input_size is not set; the corpus is not initialised".to_string(),
            ));
        }

        let needed = config.variant.num_streams();
        if source.num_label_streams() < needed {
            return Err(crate::LoaderError::Configuration(format!(
                "{:?} loader needs {} label streams, corpus provides {}",
                config.variant,
                needed,
                source.num_label_streams()
            )));
        }

        let cursor = BatchCursor::new(source.len(), config.data_type, config.is_sorted, config.seed)?;
        let packer = SequencePacker::from_config(&config)?;

        log::info!(
            "{:?} loader ready: data_num={}, batch_size={}, sorted={}, variant={:?}",
            config.data_type,
            source.len(),
            config.total_batch_size(),
            config.is_sorted,
            config.variant
        );

        Ok(Self {
            config,
            source,
            cursor,
            packer,
        })
    }

    /// Next mini-batch; `None` uses `batch_size * num_gpu` from the config
    pub fn next_batch(&mut self, batch_size: Option<usize>) -> crate::Result<PackedBatch> {
        self.next_batch_with_epoch_end(batch_size).map(|(batch, _)| batch)
    }

    /// Next mini-batch plus whether it was the last one of its epoch
    pub fn next_batch_with_epoch_end(
        &mut self,
        batch_size: Option<usize>,
    ) -> crate::Result<(PackedBatch, bool)> {
        let batch_size = batch_size.unwrap_or_else(|| self.config.total_batch_size());
        let selection = self.cursor.select_batch(batch_size)?;
        let batch = self.packer.pack(&selection.indices, &self.source)?;
        Ok((batch, selection.epoch_end))
    }

    /// Restart from a full epoch and iterate it exactly once
    pub fn one_epoch(&mut self) -> OneEpoch<'_, S> {
        self.cursor.reset();
        OneEpoch {
            loader: self,
            done: false,
        }
    }

    /// Abandon the current epoch; the next batch starts a fresh one
    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    /// Number of examples in the partition
    pub fn data_num(&self) -> usize {
        self.source.len()
    }

    /// Feature width of packed inputs (after frame stacking)
    pub fn input_size(&self) -> usize {
        self.packer
            .output_size(self.source.input_size().unwrap_or_default())
    }

    /// Completed epochs
    pub fn epoch(&self) -> usize {
        self.cursor.epoch()
    }

    /// Batches per epoch at the configured batch size
    pub fn num_batches(&self) -> usize {
        batches_per_epoch(self.source.len(), self.config.total_batch_size())
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: ExampleSource> Iterator for DatasetLoader<S> {
    type Item = crate::Result<PackedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch(None))
    }
}

impl<S: ExampleSource> BatchDataLoader for DatasetLoader<S> {
    type Batch = PackedBatch;

    fn next_batch(&mut self, batch_size: Option<usize>) -> crate::Result<PackedBatch> {
        DatasetLoader::next_batch(self, batch_size)
    }

    fn reset(&mut self) {
        DatasetLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        DatasetLoader::num_batches(self)
    }
}

/// Batches of exactly one epoch, for evaluation passes
pub struct OneEpoch<'a, S> {
    loader: &'a mut DatasetLoader<S>,
    done: bool,
}

impl<S: ExampleSource> Iterator for OneEpoch<'_, S> {
    type Item = crate::Result<PackedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.loader.next_batch_with_epoch_end(None) {
            Ok((batch, epoch_end)) => {
                self.done = epoch_end;
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Multi-device loader: every batch is split into one shard per device
pub struct ShardedLoader<S> {
    inner: DatasetLoader<S>,
    splitter: ShardSplitter,
    devices: Vec<Device>,
}

impl<S: ExampleSource> ShardedLoader<S> {
    /// Wrap a loader; `devices` must hold one device per configured GPU
    pub fn new(inner: DatasetLoader<S>, devices: Vec<Device>) -> crate::Result<Self> {
        if devices.is_empty() {
            return Err(crate::LoaderError::Configuration(
                "multi-device mode requires a device context".to_string(),
            ));
        }

        let num_gpu = inner.config().num_gpu;
        if devices.len() != num_gpu {
            return Err(crate::LoaderError::Configuration(format!(
                "num_gpu is {} but {} devices were supplied",
                num_gpu,
                devices.len()
            )));
        }

        Ok(Self {
            inner,
            splitter: ShardSplitter::new(num_gpu)?,
            devices,
        })
    }

    /// Next mini-batch split into per-device shards
    ///
    /// Usually one shard per device; the epoch's tail batch may use fewer.
    pub fn next_batch(&mut self, batch_size: Option<usize>) -> crate::Result<Vec<PackedBatch>> {
        let (batch, epoch_end) = self.inner.next_batch_with_epoch_end(batch_size)?;
        Ok(self.splitter.split_batch(&batch, epoch_end))
    }

    /// Next mini-batch with shard `i` copied onto device `i`
    pub fn next_on_devices(&mut self, batch_size: Option<usize>) -> crate::Result<Vec<DeviceBatch>> {
        let shards = self.next_batch(batch_size)?;
        shards
            .iter()
            .zip(&self.devices)
            .map(|(shard, device)| shard.to_device(device))
            .collect()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn loader(&self) -> &DatasetLoader<S> {
        &self.inner
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn num_batches(&self) -> usize {
        self.inner.num_batches()
    }
}

impl<S: ExampleSource> BatchDataLoader for ShardedLoader<S> {
    type Batch = Vec<PackedBatch>;

    fn next_batch(&mut self, batch_size: Option<usize>) -> crate::Result<Vec<PackedBatch>> {
        ShardedLoader::next_batch(self, batch_size)
    }

    fn reset(&mut self) {
        ShardedLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        ShardedLoader::num_batches(self)
    }
}

/// Loader chosen once from configuration
pub enum Feeder<S> {
    Single(DatasetLoader<S>),
    Sharded(ShardedLoader<S>),
}

impl<S: ExampleSource> Feeder<S> {
    /// `num_gpu == 1` gives a single-device feed, anything more a sharded one
    pub fn from_config(config: LoaderConfig, source: S, devices: &[Device]) -> crate::Result<Self> {
        let num_gpu = config.num_gpu;
        let loader = DatasetLoader::new(config, source)?;
        if num_gpu == 1 {
            Ok(Feeder::Single(loader))
        } else {
            Ok(Feeder::Sharded(ShardedLoader::new(loader, devices.to_vec())?))
        }
    }

    pub fn loader(&self) -> &DatasetLoader<S> {
        match self {
            Feeder::Single(loader) => loader,
            Feeder::Sharded(sharded) => sharded.loader(),
        }
    }
}
