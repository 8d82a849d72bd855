/// Drive two epochs of mini-batches through a loader, as a training loop would
use candle_core::Device;
use ctc_loader::data::{BatchDataLoader, InMemoryCorpus, NpyCorpus};
use ctc_loader::{DataType, Feeder, LabelVariant, LoaderConfig};
use ndarray::Array2;

/// Synthetic multi-task corpus: 37 utterances of 20..120 frames, 39-dim features
fn synthetic_corpus() -> anyhow::Result<InMemoryCorpus> {
    let n = 37;
    let inputs = (0..n)
        .map(|i| Array2::from_elem((20 + (i * 53) % 100, 39), 0.1 * i as f32))
        .collect();
    let phones = (0..n).map(|i| (0..(5 + i % 7) as i32).collect()).collect();
    let chars = (0..n).map(|i| vec![(i % 26) as i32; 3 + i % 5]).collect();
    let names = (0..n).map(|i| format!("synth_{:03}", i)).collect();
    Ok(InMemoryCorpus::new(inputs, vec![phones, chars], names)?)
}

fn run_epochs<L: BatchDataLoader>(loader: &mut L, epochs: usize) -> anyhow::Result<usize> {
    let mut steps = 0;
    for _ in 0..epochs * loader.num_batches() {
        loader.next_batch(None)?;
        steps += 1;
    }
    Ok(steps)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let corpus = match std::env::args().nth(1) {
        Some(dir) => NpyCorpus::from_directory(dir)?.load_all()?,
        None => synthetic_corpus()?,
    };
    let corpus = corpus.sorted_by_frames();

    let config = LoaderConfig {
        data_type: DataType::Train,
        variant: LabelVariant::MultiTask,
        batch_size: 4,
        num_gpu: 2,
        is_sorted: true,
        num_stack: Some(3),
        num_skip: Some(3),
        ..LoaderConfig::default()
    };

    log::info!("Loader configuration: {:#?}", config);

    let devices = vec![Device::Cpu; config.num_gpu];
    match Feeder::from_config(config, corpus, &devices)? {
        Feeder::Single(mut loader) => {
            log::info!("Batches per epoch: {}", loader.num_batches());
            let batch = loader.next_batch(None)?;
            log::info!(
                "First batch: inputs {:?}, {} sparse main labels",
                batch.inputs.dim(),
                batch.sparse_labels(-1)[0].nnz()
            );
            let steps = run_epochs(&mut loader, 2)?;
            log::info!("Fed {} steps, {} epochs complete", steps, loader.epoch());
        }
        Feeder::Sharded(mut sharded) => {
            log::info!(
                "Batches per epoch: {} across {} devices (input_size={})",
                sharded.num_batches(),
                sharded.devices().len(),
                sharded.loader().input_size()
            );
            let shards = sharded.next_on_devices(None)?;
            for (i, shard) in shards.iter().enumerate() {
                log::info!("Shard {}: inputs {:?}, names {:?}", i, shard.inputs.dims(), shard.input_names);
            }
            let steps = run_epochs(&mut sharded, 2)?;
            log::info!("Fed {} steps, {} epochs complete", steps, sharded.loader().epoch());
        }
    }

    Ok(())
}
