/// Epoch cursor: which utterances go into the next mini-batch
use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::DataType;

/// Indices chosen for one mini-batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Dataset indices, in batch order
    pub indices: Vec<usize>,
    /// True when this batch drained the epoch and the pool was refilled
    pub epoch_end: bool,
}

/// Sampling-without-replacement cursor over `0..epoch_size`
///
/// Every index is handed out exactly once before any index repeats. In sorted
/// mode indices leave the pool in ascending order; otherwise they are sampled
/// uniformly at random.
pub struct BatchCursor {
    remaining: BTreeSet<usize>,
    epoch_size: usize,
    data_type: DataType,
    is_sorted: bool,
    epoch: usize,
    rng: StdRng,
}

impl BatchCursor {
    /// Create a cursor over a partition of `epoch_size` examples
    pub fn new(
        epoch_size: usize,
        data_type: DataType,
        is_sorted: bool,
        seed: Option<u64>,
    ) -> crate::Result<Self> {
        if epoch_size == 0 {
            return Err(crate::LoaderError::Configuration(
                "data_num must be > 0".to_string(),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            remaining: (0..epoch_size).collect(),
            epoch_size,
            data_type,
            is_sorted,
            epoch: 0,
            rng,
        })
    }

    /// Select the next mini-batch of indices
    ///
    /// When the pool holds no more than `batch_size` indices the whole pool is
    /// taken (a short tail batch, or a full one if the sizes line up exactly),
    /// the pool is refilled and `epoch_end` is set.
    pub fn select_batch(&mut self, batch_size: usize) -> crate::Result<Selection> {
        if batch_size == 0 {
            return Err(crate::LoaderError::Configuration(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.remaining.len() > batch_size {
            let indices: Vec<usize> = if self.is_sorted {
                self.remaining.iter().take(batch_size).copied().collect()
            } else {
                let pool: Vec<usize> = self.remaining.iter().copied().collect();
                rand::seq::index::sample(&mut self.rng, pool.len(), batch_size)
                    .into_iter()
                    .map(|i| pool[i])
                    .collect()
            };

            for index in &indices {
                self.remaining.remove(index);
            }

            return Ok(Selection {
                indices,
                epoch_end: false,
            });
        }

        let mut indices: Vec<usize> = std::mem::take(&mut self.remaining).into_iter().collect();
        if !self.is_sorted {
            // Tail comes out of the set in ascending order
            indices.shuffle(&mut self.rng);
        }

        self.reset();
        self.epoch += 1;

        if self.data_type == DataType::Train {
            log::info!("---Next epoch--- (epoch {} complete)", self.epoch);
        }

        Ok(Selection {
            indices,
            epoch_end: true,
        })
    }

    /// Refill the pool with every index, abandoning the current epoch
    pub fn reset(&mut self) {
        self.remaining = (0..self.epoch_size).collect();
    }

    /// Indices not yet handed out in the current epoch
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Number of completed epochs
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Partition size
    pub fn epoch_size(&self) -> usize {
        self.epoch_size
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::sync::Once;

    thread_local! {
        static CAPTURED: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Records messages per thread, so parallel tests do not see each other's logs
    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED.with(|c| c.borrow_mut().push(record.args().to_string()));
        }

        fn flush(&self) {}
    }

    fn epoch_notices(data_type: DataType) -> usize {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            if log::set_logger(&CaptureLogger).is_ok() {
                log::set_max_level(log::LevelFilter::Info);
            }
        });
        CAPTURED.with(|c| c.borrow_mut().clear());

        let mut cursor = BatchCursor::new(5, data_type, true, None).unwrap();
        for _ in 0..4 {
            cursor.select_batch(2).unwrap();
        }
        CAPTURED.with(|c| c.borrow().iter().filter(|m| m.contains("Next epoch")).count())
    }

    fn drain_epoch(cursor: &mut BatchCursor, batch_size: usize) -> Vec<Vec<usize>> {
        let mut batches = Vec::new();
        loop {
            let selection = cursor.select_batch(batch_size).unwrap();
            batches.push(selection.indices);
            if selection.epoch_end {
                return batches;
            }
        }
    }

    #[test]
    fn test_exhaustive_without_duplicates() {
        for &sorted in &[true, false] {
            let mut cursor = BatchCursor::new(23, DataType::Train, sorted, Some(7)).unwrap();
            let batches = drain_epoch(&mut cursor, 5);

            let seen: Vec<usize> = batches.iter().flatten().copied().collect();
            let unique: HashSet<usize> = seen.iter().copied().collect();
            assert_eq!(seen.len(), 23, "sorted={}", sorted);
            assert_eq!(unique, (0..23).collect::<HashSet<_>>());
            assert_eq!(batches.len(), 5);
            assert_eq!(batches.last().unwrap().len(), 3);
        }
    }

    #[test]
    fn test_sorted_mode_ascending_and_deterministic() {
        let run = || {
            let mut cursor = BatchCursor::new(10, DataType::Dev, true, None).unwrap();
            (0..6)
                .map(|_| cursor.select_batch(4).unwrap().indices)
                .collect::<Vec<_>>()
        };

        let first = run();
        assert_eq!(first[0], vec![0, 1, 2, 3]);
        assert_eq!(first[1], vec![4, 5, 6, 7]);
        assert_eq!(first[2], vec![8, 9]);
        assert_eq!(first[3], vec![0, 1, 2, 3]);
        assert_eq!(first, run());
    }

    #[test]
    fn test_random_mode_tail_is_complement() {
        let mut cursor = BatchCursor::new(10, DataType::Train, false, Some(42)).unwrap();

        let a = cursor.select_batch(4).unwrap();
        let b = cursor.select_batch(4).unwrap();
        let c = cursor.select_batch(4).unwrap();
        assert_eq!((a.indices.len(), b.indices.len(), c.indices.len()), (4, 4, 2));
        assert!(!a.epoch_end && !b.epoch_end && c.epoch_end);

        let taken: HashSet<usize> = a.indices.iter().chain(&b.indices).copied().collect();
        assert_eq!(taken.len(), 8);
        let complement: HashSet<usize> = (0..10).filter(|i| !taken.contains(i)).collect();
        assert_eq!(c.indices.iter().copied().collect::<HashSet<_>>(), complement);

        let d = cursor.select_batch(4).unwrap();
        assert_eq!(d.indices.len(), 4);
        assert!(!d.epoch_end);
        assert_eq!(cursor.remaining(), 6);
    }

    #[test]
    fn test_exact_multiple_flags_boundary_on_draining_batch() {
        let mut cursor = BatchCursor::new(8, DataType::Train, true, None).unwrap();

        let first = cursor.select_batch(4).unwrap();
        assert!(!first.epoch_end);

        // Pool holds exactly batch_size: full-size batch, boundary flagged now
        let second = cursor.select_batch(4).unwrap();
        assert_eq!(second.indices, vec![4, 5, 6, 7]);
        assert!(second.epoch_end);
        assert_eq!(cursor.epoch(), 1);
        assert_eq!(cursor.remaining(), 8);

        let third = cursor.select_batch(4).unwrap();
        assert_eq!(third.indices, vec![0, 1, 2, 3]);
        assert!(!third.epoch_end);
    }

    #[test]
    fn test_reset_mid_epoch_gives_full_epoch() {
        let mut cursor = BatchCursor::new(9, DataType::Train, false, Some(3)).unwrap();
        cursor.select_batch(4).unwrap();
        assert_eq!(cursor.remaining(), 5);

        cursor.reset();
        assert_eq!(cursor.remaining(), 9);
        assert_eq!(cursor.epoch(), 0);

        let batches = drain_epoch(&mut cursor, 4);
        let seen: HashSet<usize> = batches.iter().flatten().copied().collect();
        assert_eq!(seen, (0..9).collect::<HashSet<_>>());
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 9);
    }

    #[test]
    fn test_epoch_notice_only_for_train() {
        assert_eq!(epoch_notices(DataType::Train), 1);
        assert_eq!(epoch_notices(DataType::Dev), 0);
        assert_eq!(epoch_notices(DataType::Test), 0);
    }

    #[test]
    fn test_seeded_replay() {
        let mut a = BatchCursor::new(50, DataType::Train, false, Some(1234)).unwrap();
        let mut b = BatchCursor::new(50, DataType::Train, false, Some(1234)).unwrap();
        for _ in 0..20 {
            assert_eq!(a.select_batch(7).unwrap(), b.select_batch(7).unwrap());
        }
    }

    #[test]
    fn test_batch_larger_than_epoch() {
        let mut cursor = BatchCursor::new(3, DataType::Test, true, None).unwrap();
        let selection = cursor.select_batch(10).unwrap();
        assert_eq!(selection.indices, vec![0, 1, 2]);
        assert!(selection.epoch_end);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            BatchCursor::new(0, DataType::Train, true, None),
            Err(crate::LoaderError::Configuration(_))
        ));

        let mut cursor = BatchCursor::new(4, DataType::Train, true, None).unwrap();
        assert!(matches!(
            cursor.select_batch(0),
            Err(crate::LoaderError::Configuration(_))
        ));
    }
}
