/// Sequence packer: ragged utterances to dense, batch-locally padded arrays
use std::borrow::Cow;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, CowArray, Ix2};

use super::source::ExampleSource;
use super::stack::stack_frames;
use crate::config::{LabelVariant, LoaderConfig};

/// A dense mini-batch
///
/// `T_max` and `L_max` are the maxima of this batch only, so the shapes vary
/// from batch to batch. Consumers mask with `inputs_seq_len` (and
/// `labels_seq_len` or the pad sentinel for labels).
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBatch {
    /// `[B, T_max, input_size]`, zero beyond each utterance's frames
    pub inputs: Array3<f32>,
    /// One `[B, L_max]` array per label stream, padded with the pad value
    pub labels: Vec<Array2<i32>>,
    /// True frame count per utterance `[B]`
    pub inputs_seq_len: Array1<i32>,
    /// True label length per utterance and stream (Plain variant only)
    pub labels_seq_len: Option<Vec<Array1<i32>>>,
    /// Source utterance names `[B]`
    pub input_names: Vec<String>,
}

impl PackedBatch {
    /// Number of utterances in the batch
    pub fn len(&self) -> usize {
        self.input_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_names.is_empty()
    }

    /// Padded frame count `T_max`
    pub fn max_frames(&self) -> usize {
        self.inputs.dim().1
    }

    /// Labels of the main (or only) task
    pub fn labels_main(&self) -> &Array2<i32> {
        &self.labels[0]
    }

    /// Labels of the auxiliary task, multi-task batches only
    pub fn labels_sub(&self) -> Option<&Array2<i32>> {
        self.labels.get(1)
    }
}

/// Builds `PackedBatch`es from dataset indices
#[derive(Debug, Clone)]
pub struct SequencePacker {
    variant: LabelVariant,
    pad_value: i32,
    frame_stacking: Option<(usize, usize)>,
}

impl SequencePacker {
    pub fn new(variant: LabelVariant, pad_value: i32, frame_stacking: Option<(usize, usize)>) -> Self {
        Self {
            variant,
            pad_value,
            frame_stacking,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> crate::Result<Self> {
        Ok(Self::new(config.variant, config.pad_value, config.frame_stacking()?))
    }

    pub fn pad_value(&self) -> i32 {
        self.pad_value
    }

    pub fn variant(&self) -> LabelVariant {
        self.variant
    }

    /// Feature width of packed inputs for a corpus of `input_size`
    pub fn output_size(&self, input_size: usize) -> usize {
        match self.frame_stacking {
            Some((num_stack, _)) => input_size * num_stack,
            None => input_size,
        }
    }

    /// Resolve `indices` against `source` and pad them into one batch
    pub fn pack<S: ExampleSource + ?Sized>(
        &self,
        indices: &[usize],
        source: &S,
    ) -> crate::Result<PackedBatch> {
        if indices.is_empty() {
            return Err(crate::LoaderError::Configuration(
                "cannot pack an empty batch".to_string(),
            ));
        }

        let input_size = source.input_size().ok_or_else(|| {
            crate::LoaderError::Configuration(
                "input_size is not set; the corpus is not initialised".to_string(),
            )
        })?;

        let num_streams = self.variant.num_streams();
        if source.num_label_streams() < num_streams {
            return Err(crate::LoaderError::Configuration(format!(
                "{:?} loader needs {} label streams, corpus provides {}",
                self.variant,
                num_streams,
                source.num_label_streams()
            )));
        }

        let mut inputs: Vec<CowArray<'_, f32, Ix2>> = Vec::with_capacity(indices.len());
        let mut input_names = Vec::with_capacity(indices.len());
        for &index in indices {
            let input = source.input(index)?;
            if input.ncols() != input_size {
                return Err(crate::LoaderError::CorpusInconsistency(format!(
                    "utterance {} has feature dim {}, expected {}",
                    index,
                    input.ncols(),
                    input_size
                )));
            }
            let input = match self.frame_stacking {
                Some((num_stack, num_skip)) => {
                    CowArray::from(stack_frames(input.view(), num_stack, num_skip))
                }
                None => input,
            };
            inputs.push(input);
            input_names.push(source.name(index)?.into_owned());
        }

        let mut streams: Vec<Vec<Cow<'_, [i32]>>> = Vec::with_capacity(num_streams);
        for stream in 0..num_streams {
            let mut labels = Vec::with_capacity(indices.len());
            for &index in indices {
                let label = source.labels(index, stream)?;
                // Sentinel-padded labels are measured by scanning for the pad value
                if self.variant != LabelVariant::Plain && label.contains(&self.pad_value) {
                    return Err(crate::LoaderError::CorpusInconsistency(format!(
                        "utterance {} stream {} contains the pad value {} as a label",
                        index, stream, self.pad_value
                    )));
                }
                labels.push(label);
            }
            streams.push(labels);
        }

        let batch_size = indices.len();
        let max_frames = inputs.iter().map(|x| x.nrows()).max().unwrap_or(0);
        let feature_dim = self.output_size(input_size);

        let mut dense_inputs = Array3::<f32>::zeros((batch_size, max_frames, feature_dim));
        let mut inputs_seq_len = Array1::<i32>::zeros(batch_size);
        for (i, input) in inputs.iter().enumerate() {
            let frames = input.nrows();
            dense_inputs.slice_mut(s![i, ..frames, ..]).assign(input);
            inputs_seq_len[i] = frames as i32;
        }

        let mut dense_labels = Vec::with_capacity(num_streams);
        let mut labels_seq_len = Vec::with_capacity(num_streams);
        for labels in &streams {
            let max_len = labels.iter().map(|l| l.len()).max().unwrap_or(0);
            let mut dense = Array2::<i32>::from_elem((batch_size, max_len), self.pad_value);
            let mut lengths = Array1::<i32>::zeros(batch_size);
            for (i, label) in labels.iter().enumerate() {
                dense
                    .slice_mut(s![i, ..label.len()])
                    .assign(&ArrayView1::from(&label[..]));
                lengths[i] = label.len() as i32;
            }
            dense_labels.push(dense);
            labels_seq_len.push(lengths);
        }

        log::debug!(
            "Packed batch: size={}, T_max={}, L_max={:?}",
            batch_size,
            max_frames,
            dense_labels.iter().map(|l| l.ncols()).collect::<Vec<_>>()
        );

        Ok(PackedBatch {
            inputs: dense_inputs,
            labels: dense_labels,
            inputs_seq_len,
            labels_seq_len: self.variant.reports_label_lengths().then_some(labels_seq_len),
            input_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::InMemoryCorpus;
    use ndarray::array;

    fn ramp(frames: usize, dim: usize) -> Array2<f32> {
        Array2::from_shape_fn((frames, dim), |(t, d)| (t * dim + d + 1) as f32)
    }

    #[test]
    fn test_input_zero_padding() {
        let corpus = InMemoryCorpus::from_single(
            vec![ramp(3, 1), ramp(5, 1), ramp(2, 1)],
            vec![vec![1], vec![2], vec![3]],
        )
        .unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);

        let batch = packer.pack(&[0, 1, 2], &corpus).unwrap();
        assert_eq!(batch.inputs.dim(), (3, 5, 1));
        assert_eq!(batch.inputs_seq_len.to_vec(), vec![3, 5, 2]);

        let row0: Vec<f32> = batch.inputs.slice(s![0, .., 0]).to_vec();
        assert_eq!(row0, vec![1.0, 2.0, 3.0, 0.0, 0.0]);
        let row2: Vec<f32> = batch.inputs.slice(s![2, .., 0]).to_vec();
        assert_eq!(row2, vec![1.0, 2.0, 0.0, 0.0, 0.0]);
        assert!(batch.labels_seq_len.is_none());
    }

    #[test]
    fn test_label_sentinel_padding() {
        let corpus = InMemoryCorpus::from_single(
            vec![ramp(2, 3), ramp(4, 3)],
            vec![vec![1, 2], vec![3]],
        )
        .unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);

        let batch = packer.pack(&[0, 1], &corpus).unwrap();
        assert_eq!(batch.labels_main(), &array![[1, 2], [3, -1]]);
        assert_eq!(batch.input_names, vec!["utt0000", "utt0001"]);
    }

    #[test]
    fn test_batch_order_follows_indices() {
        let corpus = InMemoryCorpus::from_single(
            vec![ramp(1, 1), ramp(2, 1), ramp(3, 1)],
            vec![vec![10], vec![20, 21], vec![30, 31, 32]],
        )
        .unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);

        let batch = packer.pack(&[2, 0], &corpus).unwrap();
        assert_eq!(batch.inputs_seq_len.to_vec(), vec![3, 1]);
        assert_eq!(batch.labels_main(), &array![[30, 31, 32], [10, -1, -1]]);
        assert_eq!(batch.input_names, vec!["utt0002", "utt0000"]);
    }

    #[test]
    fn test_multitask_streams_padded_independently() {
        let corpus = InMemoryCorpus::new(
            vec![ramp(2, 2), ramp(3, 2)],
            vec![
                vec![vec![1, 2, 3], vec![4]],
                vec![vec![7], vec![8, 9]],
            ],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let packer = SequencePacker::new(LabelVariant::MultiTask, -1, None);

        let batch = packer.pack(&[0, 1], &corpus).unwrap();
        assert_eq!(batch.labels.len(), 2);
        assert_eq!(batch.labels_main(), &array![[1, 2, 3], [4, -1, -1]]);
        assert_eq!(batch.labels_sub().unwrap(), &array![[7, -1], [8, 9]]);
    }

    #[test]
    fn test_plain_variant_reports_label_lengths() {
        let eos = 1;
        let corpus = InMemoryCorpus::from_single(
            vec![ramp(2, 1), ramp(2, 1)],
            vec![vec![0, 5, 6, eos], vec![0, 7, eos]],
        )
        .unwrap();
        let packer = SequencePacker::new(LabelVariant::Plain, eos, None);

        let batch = packer.pack(&[0, 1], &corpus).unwrap();
        assert_eq!(batch.labels_main(), &array![[0, 5, 6, 1], [0, 7, 1, 1]]);
        let lengths = batch.labels_seq_len.unwrap();
        assert_eq!(lengths[0].to_vec(), vec![4, 3]);
    }

    #[test]
    fn test_frame_stacking_widens_inputs() {
        let corpus =
            InMemoryCorpus::from_single(vec![ramp(5, 2), ramp(2, 2)], vec![vec![1], vec![2]])
                .unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, Some((3, 2)));

        let batch = packer.pack(&[0, 1], &corpus).unwrap();
        assert_eq!(batch.inputs.dim(), (2, 3, 6));
        assert_eq!(batch.inputs_seq_len.to_vec(), vec![3, 1]);
        assert_eq!(packer.output_size(2), 6);
    }

    #[test]
    fn test_pad_value_in_labels_is_inconsistency() {
        let corpus =
            InMemoryCorpus::from_single(vec![ramp(2, 1)], vec![vec![3, -1, 4]]).unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);
        assert!(matches!(
            packer.pack(&[0], &corpus),
            Err(crate::LoaderError::CorpusInconsistency(_))
        ));
    }

    #[test]
    fn test_uninitialised_input_size() {
        let corpus = InMemoryCorpus::from_single(vec![], vec![]).unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);
        assert!(matches!(
            packer.pack(&[0], &corpus),
            Err(crate::LoaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_index_surfaces() {
        let corpus = InMemoryCorpus::from_single(vec![ramp(2, 1)], vec![vec![1]]).unwrap();
        let packer = SequencePacker::new(LabelVariant::Ctc, -1, None);
        assert!(matches!(
            packer.pack(&[0, 3], &corpus),
            Err(crate::LoaderError::CorpusInconsistency(_))
        ));
        assert!(packer.pack(&[], &corpus).is_err());
    }

    #[test]
    fn test_variant_needs_enough_streams() {
        let corpus = InMemoryCorpus::from_single(vec![ramp(2, 1)], vec![vec![1]]).unwrap();
        let packer = SequencePacker::new(LabelVariant::MultiTask, -1, None);
        assert!(matches!(
            packer.pack(&[0], &corpus),
            Err(crate::LoaderError::Configuration(_))
        ));
    }
}
