/// Example sources: resolve a dataset index to its features, labels and name
use std::borrow::Cow;

use ndarray::{Array2, CowArray, Ix2};

/// Random-access view over one dataset partition
///
/// Implementations must report missing or malformed data as
/// `LoaderError::CorpusInconsistency` instead of skipping the example, so that
/// inputs and labels never drift out of alignment.
pub trait ExampleSource {
    /// Number of examples (`data_num`)
    fn len(&self) -> usize;

    /// Whether the partition is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature dimension shared by every input, `None` until known
    fn input_size(&self) -> Option<usize>;

    /// Label streams per example: 1 for single-task, 2 for multi-task
    fn num_label_streams(&self) -> usize;

    /// Input features `[frames, input_size]`
    fn input(&self, index: usize) -> crate::Result<CowArray<'_, f32, Ix2>>;

    /// Label ids of one stream
    fn labels(&self, index: usize, stream: usize) -> crate::Result<Cow<'_, [i32]>>;

    /// Source utterance name, for traceability only
    fn name(&self, index: usize) -> crate::Result<Cow<'_, str>>;
}

pub(crate) fn missing_index(index: usize, len: usize) -> crate::LoaderError {
    crate::LoaderError::CorpusInconsistency(format!(
        "index {} resolves to no data ({} examples)",
        index, len
    ))
}

/// A partition held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryCorpus {
    inputs: Vec<Array2<f32>>,
    labels: Vec<Vec<Vec<i32>>>, // [stream][example]
    names: Vec<String>,
    input_size: Option<usize>,
}

impl InMemoryCorpus {
    /// Build from per-example inputs, label streams and names
    ///
    /// `labels` is stream-major: `labels[stream][example]`.
    pub fn new(
        inputs: Vec<Array2<f32>>,
        labels: Vec<Vec<Vec<i32>>>,
        names: Vec<String>,
    ) -> crate::Result<Self> {
        if labels.is_empty() {
            return Err(crate::LoaderError::CorpusInconsistency(
                "at least one label stream is required".to_string(),
            ));
        }

        for (stream, stream_labels) in labels.iter().enumerate() {
            if stream_labels.len() != inputs.len() {
                return Err(crate::LoaderError::CorpusInconsistency(format!(
                    "label stream {} has {} examples, inputs have {}",
                    stream,
                    stream_labels.len(),
                    inputs.len()
                )));
            }
        }

        if names.len() != inputs.len() {
            return Err(crate::LoaderError::CorpusInconsistency(format!(
                "{} names for {} inputs",
                names.len(),
                inputs.len()
            )));
        }

        let input_size = inputs.first().map(|x| x.ncols());
        if let Some(size) = input_size {
            if let Some((i, x)) = inputs.iter().enumerate().find(|(_, x)| x.ncols() != size) {
                return Err(crate::LoaderError::CorpusInconsistency(format!(
                    "input {} ({}) has feature dim {}, expected {}",
                    i,
                    names[i],
                    x.ncols(),
                    size
                )));
            }
        }

        Ok(Self {
            inputs,
            labels,
            names,
            input_size,
        })
    }

    /// Single-task corpus with names `utt0000`, `utt0001`, ...
    pub fn from_single(inputs: Vec<Array2<f32>>, labels: Vec<Vec<i32>>) -> crate::Result<Self> {
        let names = (0..inputs.len()).map(|i| format!("utt{:04}", i)).collect();
        Self::new(inputs, vec![labels], names)
    }

    /// Reorder examples by ascending frame count (stable)
    ///
    /// Sorted-mode loaders hand out indices in ascending order, so after this
    /// call they also hand out utterances shortest first.
    pub fn sorted_by_frames(self) -> Self {
        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        order.sort_by_key(|&i| self.inputs[i].nrows());

        let Self {
            inputs,
            labels,
            names,
            input_size,
        } = self;

        let mut inputs: Vec<Option<Array2<f32>>> = inputs.into_iter().map(Some).collect();
        let mut names: Vec<Option<String>> = names.into_iter().map(Some).collect();
        let mut labels: Vec<Vec<Option<Vec<i32>>>> = labels
            .into_iter()
            .map(|s| s.into_iter().map(Some).collect())
            .collect();

        Self {
            inputs: order.iter().filter_map(|&i| inputs[i].take()).collect(),
            labels: labels
                .iter_mut()
                .map(|s| order.iter().filter_map(|&i| s[i].take()).collect())
                .collect(),
            names: order.iter().filter_map(|&i| names[i].take()).collect(),
            input_size,
        }
    }

    /// Frame count of every example, in index order
    pub fn frame_counts(&self) -> Vec<usize> {
        self.inputs.iter().map(|x| x.nrows()).collect()
    }
}

impl ExampleSource for InMemoryCorpus {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn input_size(&self) -> Option<usize> {
        self.input_size
    }

    fn num_label_streams(&self) -> usize {
        self.labels.len()
    }

    fn input(&self, index: usize) -> crate::Result<CowArray<'_, f32, Ix2>> {
        self.inputs
            .get(index)
            .map(|x| CowArray::from(x.view()))
            .ok_or_else(|| missing_index(index, self.inputs.len()))
    }

    fn labels(&self, index: usize, stream: usize) -> crate::Result<Cow<'_, [i32]>> {
        let stream_labels = self.labels.get(stream).ok_or_else(|| {
            crate::LoaderError::CorpusInconsistency(format!(
                "label stream {} requested, corpus has {}",
                stream,
                self.labels.len()
            ))
        })?;
        stream_labels
            .get(index)
            .map(|l| Cow::Borrowed(l.as_slice()))
            .ok_or_else(|| missing_index(index, self.inputs.len()))
    }

    fn name(&self, index: usize) -> crate::Result<Cow<'_, str>> {
        self.names
            .get(index)
            .map(|n| Cow::Borrowed(n.as_str()))
            .ok_or_else(|| missing_index(index, self.names.len()))
    }
}
