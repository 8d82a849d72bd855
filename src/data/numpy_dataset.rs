/// NumPy corpus: utterance features and labels stored as one .npy file each
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, CowArray, Ix2};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};

use super::source::{missing_index, ExampleSource, InMemoryCorpus};
use crate::utils::input_name;

/// Manifest read from `dataset.json`
///
/// Paths are relative to the manifest's directory. `labels` is stream-major:
/// one list of label files per stream. `frames`, when present, holds each
/// input's frame count so the corpus can be length-sorted without reading it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub input_size: usize,
    #[serde(default)]
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
    pub inputs: Vec<String>,
    pub labels: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<usize>>,
}

/// Corpus read lazily from disk: every access loads the example's files
pub struct NpyCorpus {
    input_paths: Vec<PathBuf>,
    label_paths: Vec<Vec<PathBuf>>, // [stream][example]
    names: Vec<String>,
    input_size: Option<usize>,
    frames: Option<Vec<usize>>,
}

fn open(path: &Path) -> crate::Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        crate::LoaderError::CorpusInconsistency(format!("cannot open {:?}: {}", path, e))
    })
}

fn malformed(path: &Path, e: impl std::fmt::Display) -> crate::LoaderError {
    crate::LoaderError::CorpusInconsistency(format!("failed to read {:?}: {}", path, e))
}

/// Read a `[frames, input_size]` feature matrix (f32, or f64 cast down)
fn read_input(path: &Path) -> crate::Result<Array2<f32>> {
    match <Array2<f32> as ReadNpyExt>::read_npy(open(path)?) {
        Ok(input) => Ok(input),
        Err(_) => {
            let input = <Array2<f64> as ReadNpyExt>::read_npy(open(path)?)
                .map_err(|e| malformed(path, e))?;
            Ok(input.mapv(|x| x as f32))
        }
    }
}

/// Read a 1-D label id vector (i32, or i64 as numpy saves by default)
fn read_labels(path: &Path) -> crate::Result<Vec<i32>> {
    match <Array1<i32> as ReadNpyExt>::read_npy(open(path)?) {
        Ok(labels) => Ok(labels.to_vec()),
        Err(_) => {
            let labels = <Array1<i64> as ReadNpyExt>::read_npy(open(path)?)
                .map_err(|e| malformed(path, e))?;
            labels
                .iter()
                .map(|&x| i32::try_from(x).map_err(|e| malformed(path, e)))
                .collect()
        }
    }
}

impl NpyCorpus {
    /// Build from explicit file lists
    ///
    /// The feature dimension is taken from the first input file.
    pub fn new(input_paths: Vec<PathBuf>, label_paths: Vec<Vec<PathBuf>>) -> crate::Result<Self> {
        let input_size = match input_paths.first() {
            Some(first) => Some(read_input(first)?.ncols()),
            None => None,
        };
        Self::with_input_size(input_paths, label_paths, input_size)
    }

    fn with_input_size(
        input_paths: Vec<PathBuf>,
        label_paths: Vec<Vec<PathBuf>>,
        input_size: Option<usize>,
    ) -> crate::Result<Self> {
        if label_paths.is_empty() {
            return Err(crate::LoaderError::CorpusInconsistency(
                "at least one label stream is required".to_string(),
            ));
        }
        for (stream, paths) in label_paths.iter().enumerate() {
            if paths.len() != input_paths.len() {
                return Err(crate::LoaderError::CorpusInconsistency(format!(
                    "label stream {} lists {} files, inputs list {}",
                    stream,
                    paths.len(),
                    input_paths.len()
                )));
            }
        }

        let names = input_paths.iter().map(input_name).collect();

        Ok(Self {
            input_paths,
            label_paths,
            names,
            input_size,
            frames: None,
        })
    }

    /// Load from a directory containing `dataset.json` and the listed .npy files
    pub fn from_directory<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading NumPy corpus manifest from: {:?}", dir);

        let reader = BufReader::new(File::open(dir.join("dataset.json"))?);
        let metadata: DatasetMetadata = serde_json::from_reader(reader)?;

        if metadata.num_examples == 0 {
            log::warn!(
                "num_examples missing from dataset.json, using {}",
                metadata.inputs.len()
            );
        } else if metadata.num_examples != metadata.inputs.len() {
            return Err(crate::LoaderError::CorpusInconsistency(format!(
                "manifest declares {} examples but lists {} inputs",
                metadata.num_examples,
                metadata.inputs.len()
            )));
        }

        let input_paths = metadata.inputs.iter().map(|p| dir.join(p)).collect();
        let label_paths = metadata
            .labels
            .iter()
            .map(|stream| stream.iter().map(|p| dir.join(p)).collect())
            .collect();

        let mut corpus =
            Self::with_input_size(input_paths, label_paths, Some(metadata.input_size))?;
        if let Some(frames) = metadata.frames {
            if frames.len() != corpus.len() {
                return Err(crate::LoaderError::CorpusInconsistency(format!(
                    "manifest lists {} frame counts for {} inputs",
                    frames.len(),
                    corpus.len()
                )));
            }
            corpus.frames = Some(frames);
        }

        log::info!(
            "Corpus indexed: {} examples, input_size={}, label_streams={} ({})",
            corpus.len(),
            metadata.input_size,
            corpus.num_label_streams(),
            metadata.description
        );

        Ok(corpus)
    }

    /// Read every example into memory
    pub fn load_all(&self) -> crate::Result<InMemoryCorpus> {
        let inputs = self
            .input_paths
            .iter()
            .map(|p| read_input(p))
            .collect::<crate::Result<Vec<_>>>()?;
        let labels = self
            .label_paths
            .iter()
            .map(|stream| stream.iter().map(|p| read_labels(p)).collect())
            .collect::<crate::Result<Vec<Vec<_>>>>()?;

        log::info!("Loaded {} examples into memory", inputs.len());

        InMemoryCorpus::new(inputs, labels, self.names.clone())
    }

    /// Frame count of every example, in index order
    ///
    /// Taken from the manifest when it lists them, otherwise every input file
    /// is read once.
    pub fn frame_counts(&self) -> crate::Result<Vec<usize>> {
        if let Some(frames) = &self.frames {
            return Ok(frames.clone());
        }
        log::info!("Scanning {} inputs for frame counts", self.input_paths.len());
        self.input_paths
            .iter()
            .map(|p| read_input(p).map(|x| x.nrows()))
            .collect()
    }

    /// Reorder examples by ascending frame count (stable), without loading them
    ///
    /// Sorted-mode loaders then read utterances shortest first.
    pub fn sorted_by_frames(self) -> crate::Result<Self> {
        let frames = self.frame_counts()?;
        let mut order: Vec<usize> = (0..frames.len()).collect();
        order.sort_by_key(|&i| frames[i]);

        let permute = |paths: &[PathBuf]| -> Vec<PathBuf> {
            order.iter().map(|&i| paths[i].clone()).collect()
        };
        Ok(Self {
            input_paths: permute(self.input_paths.as_slice()),
            label_paths: self.label_paths.iter().map(|s| permute(s.as_slice())).collect(),
            names: order.iter().map(|&i| self.names[i].clone()).collect(),
            input_size: self.input_size,
            frames: Some(order.iter().map(|&i| frames[i]).collect()),
        })
    }

    /// Path of the feature file behind an index
    pub fn input_path(&self, index: usize) -> Option<&Path> {
        self.input_paths.get(index).map(PathBuf::as_path)
    }
}

impl ExampleSource for NpyCorpus {
    fn len(&self) -> usize {
        self.input_paths.len()
    }

    fn input_size(&self) -> Option<usize> {
        self.input_size
    }

    fn num_label_streams(&self) -> usize {
        self.label_paths.len()
    }

    fn input(&self, index: usize) -> crate::Result<CowArray<'_, f32, Ix2>> {
        let path = self
            .input_paths
            .get(index)
            .ok_or_else(|| missing_index(index, self.len()))?;
        Ok(CowArray::from(read_input(path)?))
    }

    fn labels(&self, index: usize, stream: usize) -> crate::Result<Cow<'_, [i32]>> {
        let path = self
            .label_paths
            .get(stream)
            .and_then(|paths| paths.get(index))
            .ok_or_else(|| missing_index(index, self.len()))?;
        Ok(Cow::Owned(read_labels(path)?))
    }

    fn name(&self, index: usize) -> crate::Result<Cow<'_, str>> {
        self.names
            .get(index)
            .map(|n| Cow::Borrowed(n.as_str()))
            .ok_or_else(|| missing_index(index, self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_deserialization() {
        let json = r#"{
            "input_size": 123,
            "description": "timit train",
            "inputs": ["a.npy", "b.npy"],
            "labels": [["a.phone61.npy", "b.phone61.npy"], ["a.char.npy", "b.char.npy"]]
        }"#;

        let metadata: DatasetMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.input_size, 123);
        assert_eq!(metadata.num_examples, 0);
        assert_eq!(metadata.labels.len(), 2);
        assert_eq!(metadata.labels[1][0], "a.char.npy");
    }

    #[test]
    fn test_missing_file_is_inconsistency() {
        let corpus = NpyCorpus::with_input_size(
            vec![PathBuf::from("/nonexistent/utt1.npy")],
            vec![vec![PathBuf::from("/nonexistent/utt1.label.npy")]],
            Some(4),
        )
        .unwrap();

        assert_eq!(corpus.name(0).unwrap(), "utt1");
        assert!(matches!(
            corpus.input(0),
            Err(crate::LoaderError::CorpusInconsistency(_))
        ));
        assert!(matches!(
            corpus.labels(0, 0),
            Err(crate::LoaderError::CorpusInconsistency(_))
        ));
    }

    #[test]
    fn test_manifest_frames_sort_without_reading() {
        let mut corpus = NpyCorpus::with_input_size(
            vec![
                PathBuf::from("/nonexistent/long.npy"),
                PathBuf::from("/nonexistent/short.npy"),
                PathBuf::from("/nonexistent/mid.npy"),
            ],
            vec![vec![
                PathBuf::from("/nonexistent/long.l.npy"),
                PathBuf::from("/nonexistent/short.l.npy"),
                PathBuf::from("/nonexistent/mid.l.npy"),
            ]],
            Some(4),
        )
        .unwrap();
        corpus.frames = Some(vec![90, 10, 40]);

        let sorted = corpus.sorted_by_frames().unwrap();
        assert_eq!(sorted.frame_counts().unwrap(), vec![10, 40, 90]);
        assert_eq!(sorted.name(0).unwrap(), "short");
        assert_eq!(sorted.name(2).unwrap(), "long");
        assert_eq!(
            sorted.label_paths[0][1],
            PathBuf::from("/nonexistent/mid.l.npy")
        );
    }

    #[test]
    fn test_stream_length_mismatch_rejected() {
        let result = NpyCorpus::with_input_size(
            vec![PathBuf::from("a.npy"), PathBuf::from("b.npy")],
            vec![vec![PathBuf::from("a.l.npy")]],
            Some(1),
        );
        assert!(result.is_err());
    }
}
