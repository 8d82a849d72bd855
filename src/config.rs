/// Configuration for a dataset loader
///
/// One config describes one partition (train/dev/test) of one loader variant.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which partition a loader feeds. Only `Train` announces epoch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Train,
    Dev,
    Test,
}

/// Label layout produced by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelVariant {
    /// One label stream padded with a reserved id (e.g. `<EOS>`), lengths reported
    Plain,
    /// One label stream padded with the `-1` sentinel, sparse-encodable
    Ctc,
    /// Main + auxiliary label streams, both sentinel padded
    MultiTask,
}

impl LabelVariant {
    /// Number of label streams every example must carry
    pub fn num_streams(&self) -> usize {
        match self {
            LabelVariant::MultiTask => 2,
            LabelVariant::Plain | LabelVariant::Ctc => 1,
        }
    }

    /// Whether per-example label lengths are reported alongside the labels
    pub fn reports_label_lengths(&self) -> bool {
        matches!(self, LabelVariant::Plain)
    }
}

fn default_num_gpu() -> usize {
    1
}

fn default_is_sorted() -> bool {
    true
}

fn default_pad_value() -> i32 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Partition being fed
    pub data_type: DataType,

    /// Label layout
    pub variant: LabelVariant,

    /// Mini-batch size per device
    pub batch_size: usize,

    /// Number of devices; the effective batch is `batch_size * num_gpu`
    #[serde(default = "default_num_gpu")]
    pub num_gpu: usize,

    /// Draw indices in ascending order instead of sampling randomly
    #[serde(default = "default_is_sorted")]
    pub is_sorted: bool,

    /// Label padding value. Must never be a valid class id.
    #[serde(default = "default_pad_value")]
    pub pad_value: i32,

    /// RNG seed for random mode; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Number of frames concatenated into one stacked frame
    #[serde(default)]
    pub num_stack: Option<usize>,

    /// Hop between stacked frames
    #[serde(default)]
    pub num_skip: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            data_type: DataType::Train,
            variant: LabelVariant::Ctc,
            batch_size: 32,
            num_gpu: 1,
            is_sorted: true,
            pad_value: -1,
            seed: None,
            num_stack: None,
            num_skip: None,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::LoaderError::Configuration(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.num_gpu == 0 {
            return Err(crate::LoaderError::Configuration(
                "num_gpu must be > 0".to_string(),
            ));
        }

        // Class ids are non-negative for the sentinel-padded variants
        if self.variant != LabelVariant::Plain && self.pad_value >= 0 {
            return Err(crate::LoaderError::Configuration(format!(
                "pad_value {} may collide with class ids; use a negative sentinel",
                self.pad_value
            )));
        }

        self.frame_stacking()?;

        Ok(())
    }

    /// Effective mini-batch size across all devices
    pub fn total_batch_size(&self) -> usize {
        self.batch_size * self.num_gpu
    }

    /// Returns `(num_stack, num_skip)` when frame stacking is enabled
    pub fn frame_stacking(&self) -> crate::Result<Option<(usize, usize)>> {
        match (self.num_stack, self.num_skip) {
            (None, None) => Ok(None),
            (Some(stack), Some(skip)) => {
                if skip == 0 || stack < skip {
                    return Err(crate::LoaderError::Configuration(format!(
                        "frame stacking requires num_stack >= num_skip >= 1, got stack={} skip={}",
                        stack, skip
                    )));
                }
                Ok(Some((stack, skip)))
            }
            _ => Err(crate::LoaderError::Configuration(
                "num_stack and num_skip must be set together".to_string(),
            )),
        }
    }
}
