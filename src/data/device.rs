/// Materialise packed batches as candle tensors on a device
use candle_core::{Device, Tensor};
use ndarray::{Array1, Array2};

use super::packer::PackedBatch;

/// A `PackedBatch` living on a compute device
#[derive(Debug, Clone)]
pub struct DeviceBatch {
    /// `[B, T_max, F]` f32
    pub inputs: Tensor,
    /// `[B, L_max]` i64 per label stream
    pub labels: Vec<Tensor>,
    /// `[B]` u32
    pub inputs_seq_len: Tensor,
    /// `[B]` u32 per label stream (Plain variant only)
    pub labels_seq_len: Option<Vec<Tensor>>,
    pub input_names: Vec<String>,
}

fn labels_tensor(labels: &Array2<i32>, device: &Device) -> candle_core::Result<Tensor> {
    let data: Vec<i64> = labels.iter().map(|&id| id as i64).collect();
    Tensor::from_vec(data, labels.dim(), device)
}

fn lengths_tensor(lengths: &Array1<i32>, device: &Device) -> candle_core::Result<Tensor> {
    let data: Vec<u32> = lengths.iter().map(|&len| len as u32).collect();
    Tensor::from_vec(data, lengths.len(), device)
}

impl PackedBatch {
    /// Copy the batch onto `device`
    pub fn to_device(&self, device: &Device) -> crate::Result<DeviceBatch> {
        let inputs = Tensor::from_vec(
            self.inputs.iter().copied().collect::<Vec<f32>>(),
            self.inputs.dim(),
            device,
        )?;

        let labels = self
            .labels
            .iter()
            .map(|l| labels_tensor(l, device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let labels_seq_len = match &self.labels_seq_len {
            Some(streams) => Some(
                streams
                    .iter()
                    .map(|l| lengths_tensor(l, device))
                    .collect::<candle_core::Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(DeviceBatch {
            inputs,
            labels,
            inputs_seq_len: lengths_tensor(&self.inputs_seq_len, device)?,
            labels_seq_len,
            input_names: self.input_names.clone(),
        })
    }
}
