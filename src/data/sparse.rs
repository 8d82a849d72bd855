/// Sparse (COO) encoding of sentinel-padded CTC labels
use ndarray::Array2;

use super::packer::PackedBatch;

/// Labels as `(indices, values, dense_shape)`, the layout CTC losses consume
///
/// Only built from a padded array, so every index lies inside `dense_shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseLabels {
    indices: Vec<[i64; 2]>,
    values: Vec<i32>,
    dense_shape: [i64; 2],
}

impl SparseLabels {
    /// Encode a padded label array, reading each row up to its first pad value
    pub fn from_padded(labels: &Array2<i32>, pad_value: i32) -> Self {
        let mut indices = Vec::new();
        let mut values = Vec::new();
        let mut max_len = 0usize;

        for (row, label) in labels.outer_iter().enumerate() {
            let len = label
                .iter()
                .position(|&id| id == pad_value)
                .unwrap_or(label.len());
            for (col, &id) in label.iter().take(len).enumerate() {
                indices.push([row as i64, col as i64]);
                values.push(id);
            }
            max_len = max_len.max(len);
        }

        Self {
            indices,
            values,
            dense_shape: [labels.nrows() as i64, max_len as i64],
        }
    }

    /// Decode back into a dense array padded with `pad_value`
    pub fn to_padded(&self, pad_value: i32) -> Array2<i32> {
        let shape = (self.dense_shape[0] as usize, self.dense_shape[1] as usize);
        let mut dense = Array2::from_elem(shape, pad_value);
        for (&[row, col], &id) in self.indices.iter().zip(&self.values) {
            dense[[row as usize, col as usize]] = id;
        }
        dense
    }

    /// `(row, column)` of every real label, row-major
    pub fn indices(&self) -> &[[i64; 2]] {
        &self.indices
    }

    /// Label ids, parallel to `indices`
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// `[batch_size, longest true label length]`
    pub fn dense_shape(&self) -> [i64; 2] {
        self.dense_shape
    }

    /// Number of real labels across the batch
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl PackedBatch {
    /// Sparse encoding of every label stream, cut at `pad_value`
    pub fn sparse_labels(&self, pad_value: i32) -> Vec<SparseLabels> {
        self.labels
            .iter()
            .map(|labels| SparseLabels::from_padded(labels, pad_value))
            .collect()
    }
}
