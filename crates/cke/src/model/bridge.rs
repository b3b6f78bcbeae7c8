//! Conversions between plain Rust buffers and burn tensors.
//!
//! Dataset code works with `Vec<i64>` ids and the evaluation code with
//! `Vec<f32>` rows; the model works with burn tensors. Everything crossing
//! that boundary goes through here.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert a slice of ids to a 1D integer tensor.
pub fn ids_to_tensor<B: Backend>(ids: &[i64], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(TensorData::new(ids.to_vec(), [ids.len()]), device)
}

/// Convert a row-major `[rows, cols]` id buffer to a 2D integer tensor.
///
/// # Panics
/// Panics if `ids.len() != rows * cols`.
pub fn ids_to_tensor_2d<B: Backend>(
    ids: Vec<i64>,
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    assert_eq!(
        ids.len(),
        rows * cols,
        "id buffer has {} entries, expected {rows}x{cols}",
        ids.len()
    );
    Tensor::from_data(TensorData::new(ids, [rows, cols]), device)
}

/// Extract a single f64 scalar from a burn 1D tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}

/// Extract the rows of a 2D tensor as `Vec<Vec<f32>>`.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    let flat = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default();
    if cols == 0 {
        return Vec::new();
    }
    flat.chunks(cols).map(|row| row.to_vec()).collect()
}
