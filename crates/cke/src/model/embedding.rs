use std::ops::Range;

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration for an embedding table whose row 0 is padding.
#[derive(Config, Debug)]
pub struct PaddedEmbeddingConfig {
    /// Number of rows, padding row included.
    pub num_embeddings: usize,
    /// Row dimension.
    pub dim: usize,
}

/// Embedding table with a padding row at index 0.
///
/// Looking up id 0 yields a zero vector and contributes no gradient to the
/// table, so padding never moves during training.
#[derive(Module, Debug)]
pub struct PaddedEmbedding<B: Backend> {
    /// Table, shape `(num_embeddings, dim)`. Xavier-normal initialized, row 0 zeroed.
    pub(crate) weight: Param<Tensor<B, 2>>,
}

impl PaddedEmbeddingConfig {
    /// Initialize the table.
    ///
    /// Rows are drawn from `Normal(0, sqrt(2 / (num_embeddings + dim)))`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PaddedEmbedding<B> {
        let std_dev = (2.0 / (self.num_embeddings + self.dim) as f64).sqrt();
        let weight = Tensor::random(
            [self.num_embeddings, self.dim],
            Distribution::Normal(0.0, std_dev),
            device,
        );
        let weight = weight.slice_assign([0..1, 0..self.dim], Tensor::zeros([1, self.dim], device));

        PaddedEmbedding {
            weight: Param::from_tensor(weight),
        }
    }
}

impl<B: Backend> PaddedEmbedding<B> {
    /// Build a table from an explicit weight matrix.
    pub fn from_weight(weight: Tensor<B, 2>) -> Self {
        Self {
            weight: Param::from_tensor(weight),
        }
    }

    /// Number of rows, padding included.
    pub fn num_embeddings(&self) -> usize {
        self.weight.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.weight.dims()[1]
    }

    /// Look up `(batch,)` ids, returning `(batch, dim)`.
    pub fn forward(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let mask = ids.clone().not_equal_elem(0).float().unsqueeze_dim::<2>(1);
        self.weight.val().select(0, ids) * mask
    }

    /// Look up `(batch, n)` ids, returning `(batch, n, dim)`.
    pub fn forward_2d(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, n] = ids.dims();
        let flat = ids.reshape([batch * n]);
        self.forward(flat).reshape([batch, n, self.dim()])
    }

    /// A contiguous range of table rows, still on the autodiff graph.
    pub fn rows(&self, range: Range<usize>) -> Tensor<B, 2> {
        let dim = self.dim();
        self.weight.val().slice([range, 0..dim])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_padding_row_zero_at_init() {
        let device = Default::default();
        let emb = PaddedEmbeddingConfig::new(10, 4).init::<TestBackend>(&device);
        assert_eq!(emb.num_embeddings(), 10);
        assert_eq!(emb.dim(), 4);
        let pad: f32 = emb.rows(0..1).abs().sum().into_scalar().elem();
        assert_eq!(pad, 0.0);
        let rest: f32 = emb.rows(1..10).abs().sum().into_scalar().elem();
        assert!(rest > 0.0);
    }

    #[test]
    fn test_lookup_masks_padding() {
        let device = Default::default();
        let weight = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[9.0_f32, 9.0], [1.0, 2.0], [3.0, 4.0]]),
            &device,
        );
        let emb = PaddedEmbedding::from_weight(weight);
        let ids = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([2_i64, 0, 1]), &device);
        let out: Vec<f32> = emb.forward(ids).into_data().to_vec().unwrap();
        // Row 0 holds garbage on purpose; the lookup must still be zero.
        assert_eq!(out, vec![3.0, 4.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_forward_2d_shape() {
        let device = Default::default();
        let emb = PaddedEmbeddingConfig::new(6, 3).init::<TestBackend>(&device);
        let ids = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::from([[1_i64, 2], [3, 0], [5, 4]]),
            &device,
        );
        let out = emb.forward_2d(ids);
        assert_eq!(out.dims(), [3, 2, 3]);
    }

    #[test]
    fn test_padding_receives_no_gradient() {
        let device = Default::default();
        let emb = PaddedEmbeddingConfig::new(4, 3).init::<TestAutodiffBackend>(&device);
        let ids = Tensor::<TestAutodiffBackend, 1, Int>::from_data(
            TensorData::from([0_i64, 1, 0, 2]),
            &device,
        );
        let loss = emb.forward(ids).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &emb);
        let grad = grads
            .get::<NdArray<f32>, 2>(emb.weight.id)
            .expect("table should have a gradient");
        let rows: Vec<f32> = grad.into_data().to_vec().unwrap();
        assert!(rows[0..3].iter().all(|&g| g == 0.0), "padding row got gradient: {rows:?}");
        assert!(rows[3..6].iter().all(|&g| g == 1.0));
        assert!(rows[9..12].iter().all(|&g| g == 0.0));
    }
}
