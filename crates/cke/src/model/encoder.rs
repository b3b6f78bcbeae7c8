//! Item tower of the CKE model.

use burn::prelude::*;

use crate::model::embedding::{PaddedEmbedding, PaddedEmbeddingConfig};

/// Configuration for the CKE item encoder.
#[derive(Config, Debug)]
pub struct CkeItemEncoderConfig {
    /// Item table size, padding included.
    pub num_items: usize,
    /// Entity table size, padding included. Must be `>= num_items`.
    pub num_entities: usize,
    /// Shared embedding dimension.
    pub embed_dim: usize,
}

/// Item representation as the sum of a collaborative item embedding and
/// the item's knowledge-graph entity embedding.
///
/// ```text
/// item(i) = rec_item_emb[i] + ent_emb[i]
/// ```
///
/// Item `i` and entity `i` are the same catalog object, so the entity table
/// is also the one the KG loss trains. The encoder owns it; the model reads
/// it through [`CkeItemEncoder::entity_embedding`].
#[derive(Module, Debug)]
pub struct CkeItemEncoder<B: Backend> {
    pub(crate) rec_item_emb: PaddedEmbedding<B>,
    pub(crate) ent_emb: PaddedEmbedding<B>,
}

impl CkeItemEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CkeItemEncoder<B> {
        CkeItemEncoder {
            rec_item_emb: PaddedEmbeddingConfig::new(self.num_items, self.embed_dim).init(device),
            ent_emb: PaddedEmbeddingConfig::new(self.num_entities, self.embed_dim).init(device),
        }
    }
}

impl<B: Backend> CkeItemEncoder<B> {
    /// Encode `(batch,)` item ids to `(batch, dim)`.
    pub fn forward(&self, items: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.rec_item_emb.forward(items.clone()) + self.ent_emb.forward(items)
    }

    /// Encode `(batch, n)` item ids to `(batch, n, dim)`.
    pub fn forward_2d(&self, items: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.rec_item_emb.forward_2d(items.clone()) + self.ent_emb.forward_2d(items)
    }

    /// The knowledge-graph entity table shared with the item tower.
    pub fn entity_embedding(&self) -> &PaddedEmbedding<B> {
        &self.ent_emb
    }

    /// Item table size, padding included.
    pub fn num_items(&self) -> usize {
        self.rec_item_emb.num_embeddings()
    }

    pub fn num_entities(&self) -> usize {
        self.ent_emb.num_embeddings()
    }

    /// Final vectors for every real item, ids `1..num_items`.
    ///
    /// Row `k` is item `k + 1`. Reads the tables in place.
    pub fn item_vectors(&self) -> Tensor<B, 2> {
        let n = self.num_items();
        self.rec_item_emb.rows(1..n) + self.ent_emb.rows(1..n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn fixed_encoder(device: &<TestBackend as Backend>::Device) -> CkeItemEncoder<TestBackend> {
        let items = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0_f32, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            device,
        );
        let entities = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0_f32, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]]),
            device,
        );
        CkeItemEncoder {
            rec_item_emb: PaddedEmbedding::from_weight(items),
            ent_emb: PaddedEmbedding::from_weight(entities),
        }
    }

    #[test]
    fn test_item_is_sum_of_tables() {
        let device = Default::default();
        let encoder = fixed_encoder(&device);
        let ids = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 2, 0]), &device);
        let out: Vec<f32> = encoder.forward(ids).into_data().to_vec().unwrap();
        assert_eq!(out, vec![11.0, 10.0, 20.0, 21.0, 0.0, 0.0]);
    }

    #[test]
    fn test_item_vectors_skip_padding_and_kg_only_entities() {
        let device = Default::default();
        let encoder = fixed_encoder(&device);
        let vectors = encoder.item_vectors();
        // 2 real items; entity 3 is KG-only and must not appear
        assert_eq!(vectors.dims(), [2, 2]);
        let out: Vec<f32> = vectors.into_data().to_vec().unwrap();
        assert_eq!(out, vec![11.0, 10.0, 20.0, 21.0]);
    }

    #[test]
    fn test_forward_2d_matches_forward() {
        let device = Default::default();
        let encoder = CkeItemEncoderConfig::new(5, 8, 4).init::<TestBackend>(&device);
        let flat = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 2, 3, 4]), &device);
        let grid = Tensor::<TestBackend, 2, Int>::from_data(TensorData::from([[1_i64, 2], [3, 4]]), &device);
        let a: Vec<f32> = encoder.forward(flat).into_data().to_vec().unwrap();
        let b: Vec<f32> = encoder.forward_2d(grid).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
