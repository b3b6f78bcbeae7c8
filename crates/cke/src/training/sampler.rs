//! Negative samplers.

use burn::prelude::*;
use rand::Rng;

use crate::model::bridge::ids_to_tensor_2d;

/// Negatives drawn for a batch of positives, with log-probabilities.
#[derive(Debug, Clone)]
pub struct NegativeSample<B: Backend> {
    /// Log-probability of drawing each positive, shape `(batch,)`.
    pub pos_log_prob: Tensor<B, 1>,
    /// Sampled ids, shape `(batch, neg_count)`.
    pub neg_ids: Tensor<B, 2, Int>,
    /// Log-probability of each sampled id, shape `(batch, neg_count)`.
    pub neg_log_prob: Tensor<B, 2>,
}

/// Uniform sampler over ids `1..=num_items`.
///
/// Id 0 is padding and is never drawn. Positives are not excluded, matching
/// plain uniform sampling; every id has probability `1 / num_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSampler {
    num_items: usize,
}

impl UniformSampler {
    /// # Panics
    /// Panics if `num_items == 0`.
    pub fn new(num_items: usize) -> Self {
        assert!(num_items > 0, "sampler needs at least one item");
        Self { num_items }
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Log-probability of any single id.
    pub fn log_prob(&self) -> f64 {
        -(self.num_items as f64).ln()
    }

    /// Draw `batch * neg_count` raw ids.
    pub fn sample_ids(&self, batch: usize, neg_count: usize, rng: &mut impl Rng) -> Vec<i64> {
        (0..batch * neg_count)
            .map(|_| rng.gen_range(1..=self.num_items) as i64)
            .collect()
    }

    /// Draw `neg_count` negatives for each of the `batch` positives.
    pub fn sample<B: Backend>(
        &self,
        batch: usize,
        neg_count: usize,
        rng: &mut impl Rng,
        device: &B::Device,
    ) -> NegativeSample<B> {
        let ids = self.sample_ids(batch, neg_count, rng);
        let log_prob = self.log_prob();
        NegativeSample {
            pos_log_prob: Tensor::full([batch], log_prob, device),
            neg_ids: ids_to_tensor_2d(ids, batch, neg_count, device),
            neg_log_prob: Tensor::full([batch, neg_count], log_prob, device),
        }
    }
}
