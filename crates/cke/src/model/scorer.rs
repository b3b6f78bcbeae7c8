//! Similarity functions between query vectors and item vectors.
//!
//! Every scorer handles three layouts:
//!
//! | Method | Query | Items | Output |
//! |--------|-------|-------|--------|
//! | `score_pairs` | `(B, D)` | `(B, D)` | `(B,)` |
//! | `score_candidates` | `(B, D)` | `(B, N, D)` | `(B, N)` |
//! | `score_all` | `(U, D)` | `(I, D)` | `(U, I)` |
//!
//! Higher scores mean a better match.

use burn::prelude::*;

/// Floor on squared norms before taking a square root. Keeps the gradient
/// finite for zero vectors.
const MIN_SQUARED_NORM: f64 = 1e-24;

/// Similarity between query and item vectors.
pub trait Scorer {
    fn score_pairs<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 1>;

    fn score_candidates<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 3>) -> Tensor<B, 2>;

    fn score_all<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Dot-product scorer used by the recommendation tower.
#[derive(Debug, Clone, Copy, Default)]
pub struct InnerProductScorer;

impl Scorer for InnerProductScorer {
    fn score_pairs<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 1> {
        (query * items).sum_dim(1).squeeze::<1>(1)
    }

    fn score_candidates<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 3>) -> Tensor<B, 2> {
        (query.unsqueeze_dim::<3>(1) * items).sum_dim(2).squeeze::<2>(2)
    }

    fn score_all<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 2> {
        query.matmul(items.transpose())
    }
}

/// Negative Euclidean distance: `-||query - item||₂`.
///
/// Used on the knowledge-graph side, where `query = h + r` and items are
/// projected tails. Identical vectors score (approximately) 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanScorer;

impl Scorer for EuclideanScorer {
    fn score_pairs<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 1> {
        (query - items)
            .powf_scalar(2.0)
            .sum_dim(1)
            .clamp_min(MIN_SQUARED_NORM)
            .sqrt()
            .neg()
            .squeeze::<1>(1)
    }

    fn score_candidates<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 3>) -> Tensor<B, 2> {
        // (B, 1, D) broadcast against (B, N, D)
        (query.unsqueeze_dim::<3>(1) - items)
            .powf_scalar(2.0)
            .sum_dim(2)
            .clamp_min(MIN_SQUARED_NORM)
            .sqrt()
            .neg()
            .squeeze::<2>(2)
    }

    fn score_all<B: Backend>(&self, query: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 2> {
        // ||q - i||² = ||q||² - 2 q·i + ||i||²
        let [num_items, _] = items.dims();
        let q_sq = query.clone().powf_scalar(2.0).sum_dim(1); // (U, 1)
        let i_sq = items.clone().powf_scalar(2.0).sum_dim(1).reshape([1, num_items]); // (1, I)
        let cross = query.matmul(items.transpose()); // (U, I)
        (q_sq + i_sq - cross * 2.0)
            .clamp_min(MIN_SQUARED_NORM)
            .sqrt()
            .neg()
    }
}

/// L2-normalize along `dim`: `x / max(||x||, 1e-12)`.
pub fn l2_normalize<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let norm = x
        .clone()
        .powf_scalar(2.0)
        .sum_dim(dim)
        .clamp_min(MIN_SQUARED_NORM)
        .sqrt();
    x / norm
}
