//! Ranking losses for the recommendation and knowledge-graph towers.
//!
//! All losses take scores where higher means more relevant and return a
//! scalar tensor of shape `(1,)`.

use std::fmt;

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::log_sigmoid;
use serde::{Deserialize, Serialize};

/// Recommendation loss selection. The knowledge-graph loss is always BPR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingLoss {
    /// Bayesian personalized ranking over sampled negatives.
    Bpr,
    /// Softmax over the positive and sampled negatives with log-Q correction.
    SampledSoftmax,
    /// Softmax over every item in the catalog.
    FullSoftmax,
}

impl fmt::Display for RankingLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpr => write!(f, "bpr"),
            Self::SampledSoftmax => write!(f, "sampled_softmax"),
            Self::FullSoftmax => write!(f, "full_softmax"),
        }
    }
}

impl std::str::FromStr for RankingLoss {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bpr" => Ok(Self::Bpr),
            "sampled_softmax" => Ok(Self::SampledSoftmax),
            "full_softmax" => Ok(Self::FullSoftmax),
            other => Err(format!(
                "unknown loss `{other}` (expected bpr, sampled_softmax or full_softmax)"
            )),
        }
    }
}

/// BPR loss.
///
/// ```text
/// loss = -mean_b( sum_n w_n * log σ(pos_b - neg_bn) ),  w_n = 1/N
/// ```
///
/// # Arguments
/// - `pos_score`: shape `(batch,)`
/// - `neg_score`: shape `(batch, N)`
pub fn bpr_loss<B: Backend>(pos_score: Tensor<B, 1>, neg_score: Tensor<B, 2>) -> Tensor<B, 1> {
    let [_, n] = neg_score.dims();
    let diff = pos_score.unsqueeze_dim::<2>(1) - neg_score; // (batch, N)
    let per_row = log_sigmoid(diff).sum_dim(1) / n as f64; // (batch, 1)
    per_row.mean().neg()
}

/// Sampled softmax with log-Q correction.
///
/// Logits are `score - log_prob`, so that sampling frequency does not bias
/// the softmax. The positive sits at index 0.
pub fn sampled_softmax_loss<B: Backend>(
    pos_score: Tensor<B, 1>,
    pos_log_prob: Tensor<B, 1>,
    neg_score: Tensor<B, 2>,
    neg_log_prob: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let device = pos_score.device();
    let [batch_size, _] = neg_score.dims();

    let pos_logits = (pos_score - pos_log_prob).unsqueeze_dim::<2>(1); // (batch, 1)
    let neg_logits = neg_score - neg_log_prob; // (batch, N)
    let logits = Tensor::cat(vec![pos_logits, neg_logits], 1); // (batch, N+1)

    let labels = Tensor::<B, 1, Int>::zeros([batch_size], &device);

    CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, labels)
}

/// Softmax cross-entropy over the full catalog.
///
/// # Arguments
/// - `all_scores`: shape `(batch, num_candidates)`
/// - `targets`: column index of the positive in `all_scores`, shape `(batch,)`
pub fn full_softmax_loss<B: Backend>(
    all_scores: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let device = all_scores.device();
    CrossEntropyLossConfig::new()
        .init(&device)
        .forward(all_scores, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn t1(data: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_data(TensorData::new(data.to_vec(), [data.len()]), &Default::default())
    }

    fn t2(data: &[f32], rows: usize, cols: usize) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(data.to_vec(), [rows, cols]), &Default::default())
    }

    #[test]
    fn test_bpr_equal_scores_is_ln2() {
        let loss: f32 = bpr_loss(t1(&[0.3, -1.0]), t2(&[0.3, 0.3, -1.0, -1.0], 2, 2))
            .into_scalar()
            .elem();
        assert!((loss - 2.0_f32.ln()).abs() < 1e-5, "got {loss}");
    }

    #[test]
    fn test_bpr_decreases_with_separation() {
        let close: f32 = bpr_loss(t1(&[1.0]), t2(&[0.5], 1, 1)).into_scalar().elem();
        let far: f32 = bpr_loss(t1(&[5.0]), t2(&[-5.0], 1, 1)).into_scalar().elem();
        let wrong: f32 = bpr_loss(t1(&[-5.0]), t2(&[5.0], 1, 1)).into_scalar().elem();
        assert!(far < close && close < wrong, "far={far} close={close} wrong={wrong}");
        assert!(far < 1e-3);
    }

    #[test]
    fn test_bpr_averages_negatives() {
        // One easy and one hard negative: loss is the mean of the two terms.
        let both: f32 = bpr_loss(t1(&[0.0]), t2(&[-10.0, 0.0], 1, 2)).into_scalar().elem();
        let expected = 0.5 * (2.0_f32.ln() + (1.0 + (-10.0_f32).exp()).ln());
        assert!((both - expected).abs() < 1e-5, "got {both}, want {expected}");
    }

    #[test]
    fn test_bpr_gradient_direction() {
        let device = Default::default();
        let pos = Tensor::<TestAutodiffBackend, 1>::from_data(TensorData::from([0.0_f32]), &device)
            .require_grad();
        let neg = Tensor::<TestAutodiffBackend, 2>::from_data(TensorData::from([[0.0_f32]]), &device)
            .require_grad();
        let grads = bpr_loss(pos.clone(), neg.clone()).backward();

        let pos_grad: Vec<f32> = pos.grad(&grads).unwrap().into_data().to_vec().unwrap();
        let neg_grad: Vec<f32> = neg.grad(&grads).unwrap().into_data().to_vec().unwrap();
        // Descent raises the positive score and lowers the negative one.
        assert!(pos_grad[0] < 0.0, "pos grad {pos_grad:?}");
        assert!(neg_grad[0] > 0.0, "neg grad {neg_grad:?}");
    }

    #[test]
    fn test_sampled_softmax_uniform_is_ln_k() {
        let lp = -(10.0_f32).ln();
        let loss: f32 = sampled_softmax_loss(
            t1(&[0.0, 0.0]),
            t1(&[lp, lp]),
            t2(&[0.0, 0.0, 0.0, 0.0], 2, 2),
            t2(&[lp, lp, lp, lp], 2, 2),
        )
        .into_scalar()
        .elem();
        assert!((loss - 3.0_f32.ln()).abs() < 1e-4, "got {loss}");
    }

    #[test]
    fn test_sampled_softmax_log_q_correction() {
        // A negative drawn far more often than the positive gets pushed down
        // by the correction, lowering the loss compared with no correction.
        let corrected: f32 = sampled_softmax_loss(
            t1(&[0.0]),
            t1(&[-5.0]),
            t2(&[0.0], 1, 1),
            t2(&[-0.1], 1, 1),
        )
        .into_scalar()
        .elem();
        let flat: f32 = sampled_softmax_loss(t1(&[0.0]), t1(&[0.0]), t2(&[0.0], 1, 1), t2(&[0.0], 1, 1))
            .into_scalar()
            .elem();
        assert!(corrected < flat, "corrected={corrected} flat={flat}");
    }

    #[test]
    fn test_full_softmax_prefers_target() {
        let device = Default::default();
        let scores = t2(&[5.0, 0.0, 0.0, 0.0, 0.0, 5.0], 2, 3);
        let good = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0_i64, 2]), &device);
        let bad = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 0]), &device);
        let good_loss: f32 = full_softmax_loss(scores.clone(), good).into_scalar().elem();
        let bad_loss: f32 = full_softmax_loss(scores, bad).into_scalar().elem();
        assert!(good_loss < 0.05 && bad_loss > 4.0, "good={good_loss} bad={bad_loss}");
    }

    #[test]
    fn test_ranking_loss_parse_and_display() {
        for loss in [RankingLoss::Bpr, RankingLoss::SampledSoftmax, RankingLoss::FullSoftmax] {
            assert_eq!(loss.to_string().parse::<RankingLoss>().unwrap(), loss);
        }
        assert!("hinge".parse::<RankingLoss>().is_err());
    }
}
