//! Per-step training metrics with health checks.

use burn::prelude::*;

use crate::model::cke::ScoredPairs;

/// Metrics for one training step (or an average over several).
#[derive(Debug, Clone, Default)]
pub struct CkeMetrics {
    /// Total loss: `rec_loss + kg_loss_weight * kg_loss`.
    pub loss: f64,
    pub rec_loss: f64,
    pub kg_loss: f64,
    /// Fraction of `(positive, negative)` pairs ranked correctly by the
    /// recommendation tower.
    pub rec_pair_accuracy: f64,
    /// Same, for the knowledge-graph tower.
    pub kg_pair_accuracy: f64,
    /// Mean positive minus mean negative recommendation score.
    pub rec_score_gap: f64,
    /// Mean positive minus mean negative KG score.
    pub kg_score_gap: f64,
}

impl CkeMetrics {
    /// Compute metrics from the scores of one step and its loss values.
    pub fn compute<B: Backend>(
        rec: &ScoredPairs<B>,
        kg: &ScoredPairs<B>,
        loss: f64,
        rec_loss: f64,
        kg_loss: f64,
    ) -> Self {
        let (rec_pair_accuracy, rec_score_gap) = pair_stats(rec);
        let (kg_pair_accuracy, kg_score_gap) = pair_stats(kg);
        Self {
            loss,
            rec_loss,
            kg_loss,
            rec_pair_accuracy,
            kg_pair_accuracy,
            rec_score_gap,
            kg_score_gap,
        }
    }

    /// Return warnings for values that indicate a broken run.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.loss.is_finite() {
            warnings.push(format!("loss is not finite ({})", self.loss));
        }
        if !self.kg_loss.is_finite() {
            warnings.push(format!("kg loss is not finite ({})", self.kg_loss));
        }
        if self.rec_pair_accuracy < 0.5 && self.rec_loss.is_finite() {
            warnings.push(format!(
                "recommendation pairs ranked worse than chance ({:.2})",
                self.rec_pair_accuracy
            ));
        }
        if self.kg_pair_accuracy < 0.5 && self.kg_loss.is_finite() {
            warnings.push(format!(
                "kg pairs ranked worse than chance ({:.2})",
                self.kg_pair_accuracy
            ));
        }
        warnings
    }
}

/// `(pair accuracy, mean score gap)` for one tower.
fn pair_stats<B: Backend>(scores: &ScoredPairs<B>) -> (f64, f64) {
    let neg = scores.neg_score.clone(); // (batch, N)
    let [batch, n] = neg.dims();
    let pos = scores.pos_score.clone().unsqueeze_dim::<2>(1).expand([batch, n]);

    let correct: f64 = pos.clone().greater(neg.clone()).float().mean().into_scalar().elem();
    let pos_mean: f64 = pos.mean().into_scalar().elem();
    let neg_mean: f64 = neg.mean().into_scalar().elem();
    (correct, pos_mean - neg_mean)
}

/// Running average of metrics over a logging window.
#[derive(Debug, Clone, Default)]
pub struct RunningAvg {
    sum: CkeMetrics,
    count: usize,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, m: &CkeMetrics) {
        self.sum.loss += m.loss;
        self.sum.rec_loss += m.rec_loss;
        self.sum.kg_loss += m.kg_loss;
        self.sum.rec_pair_accuracy += m.rec_pair_accuracy;
        self.sum.kg_pair_accuracy += m.kg_pair_accuracy;
        self.sum.rec_score_gap += m.rec_score_gap;
        self.sum.kg_score_gap += m.kg_score_gap;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn average(&self) -> Option<CkeMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(CkeMetrics {
            loss: self.sum.loss / n,
            rec_loss: self.sum.rec_loss / n,
            kg_loss: self.sum.kg_loss / n,
            rec_pair_accuracy: self.sum.rec_pair_accuracy / n,
            kg_pair_accuracy: self.sum.kg_pair_accuracy / n,
            rec_score_gap: self.sum.rec_score_gap / n,
            kg_score_gap: self.sum.kg_score_gap / n,
        })
    }

    pub fn display(&self) -> String {
        match self.average() {
            None => "no data".to_string(),
            Some(m) => format!(
                "loss={:.4} rec={:.4} kg={:.4} rec_acc={:.2} kg_acc={:.2} rec_gap={:.3} kg_gap={:.3}",
                m.loss, m.rec_loss, m.kg_loss, m.rec_pair_accuracy, m.kg_pair_accuracy,
                m.rec_score_gap, m.kg_score_gap,
            ),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Per-epoch training averages and validation results.
#[derive(Debug, Clone, Default)]
pub struct MetricsHistory {
    pub train: Vec<(usize, CkeMetrics)>,
    /// `(epoch, monitored validation value)`.
    pub valid: Vec<(usize, f64)>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_train(&mut self, epoch: usize, metrics: CkeMetrics) {
        self.train.push((epoch, metrics));
    }

    pub fn push_valid(&mut self, epoch: usize, value: f64) {
        self.valid.push((epoch, value));
    }

    /// Epoch and value of the best validation result so far.
    pub fn best_valid(&self) -> Option<(usize, f64)> {
        self.valid
            .iter()
            .copied()
            .filter(|(_, v)| v.is_finite())
            .fold(None, |best, cur| match best {
                Some((_, b)) if b >= cur.1 => best,
                _ => Some(cur),
            })
    }

    /// Whether training loss went down between the first and last epoch.
    pub fn loss_decreased(&self) -> bool {
        match (self.train.first(), self.train.last()) {
            (Some((_, first)), Some((_, last))) if self.train.len() > 1 => last.loss < first.loss,
            _ => false,
        }
    }
}
