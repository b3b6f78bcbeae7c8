//! Full-ranking offline evaluation.
//!
//! Every user with at least one target item in the evaluated split is scored
//! against the whole catalog. Items the user already interacted with in
//! earlier parts of the split are masked out before ranking.
//!
//! | Metric | Per-user value |
//! |--------|----------------|
//! | `recall@k` | hits in top-k / number of targets |
//! | `precision@k` | hits in top-k / k |
//! | `ndcg@k` | DCG of the top-k / ideal DCG |
//! | `hit@k` | 1 if any target is in the top-k |
//! | `mrr@k` | 1 / rank of the first hit in the top-k, else 0 |
//! | `map@k` | sum of precision at each hit / min(targets, k) |
//!
//! Reported values are means over evaluated users.

use std::collections::{BTreeMap, HashSet};

use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use kgdata::{KnowledgeDataset, SplitKind};

use crate::inference::top_k;
use crate::model::bridge::{ids_to_tensor, tensor_to_rows};
use crate::model::cke::Cke;

/// Metric names in reporting order.
pub const METRIC_NAMES: [&str; 6] = ["recall", "precision", "ndcg", "hit", "mrr", "map"];

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Cut-offs `k` for every metric.
    #[serde(default = "default_cutoffs")]
    pub cutoffs: Vec<usize>,
    /// Users scored per forward pass.
    #[serde(default = "default_eval_batch_size")]
    pub batch_size: usize,
}

fn default_cutoffs() -> Vec<usize> {
    vec![10, 20]
}
fn default_eval_batch_size() -> usize {
    256
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            cutoffs: default_cutoffs(),
            batch_size: default_eval_batch_size(),
        }
    }
}

impl EvalConfig {
    pub fn max_cutoff(&self) -> usize {
        self.cutoffs.iter().copied().max().unwrap_or(0)
    }

    /// Every metric key this configuration produces, e.g. `ndcg@20`.
    pub fn metric_keys(&self) -> Vec<String> {
        METRIC_NAMES
            .iter()
            .flat_map(|name| self.cutoffs.iter().map(move |k| format!("{name}@{k}")))
            .collect()
    }
}

/// Averaged ranking metrics keyed by `name@k`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankingMetrics {
    pub values: BTreeMap<String, f64>,
    /// Users with at least one target item.
    pub num_users: usize,
}

impl RankingMetrics {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// One line per cut-off, e.g. `@10  recall=0.1234 ...`.
    pub fn summary(&self, cutoffs: &[usize]) -> String {
        let mut lines = Vec::with_capacity(cutoffs.len());
        for k in cutoffs {
            let parts: Vec<String> = METRIC_NAMES
                .iter()
                .filter_map(|name| {
                    self.get(&format!("{name}@{k}"))
                        .map(|v| format!("{name}={v:.4}"))
                })
                .collect();
            lines.push(format!("@{k:<3} {}", parts.join(" ")));
        }
        lines.push(format!("users={}", self.num_users));
        lines.join("\n")
    }
}

/// Metric values for one user's ranked list at cut-off `k`.
///
/// `ranked` is best first and may be longer than `k`. Returns values in
/// [`METRIC_NAMES`] order.
pub fn user_metrics(ranked: &[u32], targets: &HashSet<u32>, k: usize) -> [f64; 6] {
    if targets.is_empty() || k == 0 {
        return [0.0; 6];
    }
    let mut hits = 0usize;
    let mut dcg = 0.0;
    let mut first_hit: Option<usize> = None;
    let mut precision_sum = 0.0;
    for (pos, item) in ranked.iter().take(k).enumerate() {
        if targets.contains(item) {
            hits += 1;
            dcg += 1.0 / ((pos + 2) as f64).log2();
            first_hit.get_or_insert(pos + 1);
            precision_sum += hits as f64 / (pos + 1) as f64;
        }
    }
    let ideal = targets.len().min(k);
    let idcg: f64 = (0..ideal).map(|pos| 1.0 / ((pos + 2) as f64).log2()).sum();

    [
        hits as f64 / targets.len() as f64,
        hits as f64 / k as f64,
        dcg / idcg,
        if hits > 0 { 1.0 } else { 0.0 },
        first_hit.map_or(0.0, |rank| 1.0 / rank as f64),
        precision_sum / ideal as f64,
    ]
}

/// Parts of the split whose items are hidden when ranking for `split`.
fn masked_parts(split: SplitKind) -> &'static [SplitKind] {
    match split {
        SplitKind::Train => &[],
        SplitKind::Valid => &[SplitKind::Train],
        SplitKind::Test => &[SplitKind::Train, SplitKind::Valid],
    }
}

/// Evaluate `model` on one part of the dataset split.
pub fn evaluate<B: Backend>(
    model: &Cke<B>,
    dataset: &KnowledgeDataset,
    split: SplitKind,
    config: &EvalConfig,
    device: &B::Device,
) -> anyhow::Result<RankingMetrics> {
    if config.cutoffs.is_empty() || config.cutoffs.contains(&0) {
        anyhow::bail!("cutoffs must be non-empty and positive, got {:?}", config.cutoffs);
    }
    if config.batch_size == 0 {
        anyhow::bail!("evaluation batch_size must be > 0");
    }
    if model.num_items() != dataset.num_items() {
        anyhow::bail!(
            "model has {} item rows but dataset `{}` has {}",
            model.num_items(),
            dataset.name,
            dataset.num_items()
        );
    }

    let targets_by_user = dataset.split.items_by_user(split);
    let masked: Vec<_> = masked_parts(split)
        .iter()
        .map(|&kind| dataset.split.items_by_user(kind))
        .collect();

    let mut users: Vec<u32> = targets_by_user.keys().copied().collect();
    users.sort_unstable();

    let max_k = config.max_cutoff();
    let mut sums = vec![[0.0f64; 6]; config.cutoffs.len()];

    let pb = ProgressBar::new(users.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(format!("Evaluating {split}"));

    for chunk in users.chunks(config.batch_size) {
        let ids: Vec<i64> = chunk.iter().map(|&u| u as i64).collect();
        let scores = tensor_to_rows(model.score_all_items(ids_to_tensor(&ids, device)));

        for (user, row) in chunk.iter().zip(&scores) {
            let mut exclude: HashSet<u32> = HashSet::new();
            for part in &masked {
                if let Some(items) = part.get(user) {
                    exclude.extend(items);
                }
            }
            let ranked: Vec<u32> = top_k(row, max_k, &exclude)
                .into_iter()
                .map(|(item, _)| item)
                .collect();

            let Some(targets) = targets_by_user.get(user) else {
                continue;
            };
            for (sum, &k) in sums.iter_mut().zip(&config.cutoffs) {
                for (acc, value) in sum.iter_mut().zip(user_metrics(&ranked, targets, k)) {
                    *acc += value;
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    let num_users = users.len();
    let mut values = BTreeMap::new();
    for (sum, k) in sums.iter().zip(&config.cutoffs) {
        for (name, total) in METRIC_NAMES.iter().zip(sum) {
            let mean = if num_users > 0 { total / num_users as f64 } else { 0.0 };
            values.insert(format!("{name}@{k}"), mean);
        }
    }

    let metrics = RankingMetrics { values, num_users };
    tracing::info!(%split, users = num_users, "Evaluation finished");
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u32]) -> HashSet<u32> {
        items.iter().copied().collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_ranking() {
        let m = user_metrics(&[1, 2, 3, 4], &set(&[1, 2]), 2);
        assert!(m.iter().all(|&v| approx(v, 1.0)), "{m:?}");
    }

    #[test]
    fn test_no_hits() {
        let m = user_metrics(&[5, 6, 7], &set(&[1]), 3);
        assert!(m.iter().all(|&v| approx(v, 0.0)), "{m:?}");
    }

    #[test]
    fn test_hand_computed_ranking() {
        // hits at ranks 2 and 4, three targets, k = 4
        let m = user_metrics(&[9, 1, 8, 2, 3], &set(&[1, 2, 3]), 4);
        let [recall, precision, ndcg, hit, mrr, map] = m;
        assert!(approx(recall, 2.0 / 3.0));
        assert!(approx(precision, 0.5));
        let dcg = 1.0 / 3f64.log2() + 1.0 / 5f64.log2();
        let idcg = 1.0 + 1.0 / 3f64.log2() + 1.0 / 4f64.log2();
        assert!(approx(ndcg, dcg / idcg));
        assert!(approx(hit, 1.0));
        assert!(approx(mrr, 0.5));
        assert!(approx(map, (0.5 + 0.5) / 3.0));
    }

    #[test]
    fn test_short_ranked_list() {
        // fewer ranked items than k still divides precision by k
        let m = user_metrics(&[1], &set(&[1]), 5);
        assert!(approx(m[0], 1.0));
        assert!(approx(m[1], 0.2));
        assert!(approx(m[2], 1.0));
    }

    #[test]
    fn test_metric_keys_and_summary() {
        let config = EvalConfig::default();
        let keys = config.metric_keys();
        assert_eq!(keys.len(), 12);
        assert!(keys.contains(&"ndcg@20".to_string()));
        assert_eq!(config.max_cutoff(), 20);

        let mut metrics = RankingMetrics::default();
        metrics.values.insert("recall@10".into(), 0.25);
        metrics.num_users = 3;
        let text = metrics.summary(&[10]);
        assert!(text.contains("recall=0.2500"));
        assert!(text.contains("users=3"));
    }

    #[test]
    fn test_masked_parts() {
        assert!(masked_parts(SplitKind::Train).is_empty());
        assert_eq!(masked_parts(SplitKind::Valid), &[SplitKind::Train]);
        assert_eq!(masked_parts(SplitKind::Test), &[SplitKind::Train, SplitKind::Valid]);
    }
}
