//! Top-k recommendation from a trained checkpoint.
//!
//! Item and user vectors are materialized once at load time; scoring a user
//! is a dot product against every item row plus a bounded heap for the
//! top-k.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::path::Path;

use burn::prelude::*;
use ordered_float::OrderedFloat;

use kgdata::{ItemVectors, KnowledgeDataset, SplitKind};

use crate::model::bridge::tensor_to_rows;
use crate::model::cke::Cke;
use crate::training::trainer::load_checkpoint;

/// The `k` best-scoring columns of `scores`, best first, as item ids.
///
/// Column `c` is item `c + 1`. Items in `exclude` and non-finite scores are
/// skipped. Ties keep the lower item id first.
pub fn top_k(scores: &[f32], k: usize, exclude: &HashSet<u32>) -> Vec<(u32, f32)> {
    if k == 0 {
        return Vec::new();
    }
    // min-heap of the current best k
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, Reverse<u32>)>> =
        BinaryHeap::with_capacity(k + 1);
    for (col, &score) in scores.iter().enumerate() {
        let item = col as u32 + 1;
        if !score.is_finite() || exclude.contains(&item) {
            continue;
        }
        heap.push(Reverse((OrderedFloat(score), Reverse(item))));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut ranked: Vec<(u32, f32)> = heap
        .into_iter()
        .map(|Reverse((score, Reverse(item)))| (item, score.0))
        .collect();
    ranked.sort_by(|a, b| {
        OrderedFloat(b.1)
            .cmp(&OrderedFloat(a.1))
            .then(a.0.cmp(&b.0))
    });
    ranked
}

/// A recommendation for one user.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Recommendation {
    pub item_id: u32,
    pub token: String,
    pub score: f32,
}

/// Serves top-k recommendations from precomputed vectors.
pub struct Recommender {
    /// Row `k` is user `k + 1`.
    user_vectors: Vec<Vec<f32>>,
    /// Row `k` is item `k + 1`.
    item_vectors: Vec<Vec<f32>>,
}

impl Recommender {
    /// Materialize user and item vectors from a model.
    pub fn from_model<B: Backend>(model: &Cke<B>) -> Self {
        Self {
            user_vectors: tensor_to_rows(model.user_vectors()),
            item_vectors: tensor_to_rows(model.item_vectors()),
        }
    }

    /// Load a checkpoint directory written by the trainer.
    pub fn load<B: Backend>(checkpoint_dir: &Path, device: &B::Device) -> anyhow::Result<Self> {
        let (model, _) = load_checkpoint::<B>(checkpoint_dir, device)?;
        Ok(Self::from_model(&model))
    }

    pub fn num_users(&self) -> usize {
        self.user_vectors.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_vectors.len()
    }

    pub fn dim(&self) -> usize {
        self.item_vectors.first().map_or(0, Vec::len)
    }

    /// Scores of user `user_id` against every item; entry `k` is item `k + 1`.
    pub fn scores(&self, user_id: u32) -> anyhow::Result<Vec<f32>> {
        let user = user_id
            .checked_sub(1)
            .and_then(|row| self.user_vectors.get(row as usize))
            .ok_or_else(|| {
                anyhow::anyhow!("user id {user_id} out of range 1..={}", self.num_users())
            })?;
        Ok(self
            .item_vectors
            .iter()
            .map(|item| item.iter().zip(user).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Top-`k` items for a user, skipping the items in `exclude`.
    pub fn recommend_ids(
        &self,
        user_id: u32,
        k: usize,
        exclude: &HashSet<u32>,
    ) -> anyhow::Result<Vec<(u32, f32)>> {
        Ok(top_k(&self.scores(user_id)?, k, exclude))
    }

    /// Top-`k` items for a user token, excluding items the user saw in training.
    pub fn recommend(
        &self,
        dataset: &KnowledgeDataset,
        user_token: &str,
        k: usize,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let user_id = dataset.user_id(user_token)?;
        let seen = dataset
            .split
            .items_by_user(SplitKind::Train)
            .remove(&user_id)
            .unwrap_or_default();

        let ranked = self.recommend_ids(user_id, k, &seen)?;
        tracing::debug!(user = user_token, count = ranked.len(), "Ranked items");
        Ok(ranked
            .into_iter()
            .map(|(item_id, score)| Recommendation {
                item_id,
                token: dataset.item_token(item_id).unwrap_or_default().to_string(),
                score,
            })
            .collect())
    }

    /// Item vectors with their tokens, ready to be written to Parquet.
    pub fn export_item_vectors(&self, dataset: &KnowledgeDataset) -> anyhow::Result<ItemVectors> {
        if self.num_items() + 1 != dataset.num_items() {
            anyhow::bail!(
                "checkpoint has {} items but dataset `{}` has {}",
                self.num_items(),
                dataset.name,
                dataset.num_items() - 1
            );
        }
        let mut vectors = ItemVectors::new(self.dim());
        for (row, vector) in self.item_vectors.iter().enumerate() {
            let item_id = row as u32 + 1;
            let token = dataset.item_token(item_id).unwrap_or_default();
            vectors.push(item_id, token, vector.clone())?;
        }
        Ok(vectors)
    }
}
