use burn::prelude::*;
use rand::Rng;

use kgdata::TrainBatch;

use crate::model::bridge::ids_to_tensor;
use crate::model::embedding::{PaddedEmbedding, PaddedEmbeddingConfig};
use crate::model::encoder::{CkeItemEncoder, CkeItemEncoderConfig};
use crate::model::scorer::{l2_normalize, EuclideanScorer, InnerProductScorer, Scorer};
use crate::training::loss::{bpr_loss, full_softmax_loss, sampled_softmax_loss, RankingLoss};
use crate::training::sampler::UniformSampler;

/// Configuration for the CKE model.
///
/// Table sizes include the padding row and come from the dataset.
///
/// ```text
/// user tower:  user_emb[u]                                 (D)
/// item tower:  rec_item_emb[i] + ent_emb[i]                (D)
/// rec score:   <user, item>
///
/// KG tower:    h' = norm(ent_emb[h] · M_r)                 (P)
///              t' = norm(ent_emb[t] · M_r)                 (P)
///              r' = norm(rel_emb[r])                       (P)
///              score = -||h' + r' - t'||
/// ```
#[derive(Config, Debug)]
pub struct CkeConfig {
    /// User table size, padding included.
    pub num_users: usize,
    /// Item table size, padding included.
    pub num_items: usize,
    /// Entity table size, padding included. Items occupy ids `1..num_items`.
    pub num_entities: usize,
    /// Relation table size, padding included.
    pub num_relations: usize,
    /// User / item / entity embedding dimension `D`.
    #[config(default = 64)]
    pub embed_dim: usize,
    /// Relation space dimension `P`.
    #[config(default = 64)]
    pub pro_embed_dim: usize,
    /// Weight of the KG loss in the joint loss.
    #[config(default = 1.0)]
    pub kg_loss_weight: f64,
}

impl CkeConfig {
    /// Check table sizes and dimensions before allocating anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embed_dim == 0 || self.pro_embed_dim == 0 {
            anyhow::bail!(
                "embedding dimensions must be > 0 (embed_dim={}, pro_embed_dim={})",
                self.embed_dim,
                self.pro_embed_dim
            );
        }
        if self.num_users < 2 || self.num_items < 2 || self.num_relations < 2 {
            anyhow::bail!(
                "need at least one real user, item and relation besides padding \
                 (num_users={}, num_items={}, num_relations={})",
                self.num_users,
                self.num_items,
                self.num_relations
            );
        }
        if self.num_entities < self.num_items {
            anyhow::bail!(
                "num_entities ({}) must cover every item id (num_items={})",
                self.num_entities,
                self.num_items
            );
        }
        if !self.kg_loss_weight.is_finite() || self.kg_loss_weight < 0.0 {
            anyhow::bail!("kg_loss_weight must be a non-negative number, got {}", self.kg_loss_weight);
        }
        Ok(())
    }

    /// Allocate all tables.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cke<B> {
        Cke {
            user_emb: PaddedEmbeddingConfig::new(self.num_users, self.embed_dim).init(device),
            item_encoder: CkeItemEncoderConfig::new(self.num_items, self.num_entities, self.embed_dim)
                .init(device),
            rel_emb: PaddedEmbeddingConfig::new(self.num_relations, self.pro_embed_dim).init(device),
            pro_matrix_emb: PaddedEmbeddingConfig::new(
                self.num_relations,
                self.embed_dim * self.pro_embed_dim,
            )
            .init(device),
            embed_dim: self.embed_dim,
            pro_embed_dim: self.pro_embed_dim,
            kg_loss_weight: self.kg_loss_weight,
        }
    }
}

/// Collaborative Knowledge base Embedding model.
#[derive(Module, Debug)]
pub struct Cke<B: Backend> {
    user_emb: PaddedEmbedding<B>,
    item_encoder: CkeItemEncoder<B>,
    rel_emb: PaddedEmbedding<B>,
    /// One flattened `(D, P)` projection matrix per relation.
    pro_matrix_emb: PaddedEmbedding<B>,
    embed_dim: usize,
    pro_embed_dim: usize,
    kg_loss_weight: f64,
}

/// A training batch on device.
#[derive(Debug, Clone)]
pub struct CkeBatch<B: Backend> {
    pub users: Tensor<B, 1, Int>,
    pub items: Tensor<B, 1, Int>,
    pub heads: Tensor<B, 1, Int>,
    pub relations: Tensor<B, 1, Int>,
    pub tails: Tensor<B, 1, Int>,
}

impl<B: Backend> CkeBatch<B> {
    pub fn from_train_batch(batch: &TrainBatch, device: &B::Device) -> Self {
        Self {
            users: ids_to_tensor(&batch.users, device),
            items: ids_to_tensor(&batch.items, device),
            heads: ids_to_tensor(&batch.heads, device),
            relations: ids_to_tensor(&batch.relations, device),
            tails: ids_to_tensor(&batch.tails, device),
        }
    }

    pub fn len(&self) -> usize {
        self.users.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Positive and sampled-negative scores of one tower.
#[derive(Debug, Clone)]
pub struct ScoredPairs<B: Backend> {
    /// `(batch,)`
    pub pos_score: Tensor<B, 1>,
    /// `(batch,)`
    pub pos_log_prob: Tensor<B, 1>,
    /// `(batch, neg_count)`
    pub neg_score: Tensor<B, 2>,
    /// `(batch, neg_count)`
    pub neg_log_prob: Tensor<B, 2>,
}

/// Everything one training step produces.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// Joint loss, shape `(1,)`. Call `backward` on this.
    pub loss: Tensor<B, 1>,
    pub rec_loss: Tensor<B, 1>,
    pub kg_loss: Tensor<B, 1>,
    pub rec: ScoredPairs<B>,
    pub kg: ScoredPairs<B>,
}

impl<B: Backend> Cke<B> {
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn pro_embed_dim(&self) -> usize {
        self.pro_embed_dim
    }

    pub fn kg_loss_weight(&self) -> f64 {
        self.kg_loss_weight
    }

    pub fn num_users(&self) -> usize {
        self.user_emb.num_embeddings()
    }

    pub fn num_items(&self) -> usize {
        self.item_encoder.num_items()
    }

    pub fn num_entities(&self) -> usize {
        self.item_encoder.num_entities()
    }

    pub fn num_relations(&self) -> usize {
        self.rel_emb.num_embeddings()
    }

    /// Uniform sampler over real item ids.
    pub fn item_sampler(&self) -> UniformSampler {
        UniformSampler::new(self.num_items() - 1)
    }

    /// Uniform sampler over real entity ids, used for corrupted tails.
    pub fn entity_sampler(&self) -> UniformSampler {
        UniformSampler::new(self.num_entities() - 1)
    }

    /// User tower: `(batch,)` ids to `(batch, D)`.
    pub fn encode_users(&self, users: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.user_emb.forward(users)
    }

    /// Item tower: `(batch,)` ids to `(batch, D)`.
    pub fn encode_items(&self, items: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.item_encoder.forward(items)
    }

    /// Recommendation forward pass with sampled negatives.
    pub fn forward_rec(
        &self,
        batch: &CkeBatch<B>,
        neg_count: usize,
        rng: &mut impl Rng,
    ) -> ScoredPairs<B> {
        let device = batch.users.device();
        let batch_size = batch.len();

        let query = self.encode_users(batch.users.clone()); // (B, D)
        let pos_items = self.encode_items(batch.items.clone()); // (B, D)

        let sample = self.item_sampler().sample::<B>(batch_size, neg_count, rng, &device);
        let neg_items = self.item_encoder.forward_2d(sample.neg_ids); // (B, N, D)

        let scorer = InnerProductScorer;
        ScoredPairs {
            pos_score: scorer.score_pairs(query.clone(), pos_items),
            pos_log_prob: sample.pos_log_prob,
            neg_score: scorer.score_candidates(query, neg_items),
            neg_log_prob: sample.neg_log_prob,
        }
    }

    /// Knowledge-graph forward pass with sampled corrupted tails.
    ///
    /// Head and tail entities are projected into the relation space by the
    /// relation's `(D, P)` matrix, every vector is L2-normalized along its
    /// feature axis, and triples are scored by `-||h + r - t||`.
    pub fn forward_kg(
        &self,
        batch: &CkeBatch<B>,
        neg_count: usize,
        rng: &mut impl Rng,
    ) -> ScoredPairs<B> {
        let device = batch.heads.device();
        let batch_size = batch.len();
        let (d, p) = (self.embed_dim, self.pro_embed_dim);
        let entities = self.item_encoder.entity_embedding();

        let h = entities.forward(batch.heads.clone()).unsqueeze_dim::<3>(1); // (B, 1, D)
        let pos_t = entities.forward(batch.tails.clone()).unsqueeze_dim::<3>(1); // (B, 1, D)
        let r = self.rel_emb.forward(batch.relations.clone()); // (B, P)
        let projection = self
            .pro_matrix_emb
            .forward(batch.relations.clone())
            .reshape([batch_size, d, p]); // (B, D, P)

        let sample = self.entity_sampler().sample::<B>(batch_size, neg_count, rng, &device);
        let neg_t = entities.forward_2d(sample.neg_ids); // (B, N, D)

        let h = h.matmul(projection.clone()).squeeze::<2>(1); // (B, P)
        let pos_t = pos_t.matmul(projection.clone()).squeeze::<2>(1); // (B, P)
        let neg_t = neg_t.matmul(projection); // (B, N, P)

        let r = l2_normalize(r, 1);
        let h = l2_normalize(h, 1);
        let pos_t = l2_normalize(pos_t, 1);
        let neg_t = l2_normalize(neg_t, 2);

        let query = h + r;
        let scorer = EuclideanScorer;
        ScoredPairs {
            pos_score: scorer.score_pairs(query.clone(), pos_t),
            pos_log_prob: sample.pos_log_prob,
            neg_score: scorer.score_candidates(query, neg_t),
            neg_log_prob: sample.neg_log_prob,
        }
    }

    /// Inner-product scores of users against every real item, `(batch, num_items - 1)`.
    ///
    /// Column `k` is item `k + 1`.
    pub fn score_all_items(&self, users: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        InnerProductScorer.score_all(self.encode_users(users), self.item_vectors())
    }

    /// Joint loss for one batch: recommendation loss plus weighted KG BPR loss.
    pub fn training_step(
        &self,
        batch: &CkeBatch<B>,
        loss_type: RankingLoss,
        neg_count: usize,
        rng: &mut impl Rng,
    ) -> StepOutput<B> {
        let rec = self.forward_rec(batch, neg_count, rng);
        let kg = self.forward_kg(batch, neg_count, rng);

        let rec_loss = match loss_type {
            RankingLoss::Bpr => bpr_loss(rec.pos_score.clone(), rec.neg_score.clone()),
            RankingLoss::SampledSoftmax => sampled_softmax_loss(
                rec.pos_score.clone(),
                rec.pos_log_prob.clone(),
                rec.neg_score.clone(),
                rec.neg_log_prob.clone(),
            ),
            RankingLoss::FullSoftmax => full_softmax_loss(
                self.score_all_items(batch.users.clone()),
                batch.items.clone().sub_scalar(1),
            ),
        };
        let kg_loss = bpr_loss(kg.pos_score.clone(), kg.neg_score.clone());
        let loss = rec_loss.clone() + kg_loss.clone() * self.kg_loss_weight;

        StepOutput {
            loss,
            rec_loss,
            kg_loss,
            rec,
            kg,
        }
    }

    /// Scalar joint loss for one batch, shape `(1,)`.
    pub fn training_loss(
        &self,
        batch: &CkeBatch<B>,
        loss_type: RankingLoss,
        neg_count: usize,
        rng: &mut impl Rng,
    ) -> Tensor<B, 1> {
        self.training_step(batch, loss_type, neg_count, rng).loss
    }

    /// Final item representation for every real item, `(num_items - 1, D)`.
    ///
    /// `rec_item_emb[1..] + ent_emb[1..num_items]`; row `k` is item `k + 1`.
    pub fn item_vectors(&self) -> Tensor<B, 2> {
        self.item_encoder.item_vectors()
    }

    /// User vectors for every real user, `(num_users - 1, D)`; row `k` is user `k + 1`.
    pub fn user_vectors(&self) -> Tensor<B, 2> {
        self.user_emb.rows(1..self.num_users())
    }
}
