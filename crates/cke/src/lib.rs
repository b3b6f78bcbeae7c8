//! Collaborative Knowledge base Embedding (CKE) recommender.
//!
//! Items are represented as the sum of a collaborative embedding and the
//! embedding of the item's knowledge-graph entity. The entity table is
//! trained jointly by a TransR-style KG loss (relation-specific projection,
//! negative Euclidean distance) and by the recommendation ranking loss.

pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;

pub use evaluation::{evaluate, EvalConfig, RankingMetrics};
pub use inference::{top_k, Recommendation, Recommender};
pub use model::cke::{Cke, CkeBatch, CkeConfig, ScoredPairs, StepOutput};
pub use training::loss::RankingLoss;
pub use training::trainer::{load_checkpoint, train, CheckpointMeta, CkeTrainingConfig, TrainOutcome};
