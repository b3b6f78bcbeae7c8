//! CKE training pipeline: uniform negative sampling, ranking losses,
//! metrics with health checks, and the AdamW training loop.

pub mod loss;
pub mod metrics;
pub mod sampler;
pub mod trainer;
