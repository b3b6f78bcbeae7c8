//! CKE training loop.
//!
//! One epoch walks the shuffled training interactions in batches, each paired
//! with an equally sized slice of KG triples, and minimizes the joint loss
//! with AdamW under a warmup + cosine learning-rate schedule. The model is
//! evaluated on the validation split every `eval_interval` epochs; the best
//! checkpoint is kept and training stops early after `patience` evaluations
//! without improvement.
//!
//! Checkpoint layout:
//!
//! ```text
//! {checkpoint_dir}/
//!   model_config.json
//!   epoch_{n}/   model.mpk  optimizer.mpk  meta.json  model_config.json
//!   best/        ...
//!   final/       ...
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;

use kgdata::{epoch_batches, KnowledgeDataset, SplitKind};

use crate::evaluation::{evaluate, EvalConfig};
use crate::model::bridge::tensor_to_f64;
use crate::model::cke::{Cke, CkeBatch, CkeConfig};
use crate::training::loss::RankingLoss;
use crate::training::metrics::{CkeMetrics, MetricsHistory, RunningAvg};

const MODEL_CONFIG_FILE: &str = "model_config.json";
const META_FILE: &str = "meta.json";

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    /// Epochs completed.
    pub epoch: usize,
    /// Optimizer steps taken.
    pub step: usize,
    pub best_epoch: Option<usize>,
    pub best_value: Option<f64>,
    /// Evaluations since the last improvement.
    pub bad_evals: usize,
}

/// Configuration for CKE training.
#[derive(Config, Debug)]
pub struct CkeTrainingConfig {
    /// Number of passes over the training interactions.
    #[config(default = 100)]
    pub epochs: usize,
    /// Interactions (and triples) per step.
    #[config(default = 2048)]
    pub batch_size: usize,
    /// Base learning rate for AdamW.
    #[config(default = 1e-3)]
    pub lr: f64,
    /// Weight decay for AdamW.
    #[config(default = 0.0)]
    pub weight_decay: f64,
    /// Gradient norm clipping; `None` disables it.
    #[config(default = "None")]
    pub max_grad_norm: Option<f64>,
    /// Sampled negatives per positive, for both towers.
    #[config(default = 1)]
    pub neg_count: usize,
    /// Recommendation loss.
    #[config(default = "RankingLoss::Bpr")]
    pub loss: RankingLoss,
    /// Linear warmup steps.
    #[config(default = 0)]
    pub warmup_steps: usize,
    /// Decay the learning rate along a cosine after warmup.
    #[config(default = false)]
    pub cosine_decay: bool,
    /// Epochs between validation runs; 0 disables validation.
    #[config(default = 1)]
    pub eval_interval: usize,
    /// Validation runs without improvement before stopping; 0 disables.
    #[config(default = 10)]
    pub patience: usize,
    /// Validation metric to maximize, e.g. `ndcg@20`.
    #[config(default = "String::from(\"ndcg@20\")")]
    pub monitor: String,
    /// Epochs between `epoch_{n}` checkpoints; 0 keeps only best and final.
    #[config(default = 10)]
    pub checkpoint_interval: usize,
    /// Directory for saving checkpoints.
    #[config(default = "String::from(\"checkpoints/cke\")")]
    pub checkpoint_dir: String,
    /// Steps between debug-level metric logs; 0 disables.
    #[config(default = 100)]
    pub log_interval: usize,
    /// Seed for batch shuffling and negative sampling.
    #[config(default = 2022)]
    pub seed: u64,
}

impl CkeTrainingConfig {
    pub fn validate(&self, eval_config: &EvalConfig) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        if self.neg_count == 0 {
            anyhow::bail!("neg_count must be > 0");
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            anyhow::bail!("lr must be a positive number, got {}", self.lr);
        }
        if self.eval_interval > 0 && !eval_config.metric_keys().contains(&self.monitor) {
            anyhow::bail!(
                "monitor `{}` is not produced by evaluation (available: {})",
                self.monitor,
                eval_config.metric_keys().join(", ")
            );
        }
        Ok(())
    }
}

/// Compute the learning rate at a given step using warmup + cosine decay.
///
/// - Warmup phase (`step < warmup_steps`): linearly ramps from 0 to `base_lr`.
/// - Cosine phase: decays from `base_lr` to 0 following a cosine schedule.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps)) as f64 / decay_steps as f64;
        let progress = progress.min(1.0);
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// Learning rate for `step` under `config`.
fn step_lr(config: &CkeTrainingConfig, total_steps: usize, step: usize) -> f64 {
    if config.cosine_decay {
        lr_schedule(config.lr, config.warmup_steps, total_steps, step)
    } else if config.warmup_steps > 0 && step < config.warmup_steps {
        config.lr * (step + 1) as f64 / config.warmup_steps as f64
    } else {
        config.lr
    }
}

/// A trained model with its run history.
pub struct TrainOutcome<B: AutodiffBackend> {
    /// Model after the last epoch. The best one is under `best/`.
    pub model: Cke<B>,
    pub history: MetricsHistory,
    pub best: Option<(usize, f64)>,
    pub epochs_run: usize,
    pub stopped_early: bool,
}

/// Run CKE training on `dataset`.
///
/// # Arguments
/// - `config`: training hyperparameters
/// - `model_config`: table sizes and dimensions
/// - `dataset`: loaded dataset; trains on `split.train` and `triples`
/// - `eval_config`: cut-offs for validation
/// - `device`: burn device for tensor operations
/// - `resume_epoch`: if `Some(n)`, restore model, optimizer and metadata from
///   `{checkpoint_dir}/epoch_{n}/` and continue from there
pub fn train<B: AutodiffBackend>(
    config: &CkeTrainingConfig,
    model_config: &CkeConfig,
    dataset: &KnowledgeDataset,
    eval_config: &EvalConfig,
    device: &B::Device,
    resume_epoch: Option<usize>,
) -> anyhow::Result<TrainOutcome<B>> {
    config.validate(eval_config)?;
    model_config.validate()?;
    if dataset.split.train.is_empty() {
        anyhow::bail!("dataset `{}` has no training interactions", dataset.name);
    }
    if dataset.triples.is_empty() {
        anyhow::bail!("dataset `{}` has no knowledge-graph triples", dataset.name);
    }

    let checkpoint_dir = PathBuf::from(&config.checkpoint_dir);
    std::fs::create_dir_all(&checkpoint_dir)?;
    model_config
        .save(checkpoint_dir.join(MODEL_CONFIG_FILE))
        .map_err(|e| anyhow::anyhow!("Failed to save model config: {e}"))?;

    let mut model = model_config.init::<B>(device);

    let mut optim_config = AdamWConfig::new().with_weight_decay(config.weight_decay as f32);
    if let Some(norm) = config.max_grad_norm {
        optim_config = optim_config.with_grad_clipping(Some(GradientClippingConfig::Norm(norm as f32)));
    }
    let mut optimizer = optim_config.init();

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut meta = CheckpointMeta {
        epoch: 0,
        step: 0,
        best_epoch: None,
        best_value: None,
        bad_evals: 0,
    };

    if let Some(epoch) = resume_epoch {
        let epoch_dir = checkpoint_dir.join(format!("epoch_{epoch}"));
        model = model
            .load_file(epoch_dir.join("model"), &recorder, device)
            .map_err(|e| anyhow::anyhow!("Failed to load model from {}: {e}", epoch_dir.display()))?;

        let optim_record = Recorder::<B>::load(&recorder, epoch_dir.join("optimizer"), device)
            .map_err(|e| anyhow::anyhow!("Failed to load optimizer from {}: {e}", epoch_dir.display()))?;
        optimizer = optimizer.load_record(optim_record);

        meta = read_meta(&epoch_dir)?;
        tracing::info!(
            epoch = meta.epoch,
            step = meta.step,
            best_value = ?meta.best_value,
            "Resumed training from checkpoint"
        );
    }

    let batches_per_epoch = dataset.split.train.len().div_ceil(config.batch_size);
    let total_steps = batches_per_epoch * config.epochs;
    tracing::info!(
        loss = %config.loss,
        epochs = config.epochs,
        batch_size = config.batch_size,
        batches_per_epoch,
        neg_count = config.neg_count,
        kg_loss_weight = model_config.kg_loss_weight,
        "Starting CKE training"
    );

    let mut history = MetricsHistory::new();
    if let (Some(epoch), Some(value)) = (meta.best_epoch, meta.best_value) {
        history.push_valid(epoch, value);
    }
    let train_start = Instant::now();
    let mut stopped_early = false;
    let start_epoch = meta.epoch;

    for epoch in start_epoch..config.epochs {
        let epoch_start = Instant::now();
        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        let batches = epoch_batches(
            &dataset.split.train,
            &dataset.triples,
            config.batch_size,
            &mut rng,
        );

        let pb = ProgressBar::new(batches.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(format!("epoch {}", epoch + 1));

        let mut epoch_avg = RunningAvg::new();
        let mut window_avg = RunningAvg::new();
        for batch in &batches {
            let lr = step_lr(config, total_steps, meta.step);
            let batch = CkeBatch::<B>::from_train_batch(batch, device);
            let out = model.training_step(&batch, config.loss, config.neg_count, &mut rng);

            let loss_val = tensor_to_f64(out.loss.clone());
            let metrics = CkeMetrics::compute(
                &out.rec,
                &out.kg,
                loss_val,
                tensor_to_f64(out.rec_loss.clone()),
                tensor_to_f64(out.kg_loss.clone()),
            );

            let grads = GradientsParams::from_grads(out.loss.backward(), &model);
            model = optimizer.step(lr, model, grads);
            meta.step += 1;

            epoch_avg.update(&metrics);
            window_avg.update(&metrics);
            if config.log_interval > 0 && meta.step % config.log_interval == 0 {
                let lr_str = format!("{lr:.2e}");
                tracing::debug!(step = meta.step, lr = %lr_str, "avg({}) {}", window_avg.count(), window_avg.display());
                window_avg.reset();
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        meta.epoch = epoch + 1;

        if let Some(avg) = epoch_avg.average() {
            let warnings = avg.health_check();
            if !warnings.is_empty() {
                tracing::warn!(epoch = meta.epoch, "Health check warnings: {:?}", warnings);
            }
            history.push_train(meta.epoch, avg);
        }
        tracing::info!(
            epoch = meta.epoch,
            elapsed_secs = format!("{:.1}", epoch_start.elapsed().as_secs_f64()),
            "avg({}) {}",
            epoch_avg.count(),
            epoch_avg.display()
        );

        if config.eval_interval > 0 && meta.epoch % config.eval_interval == 0 {
            let valid_model = model.valid();
            let metrics = evaluate(&valid_model, dataset, SplitKind::Valid, eval_config, device)?;
            if metrics.num_users == 0 {
                tracing::warn!(epoch = meta.epoch, "Validation split is empty; skipping model selection");
            } else {
                let value = metrics.get(&config.monitor).unwrap_or(f64::NEG_INFINITY);
                history.push_valid(meta.epoch, value);
                tracing::info!(
                    epoch = meta.epoch,
                    monitor = %config.monitor,
                    value = format!("{value:.4}"),
                    "Validation\n{}",
                    metrics.summary(&eval_config.cutoffs)
                );

                if meta.best_value.map_or(true, |best| value > best) {
                    meta.best_epoch = Some(meta.epoch);
                    meta.best_value = Some(value);
                    meta.bad_evals = 0;
                    save_checkpoint(&checkpoint_dir.join("best"), &model, &optimizer, &meta, model_config)?;
                    tracing::info!(epoch = meta.epoch, value = format!("{value:.4}"), "New best checkpoint");
                } else {
                    meta.bad_evals += 1;
                }
            }
        }

        if config.checkpoint_interval > 0 && meta.epoch % config.checkpoint_interval == 0 {
            let epoch_dir = checkpoint_dir.join(format!("epoch_{}", meta.epoch));
            save_checkpoint(&epoch_dir, &model, &optimizer, &meta, model_config)?;
            tracing::info!(epoch = meta.epoch, "Checkpoint saved (model + optimizer + meta)");
        }

        if config.patience > 0 && meta.bad_evals >= config.patience {
            tracing::info!(
                epoch = meta.epoch,
                best_epoch = ?meta.best_epoch,
                patience = config.patience,
                "Early stopping: no improvement"
            );
            stopped_early = true;
            break;
        }
    }

    save_checkpoint(&checkpoint_dir.join("final"), &model, &optimizer, &meta, model_config)?;
    tracing::info!(
        epochs = meta.epoch,
        steps = meta.step,
        best_epoch = ?meta.best_epoch,
        best_value = ?meta.best_value,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training complete. Final checkpoint saved (model + optimizer + meta)."
    );
    if !history.loss_decreased() && history.train.len() > 1 {
        tracing::warn!("Training loss did not decrease between the first and last epoch");
    }

    Ok(TrainOutcome {
        model,
        best: history.best_valid(),
        history,
        epochs_run: meta.epoch - start_epoch,
        stopped_early,
    })
}

/// Write model weights, optimizer state, metadata and model config to `dir`.
fn save_checkpoint<B, O>(
    dir: &Path,
    model: &Cke<B>,
    optimizer: &O,
    meta: &CheckpointMeta,
    model_config: &CkeConfig,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Cke<B>, B>,
{
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    model
        .clone()
        .save_file(dir.join("model"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {e}", dir.display()))?;
    Recorder::<B>::record(&recorder, optimizer.to_record(), dir.join("optimizer"))
        .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {}: {e}", dir.display()))?;
    serde_json::to_writer_pretty(std::fs::File::create(dir.join(META_FILE))?, meta)?;
    model_config
        .save(dir.join(MODEL_CONFIG_FILE))
        .map_err(|e| anyhow::anyhow!("Failed to save model config to {}: {e}", dir.display()))?;
    Ok(())
}

/// Read `meta.json` from a checkpoint directory.
pub fn read_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join(META_FILE);
    let meta = serde_json::from_reader(
        std::fs::File::open(&meta_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?,
    )
    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))?;
    Ok(meta)
}

/// Load a CKE model from a checkpoint directory.
///
/// Reads `model_config.json` to size the tables, then loads `model.mpk` on top.
pub fn load_checkpoint<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> anyhow::Result<(Cke<B>, CkeConfig)> {
    let config_path = dir.join(MODEL_CONFIG_FILE);
    let config = CkeConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", config_path.display()))?;
    config.validate()?;
    let model = config
        .init::<B>(device)
        .load_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))?;
    tracing::info!(path = %dir.display(), "Loaded CKE checkpoint");
    Ok((model, config))
}
