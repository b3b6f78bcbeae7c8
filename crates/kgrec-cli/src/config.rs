//! TOML config loading for the kgrec CLI.
//!
//! Deserializes a config with `[data]`, `[model]`, `[training]` and
//! `[evaluation]` sections, then merges training values with CLI overrides.
//! Only `[data]` is required.

use std::path::{Path, PathBuf};

use cke::{CkeConfig, CkeTrainingConfig, EvalConfig, RankingLoss};
use kgdata::{DataConfig, KnowledgeDataset};
use serde::Deserialize;

/// Top-level structure matching `configs/cke.toml`.
#[derive(Debug, Deserialize)]
pub struct KgrecToml {
    /// Dataset location and split.
    pub data: DataConfig,
    /// Model dimensions.
    #[serde(default)]
    pub model: ModelSection,
    /// Training overrides on top of `CkeTrainingConfig` defaults.
    #[serde(default)]
    pub training: TrainingOverrides,
    /// Offline evaluation settings.
    #[serde(default)]
    pub evaluation: EvalConfig,
}

/// Model dimensions. Table sizes come from the dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_dim")]
    pub embed_dim: usize,
    #[serde(default = "default_dim")]
    pub pro_embed_dim: usize,
    #[serde(default = "default_kg_loss_weight")]
    pub kg_loss_weight: f64,
}

fn default_dim() -> usize {
    64
}
fn default_kg_loss_weight() -> f64 {
    1.0
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            embed_dim: default_dim(),
            pro_embed_dim: default_dim(),
            kg_loss_weight: default_kg_loss_weight(),
        }
    }
}

/// Optional overrides for `CkeTrainingConfig` fields.
#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub max_grad_norm: Option<f64>,
    pub neg_count: Option<usize>,
    pub loss: Option<RankingLoss>,
    pub warmup_steps: Option<usize>,
    pub cosine_decay: Option<bool>,
    pub eval_interval: Option<usize>,
    pub patience: Option<usize>,
    pub monitor: Option<String>,
    pub checkpoint_interval: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub log_interval: Option<usize>,
    pub seed: Option<u64>,
}

/// Training flags given on the command line.
#[derive(Debug, Default)]
pub struct TrainingCli {
    pub epochs: Option<usize>,
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// Load and deserialize a `KgrecToml` from a TOML file.
pub fn load_kgrec_toml(path: &Path) -> anyhow::Result<KgrecToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: KgrecToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), dataset = %config.data.name, "Loaded config");
    Ok(config)
}

/// Build a `CkeTrainingConfig` from defaults, TOML overrides, and CLI flags.
///
/// Priority chain: `CkeTrainingConfig::new()` defaults < TOML values < CLI flags.
pub fn build_training_config(overrides: &TrainingOverrides, cli: &TrainingCli) -> CkeTrainingConfig {
    let mut config = CkeTrainingConfig::new();

    if let Some(v) = overrides.epochs {
        config.epochs = v;
    }
    if let Some(v) = overrides.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = overrides.lr {
        config.lr = v;
    }
    if let Some(v) = overrides.weight_decay {
        config.weight_decay = v;
    }
    if overrides.max_grad_norm.is_some() {
        config.max_grad_norm = overrides.max_grad_norm;
    }
    if let Some(v) = overrides.neg_count {
        config.neg_count = v;
    }
    if let Some(v) = overrides.loss {
        config.loss = v;
    }
    if let Some(v) = overrides.warmup_steps {
        config.warmup_steps = v;
    }
    if let Some(v) = overrides.cosine_decay {
        config.cosine_decay = v;
    }
    if let Some(v) = overrides.eval_interval {
        config.eval_interval = v;
    }
    if let Some(v) = overrides.patience {
        config.patience = v;
    }
    if let Some(v) = &overrides.monitor {
        config.monitor = v.clone();
    }
    if let Some(v) = overrides.checkpoint_interval {
        config.checkpoint_interval = v;
    }
    if let Some(v) = &overrides.checkpoint_dir {
        config.checkpoint_dir = v.clone();
    }
    if let Some(v) = overrides.log_interval {
        config.log_interval = v;
    }
    if let Some(v) = overrides.seed {
        config.seed = v;
    }

    // CLI flags take highest priority
    if let Some(v) = cli.epochs {
        config.epochs = v;
    }
    if let Some(v) = &cli.output {
        config.checkpoint_dir = v.to_string_lossy().into_owned();
    }
    if let Some(v) = cli.seed {
        config.seed = v;
    }

    config
}

/// Size a `CkeConfig` for `dataset` with the dimensions from `[model]`.
pub fn build_model_config(model: &ModelSection, dataset: &KnowledgeDataset) -> CkeConfig {
    CkeConfig::new(
        dataset.num_users(),
        dataset.num_items(),
        dataset.num_entities(),
        dataset.num_relations(),
    )
    .with_embed_dim(model.embed_dim)
    .with_pro_embed_dim(model.pro_embed_dim)
    .with_kg_loss_weight(model.kg_loss_weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_toml() {
        let toml_str = r#"
[data]
dir = "data/ml-100k"
name = "ml-100k"
rating_threshold = 3.0
split_ratio = [0.7, 0.1, 0.2]
seed = 7

[model]
embed_dim = 32
pro_embed_dim = 16
kg_loss_weight = 0.5

[training]
epochs = 5
batch_size = 512
lr = 0.01
loss = "sampled_softmax"
neg_count = 8
monitor = "recall@10"
checkpoint_dir = "out/cke"

[evaluation]
cutoffs = [5, 10]
batch_size = 128
"#;
        let config: KgrecToml = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data.name, "ml-100k");
        assert_eq!(config.data.rating_threshold, Some(3.0));
        assert_eq!(config.data.seed, 7);
        assert_eq!(config.model.embed_dim, 32);
        assert_eq!(config.model.pro_embed_dim, 16);
        assert!((config.model.kg_loss_weight - 0.5).abs() < 1e-12);
        assert_eq!(config.training.loss, Some(RankingLoss::SampledSoftmax));
        assert_eq!(config.evaluation.cutoffs, vec![5, 10]);
        assert_eq!(config.evaluation.batch_size, 128);

        let training = build_training_config(&config.training, &TrainingCli::default());
        assert_eq!(training.epochs, 5);
        assert_eq!(training.batch_size, 512);
        assert_eq!(training.neg_count, 8);
        assert_eq!(training.monitor, "recall@10");
        assert_eq!(training.checkpoint_dir, "out/cke");
        // untouched fields keep their defaults
        assert_eq!(training.patience, 10);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
[data]
dir = "data/toy"
name = "toy"
"#;
        let config: KgrecToml = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data.split_ratio, [0.8, 0.1, 0.1]);
        assert_eq!(config.data.seed, 2022);
        assert!(config.data.rating_threshold.is_none());
        assert_eq!(config.model.embed_dim, 64);
        assert_eq!(config.model.pro_embed_dim, 64);
        assert!((config.model.kg_loss_weight - 1.0).abs() < 1e-12);
        assert_eq!(config.evaluation.cutoffs, vec![10, 20]);
        assert!(config.training.epochs.is_none());

        let training = build_training_config(&config.training, &TrainingCli::default());
        assert_eq!(training.loss, RankingLoss::Bpr);
        assert_eq!(training.monitor, "ndcg@20");
    }

    #[test]
    fn test_missing_data_section_is_an_error() {
        let result: Result<KgrecToml, _> = toml::from_str("[model]\nembed_dim = 8\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_override_priority() {
        let overrides = TrainingOverrides {
            epochs: Some(50),
            seed: Some(1),
            checkpoint_dir: Some("from/toml".into()),
            ..Default::default()
        };
        let cli = TrainingCli {
            epochs: Some(3),
            output: Some(PathBuf::from("from/cli")),
            seed: None,
        };
        let config = build_training_config(&overrides, &cli);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.checkpoint_dir, "from/cli");
        assert_eq!(config.seed, 1);
    }

    #[test]
    fn test_unknown_loss_rejected() {
        let toml_str = r#"
[data]
dir = "d"
name = "n"

[training]
loss = "hinge"
"#;
        assert!(toml::from_str::<KgrecToml>(toml_str).is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/cke.toml");
        let config = load_kgrec_toml(&path).unwrap();
        let training = build_training_config(&config.training, &TrainingCli::default());
        assert!(training.validate(&config.evaluation).is_ok());
    }
}
