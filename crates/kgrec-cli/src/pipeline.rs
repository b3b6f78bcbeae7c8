/// Subcommand implementations: dataset summary, training, evaluation,
/// recommendation and item-vector export.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;

use cke::{evaluate, load_checkpoint, train, Recommender};
use kgdata::{KnowledgeDataset, SplitKind};

use crate::config::{build_model_config, build_training_config, load_kgrec_toml, KgrecToml, TrainingCli};

/// Inference backend.
type InferBackend = NdArray<f32>;
/// Training backend.
type TrainBackend = Autodiff<InferBackend>;

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub config: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: PathBuf,
    /// Override `[training] epochs`.
    pub epochs: Option<usize>,
    /// Override `[training] checkpoint_dir`.
    pub output: Option<PathBuf>,
    /// Override `[training] seed`.
    pub seed: Option<u64>,
    /// Resume from `{checkpoint_dir}/epoch_{n}`.
    pub resume_epoch: Option<usize>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    pub config: PathBuf,
    /// Checkpoint directory (e.g. `checkpoints/cke/best`).
    pub checkpoint: PathBuf,
    pub split: SplitKind,
    pub json: bool,
}

/// Arguments for the `recommend` subcommand.
#[derive(Debug)]
pub struct RecommendArgs {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    /// User token as it appears in the `.inter` file.
    pub user: String,
    pub k: usize,
    pub json: bool,
}

/// Arguments for the `export-vectors` subcommand.
#[derive(Debug)]
pub struct ExportArgs {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    /// Output Parquet file.
    pub output: PathBuf,
}

fn load_dataset(config: &Path) -> anyhow::Result<(KgrecToml, KnowledgeDataset)> {
    let toml = load_kgrec_toml(config)?;
    let dataset = KnowledgeDataset::load(&toml.data)?;
    Ok((toml, dataset))
}

/// Print dataset statistics.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let (_, dataset) = load_dataset(&args.config)?;
    let summary = dataset.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Dataset Summary ---");
    println!("Name: {}", summary.name);
    // table sizes include the padding row
    println!("Users: {}", summary.num_users.saturating_sub(1));
    println!("Items: {}", summary.num_items.saturating_sub(1));
    println!("Entities: {}", summary.num_entities.saturating_sub(1));
    println!("Relations: {}", summary.num_relations.saturating_sub(1));
    println!("Linked items: {}", summary.num_linked_items);
    println!("Interactions: {}", summary.num_interactions);
    println!("Triples: {}", summary.num_triples);
    println!(
        "Split: train={} valid={} test={}",
        summary.train_interactions, summary.valid_interactions, summary.test_interactions
    );
    println!("Density: {:.4}%", summary.density() * 100.0);
    Ok(())
}

/// Train CKE and report test metrics of the best checkpoint.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let (toml, dataset) = load_dataset(&args.config)?;

    let training = build_training_config(
        &toml.training,
        &TrainingCli {
            epochs: args.epochs,
            output: args.output,
            seed: args.seed,
        },
    );
    let model_config = build_model_config(&toml.model, &dataset);
    tracing::info!(
        embed_dim = model_config.embed_dim,
        pro_embed_dim = model_config.pro_embed_dim,
        checkpoint_dir = %training.checkpoint_dir,
        "Training CKE"
    );

    let device = Default::default();
    let outcome = train::<TrainBackend>(
        &training,
        &model_config,
        &dataset,
        &toml.evaluation,
        &device,
        args.resume_epoch,
    )?;

    let selected = if outcome.best.is_some() { "best" } else { "final" };
    let checkpoint = PathBuf::from(&training.checkpoint_dir).join(selected);
    let (model, _) = load_checkpoint::<InferBackend>(&checkpoint, &device)?;
    let metrics = evaluate(&model, &dataset, SplitKind::Test, &toml.evaluation, &device)?;

    println!("--- Training Summary ---");
    println!("Epochs run: {}", outcome.epochs_run);
    if outcome.stopped_early {
        println!("Stopped early (patience {})", training.patience);
    }
    if let Some((epoch, value)) = outcome.best {
        println!("Best {}: {value:.4} (epoch {epoch})", training.monitor);
    }
    println!("Checkpoint: {}", checkpoint.display());
    println!("Test metrics:\n{}", metrics.summary(&toml.evaluation.cutoffs));
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Full-ranking evaluation of a checkpoint on one split.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let (toml, dataset) = load_dataset(&args.config)?;
    let device = Default::default();
    let (model, _) = load_checkpoint::<InferBackend>(&args.checkpoint, &device)?;
    let metrics = evaluate(&model, &dataset, args.split, &toml.evaluation, &device)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!("--- Evaluation ({}) ---", args.split);
        println!("Checkpoint: {}", args.checkpoint.display());
        println!("{}", metrics.summary(&toml.evaluation.cutoffs));
    }
    Ok(())
}

/// Print top-k items for one user.
pub fn run_recommend(args: RecommendArgs) -> anyhow::Result<()> {
    let (_, dataset) = load_dataset(&args.config)?;
    let device = Default::default();
    let recommender = Recommender::load::<InferBackend>(&args.checkpoint, &device)?;
    let recs = recommender.recommend(&dataset, &args.user, args.k)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recs)?);
    } else {
        println!("--- Top {} for {} ---", args.k, args.user);
        for (rank, rec) in recs.iter().enumerate() {
            println!("{:>3}. {} ({:.4})", rank + 1, rec.token, rec.score);
        }
    }
    Ok(())
}

/// Write final item vectors to Parquet.
pub fn run_export(args: ExportArgs) -> anyhow::Result<()> {
    let (_, dataset) = load_dataset(&args.config)?;
    let device = Default::default();
    let recommender = Recommender::load::<InferBackend>(&args.checkpoint, &device)?;
    let vectors = recommender.export_item_vectors(&dataset)?;
    vectors.save(&args.output)?;

    println!("Exported {} item vectors (dim {})", vectors.len(), vectors.dim());
    println!("Output: {}", args.output.display());
    Ok(())
}
