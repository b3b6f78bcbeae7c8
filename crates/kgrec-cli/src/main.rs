mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kgdata::SplitKind;
use pipeline::{EvaluateArgs, ExportArgs, RecommendArgs, SummaryArgs, TrainArgs};

/// kgrec: knowledge-graph-enhanced recommendation with CKE.
#[derive(Parser)]
#[command(name = "kgrec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for dataset inspection, training, evaluation and serving.
#[derive(Subcommand)]
enum Command {
    /// Print statistics of the configured dataset.
    Summary {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/cke.toml")]
        config: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Train CKE on the configured dataset.
    Train {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/cke.toml")]
        config: PathBuf,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the checkpoint directory.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the training seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Resume from the `epoch_{N}` checkpoint.
        #[arg(long)]
        resume_epoch: Option<usize>,
    },
    /// Full-ranking evaluation of a checkpoint.
    Evaluate {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/cke.toml")]
        config: PathBuf,
        /// Checkpoint directory (e.g. checkpoints/cke/best).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Split to evaluate: valid or test.
        #[arg(long, default_value = "test")]
        split: SplitKind,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Recommend top-k items for a user.
    Recommend {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/cke.toml")]
        config: PathBuf,
        /// Checkpoint directory.
        #[arg(long)]
        checkpoint: PathBuf,
        /// User token from the interaction file.
        #[arg(long)]
        user: String,
        /// Number of items to return.
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Export final item vectors to a Parquet file.
    ExportVectors {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/cke.toml")]
        config: PathBuf,
        /// Checkpoint directory.
        #[arg(long)]
        checkpoint: PathBuf,
        /// Output Parquet file.
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Summary { config, json } => pipeline::run_summary(SummaryArgs { config, json }),
        Command::Train {
            config,
            epochs,
            output,
            seed,
            resume_epoch,
        } => pipeline::run_train(TrainArgs {
            config,
            epochs,
            output,
            seed,
            resume_epoch,
        }),
        Command::Evaluate {
            config,
            checkpoint,
            split,
            json,
        } => pipeline::run_evaluate(EvaluateArgs {
            config,
            checkpoint,
            split,
            json,
        }),
        Command::Recommend {
            config,
            checkpoint,
            user,
            k,
            json,
        } => pipeline::run_recommend(RecommendArgs {
            config,
            checkpoint,
            user,
            k,
            json,
        }),
        Command::ExportVectors {
            config,
            checkpoint,
            output,
        } => pipeline::run_export(ExportArgs {
            config,
            checkpoint,
            output,
        }),
    }
}
