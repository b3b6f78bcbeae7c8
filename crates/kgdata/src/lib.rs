//! Knowledge-aware recommendation datasets.
//!
//! Loads atomic files (`.inter`, `.kg`, `.link`) into dense-id vocabularies
//! where catalog items and knowledge-graph entities share one index space,
//! splits interactions per user, builds joint training batches, and stores
//! trained item vectors as Parquet.

pub mod batch;
pub mod dataset;
pub mod error;
pub mod reader;
pub mod split;
pub mod types;
pub mod vectors;
pub mod vocab;

pub use batch::{epoch_batches, TrainBatch};
pub use dataset::{DataConfig, KnowledgeDataset};
pub use error::DatasetError;
pub use reader::AtomicTable;
pub use split::Split;
pub use types::{DatasetSummary, Interaction, SplitKind, Triple};
pub use vectors::ItemVectors;
pub use vocab::{Vocab, PAD_TOKEN};
