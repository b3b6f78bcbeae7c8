//! Record types shared by the loader, the splitter and the batcher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One user-item interaction, already mapped to dense ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub user: u32,
    pub item: u32,
    /// Explicit rating, 1.0 for implicit feedback.
    pub rating: f32,
    /// Interaction time, when the `.inter` file has one.
    pub timestamp: Option<f64>,
}

/// One knowledge-graph fact `(head, relation, tail)` in entity/relation ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    pub head: u32,
    pub relation: u32,
    pub tail: u32,
}

/// Which part of the per-user split to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Train,
    Valid,
    Test,
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Valid => write!(f, "valid"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for SplitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "valid" | "val" => Ok(Self::Valid),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown split `{other}` (expected train, valid or test)")),
        }
    }
}

/// Counts describing a loaded dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    /// Table sizes, padding included.
    pub num_users: usize,
    pub num_items: usize,
    pub num_entities: usize,
    pub num_relations: usize,
    pub num_interactions: usize,
    pub num_triples: usize,
    pub num_linked_items: usize,
    pub train_interactions: usize,
    pub valid_interactions: usize,
    pub test_interactions: usize,
}

impl DatasetSummary {
    /// Fraction of the user × item matrix that is observed.
    pub fn density(&self) -> f64 {
        let users = self.num_users.saturating_sub(1);
        let items = self.num_items.saturating_sub(1);
        if users == 0 || items == 0 {
            return 0.0;
        }
        self.num_interactions as f64 / (users as f64 * items as f64)
    }
}
