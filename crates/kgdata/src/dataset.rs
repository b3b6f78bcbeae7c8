//! Knowledge-aware dataset: interactions, item-entity links and KG triples.
//!
//! Items and entities share one index space. An item's entity id equals its
//! item id, so the item embedding and the entity embedding of the same
//! catalog object line up row by row. Entities that are not linked to any
//! item are numbered after the last item.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{DatasetError, Result};
use crate::reader::AtomicTable;
use crate::split::{split_by_user, Split};
use crate::types::{DatasetSummary, Interaction, Triple};
use crate::vocab::Vocab;

/// Prefix for placeholder entity tokens of items without a `.link` row.
const UNLINKED_ITEM_PREFIX: &str = "[ITEM]";

/// Where to find the atomic files and how to split them.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory holding `{name}.inter`, `{name}.kg` and `{name}.link`.
    pub dir: PathBuf,
    /// Dataset name, used as the file stem.
    pub name: String,
    /// Drop interactions rated below this value.
    #[serde(default)]
    pub rating_threshold: Option<f64>,
    /// Train / valid / test ratio per user.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: [f64; 3],
    /// Seed for shuffled splits.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_split_ratio() -> [f64; 3] {
    [0.8, 0.1, 0.1]
}
fn default_seed() -> u64 {
    2022
}

impl DataConfig {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            rating_threshold: None,
            split_ratio: default_split_ratio(),
            seed: default_seed(),
        }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.name))
    }
}

/// A loaded dataset with dense ids and a per-user split.
#[derive(Debug, Clone)]
pub struct KnowledgeDataset {
    pub name: String,
    pub users: Vocab,
    pub items: Vocab,
    pub entities: Vocab,
    pub relations: Vocab,
    /// All kept interactions, before splitting.
    pub interactions: Vec<Interaction>,
    pub triples: Vec<Triple>,
    pub split: Split,
    num_linked_items: usize,
}

impl KnowledgeDataset {
    /// Load `{dir}/{name}.inter`, `.link` (optional) and `.kg`, then split.
    pub fn load(config: &DataConfig) -> Result<Self> {
        let inter_table = AtomicTable::read(&config.file("inter"))?;
        let link_path = config.file("link");
        let link_table = if link_path.exists() {
            Some(AtomicTable::read(&link_path)?)
        } else {
            tracing::warn!(
                path = %link_path.display(),
                "No link file; items will not share embeddings with KG entities"
            );
            None
        };
        let kg_table = AtomicTable::read(&config.file("kg"))?;

        let dataset = Self::from_tables(
            &config.name,
            &inter_table,
            link_table.as_ref(),
            &kg_table,
            config,
        )?;

        tracing::info!(
            name = %dataset.name,
            users = dataset.num_users(),
            items = dataset.num_items(),
            entities = dataset.num_entities(),
            relations = dataset.num_relations(),
            interactions = dataset.interactions.len(),
            triples = dataset.triples.len(),
            "Loaded knowledge-aware dataset"
        );

        Ok(dataset)
    }

    /// Build a dataset from already parsed atomic tables.
    pub fn from_tables(
        name: &str,
        inter_table: &AtomicTable,
        link_table: Option<&AtomicTable>,
        kg_table: &AtomicTable,
        config: &DataConfig,
    ) -> Result<Self> {
        let mut users = Vocab::new();
        let mut items = Vocab::new();

        // Interactions
        let user_col = inter_table.column("user_id")?;
        let item_col = inter_table.column("item_id")?;
        let rating_col = inter_table.optional_column("rating");
        let ts_col = inter_table.optional_column("timestamp");

        let mut interactions = Vec::with_capacity(inter_table.len());
        let mut filtered = 0usize;
        for (line, fields) in inter_table.rows() {
            let rating = match rating_col {
                Some(c) => inter_table.parse_f64(line, "rating", &fields[c])?,
                None => 1.0,
            };
            if let Some(threshold) = config.rating_threshold {
                if rating < threshold {
                    filtered += 1;
                    continue;
                }
            }
            let timestamp = match ts_col {
                Some(c) => Some(inter_table.parse_f64(line, "timestamp", &fields[c])?),
                None => None,
            };
            interactions.push(Interaction {
                user: users.get_or_insert(&fields[user_col]),
                item: items.get_or_insert(&fields[item_col]),
                rating: rating as f32,
                timestamp,
            });
        }
        if filtered > 0 {
            tracing::info!(filtered, "Dropped interactions below rating threshold");
        }
        if interactions.is_empty() {
            return Err(DatasetError::Empty(format!(
                "{} has no usable interactions",
                inter_table.path().display()
            )));
        }

        // Item -> entity links. Items only present here still join the catalog.
        let mut item_entity: HashMap<u32, String> = HashMap::new();
        if let Some(link) = link_table {
            let item_col = link.column("item_id")?;
            let entity_col = link.column("entity_id")?;
            for (_, fields) in link.rows() {
                let item = items.get_or_insert(&fields[item_col]);
                item_entity.entry(item).or_insert_with(|| fields[entity_col].clone());
            }
        }

        // Entities: ids 1..num_items mirror item ids, then KG-only entities.
        let mut entities = Vocab::new();
        let mut num_linked_items = 0usize;
        for (item_id, item_token) in items.iter() {
            let linked = item_entity
                .get(&item_id)
                .filter(|entity| entities.id(entity).is_none());
            let entity_id = match linked {
                Some(entity) => {
                    num_linked_items += 1;
                    entities.get_or_insert(entity)
                }
                None => {
                    if item_entity.contains_key(&item_id) {
                        tracing::warn!(
                            item = item_token,
                            "Entity already linked to another item; keeping item unlinked"
                        );
                    }
                    entities.get_or_insert(&format!("{UNLINKED_ITEM_PREFIX}{item_token}"))
                }
            };
            debug_assert_eq!(entity_id, item_id);
        }

        // Knowledge-graph triples
        let mut relations = Vocab::new();
        let head_col = kg_table.column("head_id")?;
        let rel_col = kg_table.column("relation_id")?;
        let tail_col = kg_table.column("tail_id")?;
        let mut triples = Vec::with_capacity(kg_table.len());
        for (_, fields) in kg_table.rows() {
            triples.push(Triple {
                head: entities.get_or_insert(&fields[head_col]),
                relation: relations.get_or_insert(&fields[rel_col]),
                tail: entities.get_or_insert(&fields[tail_col]),
            });
        }
        if triples.is_empty() {
            return Err(DatasetError::Empty(format!(
                "{} has no triples",
                kg_table.path().display()
            )));
        }

        let split = split_by_user(&interactions, config.split_ratio, config.seed);

        Ok(Self {
            name: name.to_string(),
            users,
            items,
            entities,
            relations,
            interactions,
            triples,
            split,
            num_linked_items,
        })
    }

    /// User table size, padding included.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Item table size, padding included.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Entity table size, padding included. Always `>= num_items()`.
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    /// Relation table size, padding included.
    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn num_linked_items(&self) -> usize {
        self.num_linked_items
    }

    pub fn user_id(&self, token: &str) -> Result<u32> {
        self.users.id(token).ok_or_else(|| DatasetError::UnknownToken {
            kind: "user",
            token: token.to_string(),
        })
    }

    pub fn item_token(&self, id: u32) -> Option<&str> {
        self.items.token(id)
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            name: self.name.clone(),
            num_users: self.num_users(),
            num_items: self.num_items(),
            num_entities: self.num_entities(),
            num_relations: self.num_relations(),
            num_interactions: self.interactions.len(),
            num_triples: self.triples.len(),
            num_linked_items: self.num_linked_items,
            train_interactions: self.split.train.len(),
            valid_interactions: self.split.valid.len(),
            test_interactions: self.split.test.len(),
        }
    }
}
