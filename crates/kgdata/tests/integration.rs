//! Integration tests for the kgdata crate.
//!
//! Writes small atomic files to a temp directory and checks loading,
//! entity id sharing, splitting and batching end to end.

use std::path::Path;

use rand::SeedableRng;
use tempfile::TempDir;

use kgdata::{epoch_batches, DataConfig, DatasetError, KnowledgeDataset, SplitKind};

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

/// Three users, four movies, a director/genre KG. `m4` has no link row and
/// `m1`/`m2` are linked to entities that also appear as KG heads.
fn write_toy(dir: &Path) {
    write(
        dir,
        "toy.inter",
        "user_id:token\titem_id:token\trating:float\ttimestamp:float\n\
         u1\tm1\t5\t1\n\
         u1\tm2\t4\t2\n\
         u1\tm3\t1\t3\n\
         u2\tm2\t5\t1\n\
         u2\tm4\t3\t2\n\
         u3\tm1\t4\t5\n",
    );
    write(
        dir,
        "toy.link",
        "item_id:token\tentity_id:token\n\
         m1\tQ1\n\
         m2\tQ2\n\
         m3\tQ3\n\
         m5\tQ5\n",
    );
    write(
        dir,
        "toy.kg",
        "head_id:token\trelation_id:token\ttail_id:token\n\
         Q1\tdirected_by\tnolan\n\
         Q2\tdirected_by\tnolan\n\
         Q3\thas_genre\tdrama\n\
         Q5\thas_genre\tdrama\n",
    );
}

#[test]
fn test_load_shares_item_and_entity_ids() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    let config = DataConfig::new(tmp.path(), "toy");
    let ds = KnowledgeDataset::load(&config).unwrap();

    // padding + u1..u3
    assert_eq!(ds.num_users(), 4);
    // padding + m1..m4 from .inter + m5 from .link
    assert_eq!(ds.num_items(), 6);
    // padding + 5 item slots + nolan + drama
    assert_eq!(ds.num_entities(), 8);
    // padding + 2 relations
    assert_eq!(ds.num_relations(), 3);
    assert_eq!(ds.num_linked_items(), 4);
    assert!(ds.num_entities() >= ds.num_items());

    for token in ["m1", "m2", "m3", "m5"] {
        let item_id = ds.items.id(token).unwrap();
        let entity = format!("Q{}", &token[1..]);
        assert_eq!(ds.entities.id(&entity), Some(item_id), "{token} must share its id");
    }

    // KG triples reference the shared ids
    let m1 = ds.items.id("m1").unwrap();
    let nolan = ds.entities.id("nolan").unwrap();
    assert!(nolan >= ds.num_items() as u32);
    assert!(ds
        .triples
        .iter()
        .any(|t| t.head == m1 && t.tail == nolan));
}

#[test]
fn test_rating_threshold_filters() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    let mut config = DataConfig::new(tmp.path(), "toy");
    config.rating_threshold = Some(3.0);
    let ds = KnowledgeDataset::load(&config).unwrap();
    assert_eq!(ds.interactions.len(), 5);
    assert!(ds.interactions.iter().all(|i| i.rating >= 3.0));
}

#[test]
fn test_split_and_summary() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    let mut config = DataConfig::new(tmp.path(), "toy");
    config.split_ratio = [1.0, 1.0, 1.0];
    let ds = KnowledgeDataset::load(&config).unwrap();

    let summary = ds.summary();
    assert_eq!(summary.num_interactions, 6);
    assert_eq!(
        summary.train_interactions + summary.valid_interactions + summary.test_interactions,
        6
    );
    // u1 has 3 chronological interactions: m1 train, m2 valid, m3 test
    let u1 = ds.user_id("u1").unwrap();
    let test = ds.split.items_by_user(SplitKind::Test);
    assert!(test[&u1].contains(&ds.items.id("m3").unwrap()));
    // every user keeps a training interaction
    let train = ds.split.items_by_user(SplitKind::Train);
    assert_eq!(train.len(), 3);
}

#[test]
fn test_unknown_user_token() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    let ds = KnowledgeDataset::load(&DataConfig::new(tmp.path(), "toy")).unwrap();
    assert!(matches!(
        ds.user_id("nobody"),
        Err(DatasetError::UnknownToken { kind: "user", .. })
    ));
}

#[test]
fn test_missing_link_file_keeps_items_unlinked() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    std::fs::remove_file(tmp.path().join("toy.link")).unwrap();
    let ds = KnowledgeDataset::load(&DataConfig::new(tmp.path(), "toy")).unwrap();
    assert_eq!(ds.num_linked_items(), 0);
    assert_eq!(ds.num_items(), 5);
    // 4 item placeholders + Q1 Q2 Q3 Q5 nolan drama
    assert_eq!(ds.num_entities(), 1 + 4 + 6);
}

#[test]
fn test_missing_kg_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    std::fs::remove_file(tmp.path().join("toy.kg")).unwrap();
    let err = KnowledgeDataset::load(&DataConfig::new(tmp.path(), "toy")).unwrap_err();
    assert!(matches!(err, DatasetError::Io { .. }));
}

#[test]
fn test_batches_from_loaded_dataset() {
    let tmp = TempDir::new().unwrap();
    write_toy(tmp.path());
    let ds = KnowledgeDataset::load(&DataConfig::new(tmp.path(), "toy")).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let batches = epoch_batches(&ds.split.train, &ds.triples, 2, &mut rng);

    let total: usize = batches.iter().map(|b| b.len()).sum();
    assert_eq!(total, ds.split.train.len());
    for batch in &batches {
        assert!(batch.users.iter().all(|&u| u > 0 && (u as usize) < ds.num_users()));
        assert!(batch.items.iter().all(|&i| i > 0 && (i as usize) < ds.num_items()));
        assert!(batch.tails.iter().all(|&t| t > 0 && (t as usize) < ds.num_entities()));
    }
}
