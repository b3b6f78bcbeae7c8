//! Training batches pairing interactions with knowledge-graph triples.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{Interaction, Triple};

/// One joint training step: a slice of interactions plus a slice of triples.
///
/// Ids are `i64` so they can be handed to integer tensors without another
/// conversion. Both halves always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainBatch {
    pub users: Vec<i64>,
    pub items: Vec<i64>,
    pub ratings: Vec<f32>,
    pub heads: Vec<i64>,
    pub relations: Vec<i64>,
    pub tails: Vec<i64>,
}

impl TrainBatch {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Build one epoch of shuffled batches.
///
/// Interactions are shuffled and chunked by `batch_size`; the last batch may
/// be shorter. Triples are shuffled once and consumed cyclically, so every
/// batch carries as many triples as interactions even when the KG is the
/// smaller of the two.
pub fn epoch_batches(
    interactions: &[Interaction],
    triples: &[Triple],
    batch_size: usize,
    rng: &mut impl Rng,
) -> Vec<TrainBatch> {
    assert!(batch_size > 0, "batch_size must be > 0");
    if interactions.is_empty() || triples.is_empty() {
        return Vec::new();
    }

    let mut inter_order: Vec<usize> = (0..interactions.len()).collect();
    inter_order.shuffle(rng);
    let mut triple_order: Vec<usize> = (0..triples.len()).collect();
    triple_order.shuffle(rng);

    let mut cursor = 0usize;
    inter_order
        .chunks(batch_size)
        .map(|chunk| {
            let mut batch = TrainBatch {
                users: Vec::with_capacity(chunk.len()),
                items: Vec::with_capacity(chunk.len()),
                ratings: Vec::with_capacity(chunk.len()),
                heads: Vec::with_capacity(chunk.len()),
                relations: Vec::with_capacity(chunk.len()),
                tails: Vec::with_capacity(chunk.len()),
            };
            for &idx in chunk {
                let inter = &interactions[idx];
                batch.users.push(inter.user as i64);
                batch.items.push(inter.item as i64);
                batch.ratings.push(inter.rating);

                let triple = &triples[triple_order[cursor % triple_order.len()]];
                cursor += 1;
                batch.heads.push(triple.head as i64);
                batch.relations.push(triple.relation as i64);
                batch.tails.push(triple.tail as i64);
            }
            batch
        })
        .collect()
}
