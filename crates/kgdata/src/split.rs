//! Per-user train / valid / test split.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{Interaction, SplitKind};

/// Interactions partitioned per user into train / valid / test.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<Interaction>,
    pub valid: Vec<Interaction>,
    pub test: Vec<Interaction>,
}

impl Split {
    pub fn get(&self, kind: SplitKind) -> &[Interaction] {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Valid => &self.valid,
            SplitKind::Test => &self.test,
        }
    }

    /// Item ids per user for one part of the split.
    pub fn items_by_user(&self, kind: SplitKind) -> HashMap<u32, HashSet<u32>> {
        let mut map: HashMap<u32, HashSet<u32>> = HashMap::new();
        for inter in self.get(kind) {
            map.entry(inter.user).or_default().insert(inter.item);
        }
        map
    }
}

/// Number of `(train, valid, test)` interactions for a user with `n` records.
///
/// Valid and test take the floor of their share; train keeps the rest and
/// never drops below one while `n > 0`.
pub fn split_counts(n: usize, ratio: [f64; 3]) -> (usize, usize, usize) {
    if n == 0 {
        return (0, 0, 0);
    }
    let total: f64 = ratio.iter().sum();
    let total = if total > 0.0 { total } else { 1.0 };

    let mut n_valid = (n as f64 * ratio[1] / total).floor() as usize;
    let mut n_test = (n as f64 * ratio[2] / total).floor() as usize;
    while n_valid + n_test >= n {
        if n_valid > 0 {
            n_valid -= 1;
        } else {
            n_test -= 1;
        }
    }
    (n - n_valid - n_test, n_valid, n_test)
}

/// Split interactions per user by `ratio`.
///
/// When every interaction of a user carries a timestamp the user's history
/// is ordered chronologically, so the latest interactions land in test.
/// Otherwise the history is shuffled with `seed`.
pub fn split_by_user(interactions: &[Interaction], ratio: [f64; 3], seed: u64) -> Split {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    // BTreeMap keeps user order stable across runs for a fixed seed.
    let mut by_user: BTreeMap<u32, Vec<Interaction>> = BTreeMap::new();
    for inter in interactions {
        by_user.entry(inter.user).or_default().push(*inter);
    }

    let mut split = Split::default();
    for (_, mut history) in by_user {
        if history.iter().all(|i| i.timestamp.is_some()) {
            history.sort_by(|a, b| {
                a.timestamp
                    .partial_cmp(&b.timestamp)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        } else {
            history.shuffle(&mut rng);
        }

        let (n_train, n_valid, _) = split_counts(history.len(), ratio);
        let mut rest = history.split_off(n_train);
        let test = rest.split_off(n_valid);
        split.train.extend(history);
        split.valid.extend(rest);
        split.test.extend(test);
    }

    tracing::debug!(
        train = split.train.len(),
        valid = split.valid.len(),
        test = split.test.len(),
        "Split interactions per user"
    );

    split
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inter(user: u32, item: u32, ts: Option<f64>) -> Interaction {
        Interaction {
            user,
            item,
            rating: 1.0,
            timestamp: ts,
        }
    }

    #[test]
    fn test_split_counts() {
        assert_eq!(split_counts(10, [0.8, 0.1, 0.1]), (8, 1, 1));
        assert_eq!(split_counts(5, [0.8, 0.1, 0.1]), (5, 0, 0));
        assert_eq!(split_counts(1, [0.0, 0.5, 0.5]), (1, 0, 0));
        assert_eq!(split_counts(2, [0.0, 0.5, 0.5]), (1, 0, 1));
        assert_eq!(split_counts(0, [0.8, 0.1, 0.1]), (0, 0, 0));
        // Unnormalized ratios behave like their normalized form
        assert_eq!(split_counts(10, [8.0, 1.0, 1.0]), (8, 1, 1));
    }

    #[test]
    fn test_chronological_split() {
        let history: Vec<Interaction> = (1..=10)
            .rev()
            .map(|i| inter(1, i, Some(i as f64)))
            .collect();
        let split = split_by_user(&history, [0.8, 0.1, 0.1], 7);

        assert_eq!(split.train.len(), 8);
        assert_eq!(split.valid.len(), 1);
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.valid[0].item, 9);
        assert_eq!(split.test[0].item, 10);
        assert!(split.train.iter().all(|i| i.item <= 8));
    }

    #[test]
    fn test_shuffled_split_is_seeded() {
        let history: Vec<Interaction> = (1..=20).map(|i| inter(i % 2 + 1, i, None)).collect();
        let a = split_by_user(&history, [0.6, 0.2, 0.2], 42);
        let b = split_by_user(&history, [0.6, 0.2, 0.2], 42);
        assert_eq!(a.test, b.test);
        assert_eq!(a.train.len() + a.valid.len() + a.test.len(), 20);
    }

    #[test]
    fn test_items_by_user() {
        let history = vec![inter(1, 3, None), inter(1, 4, None), inter(2, 3, None)];
        let split = Split {
            train: history,
            ..Default::default()
        };
        let map = split.items_by_user(SplitKind::Train);
        assert_eq!(map[&1].len(), 2);
        assert!(map[&2].contains(&3));
        assert!(split.items_by_user(SplitKind::Test).is_empty());
    }
}
