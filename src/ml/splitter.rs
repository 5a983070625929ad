// src/ml/splitter.rs
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{LabeledTitles, Split};

/// Randomly partitions `data` into train and test sets.
///
/// `ceil(test_fraction * n)` rows go to the test set and the rest to training,
/// so eight rows at 0.2 split 6/2. With `seed` set the partition is
/// reproducible; without it every call draws a new one.
pub fn split_train_test(data: &LabeledTitles, test_fraction: f64, seed: Option<u64>) -> Split {
    let total = data.len();
    let test_fraction = test_fraction.clamp(0.0, 1.0);
    let n_test = ((total as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.min(total);

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..total).collect();
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    let split = Split {
        train: data.select(train_idx),
        test: data.select(test_idx),
    };

    debug!(
        "Dataset split: {} training, {} test (seed: {:?})",
        split.train.len(),
        split.test.len(),
        seed
    );
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn corpus(n: usize) -> LabeledTitles {
        LabeledTitles {
            ids: (0..n as u64).collect(),
            titles: (0..n).map(|i| format!("title {}", i)).collect(),
            labels: (0..n).map(|i| if i % 3 == 0 { None } else { Some(i as u32) }).collect(),
        }
    }

    #[test]
    fn test_eight_rows_split_six_two() {
        let split = split_train_test(&corpus(8), 0.2, None);
        assert_eq!(split.train.len(), 6);
        assert_eq!(split.test.len(), 2);
    }

    #[test]
    fn test_all_rows_preserved_and_disjoint() {
        let data = corpus(53);
        let split = split_train_test(&data, 0.2, None);
        assert_eq!(split.train.len() + split.test.len(), data.len());

        let train: HashSet<u64> = split.train.ids.iter().copied().collect();
        let test: HashSet<u64> = split.test.ids.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 53);
    }

    #[test]
    fn test_missing_labels_travel_with_their_rows() {
        let data = corpus(12);
        let split = split_train_test(&data, 0.25, Some(3));
        for part in [&split.train, &split.test] {
            for (id, label) in part.ids.iter().zip(&part.labels) {
                assert_eq!(*label, data.labels[*id as usize]);
            }
        }
        assert_eq!(
            split.train.missing_label_count() + split.test.missing_label_count(),
            data.missing_label_count()
        );
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let data = corpus(40);
        let a = split_train_test(&data, 0.2, Some(42));
        let b = split_train_test(&data, 0.2, Some(42));
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_empty_dataset() {
        let split = split_train_test(&LabeledTitles::default(), 0.2, None);
        assert!(split.train.is_empty());
        assert!(split.test.is_empty());
    }
}
