use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::dataset::Dataset;
use crate::error::{PredictError, Result};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train: Dataset,
    pub test: Dataset,
    pub dropped_train: usize,
    pub dropped_test: usize,
}

/// Stratified train/test partition, then lockstep removal of rows holding an
/// undefined feature from each partition.
///
/// Stratification runs on the uncleaned table so the partition is a pure
/// function of `(labels, seed)`. Both partitions come back densely indexed.
pub fn split_and_clean(dataset: &Dataset, test_fraction: f64, seed: u64) -> Result<SplitDataset> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PredictError::InvalidConfig {
            field: "test_fraction",
            reason: format!("{test_fraction} is outside (0, 1)"),
        });
    }

    let (train_rows, test_rows) = stratified_indices(dataset.outcomes(), test_fraction, seed);
    let mut train = dataset.select(&train_rows);
    let mut test = dataset.select(&test_rows);
    let dropped_train = train.drop_undefined_rows();
    let dropped_test = test.drop_undefined_rows();

    info!(
        train = train.len(),
        test = test.len(),
        dropped_train,
        dropped_test,
        "dataset split"
    );
    Ok(SplitDataset {
        train,
        test,
        dropped_train,
        dropped_test,
    })
}

/// Row indices for each partition. Every class contributes
/// `round(n_class * test_fraction)` rows to the test side, so each side keeps
/// the global class ratio up to rounding.
pub fn stratified_indices(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for class in classes {
        let mut rows = labels
            .iter()
            .enumerate()
            .filter(|(_, y)| **y == class)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.min(rows.len());
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::GameMeta;
    use crate::features::FEATURE_COUNT;

    fn dataset(n: usize, nan_every: usize) -> Dataset {
        let mut ds = Dataset::new();
        for i in 0..n {
            let mut row = [i as f64; FEATURE_COUNT];
            if nan_every > 0 && i % nan_every == 0 {
                row[3] = f64::NAN;
            }
            let outcome = u8::from(i % 5 < 3);
            ds.push(
                row,
                outcome,
                GameMeta {
                    season: 2000 + (i % 3) as i32,
                    home_team: format!("Home {i}"),
                    away_team: format!("Away {i}"),
                },
            );
        }
        ds
    }

    #[test]
    fn partitions_cover_all_rows_once() {
        let labels = dataset(200, 0).outcomes().to_vec();
        let (train, test) = stratified_indices(&labels, 0.2, 42);
        assert_eq!(train.len() + test.len(), 200);
        let mut all = train.iter().chain(test.iter()).copied().collect::<Vec<_>>();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 200);
        assert_eq!(test.len(), 40);
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let labels = dataset(120, 0).outcomes().to_vec();
        assert_eq!(
            stratified_indices(&labels, 0.2, 7),
            stratified_indices(&labels, 0.2, 7)
        );
    }

    #[test]
    fn class_ratio_is_preserved_and_nan_rows_removed() {
        let ds = dataset(500, 0);
        let split = split_and_clean(&ds, 0.2, 42).unwrap();
        let full = ds.home_win_rate().unwrap();
        assert!((split.train.home_win_rate().unwrap() - full).abs() < 0.01);
        assert!((split.test.home_win_rate().unwrap() - full).abs() < 0.01);

        let dirty = dataset(500, 7);
        let split = split_and_clean(&dirty, 0.2, 42).unwrap();
        assert_eq!(split.dropped_train + split.dropped_test, 72);
        for part in [&split.train, &split.test] {
            assert_eq!(part.features().len(), part.outcomes().len());
            assert_eq!(part.features().len(), part.meta().len());
            assert!(part.features().iter().all(|r| r.iter().all(|v| v.is_finite())));
            // Meta stays attached to its own row after compaction.
            for (row, meta) in part.features().iter().zip(part.meta()) {
                assert_eq!(meta.home_team, format!("Home {}", row[0] as usize));
            }
        }
    }

    #[test]
    fn rejects_degenerate_fraction() {
        let ds = dataset(10, 0);
        assert!(split_and_clean(&ds, 0.0, 1).is_err());
        assert!(split_and_clean(&ds, 1.0, 1).is_err());
    }
}
