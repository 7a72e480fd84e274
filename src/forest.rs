use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ForestConfig;
use crate::error::Result;
use crate::features::{FEATURE_COUNT, FeatureRow};
use crate::trainer::{ClassProbs, check_training_set};
use crate::tree::{DecisionTree, FeatureSampling, GiniCriterion, GrowParams, grow};

/// Bagged Gini trees; the home-win probability is the mean leaf fraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Trees are grown in parallel. Tree `i` draws from its own RNG seeded with
    /// `seed + i`, so the fitted forest does not depend on thread scheduling.
    pub fn fit(x: &[FeatureRow], y: &[u8], cfg: &ForestConfig) -> Result<Self> {
        check_training_set("random_forest", y)?;
        cfg.validate()?;

        let pool: Vec<usize> = (0..FEATURE_COUNT).collect();
        let k = cfg.max_features.resolve(FEATURE_COUNT);
        let params = GrowParams {
            max_depth: cfg.max_depth,
            min_samples_split: cfg.min_samples_split,
            min_samples_leaf: cfg.min_samples_leaf,
        };
        let criterion = GiniCriterion { labels: y };
        let n = x.len();

        let trees: Vec<DecisionTree> = (0..cfg.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
                let rows = if cfg.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                grow(
                    &criterion,
                    x,
                    rows,
                    params,
                    FeatureSampling::PerNode { pool: &pool, k },
                    &mut rng,
                )
            })
            .collect();

        debug!(
            trees = trees.len(),
            mean_depth = trees.iter().map(|t| t.depth()).sum::<usize>() as f64
                / trees.len().max(1) as f64,
            "random forest fit"
        );
        Ok(Self { trees })
    }

    pub fn predict_proba(&self, row: &FeatureRow) -> ClassProbs {
        if self.trees.is_empty() {
            return ClassProbs::from_home(0.5);
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        ClassProbs::from_home(sum / self.trees.len() as f64)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
