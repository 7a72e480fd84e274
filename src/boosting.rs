use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BoostingConfig;
use crate::error::Result;
use crate::features::{FEATURE_COUNT, FeatureRow};
use crate::logistic::sigmoid;
use crate::trainer::{ClassProbs, check_training_set};
use crate::tree::{DecisionTree, FeatureSampling, GrowParams, NewtonCriterion, grow};

/// Additive trees on the log-odds of a home win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    trees: Vec<DecisionTree>,
    learning_rate: f64,
    base_margin: f64,
}

impl GradientBoosting {
    /// Each round fits one tree to the logistic-loss gradient and hessian of
    /// the current margins, over a row subsample and a per-tree column
    /// subsample, and adds it with shrinkage `learning_rate`.
    pub fn fit(x: &[FeatureRow], y: &[u8], cfg: &BoostingConfig) -> Result<Self> {
        check_training_set("gradient_boosting", y)?;
        cfg.validate()?;

        let n = x.len();
        let n_rows = sample_size(n, cfg.subsample);
        let n_cols = sample_size(FEATURE_COUNT, cfg.colsample_bytree);
        let params = GrowParams {
            max_depth: Some(cfg.max_depth),
            min_samples_split: 2,
            min_samples_leaf: 1,
        };

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let base_margin = 0.0;
        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(cfg.n_estimators);

        for _ in 0..cfg.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - f64::from(y[i]);
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let rows: Vec<usize> = if n_rows >= n {
                (0..n).collect()
            } else {
                index::sample(&mut rng, n, n_rows).into_vec()
            };
            let mut cols: Vec<usize> = if n_cols >= FEATURE_COUNT {
                (0..FEATURE_COUNT).collect()
            } else {
                index::sample(&mut rng, FEATURE_COUNT, n_cols).into_vec()
            };
            cols.sort_unstable();

            let criterion = NewtonCriterion {
                grad: &grad,
                hess: &hess,
                reg_lambda: cfg.reg_lambda,
                reg_alpha: cfg.reg_alpha,
                min_child_weight: cfg.min_child_weight,
            };
            let tree = grow(
                &criterion,
                x,
                rows,
                params,
                FeatureSampling::Fixed(&cols),
                &mut rng,
            );

            for (m, row) in margins.iter_mut().zip(x) {
                *m += cfg.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(rounds = trees.len(), "gradient boosting fit");
        Ok(Self {
            trees,
            learning_rate: cfg.learning_rate,
            base_margin,
        })
    }

    pub fn margin(&self, row: &FeatureRow) -> f64 {
        self.base_margin
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &FeatureRow) -> ClassProbs {
        ClassProbs::from_home(sigmoid(self.margin(row)))
    }

    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }
}

fn sample_size(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).clamp(1, n.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (Vec<FeatureRow>, Vec<u8>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let mut r = [0.0; FEATURE_COUNT];
            for (j, v) in r.iter_mut().enumerate() {
                *v = ((i * 13 + j * 7) % 53) as f64 / 53.0 - 0.5;
            }
            let signal = i as f64 / n as f64 - 0.5;
            for j in [0usize, 4, 9, 14, 20] {
                r[j] = signal;
            }
            x.push(r);
            y.push(u8::from(signal > 0.0));
        }
        (x, y)
    }

    #[test]
    fn boosting_separates_signal() {
        let (x, y) = data(300);
        let cfg = BoostingConfig {
            n_estimators: 60,
            learning_rate: 0.3,
            ..BoostingConfig::default()
        };
        let model = GradientBoosting::fit(&x, &y, &cfg).unwrap();
        assert_eq!(model.n_rounds(), 60);
        let correct = x
            .iter()
            .zip(&y)
            .filter(|(r, label)| u8::from(model.predict_proba(r).home > 0.5) == **label)
            .count();
        assert!(correct as f64 / x.len() as f64 > 0.95);
    }

    #[test]
    fn training_is_deterministic_for_seed() {
        let (x, y) = data(100);
        let cfg = BoostingConfig {
            n_estimators: 10,
            ..BoostingConfig::default()
        };
        let a = GradientBoosting::fit(&x, &y, &cfg).unwrap();
        let b = GradientBoosting::fit(&x, &y, &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sample_size_is_at_least_one() {
        assert_eq!(sample_size(23, 0.8), 18);
        assert_eq!(sample_size(3, 0.01), 1);
        assert_eq!(sample_size(10, 1.0), 10);
    }
}
