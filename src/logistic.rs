use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LogisticConfig;
use crate::error::Result;
use crate::features::{FEATURE_COUNT, FeatureRow};
use crate::trainer::{ClassProbs, check_training_set};

const LR_DECAY: f64 = 0.003;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: FeatureRow,
    intercept: f64,
    iterations: usize,
}

impl LogisticModel {
    /// Full-batch gradient descent on mean log loss plus `||w||^2 / (2 C n)`.
    /// The intercept is not penalized. The step is capped by the loss's
    /// Lipschitz bound so correlated columns cannot make it diverge.
    pub fn fit(x: &[FeatureRow], y: &[u8], cfg: &LogisticConfig) -> Result<Self> {
        check_training_set("logistic", y)?;
        cfg.validate()?;

        let n = x.len() as f64;
        let l2 = 1.0 / (cfg.c * n);
        let mean_sq_norm = x
            .iter()
            .map(|r| r.iter().map(|v| v * v).sum::<f64>())
            .sum::<f64>()
            / n;
        let lipschitz = 0.25 * (1.0 + mean_sq_norm) + l2;
        let lr_start = cfg.learning_rate.min(1.0 / lipschitz);

        let mut weights = [0.0; FEATURE_COUNT];
        let mut intercept = 0.0;
        let mut iterations = 0usize;

        for iter in 0..cfg.max_iter {
            iterations = iter + 1;
            let mut grad = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (row, label) in x.iter().zip(y) {
                let p = sigmoid(dot(&weights, row) + intercept);
                let err = p - f64::from(*label);
                grad_b += err;
                for j in 0..FEATURE_COUNT {
                    grad[j] += err * row[j];
                }
            }

            let mut max_grad = (grad_b / n).abs();
            for j in 0..FEATURE_COUNT {
                grad[j] = grad[j] / n + l2 * weights[j];
                max_grad = max_grad.max(grad[j].abs());
            }
            if max_grad < cfg.tol {
                break;
            }

            let lr = lr_start / (1.0 + iter as f64 * LR_DECAY);
            for j in 0..FEATURE_COUNT {
                weights[j] -= lr * grad[j];
            }
            intercept -= lr * grad_b / n;
        }

        debug!(iterations, "logistic regression fit");
        Ok(Self {
            weights,
            intercept,
            iterations,
        })
    }

    pub fn predict_proba(&self, row: &FeatureRow) -> ClassProbs {
        ClassProbs::from_home(sigmoid(dot(&self.weights, row) + self.intercept))
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn dot(a: &FeatureRow, b: &FeatureRow) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
