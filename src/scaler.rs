use serde::{Deserialize, Serialize};

use crate::features::{FEATURE_COUNT, FeatureRow};

/// Per-column standardization fit once on the training matrix.
///
/// Fields are private: after [`StandardScaler::fit`] the parameters can only be
/// read, so a scaler travelling with its classifier cannot be refit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: FeatureRow,
    scales: FeatureRow,
}

impl StandardScaler {
    /// Population mean and standard deviation per column. Constant columns
    /// get a scale of 1 so they map to zero instead of NaN.
    pub fn fit(rows: &[FeatureRow]) -> Self {
        let mut means = [0.0; FEATURE_COUNT];
        let mut scales = [1.0; FEATURE_COUNT];
        if rows.is_empty() {
            return Self { means, scales };
        }

        let n = rows.len() as f64;
        for row in rows {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut var = [0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                let d = row[i] - means[i];
                var[i] += d * d;
            }
        }
        for i in 0..FEATURE_COUNT {
            let std = (var[i] / n).sqrt();
            scales[i] = if std > 1e-12 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (row[i] - self.means[i]) / self.scales[i];
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureRow]) -> Vec<FeatureRow> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
