use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::boosting::GradientBoosting;
use crate::config::{BoostingConfig, ForestConfig, LogisticConfig, ModelSuiteConfig};
use crate::error::{PredictError, Result};
use crate::features::{FEATURE_NAMES, FeatureRow};
use crate::forest::RandomForest;
use crate::logistic::LogisticModel;
use crate::scaler::StandardScaler;

pub const ARTIFACT_VERSION: u32 = 1;

/// Probability of each outcome for one matchup. `home` is P(home team wins).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbs {
    pub away: f64,
    pub home: f64,
}

impl ClassProbs {
    pub fn from_home(p: f64) -> Self {
        let home = p.clamp(0.0, 1.0);
        Self {
            away: 1.0 - home,
            home,
        }
    }
}

pub(crate) fn check_training_set(model: &'static str, y: &[u8]) -> Result<()> {
    if y.is_empty() {
        return Err(PredictError::EmptyTrainingSet { model });
    }
    let positives = y.iter().filter(|v| **v == 1).count();
    if positives == 0 || positives == y.len() {
        return Err(PredictError::SingleClassTrainingSet { model });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlgorithmConfig {
    Logistic(LogisticConfig),
    Boosting(BoostingConfig),
    Forest(ForestConfig),
}

impl AlgorithmConfig {
    pub fn display_name(&self) -> &'static str {
        match self {
            AlgorithmConfig::Logistic(_) => "Logistic Regression",
            AlgorithmConfig::Boosting(_) => "Gradient Boosting",
            AlgorithmConfig::Forest(_) => "Random Forest",
        }
    }
}

impl ModelSuiteConfig {
    pub fn families(&self) -> [AlgorithmConfig; 3] {
        [
            AlgorithmConfig::Logistic(self.logistic),
            AlgorithmConfig::Boosting(self.boosting),
            AlgorithmConfig::Forest(self.forest),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Classifier {
    Logistic(LogisticModel),
    Boosting(GradientBoosting),
    Forest(RandomForest),
}

impl Classifier {
    /// `x` must already be scaled.
    pub fn predict_proba(&self, x: &FeatureRow) -> ClassProbs {
        match self {
            Classifier::Logistic(m) => m.predict_proba(x),
            Classifier::Boosting(m) => m.predict_proba(x),
            Classifier::Forest(m) => m.predict_proba(x),
        }
    }

    /// One-line fit diagnostics for reports.
    pub fn summary(&self) -> String {
        match self {
            Classifier::Logistic(m) => format!(
                "{} iterations, intercept {:.4}",
                m.iterations(),
                m.intercept()
            ),
            Classifier::Boosting(m) => format!("{} rounds", m.n_rounds()),
            Classifier::Forest(m) => format!("{} trees", m.n_trees()),
        }
    }
}

/// A scaler and the classifier fit on its output. The pair is built once and
/// never mutated; prediction always goes through both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    name: String,
    scaler: StandardScaler,
    classifier: Classifier,
}

impl TrainedModel {
    /// Fits the scaler on `x` and the classifier on the scaled rows.
    pub fn train(config: &AlgorithmConfig, x: &[FeatureRow], y: &[u8]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(PredictError::MisalignedTables {
                features: x.len(),
                outcomes: y.len(),
                meta: y.len(),
            });
        }
        let started = Instant::now();
        let scaler = StandardScaler::fit(x);
        let scaled = scaler.transform_all(x);
        let classifier = match config {
            AlgorithmConfig::Logistic(cfg) => {
                Classifier::Logistic(LogisticModel::fit(&scaled, y, cfg)?)
            }
            AlgorithmConfig::Boosting(cfg) => {
                Classifier::Boosting(GradientBoosting::fit(&scaled, y, cfg)?)
            }
            AlgorithmConfig::Forest(cfg) => Classifier::Forest(RandomForest::fit(&scaled, y, cfg)?),
        };
        info!(
            model = config.display_name(),
            samples = x.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model trained"
        );
        Ok(Self {
            name: config.display_name().to_string(),
            scaler,
            classifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Probabilities for an unscaled feature row.
    pub fn predict_proba(&self, raw: &FeatureRow) -> ClassProbs {
        self.classifier.predict_proba(&self.scaler.transform(raw))
    }
}

/// Trains every family in the suite concurrently. Output order follows
/// [`ModelSuiteConfig::families`].
pub fn train_all(suite: &ModelSuiteConfig, x: &[FeatureRow], y: &[u8]) -> Result<Vec<TrainedModel>> {
    suite.validate()?;
    suite
        .families()
        .par_iter()
        .map(|cfg| TrainedModel::train(cfg, x, y))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub generated_at: String,
    pub feature_names: Vec<String>,
    pub train_samples: usize,
    pub models: Vec<TrainedModel>,
}

impl ModelArtifact {
    pub fn new(models: Vec<TrainedModel>, train_samples: usize) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            train_samples,
            models,
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create model dir {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(self).context("serialize model artifact")?;
        fs::write(&tmp, json).context("write model artifact")?;
        fs::rename(&tmp, path).context("swap model artifact")?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model artifact {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse model artifact {}", path.display()))?;
        if artifact.version != ARTIFACT_VERSION {
            anyhow::bail!(
                "model artifact version {} is not supported (expected {ARTIFACT_VERSION})",
                artifact.version
            );
        }
        artifact.check_schema()?;
        Ok(artifact)
    }

    pub fn check_schema(&self) -> Result<()> {
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(PredictError::FeatureSchemaMismatch {
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                found: self.feature_names.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;

    fn data(n: usize) -> (Vec<FeatureRow>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let mut r = [0.0; FEATURE_COUNT];
            let s = (i as f64 / n as f64 - 0.5) * 20.0;
            r[0] = s;
            r[3] = 100.0 + ((i * 7) % 11) as f64;
            x.push(r);
            y.push(u8::from(s > 0.0));
        }
        (x, y)
    }

    fn quick_suite() -> ModelSuiteConfig {
        let mut suite = ModelSuiteConfig::default();
        suite.forest.n_estimators = 10;
        suite.boosting.n_estimators = 30;
        suite.logistic.max_iter = 200;
        suite
    }

    #[test]
    fn summaries_describe_each_family() {
        let (x, y) = data(150);
        let models = train_all(&quick_suite(), &x, &y).unwrap();
        let summaries = models
            .iter()
            .map(|m| m.classifier().summary())
            .collect::<Vec<_>>();
        assert!(summaries[0].contains("iterations"));
        assert_eq!(summaries[1], "30 rounds");
        assert_eq!(summaries[2], "10 trees");
    }

    #[test]
    fn trains_all_families_in_order() {
        let (x, y) = data(150);
        let models = train_all(&quick_suite(), &x, &y).unwrap();
        let names = models.iter().map(|m| m.name()).collect::<Vec<_>>();
        assert_eq!(names, ["Logistic Regression", "Gradient Boosting", "Random Forest"]);
        let mut home = [0.0; FEATURE_COUNT];
        home[0] = 8.0;
        home[3] = 105.0;
        for m in &models {
            let p = m.predict_proba(&home);
            assert!(p.home > 0.5, "{} gave {p:?}", m.name());
        }
    }

    #[test]
    fn empty_and_single_class_sets_fail() {
        let cfg = AlgorithmConfig::Logistic(LogisticConfig::default());
        assert!(matches!(
            TrainedModel::train(&cfg, &[], &[]),
            Err(PredictError::EmptyTrainingSet { .. })
        ));
        let (x, _) = data(10);
        let y = vec![0u8; 10];
        let cfg = AlgorithmConfig::Forest(ForestConfig::default());
        assert!(matches!(
            TrainedModel::train(&cfg, &x, &y),
            Err(PredictError::SingleClassTrainingSet { .. })
        ));
    }

    #[test]
    fn schema_mismatch_is_reported() {
        let mut artifact = ModelArtifact::new(Vec::new(), 0);
        assert!(artifact.check_schema().is_ok());
        artifact.feature_names.swap(0, 1);
        assert!(matches!(
            artifact.check_schema(),
            Err(PredictError::FeatureSchemaMismatch { .. })
        ));
    }

    #[test]
    fn artifact_survives_disk_round_trip() {
        let (x, y) = data(80);
        let models = train_all(&quick_suite(), &x, &y).unwrap();
        let dir = std::env::temp_dir().join(format!("nba_iq_artifact_{}", std::process::id()));
        let path = dir.join("models.json");
        ModelArtifact::new(models.clone(), x.len()).save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.train_samples, 80);
        for (a, b) in models.iter().zip(&loaded.models) {
            let pa = a.predict_proba(&x[5]);
            let pb = b.predict_proba(&x[5]);
            assert!((pa.home - pb.home).abs() < 1e-12);
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
