use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PredictError;
use crate::split::{DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION};

const DATA_DIR: &str = "nba_iq";
const DB_FILE: &str = "nba_iq.sqlite";
const MODELS_FILE: &str = "models.json";

/// L2-regularized logistic regression. `c` is the inverse regularization
/// strength, as in the usual `C * sum(loss) + ||w||^2 / 2` objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticConfig {
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tol: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 10.0,
            max_iter: 500,
            learning_rate: 0.5,
            tol: 1e-4,
        }
    }
}

impl LogisticConfig {
    pub fn validate(&self) -> Result<(), PredictError> {
        positive("logistic.c", self.c)?;
        positive("logistic.learning_rate", self.learning_rate)?;
        positive("logistic.tol", self.tol)?;
        at_least("logistic.max_iter", self.max_iter, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features.max(1) as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().floor(),
            MaxFeatures::Log2 => n.log2().floor(),
            MaxFeatures::All => n,
        };
        (k as usize).clamp(1, n_features.max(1))
    }
}

/// Bagged decision trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), PredictError> {
        at_least("forest.n_estimators", self.n_estimators, 1)?;
        at_least("forest.min_samples_split", self.min_samples_split, 2)?;
        at_least("forest.min_samples_leaf", self.min_samples_leaf, 1)?;
        if let Some(depth) = self.max_depth {
            at_least("forest.max_depth", depth, 1)?;
        }
        Ok(())
    }
}

/// Gradient-boosted trees on logistic loss with shrinkage and row/column
/// subsampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 3,
            learning_rate: 0.05,
            reg_lambda: 2.0,
            reg_alpha: 0.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_child_weight: 5.0,
            seed: 42,
        }
    }
}

impl BoostingConfig {
    pub fn validate(&self) -> Result<(), PredictError> {
        at_least("boosting.n_estimators", self.n_estimators, 1)?;
        at_least("boosting.max_depth", self.max_depth, 1)?;
        unit_interval("boosting.learning_rate", self.learning_rate)?;
        unit_interval("boosting.subsample", self.subsample)?;
        unit_interval("boosting.colsample_bytree", self.colsample_bytree)?;
        non_negative("boosting.reg_lambda", self.reg_lambda)?;
        non_negative("boosting.reg_alpha", self.reg_alpha)?;
        non_negative("boosting.min_child_weight", self.min_child_weight)
    }
}

/// The model families trained for the ensemble, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSuiteConfig {
    #[serde(default)]
    pub logistic: LogisticConfig,
    #[serde(default)]
    pub boosting: BoostingConfig,
    #[serde(default)]
    pub forest: ForestConfig,
}

impl Default for ModelSuiteConfig {
    fn default() -> Self {
        Self {
            logistic: LogisticConfig::default(),
            boosting: BoostingConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

impl ModelSuiteConfig {
    pub fn validate(&self) -> Result<(), PredictError> {
        self.logistic.validate()?;
        self.boosting.validate()?;
        self.forest.validate()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse model config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Paths and run settings, read from the environment (after `.env.local` /
/// `.env`) and then overridden by command-line flags in each binary.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub models_path: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let db_path = resolve_db_path(None)?;
        let models_path = resolve_models_path(None)?;

        let seed = match std::env::var("NBA_IQ_SEED") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("NBA_IQ_SEED is not an integer: {raw}"))?,
            _ => DEFAULT_SPLIT_SEED,
        };
        let test_fraction = match std::env::var("NBA_IQ_TEST_FRACTION") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("NBA_IQ_TEST_FRACTION is not a number: {raw}"))?,
            _ => DEFAULT_TEST_FRACTION,
        };

        let cfg = Self {
            db_path,
            models_path,
            seed,
            test_fraction,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PredictError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PredictError::InvalidConfig {
                field: "test_fraction",
                reason: format!("{} is outside (0, 1)", self.test_fraction),
            });
        }
        Ok(())
    }
}

/// Loads `.env.local` then `.env`; either may be absent.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// `flag` when given; otherwise `NBA_IQ_DB`, then the default data directory.
pub fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| env_path("NBA_IQ_DB"))
        .or_else(|| app_data_dir().map(|d| d.join(DB_FILE)))
        .context("unable to resolve sqlite path; pass --db or set NBA_IQ_DB")
}

/// `flag` when given; otherwise `NBA_IQ_MODELS`, then the default data directory.
pub fn resolve_models_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| env_path("NBA_IQ_MODELS"))
        .or_else(|| app_data_dir().map(|d| d.join(MODELS_FILE)))
        .context("unable to resolve model artifact path; pass --models or set NBA_IQ_MODELS")
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(DATA_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR),
    )
}

fn positive(field: &'static str, v: f64) -> Result<(), PredictError> {
    if v.is_finite() && v > 0.0 {
        return Ok(());
    }
    Err(PredictError::InvalidConfig {
        field,
        reason: format!("{v} must be a positive number"),
    })
}

fn non_negative(field: &'static str, v: f64) -> Result<(), PredictError> {
    if v.is_finite() && v >= 0.0 {
        return Ok(());
    }
    Err(PredictError::InvalidConfig {
        field,
        reason: format!("{v} must be zero or positive"),
    })
}

fn unit_interval(field: &'static str, v: f64) -> Result<(), PredictError> {
    if v.is_finite() && v > 0.0 && v <= 1.0 {
        return Ok(());
    }
    Err(PredictError::InvalidConfig {
        field,
        reason: format!("{v} must be in (0, 1]"),
    })
}

fn at_least(field: &'static str, v: usize, min: usize) -> Result<(), PredictError> {
    if v >= min {
        return Ok(());
    }
    Err(PredictError::InvalidConfig {
        field,
        reason: format!("{v} must be at least {min}"),
    })
}
