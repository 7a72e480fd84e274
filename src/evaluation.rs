use serde::Serialize;

use crate::dataset::Dataset;
use crate::trainer::{ClassProbs, TrainedModel};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class scores for label 0 (away win) and label 1 (home win), plus the
/// unweighted and support-weighted averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub away_win: ClassScores,
    pub home_win: ClassScores,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEvaluation {
    pub model_name: String,
    pub metrics: Metrics,
    pub report: ClassificationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TeamSeasonReport {
    NoData { team: String, season: i32 },
    Evaluated {
        team: String,
        season: i32,
        games: usize,
        models: Vec<ModelEvaluation>,
    },
}

/// Predicted label for one row: home win when its probability is strictly
/// larger.
pub fn predicted_label(p: &ClassProbs) -> u8 {
    u8::from(p.home > p.away)
}

pub fn evaluate_probs(predictions: &[ClassProbs], outcomes: &[u8]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;
    for (p, y) in predictions.iter().zip(outcomes) {
        let y_home = f64::from(*y);
        brier_sum += (p.home - y_home).powi(2);
        let actual_prob = if *y == 1 { p.home } else { p.away }.clamp(1e-15, 1.0);
        log_loss_sum += -actual_prob.ln();
        if predicted_label(p) == *y {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn classification_report(predicted: &[u8], outcomes: &[u8]) -> ClassificationReport {
    let scores = |class: u8| {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (p, y) in predicted.iter().zip(outcomes) {
            match (*p == class, *y == class) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassScores {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    };

    let away_win = scores(0);
    let home_win = scores(1);
    let correct = predicted
        .iter()
        .zip(outcomes)
        .filter(|(p, y)| p == y)
        .count();
    let total = away_win.support + home_win.support;

    let macro_avg = ClassScores {
        precision: (away_win.precision + home_win.precision) / 2.0,
        recall: (away_win.recall + home_win.recall) / 2.0,
        f1: (away_win.f1 + home_win.f1) / 2.0,
        support: total,
    };
    let weighted = |f: fn(&ClassScores) -> f64| {
        if total == 0 {
            return 0.0;
        }
        (f(&away_win) * away_win.support as f64 + f(&home_win) * home_win.support as f64)
            / total as f64
    };
    let weighted_avg = ClassScores {
        precision: weighted(|s| s.precision),
        recall: weighted(|s| s.recall),
        f1: weighted(|s| s.f1),
        support: total,
    };

    ClassificationReport {
        away_win,
        home_win,
        accuracy: ratio(correct, predicted.len().min(outcomes.len())),
        macro_avg,
        weighted_avg,
    }
}

/// Reliability buckets over the home-win probability.
pub fn calibration_bins(predictions: &[ClassProbs], outcomes: &[u8], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, y) in predictions.iter().zip(outcomes) {
        let prob = p.home.clamp(0.0, 1.0);
        let idx = ((prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += prob;
        actual_sum[idx] += f64::from(*y);
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

pub fn evaluate_model(model: &TrainedModel, data: &Dataset) -> ModelEvaluation {
    let probs = data
        .features()
        .iter()
        .map(|row| model.predict_proba(row))
        .collect::<Vec<_>>();
    let predicted = probs.iter().map(predicted_label).collect::<Vec<_>>();
    ModelEvaluation {
        model_name: model.name().to_string(),
        metrics: evaluate_probs(&probs, data.outcomes()),
        report: classification_report(&predicted, data.outcomes()),
    }
}

/// Evaluate every model on the test games of one team in one season. An empty
/// selection yields [`TeamSeasonReport::NoData`].
pub fn evaluate_team_season(
    models: &[TrainedModel],
    test: &Dataset,
    team: &str,
    season: i32,
) -> TeamSeasonReport {
    let Some(subset) = test.filter_team_season(season, team) else {
        return TeamSeasonReport::NoData {
            team: team.to_string(),
            season,
        };
    };
    TeamSeasonReport::Evaluated {
        team: team.to_string(),
        season,
        games: subset.len(),
        models: models.iter().map(|m| evaluate_model(m, &subset)).collect(),
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
