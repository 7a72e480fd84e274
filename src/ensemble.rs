use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PredictError, Result};
use crate::features::{FeatureVector, build_feature_vector};
use crate::records::StatsTable;
use crate::trainer::TrainedModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model_name: String,
    pub predicted_winner: String,
    pub home_win_probability: f64,
    pub away_win_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleAggregate {
    pub average_home_probability: f64,
    pub average_away_probability: f64,
    pub final_winner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub home_team: String,
    pub home_season: i32,
    pub away_team: String,
    pub away_season: i32,
    pub features: FeatureVector,
    pub per_model: Vec<ModelPrediction>,
    pub aggregate: EnsembleAggregate,
}

/// Predict one matchup with every model and average the results.
///
/// Team names are matched after trimming and case-folding. Seasons may differ
/// between the two sides. Either side missing from `stats` is an error, as is
/// an empty model set or a feature row with undefined values.
pub fn predict(
    home_team: &str,
    home_season: i32,
    away_team: &str,
    away_season: i32,
    stats: &StatsTable,
    models: &[TrainedModel],
) -> Result<EnsemblePrediction> {
    if models.is_empty() {
        return Err(PredictError::NoModels);
    }
    let home = stats.lookup(home_season, home_team)?;
    let away = stats.lookup(away_season, away_team)?;
    let features = build_feature_vector(home, away);
    if features.has_undefined() {
        return Err(PredictError::UndefinedFeatures {
            home: home.team_name.clone(),
            away: away.team_name.clone(),
            features: features.undefined_features(),
        });
    }

    let per_model = models
        .iter()
        .map(|model| {
            let probs = model.predict_proba(features.values());
            let winner = if probs.home > probs.away {
                &home.team_name
            } else {
                &away.team_name
            };
            debug!(model = model.name(), home = probs.home, away = probs.away, "model prediction");
            ModelPrediction {
                model_name: model.name().to_string(),
                predicted_winner: winner.clone(),
                home_win_probability: probs.home,
                away_win_probability: probs.away,
            }
        })
        .collect::<Vec<_>>();

    let aggregate = aggregate(&per_model, &home.team_name, &away.team_name);
    Ok(EnsemblePrediction {
        home_team: home.team_name.clone(),
        home_season,
        away_team: away.team_name.clone(),
        away_season,
        features,
        per_model,
        aggregate,
    })
}

/// Mean of the home and away probabilities, each averaged on its own. The home
/// team wins only when its mean is strictly greater; ties go to the away team.
pub fn aggregate(per_model: &[ModelPrediction], home_team: &str, away_team: &str) -> EnsembleAggregate {
    let n = per_model.len().max(1) as f64;
    let average_home_probability =
        per_model.iter().map(|p| p.home_win_probability).sum::<f64>() / n;
    let average_away_probability =
        per_model.iter().map(|p| p.away_win_probability).sum::<f64>() / n;
    let final_winner = if average_home_probability > average_away_probability {
        home_team
    } else {
        away_team
    };
    EnsembleAggregate {
        average_home_probability,
        average_away_probability,
        final_winner: final_winner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(name: &str, home: f64, away: f64) -> ModelPrediction {
        ModelPrediction {
            model_name: name.to_string(),
            predicted_winner: String::new(),
            home_win_probability: home,
            away_win_probability: away,
        }
    }

    #[test]
    fn averages_three_models() {
        let preds = [
            prediction("a", 0.6, 0.4),
            prediction("b", 0.7, 0.3),
            prediction("c", 0.5, 0.5),
        ];
        let agg = aggregate(&preds, "Home", "Away");
        assert!((agg.average_home_probability - 0.6).abs() < 1e-12);
        assert!((agg.average_away_probability - 0.4).abs() < 1e-12);
        assert_eq!(agg.final_winner, "Home");
    }

    #[test]
    fn compares_averages_instead_of_half() {
        // Non-complementary outputs: home mean is above 0.5 but below away.
        let preds = [prediction("a", 0.55, 0.7), prediction("b", 0.6, 0.65)];
        let agg = aggregate(&preds, "Home", "Away");
        assert!(agg.average_home_probability > 0.5);
        assert_eq!(agg.final_winner, "Away");
    }

    #[test]
    fn exact_tie_goes_to_away() {
        let preds = [prediction("a", 0.5, 0.5)];
        assert_eq!(aggregate(&preds, "Home", "Away").final_winner, "Away");
    }
}
