use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("stats not found for {team} in {season}")]
    TeamSeasonNotFound { team: String, season: i32 },

    #[error("duplicate stats row for {team} in {season}")]
    DuplicateTeamSeason { season: i32, team: String },

    #[error("processed tables are misaligned: features={features} outcomes={outcomes} meta={meta}")]
    MisalignedTables {
        features: usize,
        outcomes: usize,
        meta: usize,
    },

    #[error("feature columns do not match the builder: expected {expected:?}, found {found:?}")]
    FeatureSchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("features for {home} vs {away} are undefined: {features:?}")]
    UndefinedFeatures {
        home: String,
        away: String,
        features: Vec<&'static str>,
    },

    #[error("no trained models available")]
    NoModels,

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("cannot fit {model} on an empty training set")]
    EmptyTrainingSet { model: &'static str },

    #[error("cannot fit {model}: training labels contain a single class")]
    SingleClassTrainingSet { model: &'static str },
}

pub type Result<T> = std::result::Result<T, PredictError>;
