use serde::{Deserialize, Serialize};

use crate::records::TeamSeasonStats;

pub const FEATURE_COUNT: usize = 23;

/// Column order of every feature row. Scalers and classifiers are fit against
/// this order, so it must only ever be extended by retraining.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "fg_pct_diff",
    "x3p_pct_diff",
    "x2p_pct_diff",
    "ft_pct_diff",
    "fg_per_100_diff",
    "fga_per_100_diff",
    "x3p_per_100_diff",
    "x3pa_per_100_diff",
    "x2p_per_100_diff",
    "x2pa_per_100_diff",
    "ft_per_100_diff",
    "fta_per_100_diff",
    "orb_per_100_diff",
    "drb_per_100_diff",
    "trb_per_100_diff",
    "ast_per_100_diff",
    "stl_per_100_diff",
    "blk_per_100_diff",
    "tov_per_100_diff",
    "pf_per_100_diff",
    "pts_per_100_diff",
    "efg_pct_diff",
    "pace_diff",
];

/// Index of the only simple differential computed as `away - home`.
pub const TOV_DIFF_INDEX: usize = 18;
/// Features 0..SIMPLE_FEATURE_COUNT are plain stat differentials.
pub const SIMPLE_FEATURE_COUNT: usize = 21;
pub const EFG_DIFF_INDEX: usize = 21;
pub const PACE_DIFF_INDEX: usize = 22;

const FTA_PACE_WEIGHT: f64 = 0.44;
const X3P_EFG_WEIGHT: f64 = 0.5;

pub type FeatureRow = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: FeatureRow,
}

impl FeatureVector {
    pub fn values(&self) -> &FeatureRow {
        &self.values
    }

    pub fn into_row(self) -> FeatureRow {
        self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// True when a zero denominator or a missing stat left a non-finite value.
    pub fn has_undefined(&self) -> bool {
        row_has_undefined(&self.values)
    }

    /// Names of the columns holding NaN or inf.
    pub fn undefined_features(&self) -> Vec<&'static str> {
        self.iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
            .collect()
    }
}

pub fn row_has_undefined(row: &FeatureRow) -> bool {
    row.iter().any(|v| !v.is_finite())
}

/// Differential features for `home` hosting `away`.
///
/// The two rows may come from different seasons. Division by a zero
/// `fga_per_100_poss` is not guarded; the resulting NaN/inf is dropped later
/// by the split stage.
pub fn build_feature_vector(home: &TeamSeasonStats, away: &TeamSeasonStats) -> FeatureVector {
    let values = [
        home.fg_percent - away.fg_percent,
        home.x3p_percent - away.x3p_percent,
        home.x2p_percent - away.x2p_percent,
        home.ft_percent - away.ft_percent,
        home.fg_per_100_poss - away.fg_per_100_poss,
        home.fga_per_100_poss - away.fga_per_100_poss,
        home.x3p_per_100_poss - away.x3p_per_100_poss,
        home.x3pa_per_100_poss - away.x3pa_per_100_poss,
        home.x2p_per_100_poss - away.x2p_per_100_poss,
        home.x2pa_per_100_poss - away.x2pa_per_100_poss,
        home.ft_per_100_poss - away.ft_per_100_poss,
        home.fta_per_100_poss - away.fta_per_100_poss,
        home.orb_per_100_poss - away.orb_per_100_poss,
        home.drb_per_100_poss - away.drb_per_100_poss,
        home.trb_per_100_poss - away.trb_per_100_poss,
        home.ast_per_100_poss - away.ast_per_100_poss,
        home.stl_per_100_poss - away.stl_per_100_poss,
        home.blk_per_100_poss - away.blk_per_100_poss,
        // Fewer turnovers is better.
        away.tov_per_100_poss - home.tov_per_100_poss,
        home.pf_per_100_poss - away.pf_per_100_poss,
        home.pts_per_100_poss - away.pts_per_100_poss,
        effective_fg_pct(home) - effective_fg_pct(away),
        pace(home) - pace(away),
    ];
    FeatureVector { values }
}

fn effective_fg_pct(s: &TeamSeasonStats) -> f64 {
    (s.fg_per_100_poss + X3P_EFG_WEIGHT * s.x3p_per_100_poss) / s.fga_per_100_poss
}

fn pace(s: &TeamSeasonStats) -> f64 {
    s.fga_per_100_poss + FTA_PACE_WEIGHT * s.fta_per_100_poss + s.tov_per_100_poss
}
