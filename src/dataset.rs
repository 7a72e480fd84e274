use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PredictError, Result};
use crate::features::{FeatureRow, build_feature_vector, row_has_undefined};
use crate::identity::TeamIdentityMap;
use crate::records::{GameRecord, StatsTable, normalize_team_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMeta {
    pub season: i32,
    pub home_team: String,
    pub away_team: String,
}

impl GameMeta {
    pub fn involves(&self, season: i32, team_norm: &str) -> bool {
        self.season == season
            && (normalize_team_name(&self.home_team) == team_norm
                || normalize_team_name(&self.away_team) == team_norm)
    }
}

/// Three row-aligned tables: row `i` of features, outcomes and meta always
/// describes the same game. The only mutators keep the lengths in lockstep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    features: Vec<FeatureRow>,
    outcomes: Vec<u8>,
    meta: Vec<GameMeta>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            features: Vec::with_capacity(n),
            outcomes: Vec::with_capacity(n),
            meta: Vec::with_capacity(n),
        }
    }

    /// Rebuild from separately persisted tables, rejecting misaligned input.
    pub fn from_parts(
        features: Vec<FeatureRow>,
        outcomes: Vec<u8>,
        meta: Vec<GameMeta>,
    ) -> Result<Self> {
        if features.len() != outcomes.len() || features.len() != meta.len() {
            return Err(PredictError::MisalignedTables {
                features: features.len(),
                outcomes: outcomes.len(),
                meta: meta.len(),
            });
        }
        Ok(Self {
            features,
            outcomes,
            meta,
        })
    }

    pub fn push(&mut self, features: FeatureRow, outcome: u8, meta: GameMeta) {
        self.features.push(features);
        self.outcomes.push(outcome);
        self.meta.push(meta);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn features(&self) -> &[FeatureRow] {
        &self.features
    }

    pub fn outcomes(&self) -> &[u8] {
        &self.outcomes
    }

    pub fn meta(&self) -> &[GameMeta] {
        &self.meta
    }

    pub fn home_win_rate(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let wins = self.outcomes.iter().filter(|y| **y == 1).count();
        Some(wins as f64 / self.len() as f64)
    }

    /// New dataset holding `rows` in the given order, dense from zero.
    pub fn select(&self, rows: &[usize]) -> Self {
        let mut out = Self::with_capacity(rows.len());
        for &idx in rows {
            out.push(self.features[idx], self.outcomes[idx], self.meta[idx].clone());
        }
        out
    }

    /// Drop every row with a non-finite feature from all three tables at once.
    /// Returns the number of rows removed.
    pub fn drop_undefined_rows(&mut self) -> usize {
        let keep = self
            .features
            .iter()
            .map(|row| !row_has_undefined(row))
            .collect::<Vec<_>>();
        let before = self.len();
        retain_by_mask(&mut self.features, &keep);
        retain_by_mask(&mut self.outcomes, &keep);
        retain_by_mask(&mut self.meta, &keep);
        before - self.len()
    }

    /// Rows for games in `season` involving `team` (either side). `None` when
    /// nothing matches.
    pub fn filter_team_season(&self, season: i32, team: &str) -> Option<Self> {
        let team_norm = normalize_team_name(team);
        let rows = self
            .meta
            .iter()
            .enumerate()
            .filter(|(_, m)| m.involves(season, &team_norm))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        if rows.is_empty() {
            return None;
        }
        Some(self.select(&rows))
    }
}

fn retain_by_mask<T>(items: &mut Vec<T>, keep: &[bool]) {
    let mut idx = 0usize;
    items.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    pub games_seen: usize,
    pub games_assembled: usize,
    pub unresolved_identity: usize,
    pub missing_stats: usize,
}

/// Turn the game log into a labeled dataset. Games whose teams cannot be
/// resolved for their season contribute no row.
pub fn assemble(
    games: &[GameRecord],
    stats: &StatsTable,
    identities: &TeamIdentityMap,
) -> (Dataset, AssemblySummary) {
    let mut dataset = Dataset::with_capacity(games.len());
    let mut summary = AssemblySummary {
        games_seen: games.len(),
        ..Default::default()
    };

    for game in games {
        let (Some(home_name), Some(away_name)) = (
            identities.team_name(game.season, game.home_team_id),
            identities.team_name(game.season, game.away_team_id),
        ) else {
            summary.unresolved_identity += 1;
            continue;
        };
        let (Some(home), Some(away)) = (
            stats.get(game.season, home_name),
            stats.get(game.season, away_name),
        ) else {
            summary.missing_stats += 1;
            continue;
        };

        let features = build_feature_vector(home, away).into_row();
        let outcome = u8::from(game.home_won());
        dataset.push(
            features,
            outcome,
            GameMeta {
                season: game.season,
                home_team: home.team_name.clone(),
                away_team: away.team_name.clone(),
            },
        );
        summary.games_assembled += 1;
    }

    debug!(
        unresolved = summary.unresolved_identity,
        missing_stats = summary.missing_stats,
        "games skipped during assembly"
    );
    info!(
        games = summary.games_seen,
        rows = summary.games_assembled,
        "dataset assembled"
    );
    (dataset, summary)
}
