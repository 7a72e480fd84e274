use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

pub type TeamId = i64;

/// One historical game as it appears in the game log.
///
/// The name fragments are the short names the log uses ("Warriors"), not the
/// full franchise names carried by the stats table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub season: i32,
    pub game_date: String,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub winner_id: TeamId,
    pub home_name_fragment: String,
    pub away_name_fragment: String,
}

impl GameRecord {
    pub fn home_won(&self) -> bool {
        self.winner_id == self.home_team_id
    }
}

/// Season derived from the leading four characters of a game date string.
pub fn season_from_date(game_date: &str) -> Option<i32> {
    game_date.trim().get(..4)?.parse::<i32>().ok()
}

/// Season-aggregate shooting percentages and per-100-possession rates for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeasonStats {
    pub season: i32,
    pub team_name: String,
    pub fg_percent: f64,
    pub x3p_percent: f64,
    pub x2p_percent: f64,
    pub ft_percent: f64,
    pub fg_per_100_poss: f64,
    pub fga_per_100_poss: f64,
    pub x3p_per_100_poss: f64,
    pub x3pa_per_100_poss: f64,
    pub x2p_per_100_poss: f64,
    pub x2pa_per_100_poss: f64,
    pub ft_per_100_poss: f64,
    pub fta_per_100_poss: f64,
    pub orb_per_100_poss: f64,
    pub drb_per_100_poss: f64,
    pub trb_per_100_poss: f64,
    pub ast_per_100_poss: f64,
    pub stl_per_100_poss: f64,
    pub blk_per_100_poss: f64,
    pub tov_per_100_poss: f64,
    pub pf_per_100_poss: f64,
    pub pts_per_100_poss: f64,
}

impl TeamSeasonStats {
    /// Last whitespace-delimited token of the full name, e.g. "Warriors".
    pub fn name_token(&self) -> Option<&str> {
        last_name_token(&self.team_name)
    }

    /// Numeric fields in [`STAT_COLUMNS`] order.
    pub fn stat_values(&self) -> [f64; STAT_COUNT] {
        [
            self.fg_percent,
            self.x3p_percent,
            self.x2p_percent,
            self.ft_percent,
            self.fg_per_100_poss,
            self.fga_per_100_poss,
            self.x3p_per_100_poss,
            self.x3pa_per_100_poss,
            self.x2p_per_100_poss,
            self.x2pa_per_100_poss,
            self.ft_per_100_poss,
            self.fta_per_100_poss,
            self.orb_per_100_poss,
            self.drb_per_100_poss,
            self.trb_per_100_poss,
            self.ast_per_100_poss,
            self.stl_per_100_poss,
            self.blk_per_100_poss,
            self.tov_per_100_poss,
            self.pf_per_100_poss,
            self.pts_per_100_poss,
        ]
    }

    pub fn from_stat_values(season: i32, team_name: String, v: [f64; STAT_COUNT]) -> Self {
        Self {
            season,
            team_name,
            fg_percent: v[0],
            x3p_percent: v[1],
            x2p_percent: v[2],
            ft_percent: v[3],
            fg_per_100_poss: v[4],
            fga_per_100_poss: v[5],
            x3p_per_100_poss: v[6],
            x3pa_per_100_poss: v[7],
            x2p_per_100_poss: v[8],
            x2pa_per_100_poss: v[9],
            ft_per_100_poss: v[10],
            fta_per_100_poss: v[11],
            orb_per_100_poss: v[12],
            drb_per_100_poss: v[13],
            trb_per_100_poss: v[14],
            ast_per_100_poss: v[15],
            stl_per_100_poss: v[16],
            blk_per_100_poss: v[17],
            tov_per_100_poss: v[18],
            pf_per_100_poss: v[19],
            pts_per_100_poss: v[20],
        }
    }
}

pub const STAT_COUNT: usize = 21;

/// Column names of the numeric stats, shared by the CSV reader and the
/// `team_season_stats` table.
pub const STAT_COLUMNS: [&str; STAT_COUNT] = [
    "fg_percent",
    "x3p_percent",
    "x2p_percent",
    "ft_percent",
    "fg_per_100_poss",
    "fga_per_100_poss",
    "x3p_per_100_poss",
    "x3pa_per_100_poss",
    "x2p_per_100_poss",
    "x2pa_per_100_poss",
    "ft_per_100_poss",
    "fta_per_100_poss",
    "orb_per_100_poss",
    "drb_per_100_poss",
    "trb_per_100_poss",
    "ast_per_100_poss",
    "stl_per_100_poss",
    "blk_per_100_poss",
    "tov_per_100_poss",
    "pf_per_100_poss",
    "pts_per_100_poss",
];

pub fn last_name_token(team_name: &str) -> Option<&str> {
    team_name.split_whitespace().last()
}

/// Trim and case-fold a team name for matching user input against the stats table.
pub fn normalize_team_name(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Stats rows keyed by `(season, team_name)`.
///
/// Lookups go through [`normalize_team_name`]; two rows whose names only
/// differ by case or surrounding whitespace count as duplicates.
#[derive(Debug, Clone, Default)]
pub struct StatsTable {
    rows: Vec<TeamSeasonStats>,
    by_key: HashMap<(i32, String), usize>,
}

impl StatsTable {
    pub fn new(rows: Vec<TeamSeasonStats>) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let key = (row.season, normalize_team_name(&row.team_name));
            if by_key.insert(key, idx).is_some() {
                return Err(PredictError::DuplicateTeamSeason {
                    season: row.season,
                    team: row.team_name.clone(),
                });
            }
        }
        Ok(Self { rows, by_key })
    }

    pub fn rows(&self) -> &[TeamSeasonStats] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, season: i32, team_name: &str) -> Option<&TeamSeasonStats> {
        self.by_key
            .get(&(season, normalize_team_name(team_name)))
            .map(|idx| &self.rows[*idx])
    }

    /// Like [`StatsTable::get`], but a miss is a lookup failure.
    pub fn lookup(&self, season: i32, team_name: &str) -> Result<&TeamSeasonStats> {
        self.get(season, team_name)
            .ok_or_else(|| PredictError::TeamSeasonNotFound {
                team: team_name.trim().to_string(),
                season,
            })
    }

    pub fn seasons(&self) -> Vec<i32> {
        let mut out = self.rows.iter().map(|r| r.season).collect::<Vec<_>>();
        out.sort_unstable();
        out.dedup();
        out
    }
}
