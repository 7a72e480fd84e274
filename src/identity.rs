use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::records::{GameRecord, TeamId, TeamSeasonStats, last_name_token, normalize_team_name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamIdentityEntry {
    pub season: i32,
    pub team_name: String,
    pub team_id: TeamId,
}

/// Teams sharing a trailing name token within one season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCollision {
    pub season: i32,
    pub token: String,
    pub team_names: Vec<String>,
}

/// `(season, team_name) -> team_id`, plus the reverse index the assembler needs.
///
/// At most one id per `(season, team_name)`: the first insert wins. The reverse
/// index likewise keeps the first name registered for a `(season, team_id)`.
#[derive(Debug, Clone, Default)]
pub struct TeamIdentityMap {
    entries: Vec<TeamIdentityEntry>,
    by_name: HashMap<(i32, String), TeamId>,
    by_id: HashMap<(i32, TeamId), usize>,
}

impl TeamIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit table, e.g. loaded from a curated `season,team_name,team_id` file.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = TeamIdentityEntry>,
    {
        let mut map = Self::new();
        for entry in entries {
            map.insert(entry.season, &entry.team_name, entry.team_id);
        }
        map
    }

    /// Match each stats row's last name token against the name fragments of
    /// games in the same season. Unmatched teams are left out.
    pub fn derive_from_games(stats: &[TeamSeasonStats], games: &[GameRecord]) -> Self {
        let mut by_season: HashMap<i32, Vec<&GameRecord>> = HashMap::new();
        for game in games {
            by_season.entry(game.season).or_default().push(game);
        }

        let mut map = Self::new();
        let mut unmapped = 0usize;
        for row in stats {
            let Some(token) = row.name_token() else {
                unmapped += 1;
                continue;
            };
            let candidates = by_season.get(&row.season).map(Vec::as_slice).unwrap_or(&[]);
            match resolve_token(token, candidates) {
                Some(team_id) => {
                    map.insert(row.season, &row.team_name, team_id);
                }
                None => {
                    debug!(
                        season = row.season,
                        team = %row.team_name,
                        "no game fragment matches team name token"
                    );
                    unmapped += 1;
                }
            }
        }
        if unmapped > 0 {
            debug!(unmapped, "team-season rows left without an id");
        }
        map
    }

    /// Returns false when the key was already present; the existing id is kept.
    pub fn insert(&mut self, season: i32, team_name: &str, team_id: TeamId) -> bool {
        let key = (season, normalize_team_name(team_name));
        if self.by_name.contains_key(&key) {
            return false;
        }
        self.by_name.insert(key, team_id);
        let idx = self.entries.len();
        self.entries.push(TeamIdentityEntry {
            season,
            team_name: team_name.to_string(),
            team_id,
        });
        if let Some(existing) = self.by_id.get(&(season, team_id)) {
            warn!(
                season,
                team_id,
                kept = %self.entries[*existing].team_name,
                ignored = %team_name,
                "two team names resolved to the same id"
            );
        } else {
            self.by_id.insert((season, team_id), idx);
        }
        true
    }

    pub fn team_id(&self, season: i32, team_name: &str) -> Option<TeamId> {
        self.by_name
            .get(&(season, normalize_team_name(team_name)))
            .copied()
    }

    pub fn team_name(&self, season: i32, team_id: TeamId) -> Option<&str> {
        self.by_id
            .get(&(season, team_id))
            .map(|idx| self.entries[*idx].team_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups of mapped teams whose last name token collides within a season.
    /// The token heuristic cannot tell these teams apart.
    pub fn collisions(&self) -> Vec<TokenCollision> {
        let mut groups: BTreeMap<(i32, String), Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            let Some(token) = last_name_token(&entry.team_name) else {
                continue;
            };
            groups
                .entry((entry.season, token.to_lowercase()))
                .or_default()
                .push(entry.team_name.clone());
        }
        groups
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|((season, token), team_names)| TokenCollision {
                season,
                token,
                team_names,
            })
            .collect()
    }
}

fn resolve_token(token: &str, games: &[&GameRecord]) -> Option<TeamId> {
    games.iter().find_map(|game| {
        if game.home_name_fragment.trim() == token {
            Some(game.home_team_id)
        } else if game.away_name_fragment.trim() == token {
            Some(game.away_team_id)
        } else {
            None
        }
    })
}
