use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use csv::StringRecord;
use tracing::{info, warn};

use crate::identity::TeamIdentityEntry;
use crate::records::{
    GameRecord, STAT_COLUMNS, STAT_COUNT, StatsTable, TeamId, TeamSeasonStats, season_from_date,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamesReadSummary {
    pub rows: usize,
    pub kept: usize,
    pub skipped: usize,
}

pub fn read_games(path: &Path) -> Result<(Vec<GameRecord>, GamesReadSummary)> {
    let file = File::open(path).with_context(|| format!("open games csv {}", path.display()))?;
    parse_games(file)
}

pub fn read_team_stats(path: &Path) -> Result<StatsTable> {
    let file = File::open(path).with_context(|| format!("open stats csv {}", path.display()))?;
    parse_team_stats(file)
}

pub fn read_team_ids(path: &Path) -> Result<Vec<TeamIdentityEntry>> {
    let file = File::open(path).with_context(|| format!("open team id csv {}", path.display()))?;
    parse_team_ids(file)
}

/// Game log with `gameDate`, `hometeamName`, `hometeamId`, `awayteamName`,
/// `awayteamId` and `winner` columns. Rows whose date, ids or winner do not
/// parse are skipped and counted.
pub fn parse_games<R: Read>(input: R) -> Result<(Vec<GameRecord>, GamesReadSummary)> {
    let mut rdr = csv::Reader::from_reader(input);
    let headers = rdr.headers().context("read games header")?.clone();
    let date = column(&headers, "gameDate")?;
    let home_name = column(&headers, "hometeamName")?;
    let home_id = column(&headers, "hometeamId")?;
    let away_name = column(&headers, "awayteamName")?;
    let away_id = column(&headers, "awayteamId")?;
    let winner = column(&headers, "winner")?;

    let mut games = Vec::new();
    let mut summary = GamesReadSummary::default();
    for result in rdr.records() {
        let record = result.context("read games row")?;
        summary.rows += 1;
        let game_date = field(&record, date).to_string();
        let parsed = (
            season_from_date(&game_date),
            parse_id(field(&record, home_id)),
            parse_id(field(&record, away_id)),
            parse_id(field(&record, winner)),
        );
        let (Some(season), Some(home_team_id), Some(away_team_id), Some(winner_id)) = parsed else {
            summary.skipped += 1;
            continue;
        };
        games.push(GameRecord {
            season,
            game_date,
            home_team_id,
            away_team_id,
            winner_id,
            home_name_fragment: field(&record, home_name).to_string(),
            away_name_fragment: field(&record, away_name).to_string(),
        });
    }
    summary.kept = games.len();

    if summary.skipped > 0 {
        warn!(skipped = summary.skipped, "games without a usable date, id or winner");
    }
    info!(rows = summary.rows, kept = summary.kept, "games parsed");
    Ok((games, summary))
}

/// Per-100-possession stats with `season`, `team` and the [`STAT_COLUMNS`].
/// Empty or `NA` cells become NaN.
pub fn parse_team_stats<R: Read>(input: R) -> Result<StatsTable> {
    let mut rdr = csv::Reader::from_reader(input);
    let headers = rdr.headers().context("read stats header")?.clone();
    let season = column(&headers, "season")?;
    let team = column(&headers, "team")?;
    let mut stat_idx = [0usize; STAT_COUNT];
    for (slot, name) in stat_idx.iter_mut().zip(STAT_COLUMNS) {
        *slot = column(&headers, name)?;
    }

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.context("read stats row")?;
        let season_raw = field(&record, season);
        let season_value = season_raw
            .parse::<i32>()
            .with_context(|| format!("stats row {}: bad season {season_raw:?}", line + 2))?;
        let mut values = [f64::NAN; STAT_COUNT];
        for (v, idx) in values.iter_mut().zip(stat_idx) {
            *v = parse_stat(field(&record, idx));
        }
        rows.push(TeamSeasonStats::from_stat_values(
            season_value,
            field(&record, team).to_string(),
            values,
        ));
    }

    let table = StatsTable::new(rows)?;
    info!(rows = table.len(), seasons = table.seasons().len(), "team stats parsed");
    Ok(table)
}

/// Curated identity table with `season`, `team_name` and `team_id` columns.
pub fn parse_team_ids<R: Read>(input: R) -> Result<Vec<TeamIdentityEntry>> {
    let mut rdr = csv::Reader::from_reader(input);
    let headers = rdr.headers().context("read team id header")?.clone();
    let season_col = column(&headers, "season")?;
    let name_col = column(&headers, "team_name")?;
    let id_col = column(&headers, "team_id")?;

    let mut out = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.context("read team id row")?;
        let season_raw = field(&record, season_col);
        let id_raw = field(&record, id_col);
        let season = season_raw
            .parse::<i32>()
            .with_context(|| format!("team id row {}: bad season {season_raw:?}", line + 2))?;
        let team_id = parse_id(id_raw)
            .ok_or_else(|| anyhow!("team id row {}: bad team id {id_raw:?}", line + 2))?;
        out.push(TeamIdentityEntry {
            season,
            team_name: field(&record, name_col).to_string(),
            team_id,
        });
    }
    Ok(out)
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| anyhow!("missing csv column {name}"))
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

/// Ids sometimes arrive float-formatted ("1610612744.0").
fn parse_id(raw: &str) -> Option<TeamId> {
    if let Ok(id) = raw.parse::<TeamId>() {
        return Some(id);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 {
        Some(f as TeamId)
    } else {
        None
    }
}

fn parse_stat(raw: &str) -> f64 {
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") {
        return f64::NAN;
    }
    raw.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMES: &str = "\
gameId,gameDate,hometeamCity,hometeamName,hometeamId,awayteamCity,awayteamName,awayteamId,homeScore,awayScore,winner
1,2024-01-10 19:30:00,Golden State,Warriors,1610612744,Utah,Jazz,1610612762,120,110,1610612744
2,2024-01-12 19:00:00,Utah,Jazz,1610612762,Golden State,Warriors,1610612744,101,99,1610612762.0
3,2024-01-13 19:00:00,Utah,Jazz,1610612762,Golden State,Warriors,1610612744,,,
";

    fn stats_csv() -> String {
        let header = format!("season,lg,team,abbreviation,{}", STAT_COLUMNS.join(","));
        let values = |base: f64| {
            (0..STAT_COUNT)
                .map(|i| format!("{}", base + i as f64))
                .collect::<Vec<_>>()
                .join(",")
        };
        let mut na_row = values(1.0).split(',').map(str::to_string).collect::<Vec<_>>();
        na_row[1] = "NA".into();
        format!(
            "{header}\n2024,NBA,Golden State Warriors,GSW,{}\n2024,NBA,Utah Jazz,UTA,{}\n",
            values(0.5),
            na_row.join(",")
        )
    }

    #[test]
    fn games_with_unparseable_winner_are_skipped() {
        let (games, summary) = parse_games(GAMES.as_bytes()).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.kept, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(games[0].season, 2024);
        assert_eq!(games[0].home_name_fragment, "Warriors");
        assert!(games[0].home_won());
        assert_eq!(games[1].winner_id, 1610612762);
        assert!(games[1].home_won());
    }

    #[test]
    fn stats_columns_are_found_by_header() {
        let table = parse_team_stats(stats_csv().as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let gsw = table.lookup(2024, "Golden State Warriors").unwrap();
        assert_eq!(gsw.fg_percent, 0.5);
        assert_eq!(gsw.pts_per_100_poss, 20.5);
        let uta = table.lookup(2024, "utah jazz").unwrap();
        assert!(uta.x3p_percent.is_nan());
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = parse_games("gameDate,winner\n2024-01-01,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("hometeamName"));
    }

    #[test]
    fn team_id_table_parses() {
        let raw = "season,team_name,team_id\n2005,Sacramento Kings,1610612758\n";
        let entries = parse_team_ids(raw.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].team_id, 1610612758);
    }
}
