use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params, params_from_iter};
use tracing::info;

use crate::dataset::{Dataset, GameMeta};
use crate::error::PredictError;
use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FeatureRow};
use crate::identity::{TeamIdentityEntry, TeamIdentityMap};
use crate::records::{GameRecord, STAT_COLUMNS, STAT_COUNT, StatsTable, TeamSeasonStats};

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        .context("enable wal journal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let stat_cols = STAT_COLUMNS
        .iter()
        .map(|c| format!("{c} REAL NULL"))
        .collect::<Vec<_>>()
        .join(",\n            ");
    let feature_cols = FEATURE_NAMES
        .iter()
        .map(|c| format!("{c} REAL NULL"))
        .collect::<Vec<_>>()
        .join(",\n            ");
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            row_idx INTEGER PRIMARY KEY,
            season INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            winner_id INTEGER NOT NULL,
            home_name TEXT NOT NULL,
            away_name TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_season ON games(season);

        CREATE TABLE IF NOT EXISTS team_season_stats (
            season INTEGER NOT NULL,
            team_name TEXT NOT NULL,
            {stat_cols},
            PRIMARY KEY (season, team_name)
        );

        CREATE TABLE IF NOT EXISTS team_ids (
            season INTEGER NOT NULL,
            team_name TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            PRIMARY KEY (season, team_name)
        );

        CREATE TABLE IF NOT EXISTS processed_features (
            row_idx INTEGER PRIMARY KEY,
            {feature_cols}
        );
        CREATE TABLE IF NOT EXISTS processed_outcomes (
            row_idx INTEGER PRIMARY KEY,
            home_win INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS processed_meta (
            row_idx INTEGER PRIMARY KEY,
            season INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL
        );
        "#
    ))
    .context("create sqlite schema")?;
    Ok(())
}

/// Replaces the stored game log.
pub fn save_games(conn: &mut Connection, games: &[GameRecord]) -> Result<usize> {
    let tx = conn.transaction().context("begin games transaction")?;
    tx.execute("DELETE FROM games", []).context("clear games")?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO games (row_idx, season, game_date, home_team_id, away_team_id, winner_id, home_name, away_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .context("prepare insert game")?;
        for (idx, g) in games.iter().enumerate() {
            stmt.execute(params![
                idx as i64,
                g.season,
                g.game_date,
                g.home_team_id,
                g.away_team_id,
                g.winner_id,
                g.home_name_fragment,
                g.away_name_fragment,
            ])
            .context("insert game")?;
        }
    }
    tx.commit().context("commit games")?;
    Ok(games.len())
}

pub fn load_games(conn: &Connection) -> Result<Vec<GameRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT season, game_date, home_team_id, away_team_id, winner_id, home_name, away_name
             FROM games ORDER BY row_idx ASC",
        )
        .context("prepare load games query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GameRecord {
                season: row.get(0)?,
                game_date: row.get(1)?,
                home_team_id: row.get(2)?,
                away_team_id: row.get(3)?,
                winner_id: row.get(4)?,
                home_name_fragment: row.get(5)?,
                away_name_fragment: row.get(6)?,
            })
        })
        .context("query load games")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode game row")?);
    }
    Ok(out)
}

/// Upserts stats rows on `(season, team_name)`.
pub fn save_team_stats(conn: &mut Connection, stats: &StatsTable) -> Result<usize> {
    let cols = STAT_COLUMNS.join(", ");
    let placeholders = (1..=STAT_COUNT + 2)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = STAT_COLUMNS
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO team_season_stats (season, team_name, {cols}) VALUES ({placeholders})
         ON CONFLICT(season, team_name) DO UPDATE SET {updates}"
    );

    let tx = conn.transaction().context("begin stats transaction")?;
    {
        let mut stmt = tx.prepare(&sql).context("prepare upsert stats")?;
        for row in stats.rows() {
            let mut values = Vec::with_capacity(STAT_COUNT + 2);
            values.push(Value::Integer(i64::from(row.season)));
            values.push(Value::Text(row.team_name.clone()));
            values.extend(row.stat_values().into_iter().map(real_or_null));
            stmt.execute(params_from_iter(values))
                .with_context(|| format!("upsert stats {} {}", row.season, row.team_name))?;
        }
    }
    tx.commit().context("commit stats")?;
    Ok(stats.len())
}

pub fn load_team_stats(conn: &Connection) -> Result<StatsTable> {
    let sql = format!(
        "SELECT season, team_name, {} FROM team_season_stats ORDER BY season ASC, team_name ASC",
        STAT_COLUMNS.join(", ")
    );
    let mut stmt = conn.prepare(&sql).context("prepare load stats query")?;
    let rows = stmt
        .query_map([], |row| {
            let mut values = [0.0; STAT_COUNT];
            for (i, v) in values.iter_mut().enumerate() {
                *v = nan_if_null(row.get(i + 2)?);
            }
            Ok(TeamSeasonStats::from_stat_values(row.get(0)?, row.get(1)?, values))
        })
        .context("query load stats")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode stats row")?);
    }
    Ok(StatsTable::new(out)?)
}

/// Replaces the injected identity table.
pub fn save_team_ids(conn: &mut Connection, entries: &[TeamIdentityEntry]) -> Result<usize> {
    let tx = conn.transaction().context("begin team ids transaction")?;
    tx.execute("DELETE FROM team_ids", []).context("clear team ids")?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT OR IGNORE INTO team_ids (season, team_name, team_id) VALUES (?1, ?2, ?3)",
            )
            .context("prepare insert team id")?;
        for e in entries {
            stmt.execute(params![e.season, e.team_name, e.team_id])
                .context("insert team id")?;
        }
    }
    tx.commit().context("commit team ids")?;
    Ok(entries.len())
}

/// `None` when no identity table was injected.
pub fn load_team_ids(conn: &Connection) -> Result<Option<TeamIdentityMap>> {
    let mut stmt = conn
        .prepare("SELECT season, team_name, team_id FROM team_ids ORDER BY season ASC, team_name ASC")
        .context("prepare load team ids query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TeamIdentityEntry {
                season: row.get(0)?,
                team_name: row.get(1)?,
                team_id: row.get(2)?,
            })
        })
        .context("query load team ids")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("decode team id row")?);
    }
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(TeamIdentityMap::from_entries(entries)))
}

/// Replaces the three processed tables in one transaction, keyed by the
/// shared `row_idx`.
pub fn save_dataset(conn: &mut Connection, dataset: &Dataset) -> Result<usize> {
    let feature_sql = format!(
        "INSERT INTO processed_features (row_idx, {}) VALUES ({})",
        FEATURE_NAMES.join(", "),
        (1..=FEATURE_COUNT + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let tx = conn.transaction().context("begin processed transaction")?;
    clear_processed(&tx)?;
    {
        let mut features = tx.prepare(&feature_sql).context("prepare insert features")?;
        let mut outcomes = tx
            .prepare("INSERT INTO processed_outcomes (row_idx, home_win) VALUES (?1, ?2)")
            .context("prepare insert outcomes")?;
        let mut meta = tx
            .prepare(
                "INSERT INTO processed_meta (row_idx, season, home_team, away_team) VALUES (?1, ?2, ?3, ?4)",
            )
            .context("prepare insert meta")?;

        for (idx, ((row, outcome), m)) in dataset
            .features()
            .iter()
            .zip(dataset.outcomes())
            .zip(dataset.meta())
            .enumerate()
        {
            let idx = idx as i64;
            let mut values = Vec::with_capacity(FEATURE_COUNT + 1);
            values.push(Value::Integer(idx));
            values.extend(row.iter().copied().map(real_or_null));
            features
                .execute(params_from_iter(values))
                .context("insert feature row")?;
            outcomes
                .execute(params![idx, i64::from(*outcome)])
                .context("insert outcome row")?;
            meta.execute(params![idx, m.season, m.home_team, m.away_team])
                .context("insert meta row")?;
        }
    }
    tx.commit().context("commit processed tables")?;
    info!(rows = dataset.len(), "processed tables saved");
    Ok(dataset.len())
}

pub fn load_dataset(conn: &Connection) -> Result<Dataset> {
    check_feature_columns(conn)?;

    let sql = format!(
        "SELECT {} FROM processed_features ORDER BY row_idx ASC",
        FEATURE_NAMES.join(", ")
    );
    let mut stmt = conn.prepare(&sql).context("prepare load features query")?;
    let rows = stmt
        .query_map([], |row| {
            let mut values: FeatureRow = [0.0; FEATURE_COUNT];
            for (i, v) in values.iter_mut().enumerate() {
                *v = nan_if_null(row.get(i)?);
            }
            Ok(values)
        })
        .context("query load features")?;
    let mut features = Vec::new();
    for row in rows {
        features.push(row.context("decode feature row")?);
    }

    let mut stmt = conn
        .prepare("SELECT home_win FROM processed_outcomes ORDER BY row_idx ASC")
        .context("prepare load outcomes query")?;
    let rows = stmt
        .query_map([], |row| Ok(u8::from(row.get::<_, i64>(0)? != 0)))
        .context("query load outcomes")?;
    let mut outcomes = Vec::new();
    for row in rows {
        outcomes.push(row.context("decode outcome row")?);
    }

    let mut stmt = conn
        .prepare("SELECT season, home_team, away_team FROM processed_meta ORDER BY row_idx ASC")
        .context("prepare load meta query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GameMeta {
                season: row.get(0)?,
                home_team: row.get(1)?,
                away_team: row.get(2)?,
            })
        })
        .context("query load meta")?;
    let mut meta = Vec::new();
    for row in rows {
        meta.push(row.context("decode meta row")?);
    }

    Ok(Dataset::from_parts(features, outcomes, meta)?)
}

fn clear_processed(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "DELETE FROM processed_features;
         DELETE FROM processed_outcomes;
         DELETE FROM processed_meta;",
    )
    .context("clear processed tables")?;
    Ok(())
}

/// Tables written by an older feature layout must not be read as the current one.
fn check_feature_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('processed_features') ORDER BY cid ASC")
        .context("prepare table info query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query table info")?;
    let mut found = Vec::new();
    for row in rows {
        let name = row.context("decode column name")?;
        if name != "row_idx" {
            found.push(name);
        }
    }
    if found.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
        return Err(PredictError::FeatureSchemaMismatch {
            expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            found,
        }
        .into());
    }
    Ok(())
}

fn real_or_null(v: f64) -> Value {
    if v.is_finite() { Value::Real(v) } else { Value::Null }
}

fn nan_if_null(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}
