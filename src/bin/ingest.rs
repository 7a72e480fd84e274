use std::path::PathBuf;

use anyhow::Result;

use nba_iq::cli::{self, path_arg};
use nba_iq::config;
use nba_iq::{ingest, logging, store};

const DEFAULT_GAMES_CSV: &str = "data/Games.csv";
const DEFAULT_STATS_CSV: &str = "data/Team Stats Per 100 Poss.csv";

fn main() -> Result<()> {
    config::load_dotenv();
    logging::init();
    let args = cli::args();

    let db_path = config::resolve_db_path(path_arg(&args, "db"))?;
    let games_path = path_arg(&args, "games").unwrap_or_else(|| PathBuf::from(DEFAULT_GAMES_CSV));
    let stats_path = path_arg(&args, "stats").unwrap_or_else(|| PathBuf::from(DEFAULT_STATS_CSV));
    let ids_path = path_arg(&args, "team-ids");

    let (games, games_summary) = ingest::read_games(&games_path)?;
    let stats = ingest::read_team_stats(&stats_path)?;
    let team_ids = match &ids_path {
        Some(path) => Some(ingest::read_team_ids(path)?),
        None => None,
    };

    let mut conn = store::open_db(&db_path)?;
    let games_saved = store::save_games(&mut conn, &games)?;
    let stats_saved = store::save_team_stats(&mut conn, &stats)?;
    let ids_saved = match &team_ids {
        Some(entries) => Some(store::save_team_ids(&mut conn, entries)?),
        None => None,
    };

    println!("Raw ingest complete");
    println!("DB: {}", db_path.display());
    println!(
        "Games: {} stored ({} rows read, {} skipped)",
        games_saved, games_summary.rows, games_summary.skipped
    );
    println!(
        "Team seasons: {} stored across {} seasons",
        stats_saved,
        stats.seasons().len()
    );
    match ids_saved {
        Some(n) => println!("Team ids: {n} injected"),
        None => println!("Team ids: none injected (build_dataset will derive them)"),
    }
    Ok(())
}
