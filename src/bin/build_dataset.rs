use anyhow::Result;
use tracing::warn;

use nba_iq::cli::{self, has_flag, path_arg};
use nba_iq::config;
use nba_iq::dataset;
use nba_iq::identity::TeamIdentityMap;
use nba_iq::{logging, store};

fn main() -> Result<()> {
    config::load_dotenv();
    logging::init();
    let args = cli::args();
    let db_path = config::resolve_db_path(path_arg(&args, "db"))?;

    let mut conn = store::open_db(&db_path)?;
    let games = store::load_games(&conn)?;
    let stats = store::load_team_stats(&conn)?;

    let injected = if has_flag(&args, "derive-ids") {
        None
    } else {
        store::load_team_ids(&conn)?
    };
    let (identities, source) = match injected {
        Some(map) => (map, "injected"),
        None => (TeamIdentityMap::derive_from_games(stats.rows(), &games), "derived"),
    };

    let collisions = identities.collisions();
    for c in &collisions {
        warn!(
            season = c.season,
            token = %c.token,
            teams = ?c.team_names,
            "teams share a trailing name token"
        );
    }

    let (data, summary) = dataset::assemble(&games, &stats, &identities);
    let saved = store::save_dataset(&mut conn, &data)?;

    println!("Dataset build complete");
    println!("DB: {}", db_path.display());
    println!("Team ids: {} ({source})", identities.len());
    println!("Name-token collisions: {}", collisions.len());
    println!("Games seen: {}", summary.games_seen);
    println!("Games resolved: {}", summary.games_assembled);
    println!(
        "Games unresolved: {} (identity {}, stats {})",
        summary.unresolved_identity + summary.missing_stats,
        summary.unresolved_identity,
        summary.missing_stats
    );
    println!("Rows saved: {saved}");
    if let Some(rate) = data.home_win_rate() {
        println!("Home win rate: {rate:.3}");
    }
    Ok(())
}
