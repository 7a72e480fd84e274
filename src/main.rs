use anyhow::{Context, Result};

use nba_iq::cli::{self, arg_value, has_flag, parse_arg, path_arg};
use nba_iq::config;
use nba_iq::ensemble::{self, EnsemblePrediction};
use nba_iq::trainer::ModelArtifact;
use nba_iq::{logging, store};

const USAGE: &str = "\
usage: nba_iq --home <team> --home-season <year> --away <team> --away-season <year>
              [--db <sqlite>] [--models <models.json>] [--json] [--features]";

fn main() -> Result<()> {
    config::load_dotenv();
    logging::init();
    let args = cli::args();
    if has_flag(&args, "help") {
        println!("{USAGE}");
        return Ok(());
    }

    let db_path = config::resolve_db_path(path_arg(&args, "db"))?;
    let models_path = config::resolve_models_path(path_arg(&args, "models"))?;

    let home = arg_value(&args, "home").with_context(|| format!("--home is required\n{USAGE}"))?;
    let away = arg_value(&args, "away").with_context(|| format!("--away is required\n{USAGE}"))?;
    let home_season: i32 = parse_arg(&args, "home-season")?
        .with_context(|| format!("--home-season is required\n{USAGE}"))?;
    let away_season: i32 = parse_arg(&args, "away-season")?
        .with_context(|| format!("--away-season is required\n{USAGE}"))?;

    let conn = store::open_db(&db_path)?;
    let stats = store::load_team_stats(&conn)?;
    let artifact = ModelArtifact::load(&models_path)?;

    let prediction = ensemble::predict(
        &home,
        home_season,
        &away,
        away_season,
        &stats,
        &artifact.models,
    )?;

    if has_flag(&args, "json") {
        let json = serde_json::to_string_pretty(&prediction).context("serialize prediction")?;
        println!("{json}");
        return Ok(());
    }
    print_report(&prediction, has_flag(&args, "features"));
    Ok(())
}

fn print_report(p: &EnsemblePrediction, show_features: bool) {
    println!(
        "{} ({}) vs {} ({})",
        p.home_team, p.home_season, p.away_team, p.away_season
    );

    if show_features {
        println!();
        println!("=== Features (home - away) ===");
        for (name, value) in p.features.iter() {
            println!("{name:<20} {value:>10.4}");
        }
    }

    println!();
    println!("=== Individual Model Predictions ===");
    for m in &p.per_model {
        println!(
            "{}: Predicted winner: {} | {} win prob: {:.3}, {} win prob: {:.3}",
            m.model_name,
            m.predicted_winner,
            p.home_team,
            m.home_win_probability,
            p.away_team,
            m.away_win_probability
        );
    }

    println!();
    println!("=== Ensemble (Average) Results ===");
    println!(
        "Average probability {} wins: {:.3}",
        p.home_team, p.aggregate.average_home_probability
    );
    println!(
        "Average probability {} wins: {:.3}",
        p.away_team, p.aggregate.average_away_probability
    );
    println!("Predicted winner: {}", p.aggregate.final_winner);
}
