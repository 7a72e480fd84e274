use anyhow::{Context, Result};

use nba_iq::cli::{self, arg_value, has_flag, parse_arg, path_arg};
use nba_iq::config::{self, AppConfig, ModelSuiteConfig};
use nba_iq::evaluation::{
    self, ClassScores, ModelEvaluation, TeamSeasonReport, calibration_bins, predicted_label,
};
use nba_iq::split::split_and_clean;
use nba_iq::trainer::{ModelArtifact, TrainedModel, train_all};
use nba_iq::{logging, store};

fn main() -> Result<()> {
    config::load_dotenv();
    logging::init();
    let args = cli::args();
    let cfg = AppConfig::from_env()?;

    let db_path = path_arg(&args, "db").unwrap_or(cfg.db_path);
    let models_path = path_arg(&args, "models").unwrap_or(cfg.models_path);
    let seed: u64 = parse_arg(&args, "seed")?.unwrap_or(cfg.seed);
    let test_fraction: f64 = parse_arg(&args, "test-fraction")?.unwrap_or(cfg.test_fraction);
    let suite = match path_arg(&args, "config") {
        Some(path) => ModelSuiteConfig::load(&path)?,
        None => ModelSuiteConfig::default(),
    };

    let conn = store::open_db(&db_path)?;
    let data = store::load_dataset(&conn)?;
    let split = split_and_clean(&data, test_fraction, seed)?;
    println!(
        "Split: train={} test={} (dropped {} + {} rows with undefined features)",
        split.train.len(),
        split.test.len(),
        split.dropped_train,
        split.dropped_test
    );

    let models = train_all(&suite, split.train.features(), split.train.outcomes())?;

    for model in &models {
        let eval = evaluation::evaluate_model(model, &split.test);
        print_evaluation(&eval);
        println!("Fit: {}", model.classifier().summary());
        if has_flag(&args, "calibration") {
            print_calibration(model, &split.test);
        }
    }

    let team = arg_value(&args, "team");
    let season: Option<i32> = parse_arg(&args, "season")?;
    if let (Some(team), Some(season)) = (team, season) {
        match evaluation::evaluate_team_season(&models, &split.test, &team, season) {
            TeamSeasonReport::NoData { team, season } => {
                println!();
                println!("No test games found for team '{team}' in season {season}");
            }
            TeamSeasonReport::Evaluated {
                team,
                season,
                games,
                models,
            } => {
                println!();
                println!("=== {team} {season}: {games} test games ===");
                for eval in &models {
                    print_evaluation(eval);
                }
            }
        }
    }

    if !has_flag(&args, "dry-run") {
        ModelArtifact::new(models, split.train.len())
            .save(&models_path)
            .with_context(|| format!("save models to {}", models_path.display()))?;
        println!();
        println!("Models saved: {}", models_path.display());
    }
    Ok(())
}

fn print_evaluation(eval: &ModelEvaluation) {
    let m = &eval.metrics;
    let r = &eval.report;
    println!();
    println!("=== {} ===", eval.model_name);
    println!(
        "Accuracy: {:.4}  Brier: {:.4}  LogLoss: {:.4}  (n={})",
        m.accuracy, m.brier, m.log_loss, m.samples
    );
    println!(
        "{:<14} {:>9} {:>9} {:>9} {:>9}",
        "", "precision", "recall", "f1-score", "support"
    );
    print_scores("away win (0)", &r.away_win);
    print_scores("home win (1)", &r.home_win);
    println!(
        "{:<14} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy", "", "", r.accuracy, r.home_win.support + r.away_win.support
    );
    print_scores("macro avg", &r.macro_avg);
    print_scores("weighted avg", &r.weighted_avg);
}

fn print_scores(label: &str, s: &ClassScores) {
    println!(
        "{:<14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        label, s.precision, s.recall, s.f1, s.support
    );
}

fn print_calibration(model: &TrainedModel, test: &nba_iq::dataset::Dataset) {
    let probs = test
        .features()
        .iter()
        .map(|row| model.predict_proba(row))
        .collect::<Vec<_>>();
    let home_calls = probs.iter().filter(|p| predicted_label(p) == 1).count();
    println!("Calibration (home win), {home_calls} home calls:");
    for bin in calibration_bins(&probs, test.outcomes(), 10) {
        if bin.count == 0 {
            continue;
        }
        println!(
            "  [{:.1}, {:.1})  n={:<5} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }
}
