use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use nba_iq::config::ModelSuiteConfig;
use nba_iq::dataset::assemble;
use nba_iq::ensemble;
use nba_iq::error::PredictError;
use nba_iq::evaluation::{TeamSeasonReport, evaluate_team_season};
use nba_iq::identity::{TeamIdentityEntry, TeamIdentityMap};
use nba_iq::ingest;
use nba_iq::records::{GameRecord, STAT_COLUMNS, STAT_COUNT, StatsTable, TeamSeasonStats};
use nba_iq::split::split_and_clean;
use nba_iq::store;
use nba_iq::trainer::{ModelArtifact, train_all};

const TEAMS: [(&str, f64); 8] = [
    ("Boston Celtics", 3.5),
    ("Denver Nuggets", 2.5),
    ("Golden State Warriors", 1.5),
    ("Miami Heat", 0.5),
    ("Phoenix Suns", -0.5),
    ("Los Angeles Lakers", -1.5),
    ("Utah Jazz", -2.5),
    ("Chicago Bulls", -3.5),
];
const SEASONS: [i32; 3] = [2020, 2021, 2022];
const BASE_ID: i64 = 1_610_612_700;

fn team_stats(season: i32, name: &str, s: f64) -> TeamSeasonStats {
    let v: [f64; STAT_COUNT] = [
        0.46 + 0.01 * s,
        0.35 + 0.008 * s,
        0.52 + 0.01 * s,
        0.77 + 0.005 * s,
        41.0 + 0.8 * s,
        88.0 - 0.2 * s,
        12.0 + 0.4 * s,
        34.0 + 0.3 * s,
        29.0 + 0.4 * s,
        54.0 - 0.5 * s,
        17.0 + 0.3 * s,
        22.0 + 0.3 * s,
        10.0 + 0.2 * s,
        34.0 + 0.5 * s,
        44.0 + 0.7 * s,
        25.0 + 0.6 * s,
        7.5 + 0.2 * s,
        5.0 + 0.2 * s,
        14.0 - 0.4 * s,
        20.0 - 0.2 * s,
        112.0 + 2.5 * s,
    ];
    TeamSeasonStats::from_stat_values(season, name.to_string(), v)
}

fn strength(idx: usize, season: i32) -> f64 {
    TEAMS[idx].1 + 0.1 * ((idx as i32 + season) % 3) as f64
}

fn fragment(name: &str) -> String {
    name.split_whitespace().last().unwrap_or(name).to_string()
}

struct League {
    stats: StatsTable,
    games: Vec<GameRecord>,
}

fn league() -> League {
    let mut rows = Vec::new();
    for season in SEASONS {
        for (idx, (name, _)) in TEAMS.iter().enumerate() {
            rows.push(team_stats(season, name, strength(idx, season)));
        }
    }
    // In the stats table but never in the game log.
    rows.push(team_stats(2021, "Seattle SuperSonics", 0.0));

    let mut rng = StdRng::seed_from_u64(2024);
    let mut games = Vec::new();
    for season in SEASONS {
        for _round in 0..3 {
            for h in 0..TEAMS.len() {
                for a in 0..TEAMS.len() {
                    if h == a {
                        continue;
                    }
                    let edge = strength(h, season) - strength(a, season) + 0.3;
                    let noise: f64 = rng.gen_range(-2.0..2.0);
                    let home_id = BASE_ID + h as i64;
                    let away_id = BASE_ID + a as i64;
                    games.push(GameRecord {
                        season,
                        game_date: format!("{season}-02-01 19:00:00"),
                        home_team_id: home_id,
                        away_team_id: away_id,
                        winner_id: if edge + noise > 0.0 { home_id } else { away_id },
                        home_name_fragment: fragment(TEAMS[h].0),
                        away_name_fragment: fragment(TEAMS[a].0),
                    });
                }
            }
        }
    }
    // An opponent that never appears in the stats table.
    games.push(GameRecord {
        season: 2020,
        game_date: "2020-03-01".into(),
        home_team_id: BASE_ID,
        away_team_id: 99,
        winner_id: 99,
        home_name_fragment: "Celtics".into(),
        away_name_fragment: "Globetrotters".into(),
    });

    League {
        stats: StatsTable::new(rows).unwrap(),
        games,
    }
}

fn quick_suite() -> ModelSuiteConfig {
    let mut suite = ModelSuiteConfig::default();
    suite.forest.n_estimators = 30;
    suite.boosting.n_estimators = 80;
    suite.boosting.learning_rate = 0.1;
    suite
}

#[test]
fn identities_resolve_per_season() {
    let l = league();
    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    assert_eq!(ids.len(), TEAMS.len() * SEASONS.len());
    assert_eq!(ids.team_id(2021, "Utah Jazz"), Some(BASE_ID + 6));
    assert_eq!(ids.team_id(2021, "Seattle SuperSonics"), None);
    assert!(ids.collisions().is_empty());
}

#[test]
fn assembled_tables_are_row_aligned() {
    let l = league();
    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    let (data, summary) = assemble(&l.games, &l.stats, &ids);

    assert_eq!(summary.games_seen, l.games.len());
    assert_eq!(summary.games_assembled, l.games.len() - 1);
    assert_eq!(summary.unresolved_identity, 1);
    assert_eq!(data.features().len(), data.outcomes().len());
    assert_eq!(data.features().len(), data.meta().len());

    // Row i still describes game i (the unresolved game is last).
    for (i, game) in l.games.iter().take(data.len()).enumerate() {
        let meta = &data.meta()[i];
        assert_eq!(meta.season, game.season);
        assert_eq!(fragment(&meta.home_team), game.home_name_fragment);
        assert_eq!(fragment(&meta.away_team), game.away_name_fragment);
        assert_eq!(data.outcomes()[i], u8::from(game.home_won()));
    }
}

#[test]
fn injected_identity_table_overrides_heuristic() {
    let l = league();
    // Only two teams injected: every other game is dropped.
    let ids = TeamIdentityMap::from_entries([
        TeamIdentityEntry {
            season: 2020,
            team_name: "Boston Celtics".into(),
            team_id: BASE_ID,
        },
        TeamIdentityEntry {
            season: 2020,
            team_name: "Chicago Bulls".into(),
            team_id: BASE_ID + 7,
        },
    ]);
    let (data, _) = assemble(&l.games, &l.stats, &ids);
    assert_eq!(data.len(), 2 * 3);
    assert!(data.meta().iter().all(|m| m.season == 2020));
}

#[test]
fn split_removes_undefined_rows_and_keeps_ratio() {
    let mut l = league();
    let mut rows = l.stats.rows().to_vec();
    rows.retain(|r| !(r.season == 2022 && r.team_name == "Miami Heat"));
    let mut broken = team_stats(2022, "Miami Heat", 0.5);
    broken.fga_per_100_poss = 0.0;
    rows.push(broken);
    l.stats = StatsTable::new(rows).unwrap();

    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    let (data, _) = assemble(&l.games, &l.stats, &ids);
    let split = split_and_clean(&data, 0.2, 42).unwrap();

    // Heat 2022 appear in 14 games per round, three rounds.
    assert_eq!(split.dropped_train + split.dropped_test, 14 * 3);
    for part in [&split.train, &split.test] {
        assert!(part.features().iter().all(|r| r.iter().all(|v| v.is_finite())));
        assert_eq!(part.features().len(), part.meta().len());
        assert!(
            part.meta()
                .iter()
                .all(|m| !(m.season == 2022 && (m.home_team == "Miami Heat" || m.away_team == "Miami Heat")))
        );
    }

    let full = data.home_win_rate().unwrap();
    let train = split.train.home_win_rate().unwrap();
    assert!((train - full).abs() < 0.03, "train {train} vs full {full}");
}

#[test]
fn trained_ensemble_favours_stronger_team() {
    let l = league();
    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    let (data, _) = assemble(&l.games, &l.stats, &ids);
    let split = split_and_clean(&data, 0.2, 42).unwrap();
    let models = train_all(&quick_suite(), split.train.features(), split.train.outcomes()).unwrap();

    let p = ensemble::predict(
        "boston celtics ",
        2022,
        "Chicago Bulls",
        2020,
        &l.stats,
        &models,
    )
    .unwrap();
    assert_eq!(p.home_team, "Boston Celtics");
    assert_eq!(p.per_model.len(), 3);
    assert_eq!(p.aggregate.final_winner, "Boston Celtics");
    for m in &p.per_model {
        assert!((m.home_win_probability + m.away_win_probability - 1.0).abs() < 1e-9);
        assert_eq!(m.predicted_winner, "Boston Celtics", "{}", m.model_name);
    }
    let agg = &p.aggregate;
    assert!((agg.average_home_probability + agg.average_away_probability - 1.0).abs() < 1e-9);

    let reversed = ensemble::predict("Chicago Bulls", 2020, "Boston Celtics", 2022, &l.stats, &models)
        .unwrap();
    assert_eq!(reversed.aggregate.final_winner, "Boston Celtics");

    match evaluate_team_season(&models, &split.test, "Utah Jazz", 1999) {
        TeamSeasonReport::NoData { season, .. } => assert_eq!(season, 1999),
        other => panic!("expected no data, got {other:?}"),
    }
    match evaluate_team_season(&models, &split.test, "utah jazz", 2021) {
        TeamSeasonReport::Evaluated { games, models, .. } => {
            assert!(games > 0);
            assert_eq!(models.len(), 3);
        }
        other => panic!("expected evaluation, got {other:?}"),
    }

    let artifact = ModelArtifact::new(models, split.train.len());
    assert!(artifact.check_schema().is_ok());
}

#[test]
fn unknown_team_season_is_a_lookup_failure() {
    let l = league();
    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    let (data, _) = assemble(&l.games, &l.stats, &ids);
    let models = train_all(&quick_suite(), data.features(), data.outcomes()).unwrap();

    let err = ensemble::predict("Boston Celtics", 2022, "Utah Jazz", 2030, &l.stats, &models)
        .unwrap_err();
    assert!(matches!(
        err,
        PredictError::TeamSeasonNotFound { season: 2030, .. }
    ));
    let err = ensemble::predict("Boston Celtics", 2022, "Utah Jazz", 2022, &l.stats, &[])
        .unwrap_err();
    assert!(matches!(err, PredictError::NoModels));
}

fn stats_csv(rows: &[TeamSeasonStats]) -> String {
    let mut out = format!("season,team,{}\n", STAT_COLUMNS.join(","));
    for row in rows {
        let values = row
            .stat_values()
            .iter()
            .map(|v| if v.is_finite() { v.to_string() } else { "NA".to_string() })
            .collect::<Vec<_>>();
        out.push_str(&format!("{},{},{}\n", row.season, row.team_name, values.join(",")));
    }
    out
}

#[test]
fn undefined_features_refuse_to_predict() {
    let l = league();
    let ids = TeamIdentityMap::derive_from_games(l.stats.rows(), &l.games);
    let (data, _) = assemble(&l.games, &l.stats, &ids);
    let split = split_and_clean(&data, 0.2, 42).unwrap();
    let models = train_all(&quick_suite(), split.train.features(), split.train.outcomes()).unwrap();

    // No three-point line yet: the cell reads NA in the raw table.
    let mut rows = l.stats.rows().to_vec();
    let mut celtics_1975 = team_stats(1975, "Boston Celtics", 3.5);
    celtics_1975.x3p_percent = f64::NAN;
    rows.push(celtics_1975);
    let mut no_attempts = team_stats(1975, "Chicago Bulls", -3.5);
    no_attempts.fga_per_100_poss = 0.0;
    rows.push(no_attempts);
    let stats = ingest::parse_team_stats(stats_csv(&rows).as_bytes()).unwrap();
    assert!(stats.lookup(1975, "Boston Celtics").unwrap().x3p_percent.is_nan());

    let err = ensemble::predict("Boston Celtics", 1975, "Utah Jazz", 2022, &stats, &models)
        .unwrap_err();
    match err {
        PredictError::UndefinedFeatures { home, away, features } => {
            assert_eq!(home, "Boston Celtics");
            assert_eq!(away, "Utah Jazz");
            assert_eq!(features, vec!["x3p_pct_diff"]);
        }
        other => panic!("expected undefined features, got {other:?}"),
    }

    let err = ensemble::predict("Utah Jazz", 2022, "Chicago Bulls", 1975, &stats, &models)
        .unwrap_err();
    assert!(matches!(
        err,
        PredictError::UndefinedFeatures { ref features, .. } if features.contains(&"efg_pct_diff")
    ));

    // Well-defined rows from the same table still predict.
    let ok = ensemble::predict("Boston Celtics", 2022, "Utah Jazz", 2022, &stats, &models).unwrap();
    assert!(ok.aggregate.average_home_probability.is_finite());
}

#[test]
fn sqlite_round_trip_reproduces_dataset() {
    let l = league();
    let mut conn = Connection::open_in_memory().unwrap();
    store::init_schema(&conn).unwrap();
    store::save_games(&mut conn, &l.games).unwrap();
    store::save_team_stats(&mut conn, &l.stats).unwrap();

    let games = store::load_games(&conn).unwrap();
    let stats = store::load_team_stats(&conn).unwrap();
    assert_eq!(games, l.games);
    assert_eq!(stats.len(), l.stats.len());

    let ids = TeamIdentityMap::derive_from_games(stats.rows(), &games);
    let (data, _) = assemble(&games, &stats, &ids);
    store::save_dataset(&mut conn, &data).unwrap();
    let loaded = store::load_dataset(&conn).unwrap();
    assert_eq!(loaded, data);
}
