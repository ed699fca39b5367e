//! Weekly batch run
//!
//! plays -> aggregation -> training set -> model -> profiles -> matchups ->
//! projections -> analysis document. Nothing is written until every step has
//! succeeded.

use crate::data::feeds::injuries::{injury_chain, InjuryReport};
use crate::data::feeds::lines::{line_chain, LineSheet};
use crate::data::feeds::{refresh_cache, FeedSnapshot};
use crate::data::{stage_json, TrainingSetBuilder};
use crate::features::season_blend::SeasonBlender;
use crate::features::{
    Aggregation, FeatureBuilder, InjuryAdjuster, InjuryEvent, PlayAggregator, TeamSeasonProfile,
};
use crate::predict::{AnalysisReport, EdgeClassifier, GameReport, PredictionEngine};
use crate::training::{ModelArtifact, ModelTrainer};
use crate::{Config, PlayRecord, Prediction, Result, TeamCode, TotalsError};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Resolve a configured team (code or name) to a known code
pub fn resolve_team(name: &str) -> Result<TeamCode> {
    let code = TeamCode::new(name);
    if code.is_known() {
        return Ok(code);
    }
    TeamCode::from_name(name).ok_or_else(|| TotalsError::UnknownTeam(name.to_string()))
}

/// Odds API key from the configured environment variable, read once per run
pub fn api_key(config: &Config) -> Option<String> {
    std::env::var(&config.feeds.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

/// Fetch lines; unavailable lines are only tolerated when every matchup has a total
pub fn fetch_lines(
    config: &Config,
    api_key: Option<String>,
    offline: bool,
) -> Result<Option<FeedSnapshot<LineSheet>>> {
    let chain = line_chain(&config.feeds, api_key, &config.data.line_cache_path, offline)?;
    match chain.fetch() {
        Ok(snapshot) => {
            if let Err(e) = refresh_cache(&snapshot, &config.data.line_cache_path) {
                log::warn!("Could not refresh line cache: {}", e);
            }
            Ok(Some(snapshot))
        }
        Err(e) => {
            let covered = !config.matchups.is_empty()
                && config.matchups.iter().all(|m| m.market_total.is_some());
            if covered {
                log::warn!("{}; using configured market totals", e);
                Ok(None)
            } else {
                Err(e)
            }
        }
    }
}

/// Fetch injuries; an unavailable feed means no adjustments
pub fn fetch_injuries(config: &Config, offline: bool) -> Option<FeedSnapshot<InjuryReport>> {
    let snapshot = injury_chain(&config.feeds, &config.data.injury_cache_path, offline)
        .and_then(|chain| chain.fetch());

    match snapshot {
        Ok(snapshot) => {
            if let Err(e) = refresh_cache(&snapshot, &config.data.injury_cache_path) {
                log::warn!("Could not refresh injury cache: {}", e);
            }
            Some(snapshot)
        }
        Err(e) => {
            log::warn!("{}; continuing without injuries", e);
            None
        }
    }
}

/// A game to project
#[derive(Debug, Clone, PartialEq)]
pub struct Matchup {
    pub game_id: String,
    pub date: Option<NaiveDate>,
    pub home: TeamCode,
    pub away: TeamCode,
    pub market_total: f64,
    pub home_moneyline: Option<i32>,
    pub away_moneyline: Option<i32>,
}

/// Everything a run consumes besides configuration
pub struct RunInputs<'a> {
    pub plays: &'a [PlayRecord],
    pub lines: Option<FeedSnapshot<LineSheet>>,
    pub injuries: Option<FeedSnapshot<InjuryReport>>,
}

/// Everything a run produces
pub struct RunOutput {
    pub artifact: ModelArtifact,
    pub predictions: Vec<Prediction>,
    pub report: AnalysisReport,
}

/// Configured components of the batch
pub struct Pipeline<'a> {
    config: &'a Config,
    blender: SeasonBlender,
    training_set: TrainingSetBuilder,
    trainer: ModelTrainer,
    adjuster: InjuryAdjuster,
    classifier: EdgeClassifier,
}

impl<'a> Pipeline<'a> {
    /// Validate configuration up front
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Pipeline {
            config,
            blender: SeasonBlender::new(&config.blend.weights)?,
            training_set: TrainingSetBuilder::new(&config.training)?,
            trainer: ModelTrainer::new(&config.training)?,
            adjuster: InjuryAdjuster::new(config.injury.high_impact_reduction)?,
            classifier: EdgeClassifier::new(config.edge.threshold)?,
        })
    }

    pub fn aggregate(&self, plays: &[PlayRecord]) -> Aggregation {
        PlayAggregator::aggregate(plays)
    }

    /// Fit a fresh model on the configured training seasons
    pub fn train(&self, aggregation: &Aggregation) -> Result<ModelArtifact> {
        let seasons = &self.config.training.seasons;
        let present = aggregation.seasons();
        for season in seasons.iter().filter(|s| !present.contains(s)) {
            log::warn!("No games for training season {}", season);
        }
        let samples = self.training_set.build(aggregation, seasons)?;
        self.trainer.train(&samples, seasons)
    }

    /// Current profiles for every team
    pub fn profiles(&self, aggregation: &Aggregation) -> BTreeMap<TeamCode, TeamSeasonProfile> {
        self.blender.blend(&aggregation.stats)
    }

    /// Configured matchups, or every game on the line sheet
    pub fn resolve_matchups(&self, lines: Option<&LineSheet>) -> Result<Vec<Matchup>> {
        if self.config.matchups.is_empty() {
            let sheet = lines.ok_or_else(|| {
                TotalsError::Config("no matchups configured and no line feed".to_string())
            })?;
            return sheet
                .games
                .iter()
                .map(|game| -> Result<Matchup> {
                    let market_total = game.over_under.ok_or_else(|| TotalsError::MissingMarketTotal {
                        home: game.home_team.clone(),
                        away: game.away_team.clone(),
                    })?;
                    Ok(Matchup {
                        game_id: game.id.clone(),
                        date: game.game_date(),
                        home: game.home_team.clone(),
                        away: game.away_team.clone(),
                        market_total,
                        home_moneyline: game.home_moneyline,
                        away_moneyline: game.away_moneyline,
                    })
                })
                .collect();
        }

        self.config
            .matchups
            .iter()
            .map(|m| -> Result<Matchup> {
                let home = resolve_team(&m.home)?;
                let away = resolve_team(&m.away)?;
                let line = lines.and_then(|sheet| sheet.find(&home, &away));

                let market_total = m
                    .market_total
                    .or_else(|| line.and_then(|l| l.over_under))
                    .ok_or_else(|| TotalsError::MissingMarketTotal {
                        home: home.clone(),
                        away: away.clone(),
                    })?;

                Ok(Matchup {
                    game_id: line.map(|l| l.id.clone()).unwrap_or_else(|| {
                        format!("{}_{}_{}", self.config.blend.current_season, away, home)
                    }),
                    date: m.date.or_else(|| line.and_then(|l| l.game_date())),
                    home_moneyline: line.and_then(|l| l.home_moneyline),
                    away_moneyline: line.and_then(|l| l.away_moneyline),
                    home,
                    away,
                    market_total,
                })
            })
            .collect()
    }

    /// Project one matchup
    pub fn project(
        &self,
        engine: &PredictionEngine<'_>,
        profiles: &BTreeMap<TeamCode, TeamSeasonProfile>,
        matchup: &Matchup,
        injuries: &[InjuryEvent],
    ) -> Result<(Prediction, GameReport)> {
        let profile = |team: &TeamCode| {
            profiles
                .get(team)
                .ok_or_else(|| TotalsError::NoProfile { team: team.clone() })
        };
        let home = profile(&matchup.home)?;
        let away = profile(&matchup.away)?;

        let features = FeatureBuilder::build(home, away);
        let adjusted = self
            .adjuster
            .adjust(&features, &matchup.home, &matchup.away, injuries);
        let projected = engine.project(&adjusted.features)?;
        let call = self.classifier.classify(projected, matchup.market_total);

        let home_share = match (home.points_per_game, away.points_per_game) {
            (Some(h), Some(a)) if h + a > 0.0 => h / (h + a),
            _ => 0.5,
        };

        let prediction = Prediction {
            game_id: matchup.game_id.clone(),
            date: matchup.date,
            home_team: matchup.home.clone(),
            away_team: matchup.away.clone(),
            projected_total: projected,
            projected_home_score: projected * home_share,
            projected_away_score: projected * (1.0 - home_share),
            market_total: matchup.market_total,
            edge: call.edge,
            edge_percent: call.edge_percent,
            recommendation: call.recommendation,
        };

        log::debug!(
            "{} @ {}: model {:.1} vs market {:.1} -> {}",
            matchup.away,
            matchup.home,
            projected,
            matchup.market_total,
            call.recommendation
        );

        let report = GameReport::new(&prediction, home, away)
            .with_moneylines(matchup.home_moneyline, matchup.away_moneyline)
            .with_injuries(&[&adjusted.home, &adjusted.away]);

        Ok((prediction, report))
    }

    /// Run every step; any error aborts before output is produced
    pub fn run(&self, inputs: RunInputs<'_>) -> Result<RunOutput> {
        let aggregation = self.aggregate(inputs.plays);
        let artifact = self.train(&aggregation)?;
        let profiles = self.profiles(&aggregation);
        let matchups = self.resolve_matchups(inputs.lines.as_ref().map(|s| &s.data))?;

        let events = inputs
            .injuries
            .as_ref()
            .map(|s| s.data.events())
            .unwrap_or_default();

        let engine = PredictionEngine::new(&artifact);
        let mut predictions = Vec::with_capacity(matchups.len());
        let mut games = Vec::with_capacity(matchups.len());
        for matchup in &matchups {
            let (prediction, game) = self.project(&engine, &profiles, matchup, &events)?;
            predictions.push(prediction);
            games.push(game);
        }

        let report = AnalysisReport::new(
            self.config.blend.current_season,
            &artifact,
            &predictions,
            games,
        )
        .with_sources(
            inputs.lines.map(|s| s.provenance),
            inputs.injuries.map(|s| s.provenance),
        );

        log::info!(
            "Projected {} games: {} over, {} under, {} hold",
            report.summary_stats.games_analyzed,
            report.summary_stats.over_picks,
            report.summary_stats.under_picks,
            report.summary_stats.hold_picks
        );

        Ok(RunOutput {
            artifact,
            predictions,
            report,
        })
    }

    /// Write the artifact and the analysis document; neither replaces the
    /// previous run's file unless both were staged
    pub fn publish(&self, output: &RunOutput) -> Result<()> {
        let model = stage_json(&self.config.data.model_path, &output.artifact)?;
        let report = stage_json(&self.config.data.output_path, &output.report)?;
        model.commit()?;
        report.commit()?;

        log::info!(
            "Saved model to {} and analysis of {} games to {}",
            self.config.data.model_path,
            output.report.games.len(),
            self.config.data.output_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feeds::lines::LineGame;
    use crate::features::FEATURE_NAMES;
    use crate::{MatchupConfig, PlayType};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    const TEAMS: [&str; 8] = ["KC", "BUF", "BAL", "DET", "SF", "PHI", "MIA", "DAL"];

    /// Two seasons of round-robin-ish games with team strengths baked in
    fn synthetic_plays(seed: u64) -> Vec<PlayRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let strength: BTreeMap<&str, f64> = TEAMS
            .iter()
            .map(|t| (*t, rng.gen_range(-0.2..0.2)))
            .collect();

        let mut plays = Vec::new();
        let mut order = TEAMS;
        for season in [2024u16, 2025] {
            for week in 1..=14u8 {
                order.shuffle(&mut rng);
                for pair in order.chunks(2) {
                    let (home, away) = (pair[0], pair[1]);
                    let game_id = format!("{season}_{week:02}_{away}_{home}");
                    let mut game = Vec::new();
                    let mut epa_sum = [0.0, 0.0];

                    for (side, (off, def)) in [(home, away), (away, home)].into_iter().enumerate() {
                        for i in 0..24 {
                            let epa = strength[off] - 0.5 * strength[def] + rng.gen_range(-0.6..0.6);
                            epa_sum[side] += epa;
                            game.push(PlayRecord {
                                game_id: game_id.clone(),
                                season,
                                week,
                                home_team: TeamCode::new(home),
                                away_team: TeamCode::new(away),
                                posteam: Some(TeamCode::new(off)),
                                defteam: Some(TeamCode::new(def)),
                                play_type: if i % 2 == 0 { PlayType::Pass } else { PlayType::Run },
                                epa: Some(epa),
                                yards_gained: Some(5.0 + 8.0 * epa + rng.gen_range(-3.0..3.0)),
                                interception: rng.gen_bool(0.04),
                                fumble_lost: rng.gen_bool(0.02),
                                sack: rng.gen_bool(0.06),
                                touchdown: rng.gen_bool(0.05),
                                home_score: None,
                                away_score: None,
                            });
                        }
                    }

                    let score = |sum: f64, rng: &mut StdRng| {
                        (21.0 + 2.0 * sum + rng.gen_range(-7.0..7.0)).max(0.0).round() as u16
                    };
                    let home_score = score(epa_sum[0], &mut rng);
                    let away_score = score(epa_sum[1], &mut rng);
                    for play in game.iter_mut() {
                        play.home_score = Some(home_score);
                        play.away_score = Some(away_score);
                    }
                    plays.extend(game);
                }
            }
        }
        plays
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.matchups = vec![
            MatchupConfig {
                home: "KC".into(),
                away: "Buffalo Bills".into(),
                date: NaiveDate::from_ymd_opt(2025, 12, 21),
                market_total: Some(45.0),
            },
            MatchupConfig {
                home: "DET".into(),
                away: "SF".into(),
                date: None,
                market_total: Some(44.0),
            },
        ];
        config
    }

    fn sheet() -> LineSheet {
        LineSheet::new(vec![LineGame {
            id: "401".into(),
            date: Some("2025-12-21T18:00Z".into()),
            home_team: TeamCode::new("DET"),
            away_team: TeamCode::new("SF"),
            over_under: Some(47.5),
            spread: Some(-3.0),
            status: "Scheduled".into(),
            home_moneyline: Some(-160),
            away_moneyline: Some(135),
        }])
    }

    #[test]
    fn test_resolve_team() {
        assert_eq!(resolve_team("la").unwrap().as_str(), "LAR");
        assert_eq!(resolve_team("Green Bay Packers").unwrap().as_str(), "GB");
        assert!(matches!(resolve_team("XYZ"), Err(TotalsError::UnknownTeam(_))));
    }

    #[test]
    fn test_full_run() {
        let plays = synthetic_plays(42);
        let config = config();
        let pipeline = Pipeline::new(&config).unwrap();

        let output = pipeline
            .run(RunInputs {
                plays: &plays,
                lines: None,
                injuries: None,
            })
            .unwrap();

        assert_eq!(output.artifact.feature_names, FEATURE_NAMES.to_vec());
        assert!(output.artifact.test_samples > 0);
        assert_eq!(output.predictions.len(), 2);

        let classifier = EdgeClassifier::new(config.edge.threshold).unwrap();
        for pred in &output.predictions {
            assert_eq!(pred.edge, pred.projected_total - pred.market_total);
            assert_eq!(pred.recommendation, classifier.recommend(pred.edge));
            let split = pred.projected_home_score + pred.projected_away_score;
            assert!((split - pred.projected_total).abs() < 1e-9);
        }

        let stats = &output.report.summary_stats;
        assert_eq!(stats.over_picks + stats.under_picks + stats.hold_picks, 2);
        assert_eq!(output.report.games[0].away_abbr, "BUF");
        assert_eq!(output.report.training_seasons, vec![2024, 2025]);
        assert!(output.report.line_source.is_none());
    }

    #[test]
    fn test_runs_are_reproducible() {
        let plays = synthetic_plays(7);
        let config = config();
        let pipeline = Pipeline::new(&config).unwrap();
        let run = || {
            pipeline
                .run(RunInputs {
                    plays: &plays,
                    lines: None,
                    injuries: None,
                })
                .unwrap()
        };

        let (a, b) = (run(), run());
        assert_eq!(a.artifact.coefficients, b.artifact.coefficients);
        assert_eq!(a.artifact.metrics, b.artifact.metrics);
        assert_eq!(a.report.games, b.report.games);
    }

    #[test]
    fn test_matchups_take_line_data() {
        let mut config = config();
        config.matchups[1].market_total = None;
        let pipeline = Pipeline::new(&config).unwrap();

        let matchups = pipeline.resolve_matchups(Some(&sheet())).unwrap();
        assert_eq!(matchups[0].market_total, 45.0);
        assert_eq!(matchups[0].game_id, "2025_BUF_KC");
        assert_eq!(matchups[1].market_total, 47.5);
        assert_eq!(matchups[1].game_id, "401");
        assert_eq!(matchups[1].home_moneyline, Some(-160));
        assert_eq!(matchups[1].date, NaiveDate::from_ymd_opt(2025, 12, 21));
    }

    #[test]
    fn test_missing_market_total_is_fatal() {
        let mut config = config();
        config.matchups[0].market_total = None;
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline.resolve_matchups(Some(&sheet())).unwrap_err();
        assert!(matches!(err, TotalsError::MissingMarketTotal { .. }));
    }

    #[test]
    fn test_line_sheet_drives_matchups_when_none_configured() {
        let mut config = config();
        config.matchups.clear();
        let pipeline = Pipeline::new(&config).unwrap();

        let matchups = pipeline.resolve_matchups(Some(&sheet())).unwrap();
        assert_eq!(matchups.len(), 1);
        assert_eq!(matchups[0].home, TeamCode::new("DET"));
        assert!(pipeline.resolve_matchups(None).is_err());
    }

    #[test]
    fn test_unknown_profile_aborts() {
        let plays = synthetic_plays(3);
        let mut config = config();
        config.matchups[0].home = "NYJ".into();
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline
            .run(RunInputs {
                plays: &plays,
                lines: None,
                injuries: None,
            })
            .err()
            .unwrap();
        assert!(matches!(err, TotalsError::NoProfile { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.blend.weights[0].weight = 0.9;
        assert!(matches!(
            Pipeline::new(&config).err().unwrap(),
            TotalsError::InvalidWeight { .. }
        ));
    }

    #[test]
    fn test_injuries_cut_projection() {
        let plays = synthetic_plays(42);
        let config = config();
        let pipeline = Pipeline::new(&config).unwrap();
        let aggregation = pipeline.aggregate(&plays);
        let artifact = pipeline.train(&aggregation).unwrap();
        let profiles = pipeline.profiles(&aggregation);
        let matchups = pipeline.resolve_matchups(None).unwrap();
        let engine = PredictionEngine::new(&artifact);

        let injury = InjuryEvent {
            team: TeamCode::new("KC"),
            player: "Starter".into(),
            position: "QB".into(),
            status: "Out".into(),
            category: crate::Side::Offense,
            tier: crate::features::ImpactTier::High,
        };

        let (healthy, healthy_game) = pipeline
            .project(&engine, &profiles, &matchups[0], &[])
            .unwrap();
        let (hurt, hurt_game) = pipeline
            .project(&engine, &profiles, &matchups[0], &[injury])
            .unwrap();

        let base = FeatureBuilder::build(
            &profiles[&TeamCode::new("KC")],
            &profiles[&TeamCode::new("BUF")],
        );
        let cut = base.scaled(
            &["home_off_pass_epa", "home_off_rush_epa"],
            1.0 - config.injury.high_impact_reduction,
        );
        assert_eq!(healthy.projected_total, engine.project(&base).unwrap());
        assert_eq!(hurt.projected_total, engine.project(&cut).unwrap());
        assert_ne!(hurt.projected_total, healthy.projected_total);
        assert_eq!(hurt.edge, hurt.projected_total - hurt.market_total);

        assert!(healthy_game.injury_notes.is_empty());
        assert_eq!(hurt_game.injury_notes.len(), 1);
    }

    #[test]
    fn test_publish_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("public");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = config();
        config.data.model_path = dir.path().join("model/totals.json").display().to_string();
        config.data.output_path = blocker.join("analysis.json").display().to_string();

        let plays = synthetic_plays(11);
        let pipeline = Pipeline::new(&config).unwrap();
        let output = pipeline
            .run(RunInputs {
                plays: &plays,
                lines: None,
                injuries: None,
            })
            .unwrap();

        assert!(pipeline.publish(&output).is_err());
        let model_dir = dir.path().join("model");
        assert!(!model_dir.join("totals.json").exists());
        assert!(!model_dir.join("totals.json.tmp").exists());

        config.data.output_path = dir.path().join("out/analysis.json").display().to_string();
        let pipeline = Pipeline::new(&config).unwrap();
        pipeline.publish(&output).unwrap();
        assert!(model_dir.join("totals.json").exists());
        assert!(dir.path().join("out/analysis.json").exists());
    }
}
